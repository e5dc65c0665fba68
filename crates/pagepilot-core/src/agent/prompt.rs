//! System prompt assembly for page-grounded turns.

use pagepilot_types::page::PageInfo;
use pagepilot_types::retrieval::GroundingContext;

const INSTRUCTIONS: &str = "\
You are PagePilot, an assistant that answers questions about the web page open in the user's browser tab.

Use the page context below to answer. If the context is insufficient, say so, then still answer from general knowledge.

Before using any interaction tool (navigate, click, type_text, execute_script, go_back, go_forward, validate_selector), call read_page_content to inspect the current page structure. Never guess selectors.";

/// Build the system prompt for one turn.
pub fn build_system_prompt(page: Option<&PageInfo>, context: &GroundingContext) -> String {
    let mut prompt = String::from(INSTRUCTIONS);

    if let Some(page) = page {
        prompt.push_str("\n\n<page>\n");
        if !page.title.is_empty() {
            prompt.push_str(&format!("Title: {}\n", page.title));
        }
        prompt.push_str(&format!("URL: {}\n</page>", page.url));
    }

    let label = match context {
        GroundingContext::Focused { .. } => "Most relevant excerpts of the page",
        GroundingContext::FullPage { .. } => "Full page text",
        GroundingContext::Empty => return prompt,
    };
    if context.is_empty() {
        return prompt;
    }

    prompt.push_str(&format!("\n\n<context description=\"{label}\">\n"));
    prompt.push_str(&context.render());
    prompt.push_str("\n</context>");
    prompt
}
