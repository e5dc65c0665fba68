//! `ppilot ask`: one grounded chat turn.

use std::path::Path;
use std::time::Duration;

use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::json;
use tokio::io::AsyncReadExt;

use pagepilot_types::chat::TabId;
use pagepilot_types::envelope::kinds;
use pagepilot_types::page::{ChatReply, ChatQuery, PageContent};

use super::{PageArgs, into_data};
use crate::state::AppState;

/// Read page text from `path`, or stdin for `-`.
async fn read_page_text(path: &Path) -> anyhow::Result<String> {
    if path == Path::new("-") {
        let mut text = String::new();
        tokio::io::stdin().read_to_string(&mut text).await?;
        return Ok(text);
    }
    tokio::fs::read_to_string(path)
        .await
        .map_err(|e| anyhow::anyhow!("cannot read page file {}: {e}", path.display()))
}

/// Attach the page described by `args` to its tab, if a file was given.
pub async fn load_page(state: &AppState, args: &PageArgs) -> anyhow::Result<Option<PageContent>> {
    let Some(path) = &args.file else {
        return Ok(None);
    };
    let page = PageContent {
        id: TabId::from(args.tab.as_str()),
        url: args.url.clone(),
        title: args.title.clone(),
        content: read_page_text(path).await?,
    };
    tracing::debug!(tab_id = %page.id, chars = page.content.len(), "loaded page");
    state.pages.insert(page.clone());
    Ok(Some(page))
}

pub async fn ask(
    state: &AppState,
    question: String,
    page: PageArgs,
    no_rag: bool,
    message_id: Option<String>,
    json_output: bool,
) -> anyhow::Result<()> {
    let loaded = load_page(state, &page).await?;
    let tab = TabId::from(page.tab.as_str());

    into_data(state.bridge.request(kinds::TAB_ACTIVATED, json!(tab.as_str())).await?)?;

    let query = ChatQuery {
        id: tab,
        query: question,
        message_id,
        enable_rag: !no_rag,
    };

    let spinner = ProgressBar::new_spinner();
    if !json_output {
        spinner.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        spinner.set_message("Thinking...");
        spinner.enable_steady_tick(Duration::from_millis(80));
    }

    let response = state
        .bridge
        .request(kinds::INITIALIZE_CHAT, serde_json::to_value(&query)?)
        .await;
    spinner.finish_and_clear();

    let reply: ChatReply = serde_json::from_value(into_data(response?)?)?;

    if json_output {
        println!("{}", serde_json::to_string_pretty(&reply)?);
        return Ok(());
    }

    if loaded.is_none() {
        println!(
            "  {}",
            style("(no page attached; answering from the conversation so far)").dim()
        );
    }
    println!();
    println!("{}", reply.content);
    println!();
    println!(
        "  {} {}",
        style("turn").dim(),
        style(reply.id).dim()
    );
    Ok(())
}
