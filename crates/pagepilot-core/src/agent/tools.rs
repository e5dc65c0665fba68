//! Tool bridge between model tool calls and page collaborators.
//!
//! A `Tool` pairs a `ToolDefinition` (what the model sees) with the
//! executable that runs it. `ToolRegistry` resolves a `ToolCall` by name to
//! exactly one executable. `PageToolkit` binds the page tools to the
//! `PageContentProvider` / `PageActions` collaborators for one tab.

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use pagepilot_types::chat::TabId;
use pagepilot_types::error::{PageError, ToolError};
use pagepilot_types::llm::ToolDefinition;
use serde_json::{Value, json};

use crate::page::{PageActions, PageContentProvider};

/// Page text beyond this many characters is cut from `read_page_content`.
const MAX_PAGE_CHARS: usize = 20_000;

/// An executable the model can call.
///
/// Uses RPITIT; `BoxTool` is the type-erased form.
pub trait Tool: Send + Sync {
    fn definition(&self) -> ToolDefinition;

    /// Run the tool. The returned text is fed back to the model verbatim.
    fn execute(&self, arguments: Value) -> impl Future<Output = Result<String, ToolError>> + Send;
}

/// Object-safe version of [`Tool`] with boxed futures.
pub trait ToolDyn: Send + Sync {
    fn definition_dyn(&self) -> ToolDefinition;

    fn execute_boxed(
        &self,
        arguments: Value,
    ) -> Pin<Box<dyn Future<Output = Result<String, ToolError>> + Send + '_>>;
}

impl<T: Tool> ToolDyn for T {
    fn definition_dyn(&self) -> ToolDefinition {
        self.definition()
    }

    fn execute_boxed(
        &self,
        arguments: Value,
    ) -> Pin<Box<dyn Future<Output = Result<String, ToolError>> + Send + '_>> {
        Box::pin(self.execute(arguments))
    }
}

/// Type-erased tool.
#[derive(Clone)]
pub struct BoxTool {
    inner: Arc<dyn ToolDyn>,
}

impl BoxTool {
    pub fn new<T: Tool + 'static>(tool: T) -> Self {
        Self {
            inner: Arc::new(tool),
        }
    }

    pub fn definition(&self) -> ToolDefinition {
        self.inner.definition_dyn()
    }

    pub async fn execute(&self, arguments: Value) -> Result<String, ToolError> {
        self.inner.execute_boxed(arguments).await
    }
}

/// Tools available to one agent run, keyed by name.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, BoxTool>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a tool. A tool with the same name is replaced.
    pub fn register<T: Tool + 'static>(&mut self, tool: T) {
        let tool = BoxTool::new(tool);
        self.tools.insert(tool.definition().name, tool);
    }

    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.values().map(BoxTool::definition).collect()
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(String::as_str).collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Run the tool named `name`. Unknown names are an error, not a panic.
    pub async fn execute(&self, name: &str, arguments: Value) -> Result<String, ToolError> {
        let tool = self
            .tools
            .get(name)
            .ok_or_else(|| ToolError::UnknownTool(name.to_string()))?;
        tool.execute(arguments).await
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.names())
            .finish()
    }
}

/// Builds the tool registry for a given tab.
pub trait ToolBinder: Send + Sync {
    fn bind(&self, tab: &TabId) -> ToolRegistry;
}

/// The page tools offered to the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageToolKind {
    ReadPageContent,
    Navigate,
    Click,
    TypeText,
    ExecuteScript,
    GoBack,
    GoForward,
    ValidateSelector,
}

impl PageToolKind {
    pub const ALL: [PageToolKind; 8] = [
        PageToolKind::ReadPageContent,
        PageToolKind::Navigate,
        PageToolKind::Click,
        PageToolKind::TypeText,
        PageToolKind::ExecuteScript,
        PageToolKind::GoBack,
        PageToolKind::GoForward,
        PageToolKind::ValidateSelector,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            PageToolKind::ReadPageContent => "read_page_content",
            PageToolKind::Navigate => "navigate",
            PageToolKind::Click => "click",
            PageToolKind::TypeText => "type_text",
            PageToolKind::ExecuteScript => "execute_script",
            PageToolKind::GoBack => "go_back",
            PageToolKind::GoForward => "go_forward",
            PageToolKind::ValidateSelector => "validate_selector",
        }
    }

    fn description(&self) -> &'static str {
        match self {
            PageToolKind::ReadPageContent => {
                "Read the current visible text, title and URL of the page. Call this before any interaction tool to learn the page structure."
            }
            PageToolKind::Navigate => "Navigate the tab to a URL.",
            PageToolKind::Click => "Click the first element matching a CSS selector.",
            PageToolKind::TypeText => "Type text into the element matching a CSS selector.",
            PageToolKind::ExecuteScript => "Run a JavaScript snippet in the page and return its result.",
            PageToolKind::GoBack => "Go back one entry in the tab's history.",
            PageToolKind::GoForward => "Go forward one entry in the tab's history.",
            PageToolKind::ValidateSelector => {
                "Check whether a CSS selector matches any element, without interacting with it."
            }
        }
    }

    fn parameters(&self) -> Value {
        let string = |description: &str| json!({"type": "string", "description": description});
        let (properties, required) = match self {
            PageToolKind::ReadPageContent | PageToolKind::GoBack | PageToolKind::GoForward => {
                (json!({}), json!([]))
            }
            PageToolKind::Navigate => (
                json!({"url": string("Absolute URL to open")}),
                json!(["url"]),
            ),
            PageToolKind::Click | PageToolKind::ValidateSelector => (
                json!({"selector": string("CSS selector")}),
                json!(["selector"]),
            ),
            PageToolKind::TypeText => (
                json!({
                    "selector": string("CSS selector of the input"),
                    "text": string("Text to type")
                }),
                json!(["selector", "text"]),
            ),
            PageToolKind::ExecuteScript => (
                json!({"script": string("JavaScript source")}),
                json!(["script"]),
            ),
        };
        json!({"type": "object", "properties": properties, "required": required})
    }
}

/// One page tool bound to a tab.
pub struct PageTool<P, A> {
    kind: PageToolKind,
    tab: TabId,
    content: Arc<P>,
    actions: Arc<A>,
}

impl<P: PageContentProvider, A: PageActions> PageTool<P, A> {
    async fn run(&self, arguments: &Value) -> Result<String, ToolError> {
        let name = self.kind.name();
        let page_err = |e: PageError| ToolError::from((name, e));
        let tab = &self.tab;

        match self.kind {
            PageToolKind::ReadPageContent => {
                let page = self.content.page_content(tab).await.map_err(page_err)?;
                let mut text: String = page.content.chars().take(MAX_PAGE_CHARS).collect();
                if text.len() < page.content.len() {
                    text.push_str("\n[truncated]");
                }
                Ok(format!("Title: {}\nURL: {}\n\n{}", page.title, page.url, text))
            }
            PageToolKind::Navigate => {
                let url = required_str(arguments, name, "url")?;
                self.actions.navigate(tab, url).await.map_err(page_err)
            }
            PageToolKind::Click => {
                let selector = required_str(arguments, name, "selector")?;
                self.actions.click(tab, selector).await.map_err(page_err)
            }
            PageToolKind::TypeText => {
                let selector = required_str(arguments, name, "selector")?;
                let text = required_str(arguments, name, "text")?;
                self.actions.type_text(tab, selector, text).await.map_err(page_err)
            }
            PageToolKind::ExecuteScript => {
                let script = required_str(arguments, name, "script")?;
                self.actions.execute_script(tab, script).await.map_err(page_err)
            }
            PageToolKind::GoBack => self.actions.go_back(tab).await.map_err(page_err),
            PageToolKind::GoForward => self.actions.go_forward(tab).await.map_err(page_err),
            PageToolKind::ValidateSelector => {
                let selector = required_str(arguments, name, "selector")?;
                self.actions.validate_selector(tab, selector).await.map_err(page_err)
            }
        }
    }
}

impl<P: PageContentProvider, A: PageActions> Tool for PageTool<P, A> {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.kind.name().to_string(),
            description: self.kind.description().to_string(),
            parameters: self.kind.parameters(),
        }
    }

    async fn execute(&self, arguments: Value) -> Result<String, ToolError> {
        self.run(&arguments).await
    }
}

fn required_str<'a>(arguments: &'a Value, tool: &str, field: &str) -> Result<&'a str, ToolError> {
    arguments
        .get(field)
        .and_then(Value::as_str)
        .ok_or_else(|| ToolError::InvalidArguments {
            tool: tool.to_string(),
            message: format!("missing string field '{field}'"),
        })
}

/// The page collaborators, ready to be bound to a tab.
pub struct PageToolkit<P, A> {
    content: Arc<P>,
    actions: Arc<A>,
}

/// Bind the page tools to the content provider and page actions.
pub fn page_tools<P, A>(content: Arc<P>, actions: Arc<A>) -> PageToolkit<P, A>
where
    P: PageContentProvider + 'static,
    A: PageActions + 'static,
{
    PageToolkit { content, actions }
}

impl<P, A> ToolBinder for PageToolkit<P, A>
where
    P: PageContentProvider + 'static,
    A: PageActions + 'static,
{
    fn bind(&self, tab: &TabId) -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        for kind in PageToolKind::ALL {
            registry.register(PageTool {
                kind,
                tab: tab.clone(),
                content: Arc::clone(&self.content),
                actions: Arc::clone(&self.actions),
            });
        }
        registry
    }
}
