//! Page collaborator ports.
//!
//! `PageContentProvider` reads the page attached to a tab; `PageActions`
//! manipulates it. Both live outside this crate (a browser bridge, or the
//! static/detached implementations in pagepilot-infra). Every action may
//! fail with a descriptive `PageError`, which the agent loop turns into a
//! tool-result message.

use std::future::Future;

use pagepilot_types::chat::TabId;
use pagepilot_types::error::PageError;
use pagepilot_types::page::PageContent;

/// Reads visible text, title and URL of the page in a tab.
pub trait PageContentProvider: Send + Sync {
    fn page_content(
        &self,
        tab: &TabId,
    ) -> impl Future<Output = Result<PageContent, PageError>> + Send;
}

/// Low-level page manipulation primitives.
pub trait PageActions: Send + Sync {
    fn navigate(
        &self,
        tab: &TabId,
        url: &str,
    ) -> impl Future<Output = Result<String, PageError>> + Send;

    fn click(
        &self,
        tab: &TabId,
        selector: &str,
    ) -> impl Future<Output = Result<String, PageError>> + Send;

    fn type_text(
        &self,
        tab: &TabId,
        selector: &str,
        text: &str,
    ) -> impl Future<Output = Result<String, PageError>> + Send;

    fn execute_script(
        &self,
        tab: &TabId,
        script: &str,
    ) -> impl Future<Output = Result<String, PageError>> + Send;

    fn go_back(&self, tab: &TabId) -> impl Future<Output = Result<String, PageError>> + Send;

    fn go_forward(&self, tab: &TabId) -> impl Future<Output = Result<String, PageError>> + Send;

    /// Report whether `selector` matches anything, and what.
    fn validate_selector(
        &self,
        tab: &TabId,
        selector: &str,
    ) -> impl Future<Output = Result<String, PageError>> + Send;
}
