//! Page collaborators for runs without a live browser.
//!
//! [`StaticPageProvider`] serves page text that was handed in up front (a
//! file, stdin, an HTTP request body). [`DetachedPageActions`] refuses every
//! manipulation, so the model gets a clear tool error instead of a silent
//! no-op.

use dashmap::DashMap;

use pagepilot_core::page::{PageActions, PageContentProvider};
use pagepilot_types::chat::TabId;
use pagepilot_types::error::PageError;
use pagepilot_types::page::PageContent;

/// Tab-keyed page snapshots held in memory.
#[derive(Default)]
pub struct StaticPageProvider {
    pages: DashMap<TabId, PageContent>,
}

impl StaticPageProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach (or replace) the page shown in `page.id`.
    pub fn insert(&self, page: PageContent) {
        self.pages.insert(page.id.clone(), page);
    }

    pub fn remove(&self, tab: &TabId) -> Option<PageContent> {
        self.pages.remove(tab).map(|(_, page)| page)
    }
}

impl PageContentProvider for StaticPageProvider {
    async fn page_content(&self, tab: &TabId) -> Result<PageContent, PageError> {
        self.pages
            .get(tab)
            .map(|page| page.value().clone())
            .ok_or_else(|| PageError::NoPage(tab.to_string()))
    }
}

/// `PageActions` with no page behind it.
#[derive(Debug, Default, Clone, Copy)]
pub struct DetachedPageActions;

impl PageActions for DetachedPageActions {
    async fn navigate(&self, _tab: &TabId, _url: &str) -> Result<String, PageError> {
        Err(PageError::Unavailable)
    }

    async fn click(&self, _tab: &TabId, _selector: &str) -> Result<String, PageError> {
        Err(PageError::Unavailable)
    }

    async fn type_text(&self, _tab: &TabId, _selector: &str, _text: &str) -> Result<String, PageError> {
        Err(PageError::Unavailable)
    }

    async fn execute_script(&self, _tab: &TabId, _script: &str) -> Result<String, PageError> {
        Err(PageError::Unavailable)
    }

    async fn go_back(&self, _tab: &TabId) -> Result<String, PageError> {
        Err(PageError::Unavailable)
    }

    async fn go_forward(&self, _tab: &TabId) -> Result<String, PageError> {
        Err(PageError::Unavailable)
    }

    async fn validate_selector(&self, _tab: &TabId, _selector: &str) -> Result<String, PageError> {
        Err(PageError::Unavailable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(tab: &str) -> PageContent {
        PageContent {
            id: TabId::from(tab),
            url: "https://acme.test/pricing".to_string(),
            title: "Pricing".to_string(),
            content: "Pro plan costs $20.".to_string(),
        }
    }

    #[tokio::test]
    async fn test_serves_inserted_pages_by_tab() {
        let provider = StaticPageProvider::new();
        provider.insert(page("1"));

        let found = provider.page_content(&TabId::from("1")).await.unwrap();
        assert_eq!(found.title, "Pricing");
        assert!(matches!(
            provider.page_content(&TabId::from("2")).await,
            Err(PageError::NoPage(tab)) if tab == "2"
        ));

        provider.remove(&TabId::from("1"));
        assert!(provider.page_content(&TabId::from("1")).await.is_err());
    }

    #[tokio::test]
    async fn test_detached_actions_are_unavailable() {
        let actions = DetachedPageActions;
        let tab = TabId::from("1");
        assert!(matches!(actions.click(&tab, "#buy").await, Err(PageError::Unavailable)));
        assert!(matches!(actions.go_back(&tab).await, Err(PageError::Unavailable)));
    }
}
