//! Page-side payloads: tab/page identity, extracted content, chat requests.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::{Position, Url};

use crate::chat::TabId;

/// Answer to `get-session`: which tab and URL the content context serves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TabSession {
    pub id: TabId,
    pub url: String,
}

/// Identity of the page a request is about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageInfo {
    pub id: TabId,
    pub url: String,
    #[serde(default)]
    pub title: String,
}

/// Answer to `get-page-content`: visible text of the page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageContent {
    pub id: TabId,
    pub url: String,
    #[serde(default)]
    pub title: String,
    pub content: String,
}

impl PageContent {
    pub fn info(&self) -> PageInfo {
        PageInfo {
            id: self.id.clone(),
            url: self.url.clone(),
            title: self.title.clone(),
        }
    }
}

/// Payload of `initialize-chat` as sent by the UI to the content context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatQuery {
    pub id: TabId,
    pub query: String,
    #[serde(default)]
    pub message_id: Option<String>,
    #[serde(default = "default_enable_rag")]
    pub enable_rag: bool,
}

fn default_enable_rag() -> bool {
    true
}

/// Payload of `initialize-chat` once the content context attached the page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeChatRequest {
    pub id: TabId,
    pub url: String,
    #[serde(default)]
    pub title: String,
    /// Extracted page text; absent when the page could not be read.
    #[serde(default)]
    pub content: Option<String>,
    pub query: String,
    #[serde(default)]
    pub message_id: Option<String>,
    #[serde(default = "default_enable_rag")]
    pub enable_rag: bool,
}

impl InitializeChatRequest {
    pub fn page(&self) -> Option<PageContent> {
        self.content.as_ref().map(|content| PageContent {
            id: self.id.clone(),
            url: self.url.clone(),
            title: self.title.clone(),
            content: content.clone(),
        })
    }
}

/// Answer to `initialize-chat`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatReply {
    pub id: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

/// Normalize a URL so that trivially different spellings of the same page
/// share one retrieval index.
///
/// Lowercases scheme and host, drops default ports and the fragment, and
/// strips a trailing slash from the path. Query strings are kept: they
/// usually select content. Unparseable input only loses its fragment and
/// trailing slash.
pub fn canonical_url(raw: &str) -> String {
    let trimmed = raw.trim();
    let Ok(mut url) = Url::parse(trimmed) else {
        let without_fragment = trimmed.split('#').next().unwrap_or(trimmed);
        return without_fragment.trim_end_matches('/').to_string();
    };
    url.set_fragment(None);

    let mut out = url[..Position::BeforePath].to_string();
    out.push_str(url.path().trim_end_matches('/'));
    if let Some(query) = url.query() {
        out.push('?');
        out.push_str(query);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_canonical_url_drops_fragment_and_trailing_slash() {
        assert_eq!(
            canonical_url("HTTPS://Example.COM/Docs/#intro"),
            "https://example.com/Docs"
        );
        assert_eq!(canonical_url("https://example.com/"), "https://example.com");
        assert_eq!(
            canonical_url("https://example.com/a/?q=1#x"),
            "https://example.com/a?q=1"
        );
    }

    #[test]
    fn test_canonical_url_drops_default_port() {
        assert_eq!(canonical_url("https://acme.test:443/a"), "https://acme.test/a");
        assert_eq!(canonical_url("http://ACME.test:80/a/"), "http://acme.test/a");
        assert_eq!(canonical_url("http://acme.test:8080/a"), "http://acme.test:8080/a");
    }

    #[test]
    fn test_canonical_url_falls_back_for_unparseable_input() {
        assert_eq!(canonical_url("  not a url/#top "), "not a url");
        assert_eq!(canonical_url("about:blank"), "about:blank");
    }

    #[test]
    fn test_canonical_url_keeps_query() {
        assert_ne!(
            canonical_url("https://example.com/search?q=a"),
            canonical_url("https://example.com/search?q=b")
        );
    }

    #[test]
    fn test_chat_query_uses_camel_case_and_defaults() {
        let q: ChatQuery = serde_json::from_value(json!({
            "id": "7",
            "query": "what is this?",
            "messageId": "m-1"
        }))
        .unwrap();
        assert_eq!(q.message_id.as_deref(), Some("m-1"));
        assert!(q.enable_rag);
    }

    #[test]
    fn test_initialize_request_page_requires_content() {
        let mut req: InitializeChatRequest = serde_json::from_value(json!({
            "id": "7",
            "url": "https://acme.test",
            "query": "hi",
            "enableRag": false
        }))
        .unwrap();
        assert!(!req.enable_rag);
        assert!(req.page().is_none());

        req.content = Some("Acme Corp".to_string());
        let page = req.page().unwrap();
        assert_eq!(page.content, "Acme Corp");
        assert_eq!(page.info().id, TabId::from("7"));
    }
}
