//! Content-role handlers: they run next to the page.
//!
//! `get-session` and `get-page-content` answer locally. `initialize-chat`
//! and `clear-session` attach what only the page side knows (the extracted
//! text, the URL and title) and let the router forward the result to the
//! background role.

use std::sync::Arc;

use pagepilot_types::envelope::kinds;
use pagepilot_types::page::{ChatQuery, InitializeChatRequest, PageInfo, TabSession};
use pagepilot_types::error::RouterError;
use serde_json::Value;
use tracing::{debug, warn};

use crate::message::registry::{HandlerResult, MessageHandler};
use crate::message::router::MessageRouter;
use crate::page::PageContentProvider;

use super::{parse_payload, tab_from_payload};

/// `get-session`: `{id, url}` of the tab's page.
pub struct GetSession<P> {
    page: Arc<P>,
}

impl<P: PageContentProvider> MessageHandler for GetSession<P> {
    async fn handle(&self, payload: Value) -> HandlerResult {
        let tab = tab_from_payload(&payload)?;
        let page = self.page.page_content(&tab).await?;
        Ok(serde_json::to_value(TabSession {
            id: page.id,
            url: page.url,
        })?)
    }

    fn forwards(&self) -> bool {
        false
    }
}

/// `get-page-content`: visible text, title and URL of the tab's page.
pub struct GetPageContent<P> {
    page: Arc<P>,
}

impl<P: PageContentProvider> MessageHandler for GetPageContent<P> {
    async fn handle(&self, payload: Value) -> HandlerResult {
        let tab = tab_from_payload(&payload)?;
        let page = self.page.page_content(&tab).await?;
        Ok(serde_json::to_value(page)?)
    }

    fn forwards(&self) -> bool {
        false
    }
}

/// `initialize-chat`: attach the page to the user's query.
///
/// An unreadable page does not fail the turn; the request goes on without
/// content and the background answers from whatever it already has.
pub struct EnrichChatQuery<P> {
    page: Arc<P>,
}

impl<P: PageContentProvider> MessageHandler for EnrichChatQuery<P> {
    async fn handle(&self, payload: Value) -> HandlerResult {
        let query: ChatQuery = parse_payload(kinds::INITIALIZE_CHAT, payload)?;

        let (url, title, content) = match self.page.page_content(&query.id).await {
            Ok(page) => {
                debug!(tab_id = %query.id, chars = page.content.len(), "attached page content");
                (page.url, page.title, Some(page.content))
            }
            Err(e) => {
                warn!(tab_id = %query.id, error = %e, "page content unavailable, forwarding query without it");
                (String::new(), String::new(), None)
            }
        };

        Ok(serde_json::to_value(InitializeChatRequest {
            id: query.id,
            url,
            title,
            content,
            query: query.query,
            message_id: query.message_id,
            enable_rag: query.enable_rag,
        })?)
    }
}

/// `clear-session`: attach the page identity.
pub struct AttachPageInfo<P> {
    page: Arc<P>,
}

impl<P: PageContentProvider> MessageHandler for AttachPageInfo<P> {
    async fn handle(&self, payload: Value) -> HandlerResult {
        let tab = tab_from_payload(&payload)?;
        let info = match self.page.page_content(&tab).await {
            Ok(page) => page.info(),
            Err(e) => {
                debug!(tab_id = %tab, error = %e, "clearing session of a tab without a readable page");
                PageInfo {
                    id: tab,
                    url: String::new(),
                    title: String::new(),
                }
            }
        };
        Ok(serde_json::to_value(info)?)
    }
}

/// Register the content-role handlers on `router`.
pub fn register_content_handlers<P>(router: &MessageRouter, page: Arc<P>) -> Result<(), RouterError>
where
    P: PageContentProvider + 'static,
{
    router.register(
        kinds::GET_SESSION,
        GetSession {
            page: Arc::clone(&page),
        },
    )?;
    router.register(
        kinds::GET_PAGE_CONTENT,
        GetPageContent {
            page: Arc::clone(&page),
        },
    )?;
    router.register(
        kinds::INITIALIZE_CHAT,
        EnrichChatQuery {
            page: Arc::clone(&page),
        },
    )?;
    router.register(kinds::CLEAR_SESSION, AttachPageInfo { page })?;
    Ok(())
}
