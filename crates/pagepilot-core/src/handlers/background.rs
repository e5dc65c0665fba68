//! Background-role handlers: thin adapters from payloads to the orchestrator.

use std::sync::Arc;

use pagepilot_types::envelope::kinds;
use pagepilot_types::error::RouterError;
use pagepilot_types::page::{InitializeChatRequest, PageInfo};
use serde_json::Value;

use crate::message::registry::{HandlerResult, MessageHandler};
use crate::message::router::MessageRouter;
use crate::orchestrator::ChatOrchestrator;
use crate::storage::kv_store::KvStore;

use super::{parse_payload, tab_from_payload};

pub struct InitializeChat<K: KvStore> {
    chat: Arc<ChatOrchestrator<K>>,
}

impl<K: KvStore> MessageHandler for InitializeChat<K> {
    async fn handle(&self, payload: Value) -> HandlerResult {
        let request: InitializeChatRequest = parse_payload(kinds::INITIALIZE_CHAT, payload)?;
        let reply = self.chat.initialize_chat(request).await?;
        Ok(serde_json::to_value(reply)?)
    }
}

pub struct ClearSession<K: KvStore> {
    chat: Arc<ChatOrchestrator<K>>,
}

impl<K: KvStore> MessageHandler for ClearSession<K> {
    async fn handle(&self, payload: Value) -> HandlerResult {
        let page: PageInfo = parse_payload(kinds::CLEAR_SESSION, payload)?;
        self.chat.clear_session(&page).await?;
        Ok(Value::Null)
    }
}

pub struct GetHistory<K: KvStore> {
    chat: Arc<ChatOrchestrator<K>>,
}

impl<K: KvStore> MessageHandler for GetHistory<K> {
    async fn handle(&self, payload: Value) -> HandlerResult {
        let tab = tab_from_payload(&payload)?;
        let turns = self.chat.history(&tab).await?;
        Ok(serde_json::to_value(turns)?)
    }
}

pub struct TabActivated<K: KvStore> {
    chat: Arc<ChatOrchestrator<K>>,
}

impl<K: KvStore> MessageHandler for TabActivated<K> {
    async fn handle(&self, payload: Value) -> HandlerResult {
        let tab = tab_from_payload(&payload)?;
        self.chat.activate_tab(&tab).await?;
        Ok(Value::Null)
    }
}

/// Register the background-role handlers on `router`.
pub fn register_background_handlers<K>(
    router: &MessageRouter,
    chat: Arc<ChatOrchestrator<K>>,
) -> Result<(), RouterError>
where
    K: KvStore + 'static,
{
    router.register(
        kinds::INITIALIZE_CHAT,
        InitializeChat {
            chat: Arc::clone(&chat),
        },
    )?;
    router.register(
        kinds::CLEAR_SESSION,
        ClearSession {
            chat: Arc::clone(&chat),
        },
    )?;
    router.register(
        kinds::GET_HISTORY,
        GetHistory {
            chat: Arc::clone(&chat),
        },
    )?;
    router.register(kinds::TAB_ACTIVATED, TabActivated { chat })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use pagepilot_types::config::AppConfig;
    use tokio::sync::Notify;
    use pagepilot_types::envelope::ErrorCode;
    use serde_json::json;

    use crate::agent::tools::page_tools;
    use crate::handlers::content::register_content_handlers;
    use crate::message::host;
    use crate::message::router::RouterConfig;
    use crate::orchestrator::ChatCollaborators;
    use crate::retrieval::box_embedder::BoxEmbedder;
    use crate::test_support::{
        FakeFactory, FakePage, MockEmbedder, MockKvStore, RecordingActions, ScriptedProvider,
        StaticCredentials, text_response,
    };

    fn router_config() -> RouterConfig {
        RouterConfig::new(Duration::from_secs(5), 16).unwrap()
    }

    fn background(credentials: StaticCredentials, scripted: ScriptedProvider) -> MessageRouter {
        background_with(router_config(), credentials, scripted)
    }

    fn background_with(
        config: RouterConfig,
        credentials: StaticCredentials,
        scripted: ScriptedProvider,
    ) -> MessageRouter {
        let page = Arc::new(FakePage::with_text("7", "https://acme.test", "Acme Corp develops routers."));
        let chat = ChatOrchestrator::new(
            Arc::new(MockKvStore::new()),
            BoxEmbedder::new(MockEmbedder::new()),
            &AppConfig::default(),
            ChatCollaborators {
                credentials: Arc::new(credentials),
                providers: Arc::new(FakeFactory::new(scripted)),
                tools: Arc::new(page_tools(page, Arc::new(RecordingActions::new()))),
            },
        )
        .unwrap();
        let router = MessageRouter::background(config);
        register_background_handlers(&router, Arc::new(chat)).unwrap();
        router
    }

    #[tokio::test]
    async fn test_full_pipeline_from_content_to_reply() {
        let (port, inbox) = host::channel(8);
        let bg = Arc::new(background(
            StaticCredentials::configured(),
            ScriptedProvider::new(vec![text_response("Acme makes routers.")]),
        ));
        bg.listen(inbox).unwrap();

        let content = MessageRouter::content(router_config(), port);
        let page = Arc::new(FakePage::with_text("7", "https://acme.test", "Acme Corp develops routers."));
        register_content_handlers(&content, page).unwrap();

        let reply = content
            .handle_raw(json!({
                "kind": "initialize-chat",
                "payload": {"id": "7", "query": "What does Acme do?", "messageId": "m-1"}
            }))
            .await
            .into_result()
            .unwrap();
        assert_eq!(reply["content"], "Acme makes routers.");
        assert!(reply["timestamp"].is_string());

        let history = bg
            .handle_raw(json!({"kind": "get-history", "payload": "7"}))
            .await
            .into_result()
            .unwrap();
        assert_eq!(history.as_array().unwrap().len(), 2);
        assert_eq!(history[0]["id"], "m-1");
        assert_eq!(history[0]["status"], "sent");

        content
            .handle_raw(json!({"kind": "clear-session", "payload": "7"}))
            .await
            .into_result()
            .unwrap();
        let history = bg
            .handle_raw(json!({"kind": "get-history", "payload": "7"}))
            .await
            .into_result()
            .unwrap();
        assert_eq!(history, json!([]));
    }

    #[tokio::test]
    async fn test_not_configured_is_a_handler_failure() {
        let bg = background(StaticCredentials::unconfigured(), ScriptedProvider::new(vec![]));
        let response = bg
            .handle_raw(json!({
                "kind": "initialize-chat",
                "payload": {"id": "7", "url": "https://acme.test", "query": "hi"}
            }))
            .await;
        assert_eq!(response.code(), Some(ErrorCode::HandlerExecutionError));
        assert!(response.into_result().unwrap_err().message.contains("no model provider is configured"));
    }

    #[tokio::test]
    async fn test_tab_activated_creates_the_session() {
        let bg = background(StaticCredentials::configured(), ScriptedProvider::new(vec![]));
        let data = bg
            .handle_raw(json!({"kind": "tab-activated", "payload": {"tabId": 3}}))
            .await
            .into_result()
            .unwrap();
        assert!(data.is_null());
        let history = bg
            .handle_raw(json!({"kind": "get-history", "payload": 3}))
            .await
            .into_result()
            .unwrap();
        assert_eq!(history, json!([]));
    }

    #[tokio::test]
    async fn test_malformed_chat_payload_is_rejected() {
        let bg = background(StaticCredentials::configured(), ScriptedProvider::new(vec![]));
        let response = bg
            .handle_raw(json!({"kind": "initialize-chat", "payload": {"id": "7"}}))
            .await;
        assert_eq!(response.code(), Some(ErrorCode::HandlerExecutionError));
        assert!(response.into_result().unwrap_err().message.contains("invalid 'initialize-chat' payload"));
    }

    #[tokio::test]
    async fn test_numeric_tab_id_starts_a_chat() {
        let bg = background(
            StaticCredentials::configured(),
            ScriptedProvider::new(vec![text_response("hello")]),
        );
        let reply = bg
            .handle_raw(json!({
                "kind": "initialize-chat",
                "payload": {"id": 7, "url": "https://acme.test", "query": "hi"}
            }))
            .await
            .into_result()
            .unwrap();
        assert_eq!(reply["content"], "hello");

        let history = bg
            .handle_raw(json!({"kind": "get-history", "payload": "7"}))
            .await
            .into_result()
            .unwrap();
        assert_eq!(history.as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_timed_out_chat_leaves_turn_in_error() {
        let stalled = ScriptedProvider::gated(vec![], Arc::new(Notify::new()), Arc::new(Notify::new()));
        let bg = background_with(
            RouterConfig::new(Duration::from_secs(1), 16).unwrap(),
            StaticCredentials::configured(),
            stalled,
        );
        let response = bg
            .handle_raw(json!({
                "kind": "initialize-chat",
                "payload": {"id": "7", "url": "https://acme.test", "query": "hi", "messageId": "m-1"}
            }))
            .await;
        assert_eq!(response.code(), Some(ErrorCode::RoutingError));

        let mut turn = json!(null);
        for _ in 0..200 {
            let history = bg
                .handle_raw(json!({"kind": "get-history", "payload": "7"}))
                .await
                .into_result()
                .unwrap();
            turn = history[0].clone();
            if turn["status"] == "error" {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(turn["id"], "m-1");
        assert_eq!(turn["status"], "error");
    }
}
