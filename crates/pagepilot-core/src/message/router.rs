//! Message routers for the content and background roles.
//!
//! Both roles share the same registry, validation and listener loop and
//! differ only in what happens after the local handler ran:
//! - **Background:** answer with the handler's result.
//! - **Content:** forward the result upstream as a new message of the same
//!   kind and relay whatever comes back, unless the handler is local-only.
//!
//! Every inbound message is answered exactly once and every request is
//! bounded by the configured timeout.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use pagepilot_types::config::RouterSettings;
use pagepilot_types::envelope::{MessageEnvelope, ResponseEnvelope};
use pagepilot_types::error::RouterError;
use serde_json::Value;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::host::{HostInbox, HostPort};
use super::registry::{HandlerRegistry, MessageHandler, run_handler};

/// Validated timeout and capacity for a router.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouterConfig {
    timeout: Duration,
    max_handlers: usize,
}

impl RouterConfig {
    pub const MIN_TIMEOUT: Duration = Duration::from_secs(1);
    pub const MAX_TIMEOUT: Duration = Duration::from_secs(300);
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
    pub const DEFAULT_MAX_HANDLERS: usize = 64;
    pub const MAX_HANDLERS_LIMIT: usize = 1024;

    /// Build a config. The timeout is clamped to [1s, 300s]; `max_handlers`
    /// outside 1..=1024 is rejected.
    pub fn new(timeout: Duration, max_handlers: usize) -> Result<Self, RouterError> {
        if max_handlers == 0 || max_handlers > Self::MAX_HANDLERS_LIMIT {
            return Err(RouterError::InvalidConfig(format!(
                "max_handlers must be between 1 and {}, got {max_handlers}",
                Self::MAX_HANDLERS_LIMIT
            )));
        }
        Ok(Self {
            timeout: timeout.clamp(Self::MIN_TIMEOUT, Self::MAX_TIMEOUT),
            max_handlers,
        })
    }

    pub fn from_settings(settings: &RouterSettings) -> Result<Self, RouterError> {
        Self::new(Duration::from_millis(settings.timeout_ms), settings.max_handlers)
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn max_handlers(&self) -> usize {
        self.max_handlers
    }
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            timeout: Self::DEFAULT_TIMEOUT,
            max_handlers: Self::DEFAULT_MAX_HANDLERS,
        }
    }
}

/// Which side of the host boundary a router serves.
#[derive(Debug, Clone)]
pub enum RouterRole {
    Background,
    Content { upstream: HostPort },
}

impl RouterRole {
    fn name(&self) -> &'static str {
        match self {
            RouterRole::Background => "background",
            RouterRole::Content { .. } => "content",
        }
    }
}

/// Validates, dispatches and answers messages for one execution context.
pub struct MessageRouter {
    role: RouterRole,
    config: RouterConfig,
    registry: HandlerRegistry,
    listener: Mutex<Option<CancellationToken>>,
}

impl MessageRouter {
    pub fn new(role: RouterRole, config: RouterConfig) -> Self {
        Self {
            role,
            config,
            registry: HandlerRegistry::new(config.max_handlers()),
            listener: Mutex::new(None),
        }
    }

    /// A background-role router: answers with local results.
    pub fn background(config: RouterConfig) -> Self {
        Self::new(RouterRole::Background, config)
    }

    /// A content-role router forwarding results through `upstream`.
    pub fn content(config: RouterConfig, upstream: HostPort) -> Self {
        Self::new(RouterRole::Content { upstream }, config)
    }

    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    pub fn register<H: MessageHandler + 'static>(
        &self,
        kind: impl Into<String>,
        handler: H,
    ) -> Result<(), RouterError> {
        self.registry.register(kind, handler)
    }

    pub fn unregister(&self, kind: &str) -> bool {
        self.registry.unregister(kind)
    }

    /// Handle one raw inbound message and produce its single response.
    ///
    /// Never fails: validation errors, missing handlers, handler failures
    /// and timeouts all become failure envelopes.
    pub async fn handle_raw(&self, message: Value) -> ResponseEnvelope {
        let envelope = match validate(message) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(role = self.role.name(), error = %e, "rejected malformed message");
                return ResponseEnvelope::failure(e.code(), e.to_string());
            }
        };

        let kind = envelope.kind.clone();
        match tokio::time::timeout(self.config.timeout, self.route(envelope)).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => ResponseEnvelope::failure(e.code(), e.to_string()),
            Err(_) => {
                let e = RouterError::Timeout {
                    kind,
                    timeout_ms: self.config.timeout.as_millis() as u64,
                };
                warn!(role = self.role.name(), error = %e, "request timed out");
                ResponseEnvelope::failure(e.code(), e.to_string())
            }
        }
    }

    async fn route(&self, envelope: MessageEnvelope) -> Result<ResponseEnvelope, RouterError> {
        let MessageEnvelope {
            kind,
            payload,
            correlation,
        } = envelope;
        debug!(role = self.role.name(), %kind, ?correlation, "dispatching message");

        let handler = self
            .registry
            .get(&kind)
            .ok_or_else(|| RouterError::HandlerNotFound(kind.clone()))?;
        let result = run_handler(&kind, &handler, payload).await?;

        match &self.role {
            RouterRole::Content { upstream } if handler.forwards() => {
                debug!(%kind, "forwarding result to background");
                upstream.request(&kind, result, self.config.timeout).await
            }
            _ => Ok(ResponseEnvelope::success(result)),
        }
    }

    /// Start answering messages from `inbox`.
    ///
    /// Each message is handled in its own task; the listener only receives
    /// and spawns. Fails with `AlreadyActive` while a listener is running.
    pub fn listen(self: &Arc<Self>, mut inbox: HostInbox) -> Result<JoinHandle<()>, RouterError> {
        let token = {
            let mut slot = self.listener.lock().unwrap_or_else(PoisonError::into_inner);
            if slot.as_ref().is_some_and(|t| !t.is_cancelled()) {
                return Err(RouterError::AlreadyActive);
            }
            let token = CancellationToken::new();
            *slot = Some(token.clone());
            token
        };

        info!(role = self.role.name(), "router listening");
        let router = Arc::clone(self);
        Ok(tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    next = inbox.recv() => {
                        let Some(inbound) = next else { break };
                        let router = Arc::clone(&router);
                        tokio::spawn(async move {
                            let response = router.handle_raw(inbound.message.clone()).await;
                            if !inbound.respond(response) {
                                debug!("sender stopped waiting before the response was ready");
                            }
                        });
                    }
                }
            }
            token.cancel();
            info!(role = router.role.name(), "router stopped listening");
        }))
    }

    /// Stop the listener. Returns `true` if one was running.
    pub fn stop(&self) -> bool {
        let token = self
            .listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match token {
            Some(token) if !token.is_cancelled() => {
                token.cancel();
                true
            }
            _ => false,
        }
    }

    pub fn is_listening(&self) -> bool {
        self.listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|t| !t.is_cancelled())
    }
}

impl std::fmt::Debug for MessageRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageRouter")
            .field("role", &self.role.name())
            .field("config", &self.config)
            .field("registry", &self.registry)
            .finish()
    }
}

/// Check the envelope shape before any handler runs.
fn validate(message: Value) -> Result<MessageEnvelope, RouterError> {
    let Value::Object(map) = &message else {
        return Err(RouterError::InvalidMessage("message must be an object".to_string()));
    };
    match map.get("kind") {
        Some(Value::String(kind)) if !kind.is_empty() => {}
        Some(Value::String(_)) => {
            return Err(RouterError::InvalidMessage("'kind' must not be empty".to_string()));
        }
        Some(_) => {
            return Err(RouterError::InvalidMessage("'kind' must be a string".to_string()));
        }
        None => {
            return Err(RouterError::InvalidMessage("missing 'kind'".to_string()));
        }
    }
    serde_json::from_value(message).map_err(|e| RouterError::InvalidMessage(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::host;
    use crate::message::registry::{handler_fn, sync_handler_fn, HandlerResult};
    use pagepilot_types::envelope::ErrorCode;
    use serde_json::json;

    fn msg(kind: &str, payload: Value) -> Value {
        json!({"kind": kind, "payload": payload})
    }

    async fn slow(_: Value) -> HandlerResult {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Ok(Value::Null)
    }

    async fn failing(_: Value) -> HandlerResult {
        Err("selector not found".into())
    }

    #[test]
    fn test_config_clamps_timeout() {
        let low = RouterConfig::new(Duration::from_millis(10), 8).unwrap();
        assert_eq!(low.timeout(), Duration::from_secs(1));
        let high = RouterConfig::new(Duration::from_secs(900), 8).unwrap();
        assert_eq!(high.timeout(), Duration::from_secs(300));
        assert_eq!(RouterConfig::default().timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_config_rejects_bad_capacity() {
        assert!(matches!(
            RouterConfig::new(Duration::from_secs(5), 0),
            Err(RouterError::InvalidConfig(_))
        ));
        assert!(RouterConfig::new(Duration::from_secs(5), 1025).is_err());
        assert!(RouterConfig::new(Duration::from_secs(5), 1024).is_ok());
    }

    #[tokio::test]
    async fn test_malformed_messages_are_rejected_before_dispatch() {
        let router = MessageRouter::background(RouterConfig::default());
        router
            .register("get-session", sync_handler_fn(|_| panic!("must not run")))
            .unwrap();

        for bad in [json!("get-session"), json!({"payload": {}}), json!({"kind": 7}), json!({"kind": ""})] {
            let resp = router.handle_raw(bad).await;
            assert_eq!(resp.code(), Some(ErrorCode::InvalidMessage));
        }
    }

    #[tokio::test]
    async fn test_background_answers_directly() {
        let router = MessageRouter::background(RouterConfig::default());
        router
            .register("get-history", sync_handler_fn(|p| Ok(json!({"echo": p}))))
            .unwrap();

        let resp = router.handle_raw(msg("get-history", json!({"id": "7"}))).await;
        assert_eq!(resp.into_result().unwrap(), json!({"echo": {"id": "7"}}));

        let missing = router.handle_raw(msg("nope", Value::Null)).await;
        assert_eq!(missing.code(), Some(ErrorCode::HandlerNotFound));
    }

    #[tokio::test]
    async fn test_handler_failure_becomes_failure_envelope() {
        let router = MessageRouter::background(RouterConfig::default());
        router.register("click", handler_fn(failing)).unwrap();

        let resp = router.handle_raw(msg("click", Value::Null)).await;
        let err = resp.into_result().unwrap_err();
        assert_eq!(err.code, ErrorCode::HandlerExecutionError);
        assert!(err.message.contains("selector not found"));
    }

    #[tokio::test]
    async fn test_slow_handler_hits_timeout() {
        let router = MessageRouter::background(RouterConfig::new(Duration::from_secs(1), 4).unwrap());
        router.register("slow", handler_fn(slow)).unwrap();

        let resp = router.handle_raw(msg("slow", Value::Null)).await;
        assert_eq!(resp.code(), Some(ErrorCode::RoutingError));
    }

    #[tokio::test]
    async fn test_content_forwards_and_relays() {
        let background = Arc::new(MessageRouter::background(RouterConfig::default()));
        background
            .register("clear-session", sync_handler_fn(|p| Ok(json!({"cleared": p["id"]}))))
            .unwrap();
        let (port, inbox) = host::channel(8);
        background.listen(inbox).unwrap();

        let content = MessageRouter::content(RouterConfig::default(), port);
        content
            .register("clear-session", sync_handler_fn(|p| Ok(json!({"id": p["id"], "url": "https://acme.test"}))))
            .unwrap();
        content
            .register("get-session", sync_handler_fn(|_| Ok(json!({"id": "7"}))).local_only())
            .unwrap();

        let relayed = content.handle_raw(msg("clear-session", json!({"id": "7"}))).await;
        assert_eq!(relayed.into_result().unwrap(), json!({"cleared": "7"}));

        let local = content.handle_raw(msg("get-session", Value::Null)).await;
        assert_eq!(local.into_result().unwrap(), json!({"id": "7"}));
    }

    #[tokio::test]
    async fn test_content_relays_upstream_failure() {
        let background = Arc::new(MessageRouter::background(RouterConfig::default()));
        let (port, inbox) = host::channel(8);
        background.listen(inbox).unwrap();

        let content = MessageRouter::content(RouterConfig::default(), port);
        content.register("initialize-chat", sync_handler_fn(Ok)).unwrap();

        let resp = content.handle_raw(msg("initialize-chat", json!({}))).await;
        assert_eq!(resp.code(), Some(ErrorCode::HandlerNotFound));
    }

    #[tokio::test]
    async fn test_listen_twice_is_already_active() {
        let router = Arc::new(MessageRouter::background(RouterConfig::default()));
        let (_port_a, inbox_a) = host::channel(1);
        let (_port_b, inbox_b) = host::channel(1);

        router.listen(inbox_a).unwrap();
        assert!(router.is_listening());
        assert!(matches!(router.listen(inbox_b), Err(RouterError::AlreadyActive)));
    }

    #[tokio::test]
    async fn test_stop_allows_restart() {
        let router = Arc::new(MessageRouter::background(RouterConfig::default()));
        router.register("ping", sync_handler_fn(|_| Ok(json!("pong")))).unwrap();

        let (_old_port, old_inbox) = host::channel(1);
        let handle = router.listen(old_inbox).unwrap();
        assert!(router.stop());
        handle.await.unwrap();
        assert!(!router.is_listening());
        assert!(!router.stop());

        let (port, inbox) = host::channel(1);
        router.listen(inbox).unwrap();
        let resp = port
            .request("ping", Value::Null, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(resp.into_result().unwrap(), json!("pong"));
    }

    #[tokio::test]
    async fn test_listener_answers_every_message_even_on_panic() {
        let router = Arc::new(MessageRouter::background(RouterConfig::default()));
        router.register("boom", sync_handler_fn(|_| panic!("kaboom"))).unwrap();
        router.register("ok", sync_handler_fn(|_| Ok(json!(1)))).unwrap();
        let (port, inbox) = host::channel(8);
        router.listen(inbox).unwrap();

        let (a, b, c) = tokio::join!(
            port.request("boom", Value::Null, Duration::from_secs(1)),
            port.request("ok", Value::Null, Duration::from_secs(1)),
            port.send_raw("?", json!([1, 2]), Duration::from_secs(1)),
        );
        assert_eq!(a.unwrap().code(), Some(ErrorCode::HandlerExecutionError));
        assert!(b.unwrap().is_success());
        assert_eq!(c.unwrap().code(), Some(ErrorCode::InvalidMessage));
    }
}
