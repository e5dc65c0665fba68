//! The host boundary between execution contexts.
//!
//! Contexts share no memory: a request is a raw JSON message pushed through
//! a bounded `mpsc` channel together with a `oneshot` responder. The sender
//! awaits that one pending future; it resolves exactly once with the
//! response, or fails if the receiving side dropped the request or the
//! timeout expired. No callback chains, no shared reply map.

use std::time::Duration;

use pagepilot_types::envelope::{MessageEnvelope, ResponseEnvelope};
use pagepilot_types::error::RouterError;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

/// One inbound request waiting for its response.
pub struct Inbound {
    /// The raw message as it crossed the boundary. Not yet validated.
    pub message: Value,
    responder: oneshot::Sender<ResponseEnvelope>,
}

impl Inbound {
    pub fn new(message: Value) -> (Self, oneshot::Receiver<ResponseEnvelope>) {
        let (responder, rx) = oneshot::channel();
        (Self { message, responder }, rx)
    }

    /// Answer the request. Returns `false` if the sender stopped waiting.
    pub fn respond(self, response: ResponseEnvelope) -> bool {
        self.responder.send(response).is_ok()
    }
}

/// Sending half of the boundary, held by the context that issues requests.
#[derive(Clone)]
pub struct HostPort {
    tx: mpsc::Sender<Inbound>,
}

/// Receiving half of the boundary, consumed by a router's listener.
pub struct HostInbox {
    rx: mpsc::Receiver<Inbound>,
}

/// Create a connected port/inbox pair with room for `buffer` queued requests.
pub fn channel(buffer: usize) -> (HostPort, HostInbox) {
    let (tx, rx) = mpsc::channel(buffer.max(1));
    (HostPort { tx }, HostInbox { rx })
}

impl HostPort {
    /// Send `{kind, payload}` and wait for its response.
    pub async fn request(
        &self,
        kind: &str,
        payload: Value,
        timeout: Duration,
    ) -> Result<ResponseEnvelope, RouterError> {
        let envelope = MessageEnvelope::new(kind, payload);
        let correlation = envelope.correlation;
        let message = serde_json::to_value(&envelope)
            .map_err(|e| RouterError::InvalidMessage(e.to_string()))?;

        debug!(%kind, ?correlation, "sending request across host boundary");
        self.send_raw(kind, message, timeout).await
    }

    /// Send an already-built message. Used for relaying and for callers that
    /// hold untrusted JSON which the receiving router must validate.
    pub async fn send_raw(
        &self,
        kind: &str,
        message: Value,
        timeout: Duration,
    ) -> Result<ResponseEnvelope, RouterError> {
        let (inbound, reply_rx) = Inbound::new(message);

        let exchange = async {
            self.tx
                .send(inbound)
                .await
                .map_err(|_| RouterError::Routing("receiving context is gone".to_string()))?;
            reply_rx
                .await
                .map_err(|_| RouterError::Routing("request was dropped without a response".to_string()))
        };

        match tokio::time::timeout(timeout, exchange).await {
            Ok(result) => result,
            Err(_) => Err(RouterError::Timeout {
                kind: kind.to_string(),
                timeout_ms: timeout.as_millis() as u64,
            }),
        }
    }

    /// Whether the receiving side still exists.
    pub fn is_connected(&self) -> bool {
        !self.tx.is_closed()
    }
}

impl std::fmt::Debug for HostPort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostPort")
            .field("connected", &self.is_connected())
            .finish()
    }
}

impl HostInbox {
    /// Next inbound request, or `None` once every port is dropped.
    pub async fn recv(&mut self) -> Option<Inbound> {
        self.rx.recv().await
    }
}
