//! Message handlers for the two router roles.
//!
//! The content role lives next to the page: it answers page queries
//! locally and enriches chat requests with extracted page text before they
//! are forwarded. The background role owns sessions, the retrieval index
//! and model calls through the [`ChatOrchestrator`](crate::orchestrator::ChatOrchestrator).

pub mod background;
pub mod content;

use pagepilot_types::chat::TabId;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::message::registry::BoxError;

/// Read a tab id from a payload that is either the id itself (string or
/// number) or an object carrying `id` or `tabId`.
pub(crate) fn tab_from_payload(payload: &Value) -> Result<TabId, BoxError> {
    let raw = match payload {
        Value::Object(map) => map.get("id").or_else(|| map.get("tabId")).unwrap_or(&Value::Null),
        other => other,
    };
    TabId::deserialize(raw).map_err(|e| format!("payload does not identify a tab: {e}").into())
}

/// Deserialize a typed payload, naming the kind on failure.
pub(crate) fn parse_payload<T: DeserializeOwned>(kind: &str, payload: Value) -> Result<T, BoxError> {
    serde_json::from_value(payload).map_err(|e| format!("invalid '{kind}' payload: {e}").into())
}
