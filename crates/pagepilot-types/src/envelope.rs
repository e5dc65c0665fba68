//! Request/response envelopes exchanged across the host message boundary.
//!
//! Every message is `{kind, payload}` (plus an optional correlation id that
//! the host never interprets). Every response is either
//! `{success: true, data}` or `{success: false, error: {code, message}}`.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Message kinds understood by the content and background routers.
pub mod kinds {
    /// Content role: report the tab id and URL of the page.
    pub const GET_SESSION: &str = "get-session";
    /// Content role: extract visible text, title and URL of the page.
    pub const GET_PAGE_CONTENT: &str = "get-page-content";
    /// Both roles: run one chat turn grounded in the page.
    pub const INITIALIZE_CHAT: &str = "initialize-chat";
    /// Both roles: drop the session and retrieval index of a tab.
    pub const CLEAR_SESSION: &str = "clear-session";
    /// Background role: list the turns of a tab's session.
    pub const GET_HISTORY: &str = "get-history";
    /// Background role: the UI switched to another tab.
    pub const TAB_ACTIVATED: &str = "tab-activated";
}

/// A request travelling across the host boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageEnvelope {
    pub kind: String,
    #[serde(default)]
    pub payload: serde_json::Value,
    /// Correlation id for logging; responses are matched by the pending
    /// future that sent the request, not by this field.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation: Option<Uuid>,
}

impl MessageEnvelope {
    /// Build an envelope with a fresh correlation id.
    pub fn new(kind: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            kind: kind.into(),
            payload,
            correlation: Some(Uuid::now_v7()),
        }
    }
}

/// Wire-level error codes carried by failure responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    InvalidMessage,
    HandlerNotFound,
    HandlerExecutionError,
    RoutingError,
    AlreadyActive,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorCode::InvalidMessage => "INVALID_MESSAGE",
            ErrorCode::HandlerNotFound => "HANDLER_NOT_FOUND",
            ErrorCode::HandlerExecutionError => "HANDLER_EXECUTION_ERROR",
            ErrorCode::RoutingError => "ROUTING_ERROR",
            ErrorCode::AlreadyActive => "ALREADY_ACTIVE",
        };
        f.write_str(s)
    }
}

/// Error body of a failure response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: ErrorCode,
    pub message: String,
}

/// The answer to exactly one [`MessageEnvelope`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "WireResponse", into = "WireResponse")]
pub enum ResponseEnvelope {
    Success { data: serde_json::Value },
    Failure { code: ErrorCode, message: String },
}

impl ResponseEnvelope {
    pub fn success(data: serde_json::Value) -> Self {
        ResponseEnvelope::Success { data }
    }

    pub fn failure(code: ErrorCode, message: impl Into<String>) -> Self {
        ResponseEnvelope::Failure {
            code,
            message: message.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ResponseEnvelope::Success { .. })
    }

    /// The error code of a failure response.
    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            ResponseEnvelope::Success { .. } => None,
            ResponseEnvelope::Failure { code, .. } => Some(*code),
        }
    }

    /// Convert into `Ok(data)` / `Err(body)`.
    pub fn into_result(self) -> Result<serde_json::Value, ErrorBody> {
        match self {
            ResponseEnvelope::Success { data } => Ok(data),
            ResponseEnvelope::Failure { code, message } => Err(ErrorBody { code, message }),
        }
    }
}

/// Flat wire shape used for (de)serializing [`ResponseEnvelope`].
#[derive(Serialize, Deserialize)]
struct WireResponse {
    success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    data: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<ErrorBody>,
}

impl TryFrom<WireResponse> for ResponseEnvelope {
    type Error = String;

    fn try_from(wire: WireResponse) -> Result<Self, Self::Error> {
        if wire.success {
            Ok(ResponseEnvelope::Success {
                data: wire.data.unwrap_or(serde_json::Value::Null),
            })
        } else {
            let body = wire
                .error
                .ok_or_else(|| "failure response without error body".to_string())?;
            Ok(ResponseEnvelope::Failure {
                code: body.code,
                message: body.message,
            })
        }
    }
}

impl From<ResponseEnvelope> for WireResponse {
    fn from(resp: ResponseEnvelope) -> Self {
        match resp {
            ResponseEnvelope::Success { data } => WireResponse {
                success: true,
                data: Some(data),
                error: None,
            },
            ResponseEnvelope::Failure { code, message } => WireResponse {
                success: false,
                data: None,
                error: Some(ErrorBody { code, message }),
            },
        }
    }
}
