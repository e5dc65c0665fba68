use thiserror::Error;

use crate::envelope::ErrorCode;
use crate::llm::LlmError;

/// Errors from repository operations (used by trait definitions in pagepilot-core).
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database connection error")]
    Connection,

    #[error("query error: {0}")]
    Query(String),

    #[error("entity not found")]
    NotFound,

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Errors raised by the handler registry, the routers and the host boundary.
#[derive(Debug, Error)]
pub enum RouterError {
    #[error("invalid message: {0}")]
    InvalidMessage(String),

    #[error("no handler registered for '{0}'")]
    HandlerNotFound(String),

    #[error("handler for '{kind}' failed: {message}")]
    HandlerExecution { kind: String, message: String },

    #[error("routing error: {0}")]
    Routing(String),

    #[error("router is already listening")]
    AlreadyActive,

    #[error("a handler for '{0}' is already registered")]
    DuplicateHandler(String),

    #[error("handler capacity of {0} reached")]
    CapacityExceeded(usize),

    #[error("invalid router config: {0}")]
    InvalidConfig(String),

    #[error("request '{kind}' timed out after {timeout_ms}ms")]
    Timeout { kind: String, timeout_ms: u64 },
}

impl RouterError {
    /// The wire code a failure response carries for this error.
    ///
    /// Registration-time errors never reach the wire from a dispatch, but
    /// still need a code when surfaced through a handler.
    pub fn code(&self) -> ErrorCode {
        match self {
            RouterError::InvalidMessage(_) => ErrorCode::InvalidMessage,
            RouterError::HandlerNotFound(_) => ErrorCode::HandlerNotFound,
            RouterError::HandlerExecution { .. } => ErrorCode::HandlerExecutionError,
            RouterError::AlreadyActive => ErrorCode::AlreadyActive,
            RouterError::Routing(_)
            | RouterError::Timeout { .. }
            | RouterError::DuplicateHandler(_)
            | RouterError::CapacityExceeded(_)
            | RouterError::InvalidConfig(_) => ErrorCode::RoutingError,
        }
    }
}

/// Errors from page collaborators (content extraction and page actions).
#[derive(Debug, Error)]
pub enum PageError {
    #[error("no page attached to tab '{0}'")]
    NoPage(String),

    #[error("selector '{0}' matched nothing")]
    SelectorNotFound(String),

    #[error("page action '{action}' failed: {message}")]
    ActionFailed { action: String, message: String },

    #[error("page actions are unavailable in this context")]
    Unavailable,
}

/// Errors from executing a tool requested by the model.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("unknown tool '{0}'")]
    UnknownTool(String),

    #[error("invalid arguments for '{tool}': {message}")]
    InvalidArguments { tool: String, message: String },

    #[error("tool '{tool}' failed: {message}")]
    Execution { tool: String, message: String },

    #[error("tool '{tool}' repeated with identical arguments {count} times; try a different approach")]
    Repeated { tool: String, count: u32 },
}

impl From<(&str, PageError)> for ToolError {
    fn from((tool, err): (&str, PageError)) -> Self {
        ToolError::Execution {
            tool: tool.to_string(),
            message: err.to_string(),
        }
    }
}

/// Errors from chunking, embedding or searching page text.
#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("chunking error: {0}")]
    Chunking(String),

    #[error("embedding error: {0}")]
    Embedding(String),

    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("storage error: {0}")]
    Storage(#[from] RepositoryError),
}

/// Errors surfaced by one chat turn.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("no model provider is configured; set an API key and try again")]
    NotConfigured,

    #[error("model provider could not be initialized: {0}")]
    NotInitialized(String),

    #[error("the active tab changed while the reply for tab '{0}' was in flight")]
    TabChanged(String),

    #[error("storage error: {0}")]
    Repository(#[from] RepositoryError),

    #[error("model error: {0}")]
    Llm(#[from] LlmError),

    #[error("page error: {0}")]
    Page(#[from] PageError),

    #[error("retrieval error: {0}")]
    Retrieval(#[from] RetrievalError),

    #[error("handler error: {0}")]
    Handler(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repository_error_display() {
        let err = RepositoryError::Query("syntax error".to_string());
        assert_eq!(err.to_string(), "query error: syntax error");
    }

    #[test]
    fn test_router_error_codes() {
        assert_eq!(
            RouterError::InvalidMessage("x".into()).code(),
            ErrorCode::InvalidMessage
        );
        assert_eq!(
            RouterError::HandlerNotFound("x".into()).code(),
            ErrorCode::HandlerNotFound
        );
        assert_eq!(
            RouterError::HandlerExecution {
                kind: "x".into(),
                message: "boom".into()
            }
            .code(),
            ErrorCode::HandlerExecutionError
        );
        assert_eq!(
            RouterError::Timeout {
                kind: "x".into(),
                timeout_ms: 1000
            }
            .code(),
            ErrorCode::RoutingError
        );
        assert_eq!(RouterError::AlreadyActive.code(), ErrorCode::AlreadyActive);
    }

    #[test]
    fn test_handler_execution_keeps_original_message() {
        let err = RouterError::HandlerExecution {
            kind: "initialize-chat".into(),
            message: "page is gone".into(),
        };
        assert!(err.to_string().contains("page is gone"));
    }

    #[test]
    fn test_chat_error_from_repository() {
        let err: ChatError = RepositoryError::NotFound.into();
        assert!(matches!(err, ChatError::Repository(_)));
    }

    #[test]
    fn test_tool_error_from_page_error() {
        let err: ToolError = ("click", PageError::SelectorNotFound("#go".into())).into();
        assert_eq!(err.to_string(), "tool 'click' failed: selector '#go' matched nothing");
    }
}
