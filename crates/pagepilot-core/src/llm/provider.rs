//! LlmProvider trait definition.
//!
//! The model backend is opaque: a request goes in, a completion (possibly
//! carrying tool calls) or a stream of events comes out. Uses RPITIT for
//! `complete` and `Pin<Box<dyn Stream>>` for `stream`, which has to stay
//! object-safe for the `BoxLlmProvider` wrapper.

use std::pin::Pin;

use futures_util::Stream;

use pagepilot_types::llm::{
    CompletionRequest, CompletionResponse, LlmError, ProviderCapabilities, StreamEvent,
};

/// Trait for LLM provider backends.
///
/// Implementations live in pagepilot-infra (e.g., `OpenAiCompatibleProvider`).
pub trait LlmProvider: Send + Sync {
    /// Human-readable provider name (e.g., "openai", "ollama").
    fn name(&self) -> &str;

    /// What this provider supports (streaming, tool calling, etc.).
    fn capabilities(&self) -> &ProviderCapabilities;

    /// Send a completion request and receive the full response.
    fn complete(
        &self,
        request: &CompletionRequest,
    ) -> impl std::future::Future<Output = Result<CompletionResponse, LlmError>> + Send;

    /// Send a streaming completion request. Returns a stream of events.
    fn stream(
        &self,
        request: CompletionRequest,
    ) -> Pin<Box<dyn Stream<Item = Result<StreamEvent, LlmError>> + Send + 'static>>;
}
