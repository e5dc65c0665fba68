//! OpenAI-compatible LLM provider.
//!
//! One [`OpenAiCompatibleProvider`] serves OpenAI, Ollama and self-hosted
//! servers that speak the chat completions protocol, selected by base URL.
//! Requests go out over `reqwest`; streaming responses are decoded with
//! `eventsource-stream`.
//!
//! The API key is held in a [`SecretString`] and only exposed when the
//! `Authorization` header is built.

pub mod config;
pub mod streaming;
pub mod types;

use std::pin::Pin;
use std::time::Duration;

use futures_util::Stream;
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};

use pagepilot_core::llm::provider::LlmProvider;
use pagepilot_types::llm::{
    CompletionRequest, CompletionResponse, LlmError, ProviderCapabilities, StreamEvent,
};

use self::config::OpenAiCompatConfig;
use self::streaming::map_sse_response;
use self::types::{ChatRequest, ChatResponse, from_chat_response, to_chat_request};

/// Provider for any chat-completions API.
///
/// Does not derive `Debug`; the key must never reach logs.
pub struct OpenAiCompatibleProvider {
    client: reqwest::Client,
    provider_name: String,
    base_url: String,
    api_key: Option<SecretString>,
    model: String,
    capabilities: ProviderCapabilities,
}

impl OpenAiCompatibleProvider {
    pub fn new(config: OpenAiCompatConfig) -> Result<Self, LlmError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(300))
            .build()
            .map_err(|e| LlmError::Provider {
                message: format!("failed to build HTTP client: {e}"),
            })?;

        Ok(Self {
            client,
            provider_name: config.provider_name,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key,
            model: config.model,
            capabilities: config.capabilities,
        })
    }

    /// The default model for requests that leave `model` empty.
    pub fn model(&self) -> &str {
        &self.model
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    fn post(&self, body: &ChatRequest) -> reqwest::RequestBuilder {
        let builder = self.client.post(self.completions_url()).json(body);
        match &self.api_key {
            Some(key) => builder.bearer_auth(key.expose_secret()),
            None => builder,
        }
    }
}

/// Send `body` and turn non-2xx statuses into [`LlmError`]s.
async fn send_checked(builder: reqwest::RequestBuilder) -> Result<reqwest::Response, LlmError> {
    let response = builder.send().await.map_err(|e| LlmError::Provider {
        message: format!("HTTP request failed: {e}"),
    })?;

    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let retry_after_ms = response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(|secs| secs * 1000);
    let body = response.text().await.unwrap_or_default();

    Err(map_status(status, retry_after_ms, body))
}

fn map_status(status: StatusCode, retry_after_ms: Option<u64>, body: String) -> LlmError {
    match status.as_u16() {
        401 | 403 => LlmError::AuthenticationFailed,
        429 => LlmError::RateLimited { retry_after_ms },
        400 | 404 | 422 => LlmError::InvalidRequest(format!("HTTP {status}: {body}")),
        _ => LlmError::Provider {
            message: format!("HTTP {status}: {body}"),
        },
    }
}

impl LlmProvider for OpenAiCompatibleProvider {
    fn name(&self) -> &str {
        &self.provider_name
    }

    fn capabilities(&self) -> &ProviderCapabilities {
        &self.capabilities
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let body = to_chat_request(request, &self.model, false);
        let response = send_checked(self.post(&body)).await?;

        let chat: ChatResponse = response
            .json()
            .await
            .map_err(|e| LlmError::Deserialization(format!("failed to parse response: {e}")))?;

        from_chat_response(chat)
    }

    fn stream(
        &self,
        request: CompletionRequest,
    ) -> Pin<Box<dyn Stream<Item = Result<StreamEvent, LlmError>> + Send + 'static>> {
        let body = to_chat_request(&request, &self.model, true);
        let builder = self.post(&body);

        Box::pin(async_stream::try_stream! {
            let response = send_checked(builder).await?;
            let mut inner = map_sse_response(response);

            use futures_util::StreamExt;
            while let Some(event) = inner.next().await {
                yield event?;
            }
        })
    }
}
