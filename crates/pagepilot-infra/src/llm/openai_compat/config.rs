//! Configuration and per-backend defaults for chat-completions providers.
//!
//! OpenAI, Ollama and any self-hosted OpenAI-compatible server speak the same
//! protocol; they differ in base URL, whether a key is required, and limits.

use pagepilot_types::llm::{LlmError, ProviderCapabilities, ProviderKind};
use secrecy::SecretString;

pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const OLLAMA_BASE_URL: &str = "http://localhost:11434/v1";

/// Settings for one [`super::OpenAiCompatibleProvider`].
pub struct OpenAiCompatConfig {
    /// Human-readable provider name ("openai", "ollama", ...).
    pub provider_name: String,
    /// Base URL without the `/chat/completions` suffix.
    pub base_url: String,
    /// Bearer token; `None` sends no `Authorization` header.
    pub api_key: Option<SecretString>,
    pub model: String,
    pub capabilities: ProviderCapabilities,
}

/// OpenAI: `https://api.openai.com/v1`, 128K context, 16K output.
pub fn openai_defaults(api_key: SecretString, model: &str) -> OpenAiCompatConfig {
    OpenAiCompatConfig {
        provider_name: "openai".into(),
        base_url: OPENAI_BASE_URL.into(),
        api_key: Some(api_key),
        model: model.into(),
        capabilities: ProviderCapabilities {
            streaming: true,
            tool_calling: true,
            max_context_tokens: 128_000,
            max_output_tokens: 16_384,
        },
    }
}

/// Local Ollama server. No key is needed.
pub fn ollama_defaults(model: &str) -> OpenAiCompatConfig {
    OpenAiCompatConfig {
        provider_name: "ollama".into(),
        base_url: OLLAMA_BASE_URL.into(),
        api_key: None,
        model: model.into(),
        capabilities: ProviderCapabilities {
            streaming: true,
            tool_calling: true,
            max_context_tokens: 32_768,
            max_output_tokens: 4_096,
        },
    }
}

/// Any other server speaking the protocol at `base_url`.
pub fn compatible_defaults(
    base_url: &str,
    api_key: Option<SecretString>,
    model: &str,
) -> OpenAiCompatConfig {
    OpenAiCompatConfig {
        provider_name: "openai_compatible".into(),
        base_url: base_url.into(),
        api_key,
        model: model.into(),
        capabilities: ProviderCapabilities {
            streaming: true,
            tool_calling: true,
            max_context_tokens: 32_768,
            max_output_tokens: 4_096,
        },
    }
}

/// Pick defaults for `kind`, then apply an explicit `base_url` override.
pub fn config_for(
    kind: ProviderKind,
    model: &str,
    api_key: Option<SecretString>,
    base_url: Option<&str>,
) -> Result<OpenAiCompatConfig, LlmError> {
    let mut config = match kind {
        ProviderKind::OpenAi => {
            let key = api_key.ok_or(LlmError::AuthenticationFailed)?;
            openai_defaults(key, model)
        }
        ProviderKind::Ollama => {
            let mut config = ollama_defaults(model);
            config.api_key = api_key;
            config
        }
        ProviderKind::OpenAiCompatible => {
            let url = base_url.ok_or_else(|| {
                LlmError::InvalidRequest("openai_compatible provider needs a base_url".to_string())
            })?;
            compatible_defaults(url, api_key, model)
        }
    };

    if let Some(url) = base_url {
        config.base_url = url.trim_end_matches('/').to_string();
    }
    Ok(config)
}
