//! LLM provider implementations.
//!
//! Everything speaks the chat completions protocol through
//! [`OpenAiCompatibleProvider`]. [`create_provider`] builds one from resolved
//! credentials, and [`DefaultProviderFactory`] exposes that to the
//! orchestrator as a `ProviderFactory`.

pub mod openai_compat;

use secrecy::{ExposeSecret, SecretString};

use pagepilot_core::credentials::{Credentials, ProviderFactory};
use pagepilot_core::llm::box_provider::BoxLlmProvider;
use pagepilot_types::llm::LlmError;

use self::openai_compat::OpenAiCompatibleProvider;
use self::openai_compat::config::config_for;

/// Build a [`BoxLlmProvider`] for `credentials`.
///
/// # Errors
///
/// `AuthenticationFailed` when OpenAI is selected without a key, and
/// `InvalidRequest` when a generic compatible server has no base URL.
pub fn create_provider(credentials: &Credentials) -> Result<BoxLlmProvider, LlmError> {
    let api_key = credentials
        .api_key
        .as_ref()
        .map(|key| SecretString::from(key.expose_secret().to_owned()));

    let config = config_for(
        credentials.provider,
        &credentials.model,
        api_key,
        credentials.base_url.as_deref(),
    )?;

    tracing::debug!(
        provider = %config.provider_name,
        model = %config.model,
        base_url = %config.base_url,
        "creating LLM provider"
    );
    Ok(BoxLlmProvider::new(OpenAiCompatibleProvider::new(config)?))
}

/// `ProviderFactory` backed by [`create_provider`].
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultProviderFactory;

impl ProviderFactory for DefaultProviderFactory {
    fn create(&self, credentials: &Credentials) -> Result<BoxLlmProvider, LlmError> {
        create_provider(credentials)
    }
}
