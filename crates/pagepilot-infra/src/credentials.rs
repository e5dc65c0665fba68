//! Environment-backed credential provider.
//!
//! The API key is read from the variable named by
//! `provider.api_key_env` (default `PAGEPILOT_API_KEY`) on every call, so a
//! key exported after startup is picked up by the next turn. Ollama needs no
//! key and always counts as configured.

use secrecy::SecretString;

use pagepilot_core::credentials::{CredentialProvider, Credentials};
use pagepilot_types::config::ProviderSettings;
use pagepilot_types::llm::ProviderKind;

type Lookup = Box<dyn Fn(&str) -> Option<String> + Send + Sync>;

pub struct EnvCredentialProvider {
    settings: ProviderSettings,
    lookup: Lookup,
}

impl EnvCredentialProvider {
    pub fn new(settings: ProviderSettings) -> Self {
        Self::with_lookup(settings, |name| std::env::var(name).ok())
    }

    /// Use `lookup` instead of the process environment.
    pub fn with_lookup(
        settings: ProviderSettings,
        lookup: impl Fn(&str) -> Option<String> + Send + Sync + 'static,
    ) -> Self {
        Self {
            settings,
            lookup: Box::new(lookup),
        }
    }
}

impl CredentialProvider for EnvCredentialProvider {
    fn credentials(&self) -> Credentials {
        let api_key = (self.lookup)(&self.settings.api_key_env)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty());

        let configured = match self.settings.kind {
            ProviderKind::OpenAi => api_key.is_some(),
            ProviderKind::Ollama => true,
            ProviderKind::OpenAiCompatible => self.settings.base_url.is_some(),
        };
        if !configured {
            tracing::debug!(
                provider = %self.settings.kind,
                env = %self.settings.api_key_env,
                "model backend not configured"
            );
        }

        Credentials {
            configured,
            provider: self.settings.kind,
            model: self.settings.model.clone(),
            api_key: api_key.map(SecretString::from),
            base_url: self.settings.base_url.clone(),
        }
    }
}
