//! Credential and provider-construction ports.
//!
//! The configuration surface is external: all the core needs is whether a
//! model backend is configured and, if so, which one. Building the concrete
//! provider is delegated to a `ProviderFactory` so the core never names an
//! HTTP client.

use std::hash::{DefaultHasher, Hash, Hasher};

use pagepilot_types::llm::{LlmError, ProviderKind};
use secrecy::{ExposeSecret, SecretString};

use crate::llm::box_provider::BoxLlmProvider;

/// Resolved credentials for the model backend.
///
/// `Debug` redacts the API key.
#[derive(Default)]
pub struct Credentials {
    pub configured: bool,
    pub provider: ProviderKind,
    pub model: String,
    pub api_key: Option<SecretString>,
    pub base_url: Option<String>,
}

impl Credentials {
    /// Credentials reporting "not configured".
    pub fn unconfigured() -> Self {
        Self::default()
    }

    /// Hash of every field a provider is built from. Two credentials with
    /// the same fingerprint build interchangeable providers.
    pub fn fingerprint(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.provider.hash(&mut hasher);
        self.model.hash(&mut hasher);
        self.base_url.hash(&mut hasher);
        self.api_key.as_ref().map(|key| key.expose_secret()).hash(&mut hasher);
        hasher.finish()
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("configured", &self.configured)
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("base_url", &self.base_url)
            .finish()
    }
}

/// Supplies the current credentials.
pub trait CredentialProvider: Send + Sync {
    fn credentials(&self) -> Credentials;
}

/// Builds a model provider from credentials.
pub trait ProviderFactory: Send + Sync {
    fn create(&self, credentials: &Credentials) -> Result<BoxLlmProvider, LlmError>;
}
