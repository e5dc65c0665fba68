//! Application configuration types for PagePilot.
//!
//! `AppConfig` represents the top-level `config.toml` that tunes the routers,
//! the retrieval index, the agent loop, and the model provider.

use serde::{Deserialize, Serialize};

use crate::llm::ProviderKind;

/// Top-level configuration.
///
/// Loaded from `~/.pagepilot/config.toml`. All fields have sensible defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub router: RouterSettings,
    #[serde(default)]
    pub retrieval: RetrievalSettings,
    #[serde(default)]
    pub agent: AgentSettings,
    #[serde(default)]
    pub provider: ProviderSettings,
}

/// Request timeout and registry capacity for both routers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouterSettings {
    /// Per-request timeout; clamped to [1s, 300s] when the router is built.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_max_handlers")]
    pub max_handlers: usize,
}

fn default_timeout_ms() -> u64 {
    30_000
}

fn default_max_handlers() -> usize {
    64
}

impl Default for RouterSettings {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            max_handlers: default_max_handlers(),
        }
    }
}

/// Chunking and search parameters of the per-tab retrieval index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Maximum characters per chunk.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Characters shared by consecutive chunks.
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
    #[serde(default = "default_search_limit")]
    pub search_limit: usize,
    /// Minimum cosine similarity for a chunk to count as a hit.
    #[serde(default = "default_relevance_threshold")]
    pub relevance_threshold: f32,
}

fn default_true() -> bool {
    true
}

fn default_chunk_size() -> usize {
    500
}

fn default_chunk_overlap() -> usize {
    100
}

fn default_search_limit() -> usize {
    5
}

fn default_relevance_threshold() -> f32 {
    0.25
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            search_limit: default_search_limit(),
            relevance_threshold: default_relevance_threshold(),
        }
    }
}

/// Bounds of the tool-calling loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentSettings {
    /// Model invocations allowed per turn.
    #[serde(default = "default_max_tool_rounds")]
    pub max_tool_rounds: u32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
}

fn default_max_tool_rounds() -> u32 {
    5
}

fn default_max_tokens() -> u32 {
    2048
}

fn default_temperature() -> f64 {
    0.2
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            max_tool_rounds: default_max_tool_rounds(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
        }
    }
}

/// Which model backend to talk to and where its key lives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderSettings {
    #[serde(default)]
    pub kind: ProviderKind,
    #[serde(default = "default_model")]
    pub model: String,
    /// Overrides the provider's default endpoint.
    #[serde(default)]
    pub base_url: Option<String>,
    /// Environment variable holding the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_api_key_env() -> String {
    "PAGEPILOT_API_KEY".to_string()
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            kind: ProviderKind::default(),
            model: default_model(),
            base_url: None,
            api_key_env: default_api_key_env(),
        }
    }
}
