//! Configuration loader for PagePilot.
//!
//! Reads `config.toml` from the data directory (`~/.pagepilot/` unless
//! `PAGEPILOT_DATA_DIR` says otherwise) into [`AppConfig`]. A missing or
//! malformed file yields the defaults.

use std::path::{Path, PathBuf};

use pagepilot_types::config::AppConfig;

/// Environment variable overriding the data directory.
pub const DATA_DIR_ENV: &str = "PAGEPILOT_DATA_DIR";

/// Resolve the data directory: `PAGEPILOT_DATA_DIR`, else `~/.pagepilot`.
pub fn resolve_data_dir() -> PathBuf {
    data_dir_from(std::env::var_os(DATA_DIR_ENV).map(PathBuf::from))
}

fn data_dir_from(env_value: Option<PathBuf>) -> PathBuf {
    match env_value {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".pagepilot"),
    }
}

/// Load `{data_dir}/config.toml`, falling back to defaults.
pub async fn load_config(data_dir: &Path) -> AppConfig {
    let config_path = data_dir.join("config.toml");

    let content = match tokio::fs::read_to_string(&config_path).await {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No config.toml found at {}, using defaults", config_path.display());
            return AppConfig::default();
        }
        Err(err) => {
            tracing::warn!("Failed to read {}: {err}, using defaults", config_path.display());
            return AppConfig::default();
        }
    };

    match toml::from_str::<AppConfig>(&content) {
        Ok(config) => config,
        Err(err) => {
            tracing::warn!("Failed to parse {}: {err}, using defaults", config_path.display());
            AppConfig::default()
        }
    }
}
