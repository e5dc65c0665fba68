//! Application state wiring the execution contexts together.
//!
//! One process hosts all three roles: a background router owning the chat
//! orchestrator, a content router reading pages from a
//! [`StaticPageProvider`], and the UI role played by the CLI or the HTTP
//! bridge. They share no state except through [`host`] channels, exactly as
//! separate contexts would.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use pagepilot_core::agent::tools::page_tools;
use pagepilot_core::handlers::background::register_background_handlers;
use pagepilot_core::handlers::content::register_content_handlers;
use pagepilot_core::message::host::{self, HostPort};
use pagepilot_core::message::router::{MessageRouter, RouterConfig};
use pagepilot_core::orchestrator::{ChatCollaborators, ChatOrchestrator};
use pagepilot_core::retrieval::box_embedder::BoxEmbedder;
use pagepilot_core::storage::kv_store::KvStore;
use pagepilot_infra::config::{load_config, resolve_data_dir};
use pagepilot_infra::credentials::EnvCredentialProvider;
use pagepilot_infra::llm::DefaultProviderFactory;
use pagepilot_infra::memory::MemoryKvStore;
use pagepilot_infra::page::{DetachedPageActions, StaticPageProvider};
use pagepilot_infra::sqlite::kv::SqliteKvStore;
use pagepilot_infra::sqlite::pool::DatabasePool;
use pagepilot_types::config::AppConfig;
use pagepilot_types::envelope::{ResponseEnvelope, kinds};
use pagepilot_types::error::RouterError;

/// Queued requests each host channel holds before senders wait.
const CHANNEL_BUFFER: usize = 32;

/// The UI role's view of the other two contexts.
#[derive(Clone, Debug)]
pub struct UiBridge {
    content: HostPort,
    background: HostPort,
    timeout: Duration,
}

impl UiBridge {
    /// Background-only kinds skip the content context.
    fn port_for(&self, kind: &str) -> &HostPort {
        match kind {
            kinds::GET_HISTORY | kinds::TAB_ACTIVATED => &self.background,
            _ => &self.content,
        }
    }

    pub async fn request(&self, kind: &str, payload: Value) -> Result<ResponseEnvelope, RouterError> {
        self.port_for(kind).request(kind, payload, self.timeout).await
    }

    /// Relay an untrusted message; the receiving router validates it.
    pub async fn relay(&self, message: Value) -> ResponseEnvelope {
        let kind = message
            .get("kind")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        match self.port_for(&kind).send_raw(&kind, message, self.timeout).await {
            Ok(response) => response,
            Err(e) => ResponseEnvelope::failure(e.code(), e.to_string()),
        }
    }
}

/// Shared state for CLI commands and HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    pub data_dir: PathBuf,
    pub config: AppConfig,
    pub pages: Arc<StaticPageProvider>,
    pub bridge: UiBridge,
    routers: Vec<Arc<MessageRouter>>,
}

impl AppState {
    /// Load config, open storage and start both routers.
    ///
    /// `ephemeral` keeps sessions in memory instead of SQLite.
    pub async fn init(ephemeral: bool) -> anyhow::Result<Self> {
        let data_dir = resolve_data_dir();
        tokio::fs::create_dir_all(&data_dir).await?;
        let config = load_config(&data_dir).await;

        let pages = Arc::new(StaticPageProvider::new());
        let collaborators = ChatCollaborators {
            credentials: Arc::new(EnvCredentialProvider::new(config.provider.clone())),
            providers: Arc::new(DefaultProviderFactory),
            tools: Arc::new(page_tools(Arc::clone(&pages), Arc::new(DetachedPageActions))),
        };

        let (bridge, routers) = if ephemeral {
            tracing::info!("using in-memory session storage");
            wire(Arc::new(MemoryKvStore::new()), &config, collaborators, &pages)?
        } else {
            let pool = DatabasePool::open_in(&data_dir).await?;
            wire(Arc::new(SqliteKvStore::new(pool)), &config, collaborators, &pages)?
        };

        Ok(Self {
            data_dir,
            config,
            pages,
            bridge,
            routers,
        })
    }

    /// Stop every router listener.
    pub fn shutdown(&self) {
        for router in &self.routers {
            router.stop();
        }
    }
}

fn embedder() -> BoxEmbedder {
    #[cfg(feature = "fastembed")]
    {
        BoxEmbedder::new(pagepilot_infra::vector::embedder::FastEmbedEmbedder::new())
    }
    #[cfg(not(feature = "fastembed"))]
    {
        BoxEmbedder::new(pagepilot_infra::vector::embedder::HashingEmbedder::default())
    }
}

/// Build and start the background and content routers over `kv`.
pub(crate) fn wire<K: KvStore + 'static>(
    kv: Arc<K>,
    config: &AppConfig,
    collaborators: ChatCollaborators,
    pages: &Arc<StaticPageProvider>,
) -> anyhow::Result<(UiBridge, Vec<Arc<MessageRouter>>)> {
    let router_config = RouterConfig::from_settings(&config.router)?;
    let orchestrator = Arc::new(ChatOrchestrator::new(kv, embedder(), config, collaborators)?);

    let background = Arc::new(MessageRouter::background(router_config));
    register_background_handlers(&background, orchestrator)?;
    let (background_port, background_inbox) = host::channel(CHANNEL_BUFFER);
    background.listen(background_inbox)?;

    let content = Arc::new(MessageRouter::content(router_config, background_port.clone()));
    register_content_handlers(&content, Arc::clone(pages))?;
    let (content_port, content_inbox) = host::channel(CHANNEL_BUFFER);
    content.listen(content_inbox)?;

    // The UI outwaits the content router, which itself waits on the background.
    let bridge = UiBridge {
        content: content_port,
        background: background_port,
        timeout: router_config.timeout() * 2,
    };
    Ok((bridge, vec![background, content]))
}
