//! Chat orchestrator: one page-grounded turn from user query to stored reply.
//!
//! Owns the session store, the retrieval index and the agent settings, and
//! reaches the outside world only through its collaborator ports. The model
//! provider is created lazily from the current credentials on the first
//! turn that needs it, and rebuilt when a later turn sees different
//! credentials.
//!
//! The active tab is tracked with an epoch counter that moves on every tab
//! switch. A turn remembers the epoch it started under; if the epoch moved
//! by the time the reply arrives, the reply is discarded instead of being
//! written into a conversation the user has left.
//!
//! Every user turn leaves `sending` exactly once: `sent` with a stored reply,
//! or `error` on failure, on a discarded reply, or when the caller stops
//! awaiting the turn (a router timeout drops the future mid-turn).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use pagepilot_types::chat::{ChatTurn, NewChatTurn, TabId, TurnRole, TurnStatus};
use pagepilot_types::config::{AgentSettings, AppConfig};
use pagepilot_types::error::{ChatError, RetrievalError};
use pagepilot_types::llm::Message;
use pagepilot_types::page::{ChatReply, InitializeChatRequest, PageInfo};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::agent::prompt::build_system_prompt;
use crate::agent::tool_loop::{AgentConfig, AgentLoop};
use crate::agent::tools::ToolBinder;
use crate::chat::session_store::SessionStore;
use crate::credentials::{CredentialProvider, Credentials, ProviderFactory};
use crate::llm::box_provider::BoxLlmProvider;
use crate::retrieval::box_embedder::BoxEmbedder;
use crate::retrieval::chunker::PageChunker;
use crate::retrieval::context::ContextAssembler;
use crate::retrieval::index::RetrievalIndex;
use crate::storage::kv_store::KvStore;

/// The external collaborators a chat turn needs.
#[derive(Clone)]
pub struct ChatCollaborators {
    pub credentials: Arc<dyn CredentialProvider>,
    pub providers: Arc<dyn ProviderFactory>,
    pub tools: Arc<dyn ToolBinder>,
}

/// A built provider and the fingerprint of the credentials it came from.
struct CachedProvider {
    fingerprint: u64,
    provider: Arc<BoxLlmProvider>,
}

/// Runs chat turns for every tab. Share it behind an `Arc`.
pub struct ChatOrchestrator<K: KvStore> {
    sessions: Arc<SessionStore<K>>,
    index: Arc<RetrievalIndex<K>>,
    assembler: ContextAssembler<K>,
    agent: AgentSettings,
    collaborators: ChatCollaborators,
    provider: Mutex<Option<CachedProvider>>,
    active_tab: RwLock<Option<TabId>>,
    epoch: AtomicU64,
}

impl<K: KvStore> ChatOrchestrator<K> {
    pub fn new(
        kv: Arc<K>,
        embedder: BoxEmbedder,
        config: &AppConfig,
        collaborators: ChatCollaborators,
    ) -> Result<Self, RetrievalError> {
        let chunker = PageChunker::new(config.retrieval.chunk_size, config.retrieval.chunk_overlap)?;
        let index = Arc::new(RetrievalIndex::new(Arc::clone(&kv), embedder, chunker));
        let assembler = ContextAssembler::new(Arc::clone(&index), config.retrieval.clone());

        Ok(Self {
            sessions: Arc::new(SessionStore::new(kv)),
            index,
            assembler,
            agent: config.agent.clone(),
            collaborators,
            provider: Mutex::new(None),
            active_tab: RwLock::new(None),
            epoch: AtomicU64::new(0),
        })
    }

    pub fn sessions(&self) -> &SessionStore<K> {
        &self.sessions
    }

    pub fn index(&self) -> &RetrievalIndex<K> {
        &self.index
    }

    pub fn active_tab(&self) -> Option<TabId> {
        self.active_tab
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Record `tab` as the active tab and make sure it has a session.
    ///
    /// Switching to a different tab moves the epoch; re-activating the
    /// current tab does not.
    pub async fn activate_tab(&self, tab: &TabId) -> Result<(), ChatError> {
        {
            let mut active = self
                .active_tab
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            if active.as_ref() != Some(tab) {
                *active = Some(tab.clone());
                let epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
                debug!(tab_id = %tab, epoch, "active tab changed");
            }
        }
        self.sessions.load_or_create(tab).await?;
        Ok(())
    }

    /// Run one chat turn.
    pub async fn initialize_chat(&self, request: InitializeChatRequest) -> Result<ChatReply, ChatError> {
        let credentials = self.collaborators.credentials.credentials();
        if !credentials.configured {
            return Err(ChatError::NotConfigured);
        }
        let provider = self.provider(&credentials).await?;

        let tab = request.id.clone();
        let started_epoch = self.epoch.load(Ordering::SeqCst);
        let prior = self.sessions.history(&tab).await?;

        let mut user_turn = NewChatTurn::user(request.query.clone());
        user_turn.id = request.message_id.clone();
        let user_turn = self.sessions.append(&tab, user_turn).await?;
        let pending = PendingTurn::new(Arc::clone(&self.sessions), tab.clone(), user_turn.id.clone());
        info!(tab_id = %tab, turn_id = %user_turn.id, enable_rag = request.enable_rag, "chat turn started");

        let outcome = self.run_turn(&provider, &credentials, &request, prior).await;

        let content = match outcome {
            Ok(content) => content,
            Err(e) => {
                warn!(tab_id = %tab, turn_id = %user_turn.id, error = %e, "chat turn failed");
                pending.settle(TurnStatus::Error).await;
                return Err(e);
            }
        };

        if self.epoch.load(Ordering::SeqCst) != started_epoch {
            warn!(tab_id = %tab, turn_id = %user_turn.id, "active tab changed mid-turn, discarding reply");
            pending.settle(TurnStatus::Error).await;
            return Err(ChatError::TabChanged(tab.to_string()));
        }

        let reply = match self.sessions.append(&tab, NewChatTurn::assistant(content)).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!(tab_id = %tab, turn_id = %user_turn.id, error = %e, "failed to store assistant turn");
                pending.settle(TurnStatus::Error).await;
                return Err(e.into());
            }
        };
        pending.settle(TurnStatus::Sent).await;

        Ok(ChatReply {
            id: reply.id,
            content: reply.text,
            timestamp: reply.created_at,
        })
    }

    /// Drop the session, retrieval index and page snapshot of a tab.
    pub async fn clear_session(&self, page: &PageInfo) -> Result<(), ChatError> {
        self.sessions.clear(&page.id).await?;
        self.index.clear(&page.id).await?;
        info!(tab_id = %page.id, url = %page.url, "session cleared");
        Ok(())
    }

    pub async fn history(&self, tab: &TabId) -> Result<Vec<ChatTurn>, ChatError> {
        Ok(self.sessions.history(tab).await?)
    }

    /// The provider for `credentials`, built on first use and whenever the
    /// credentials differ from the ones the cached provider was built from.
    /// A failed build leaves the cache untouched, so the next turn retries.
    async fn provider(&self, credentials: &Credentials) -> Result<Arc<BoxLlmProvider>, ChatError> {
        let fingerprint = credentials.fingerprint();
        let mut slot = self.provider.lock().await;
        if let Some(cached) = slot.as_ref()
            && cached.fingerprint == fingerprint
        {
            return Ok(Arc::clone(&cached.provider));
        }

        let provider = self
            .collaborators
            .providers
            .create(credentials)
            .map_err(|e| ChatError::NotInitialized(e.to_string()))?;
        if slot.is_some() {
            info!(provider = provider.name(), model = %credentials.model, "credentials changed, model provider rebuilt");
        } else {
            info!(provider = provider.name(), model = %credentials.model, "model provider initialized");
        }
        let provider = Arc::new(provider);
        *slot = Some(CachedProvider {
            fingerprint,
            provider: Arc::clone(&provider),
        });
        Ok(provider)
    }

    async fn run_turn(
        &self,
        provider: &BoxLlmProvider,
        credentials: &Credentials,
        request: &InitializeChatRequest,
        prior: Vec<ChatTurn>,
    ) -> Result<String, ChatError> {
        let tab = &request.id;

        if let Some(page) = request.page() {
            if let Err(e) = self.index.store_snapshot(&page).await {
                warn!(tab_id = %tab, error = %e, "failed to store page snapshot");
            }
            if self.assembler.retrieval_enabled(request.enable_rag) {
                match self.index.ensure_index(&page).await {
                    Ok(outcome) => debug!(tab_id = %tab, ?outcome, "retrieval index ready"),
                    Err(e) => warn!(tab_id = %tab, error = %e, "failed to build retrieval index"),
                }
            }
        } else {
            debug!(tab_id = %tab, "request carries no page content");
        }

        let context = self
            .assembler
            .assemble(tab, &request.query, request.enable_rag)
            .await;
        let page = PageInfo {
            id: tab.clone(),
            url: request.url.clone(),
            title: request.title.clone(),
        };
        let system = build_system_prompt(Some(&page), &context);

        let mut messages = to_model_history(&prior);
        messages.push(Message::user(request.query.clone()));

        let tools = self.collaborators.tools.bind(tab);
        let config = AgentConfig::from_settings(credentials.model.clone(), &self.agent);
        let outcome = AgentLoop::new(provider, &tools, &config)
            .run(system, messages)
            .await?;

        info!(
            tab_id = %tab,
            rounds = outcome.rounds,
            tools = outcome.tool_invocations,
            exhausted = outcome.exhausted,
            input_tokens = outcome.usage.input_tokens,
            output_tokens = outcome.usage.output_tokens,
            "agent loop completed"
        );
        Ok(outcome.response.content)
    }
}

async fn mark_turn<K: KvStore>(sessions: &SessionStore<K>, tab: &TabId, turn_id: &str, status: TurnStatus) {
    match sessions.set_turn_status(tab, turn_id, status).await {
        Ok(true) => {}
        Ok(false) => warn!(tab_id = %tab, turn_id, "turn vanished before its status was set"),
        Err(e) => warn!(tab_id = %tab, turn_id, error = %e, "failed to update turn status"),
    }
}

/// A user turn still in `sending`.
///
/// Dropped without [`settle`](Self::settle), it marks the turn `error` from
/// a detached task.
struct PendingTurn<K: KvStore> {
    sessions: Arc<SessionStore<K>>,
    tab: TabId,
    turn_id: String,
    settled: bool,
}

impl<K: KvStore> PendingTurn<K> {
    fn new(sessions: Arc<SessionStore<K>>, tab: TabId, turn_id: String) -> Self {
        Self {
            sessions,
            tab,
            turn_id,
            settled: false,
        }
    }

    async fn settle(mut self, status: TurnStatus) {
        self.settled = true;
        mark_turn(&self.sessions, &self.tab, &self.turn_id, status).await;
    }
}

impl<K: KvStore> Drop for PendingTurn<K> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!(tab_id = %self.tab, turn_id = %self.turn_id, "chat turn abandoned outside a runtime");
            return;
        };
        warn!(tab_id = %self.tab, turn_id = %self.turn_id, "chat turn abandoned before completion");
        let sessions = Arc::clone(&self.sessions);
        let tab = self.tab.clone();
        let turn_id = std::mem::take(&mut self.turn_id);
        handle.spawn(async move {
            mark_turn(&sessions, &tab, &turn_id, TurnStatus::Error).await;
        });
    }
}

/// Completed turns as model messages; failed and in-flight turns are skipped.
fn to_model_history(turns: &[ChatTurn]) -> Vec<Message> {
    turns
        .iter()
        .filter(|t| t.status == TurnStatus::Sent)
        .filter_map(|t| match t.role {
            TurnRole::User => Some(Message::user(t.text.clone())),
            TurnRole::Assistant => Some(Message::assistant(t.text.clone())),
            TurnRole::System => None,
        })
        .collect()
}
