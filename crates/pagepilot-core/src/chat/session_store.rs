//! Tab-keyed chat session store.
//!
//! Sessions live in a `DashMap` cache in front of the `KvStore` port
//! (namespace `sessions`, key = tab id). Every mutation persists the whole
//! session (read-modify-write, last write wins). Operations on distinct tabs
//! touch distinct keys and never interleave observably.

use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use pagepilot_types::chat::{ChatSession, ChatTurn, NewChatTurn, TabId, TurnRole, TurnStatus};
use pagepilot_types::error::RepositoryError;
use pagepilot_types::storage::SESSIONS_NAMESPACE;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::storage::kv_store::KvStore;

/// Exactly one chat session per tab id.
pub struct SessionStore<K: KvStore> {
    kv: Arc<K>,
    cache: DashMap<TabId, ChatSession>,
}

impl<K: KvStore> SessionStore<K> {
    pub fn new(kv: Arc<K>) -> Self {
        Self {
            kv,
            cache: DashMap::new(),
        }
    }

    /// Return the tab's session: cached copy, else persisted copy, else a
    /// new empty session (persisted and cached).
    ///
    /// Idempotent until the next `clear`: repeated calls return the same
    /// session id.
    pub async fn load_or_create(&self, tab: &TabId) -> Result<ChatSession, RepositoryError> {
        if let Some(session) = self.cache.get(tab) {
            return Ok(session.clone());
        }

        if let Some(value) = self.kv.get(SESSIONS_NAMESPACE, tab.as_str()).await? {
            match serde_json::from_value::<ChatSession>(value) {
                Ok(session) => {
                    debug!(tab_id = %tab, session_id = %session.id, "loaded persisted session");
                    return Ok(self.cache.entry(tab.clone()).or_insert(session).clone());
                }
                Err(e) => {
                    warn!(tab_id = %tab, error = %e, "discarding unreadable persisted session");
                }
            }
        }

        let created = ChatSession::empty(tab.clone());
        self.persist(&created).await?;
        let session = self.cache.entry(tab.clone()).or_insert(created).clone();
        debug!(tab_id = %tab, session_id = %session.id, "created session");
        Ok(session)
    }

    /// Append a turn in arrival order.
    ///
    /// Assigns a UUIDv7 id and the current timestamp when absent. A
    /// caller-supplied id that already exists is appended again, not merged.
    pub async fn append(&self, tab: &TabId, turn: NewChatTurn) -> Result<ChatTurn, RepositoryError> {
        let mut session = self.load_or_create(tab).await?;
        let now = Utc::now();

        let turn = ChatTurn {
            id: turn.id.unwrap_or_else(|| Uuid::now_v7().to_string()),
            role: turn.role.unwrap_or(TurnRole::User),
            text: turn.text,
            created_at: turn.created_at.unwrap_or(now),
            status: turn.status,
        };

        if session.find_turn(&turn.id).is_some() {
            warn!(tab_id = %tab, turn_id = %turn.id, "appending turn with duplicate id");
        }

        session.turns.push(turn.clone());
        session.updated_at = session.updated_at.max(now);
        self.save(session).await?;

        debug!(tab_id = %tab, turn_id = %turn.id, role = %turn.role, "appended turn");
        Ok(turn)
    }

    /// Set the status of the most recent turn with `turn_id`.
    ///
    /// Returns `false` if the session has no such turn.
    pub async fn set_turn_status(
        &self,
        tab: &TabId,
        turn_id: &str,
        status: TurnStatus,
    ) -> Result<bool, RepositoryError> {
        let mut session = self.load_or_create(tab).await?;
        let Some(turn) = session.turns.iter_mut().rev().find(|t| t.id == turn_id) else {
            return Ok(false);
        };
        turn.status = status;
        session.updated_at = session.updated_at.max(Utc::now());
        self.save(session).await?;
        Ok(true)
    }

    /// Turns of the tab's session, oldest first.
    pub async fn history(&self, tab: &TabId) -> Result<Vec<ChatTurn>, RepositoryError> {
        Ok(self.load_or_create(tab).await?.turns)
    }

    /// Drop the cached and the persisted session.
    pub async fn clear(&self, tab: &TabId) -> Result<(), RepositoryError> {
        self.cache.remove(tab);
        self.kv.delete(SESSIONS_NAMESPACE, tab.as_str()).await?;
        debug!(tab_id = %tab, "cleared session");
        Ok(())
    }

    async fn save(&self, session: ChatSession) -> Result<(), RepositoryError> {
        self.persist(&session).await?;
        self.cache.insert(session.tab_id.clone(), session);
        Ok(())
    }

    async fn persist(&self, session: &ChatSession) -> Result<(), RepositoryError> {
        let value = serde_json::to_value(session)
            .map_err(|e| RepositoryError::Serialization(e.to_string()))?;
        self.kv
            .set(SESSIONS_NAMESPACE, session.tab_id.as_str(), &value)
            .await
    }
}
