//! Grounding context assembly.
//!
//! Two tiers: focused ranked chunks when retrieval finds anything at or
//! above the relevance threshold, otherwise the full page snapshot. A query
//! whose wording misses every chunk still gets the whole page.

use std::sync::Arc;

use pagepilot_types::chat::TabId;
use pagepilot_types::config::RetrievalSettings;
use pagepilot_types::retrieval::GroundingContext;
use tracing::{debug, warn};

use crate::storage::kv_store::KvStore;

use super::index::RetrievalIndex;

/// Picks the context supplied to the model for one turn.
pub struct ContextAssembler<K: KvStore> {
    index: Arc<RetrievalIndex<K>>,
    settings: RetrievalSettings,
}

impl<K: KvStore> ContextAssembler<K> {
    pub fn new(index: Arc<RetrievalIndex<K>>, settings: RetrievalSettings) -> Self {
        Self { index, settings }
    }

    pub fn settings(&self) -> &RetrievalSettings {
        &self.settings
    }

    /// Whether retrieval runs for a request with the given `enable_rag` flag.
    pub fn retrieval_enabled(&self, enable_rag: bool) -> bool {
        enable_rag && self.settings.enabled
    }

    /// Assemble the grounding context for `query` on `tab`.
    ///
    /// Never fails: a retrieval error is logged and treated as "no hits",
    /// and an unreadable snapshot as "no snapshot".
    pub async fn assemble(&self, tab: &TabId, query: &str, enable_rag: bool) -> GroundingContext {
        if self.retrieval_enabled(enable_rag) {
            match self
                .index
                .search(
                    tab,
                    query,
                    self.settings.search_limit,
                    self.settings.relevance_threshold,
                )
                .await
            {
                Ok(chunks) if !chunks.is_empty() => {
                    debug!(tab_id = %tab, hits = chunks.len(), "using focused context");
                    return GroundingContext::Focused { chunks };
                }
                Ok(_) => debug!(tab_id = %tab, "no chunk cleared the threshold"),
                Err(e) => warn!(tab_id = %tab, error = %e, "retrieval failed, falling back to full page"),
            }
        }

        match self.index.snapshot(tab).await {
            Ok(Some(snapshot)) => GroundingContext::FullPage {
                text: snapshot.content,
            },
            Ok(None) => GroundingContext::Empty,
            Err(e) => {
                warn!(tab_id = %tab, error = %e, "failed to read page snapshot");
                GroundingContext::Empty
            }
        }
    }
}
