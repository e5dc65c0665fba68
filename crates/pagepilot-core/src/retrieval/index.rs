//! Per-tab retrieval index.
//!
//! Each tab owns at most one in-memory index: the chunks of one page, their
//! embeddings, and the canonical URL they were built from. An index is never
//! merged across URLs; a different canonical URL means a wholesale rebuild.
//! The untruncated page text is persisted separately through the `KvStore`
//! port (namespace `page-snapshots`) as the full-page fallback.

use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use pagepilot_types::chat::TabId;
use pagepilot_types::error::{RepositoryError, RetrievalError};
use pagepilot_types::page::{PageContent, canonical_url};
use pagepilot_types::retrieval::{DocumentChunk, PageSnapshot, RankedChunk};
use pagepilot_types::storage::SNAPSHOTS_NAMESPACE;
use tracing::{debug, info, warn};

use crate::storage::kv_store::KvStore;

use super::box_embedder::BoxEmbedder;
use super::chunker::PageChunker;
use super::embedder::cosine_similarity;

/// Texts sent to the embedder per call.
const EMBED_BATCH: usize = 32;

/// Chunks and embeddings of one page.
struct TabIndex {
    url: String,
    chunks: Vec<DocumentChunk>,
    embeddings: Vec<Vec<f32>>,
}

/// What `ensure_index` did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexOutcome {
    /// Chunked and embedded from scratch.
    Built { chunks: usize },
    /// An index for the same canonical URL already existed.
    Reused,
}

/// Retrieval indexes for all tabs plus their persisted page snapshots.
pub struct RetrievalIndex<K: KvStore> {
    kv: Arc<K>,
    embedder: BoxEmbedder,
    chunker: PageChunker,
    indexes: DashMap<TabId, Arc<TabIndex>>,
}

impl<K: KvStore> RetrievalIndex<K> {
    pub fn new(kv: Arc<K>, embedder: BoxEmbedder, chunker: PageChunker) -> Self {
        Self {
            kv,
            embedder,
            chunker,
            indexes: DashMap::new(),
        }
    }

    pub fn embedder(&self) -> &BoxEmbedder {
        &self.embedder
    }

    /// Persist the untruncated page text for the tab.
    ///
    /// An in-memory index built for a different canonical URL is dropped so
    /// it can never answer for the new page.
    pub async fn store_snapshot(&self, page: &PageContent) -> Result<(), RetrievalError> {
        let url = canonical_url(&page.url);
        self.indexes.remove_if(&page.id, |_, index| index.url != url);

        let snapshot = PageSnapshot {
            url: page.url.clone(),
            title: page.title.clone(),
            content: page.content.clone(),
            captured_at: Utc::now(),
        };
        let value = serde_json::to_value(&snapshot)
            .map_err(|e| RepositoryError::Serialization(e.to_string()))?;
        self.kv
            .set(SNAPSHOTS_NAMESPACE, page.id.as_str(), &value)
            .await?;
        debug!(tab_id = %page.id, url = %url, bytes = page.content.len(), "stored page snapshot");
        Ok(())
    }

    /// The persisted snapshot for the tab, if any.
    pub async fn snapshot(&self, tab: &TabId) -> Result<Option<PageSnapshot>, RetrievalError> {
        let Some(value) = self.kv.get(SNAPSHOTS_NAMESPACE, tab.as_str()).await? else {
            return Ok(None);
        };
        let snapshot = serde_json::from_value(value)
            .map_err(|e| RepositoryError::Serialization(e.to_string()))?;
        Ok(Some(snapshot))
    }

    /// Build the tab's index unless one already exists for the same
    /// canonical URL.
    pub async fn ensure_index(&self, page: &PageContent) -> Result<IndexOutcome, RetrievalError> {
        let url = canonical_url(&page.url);
        if self
            .indexes
            .get(&page.id)
            .is_some_and(|index| index.url == url)
        {
            debug!(tab_id = %page.id, %url, "reusing retrieval index");
            return Ok(IndexOutcome::Reused);
        }

        let chunks = self.chunker.chunk(&page.id, page);
        let embeddings = self.embed_all(&chunks).await?;
        let count = chunks.len();

        self.indexes.insert(
            page.id.clone(),
            Arc::new(TabIndex {
                url: url.clone(),
                chunks,
                embeddings,
            }),
        );
        info!(tab_id = %page.id, %url, chunks = count, model = self.embedder.model_name(), "built retrieval index");
        Ok(IndexOutcome::Built { chunks: count })
    }

    async fn embed_all(&self, chunks: &[DocumentChunk]) -> Result<Vec<Vec<f32>>, RetrievalError> {
        let mut embeddings = Vec::with_capacity(chunks.len());
        for batch in chunks.chunks(EMBED_BATCH) {
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            let vectors = self.embedder.embed(&texts).await?;
            if vectors.len() != texts.len() {
                return Err(RetrievalError::Embedding(format!(
                    "embedder returned {} vectors for {} texts",
                    vectors.len(),
                    texts.len()
                )));
            }
            embeddings.extend(vectors);
        }
        Ok(embeddings)
    }

    /// Canonical URL the tab's index was built from.
    pub fn indexed_url(&self, tab: &TabId) -> Option<String> {
        self.indexes.get(tab).map(|index| index.url.clone())
    }

    pub fn has_index(&self, tab: &TabId) -> bool {
        self.indexes.contains_key(tab)
    }

    /// Rank the tab's chunks against `query`.
    ///
    /// Keeps chunks with similarity at or above `threshold`, most similar
    /// first, at most `limit`. A tab without an index yields no chunks.
    pub async fn search(
        &self,
        tab: &TabId,
        query: &str,
        limit: usize,
        threshold: f32,
    ) -> Result<Vec<RankedChunk>, RetrievalError> {
        let Some(index) = self.indexes.get(tab).map(|entry| Arc::clone(entry.value())) else {
            return Ok(Vec::new());
        };
        if index.chunks.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let query_vec = self
            .embedder
            .embed(&[query.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| RetrievalError::Embedding("embedder returned no vector".to_string()))?;

        let mut ranked = Vec::new();
        for (chunk, embedding) in index.chunks.iter().zip(&index.embeddings) {
            if embedding.len() != query_vec.len() {
                return Err(RetrievalError::DimensionMismatch {
                    expected: embedding.len(),
                    actual: query_vec.len(),
                });
            }
            let similarity = cosine_similarity(&query_vec, embedding);
            if similarity >= threshold {
                ranked.push(RankedChunk {
                    chunk: chunk.clone(),
                    similarity,
                });
            }
        }

        ranked.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
        ranked.truncate(limit);
        debug!(tab_id = %tab, hits = ranked.len(), threshold, "searched retrieval index");
        Ok(ranked)
    }

    /// Drop the tab's index and its persisted snapshot.
    pub async fn clear(&self, tab: &TabId) -> Result<(), RetrievalError> {
        self.indexes.remove(tab);
        if let Err(e) = self.kv.delete(SNAPSHOTS_NAMESPACE, tab.as_str()).await {
            warn!(tab_id = %tab, error = %e, "failed to delete page snapshot");
            return Err(e.into());
        }
        debug!(tab_id = %tab, "cleared retrieval index");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{MockEmbedder, MockKvStore};

    fn index() -> RetrievalIndex<MockKvStore> {
        RetrievalIndex::new(
            Arc::new(MockKvStore::new()),
            BoxEmbedder::new(MockEmbedder::new()),
            PageChunker::new(60, 0).unwrap(),
        )
    }

    fn page(url: &str, content: &str) -> PageContent {
        PageContent {
            id: TabId::from("7"),
            url: url.to_string(),
            title: "Acme".to_string(),
            content: content.to_string(),
        }
    }

    const MULTI: &str = "Acme Corp develops routers for factories.\n\n\
        The cafeteria serves soup on Tuesdays.\n\n\
        Quarterly revenue grew by twelve percent.";

    #[tokio::test]
    async fn test_build_then_reuse_for_same_canonical_url() {
        let index = index();
        let first = index.ensure_index(&page("https://acme.test/about/", MULTI)).await.unwrap();
        assert!(matches!(first, IndexOutcome::Built { chunks } if chunks >= 3));

        let second = index.ensure_index(&page("HTTPS://ACME.test/about#team", MULTI)).await.unwrap();
        assert_eq!(second, IndexOutcome::Reused);
        assert_eq!(index.indexed_url(&TabId::from("7")).unwrap(), "https://acme.test/about");
    }

    #[tokio::test]
    async fn test_url_change_rebuilds_wholesale() {
        let index = index();
        index.ensure_index(&page("https://acme.test/a", MULTI)).await.unwrap();
        let outcome = index
            .ensure_index(&page("https://acme.test/b", "Completely different page."))
            .await
            .unwrap();
        assert_eq!(outcome, IndexOutcome::Built { chunks: 1 });

        let hits = index.search(&TabId::from("7"), "routers", 10, 0.0).await.unwrap();
        assert!(hits.iter().all(|h| !h.chunk.text.contains("routers")));
    }

    #[tokio::test]
    async fn test_query_identical_to_chunk_ranks_it_first() {
        let index = index();
        index.ensure_index(&page("https://acme.test", MULTI)).await.unwrap();

        let query = "The cafeteria serves soup on Tuesdays.";
        let hits = index.search(&TabId::from("7"), query, 5, 0.25).await.unwrap();
        assert!(!hits.is_empty());
        assert_eq!(hits[0].chunk.text, query);
        assert!(hits[0].similarity > 0.99);
        assert!(hits.windows(2).all(|w| w[0].similarity >= w[1].similarity));
    }

    #[tokio::test]
    async fn test_search_respects_limit_and_threshold() {
        let index = index();
        index.ensure_index(&page("https://acme.test", MULTI)).await.unwrap();
        let tab = TabId::from("7");

        assert_eq!(index.search(&tab, "soup", 1, 0.0).await.unwrap().len(), 1);
        assert!(index.search(&tab, "zebra xylophone", 5, 0.5).await.unwrap().is_empty());
        assert!(index.search(&TabId::from("99"), "soup", 5, 0.0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_snapshot_for_new_url_drops_stale_index() {
        let index = index();
        let tab = TabId::from("7");
        index.ensure_index(&page("https://acme.test/a", MULTI)).await.unwrap();

        index.store_snapshot(&page("https://acme.test/a/", MULTI)).await.unwrap();
        assert!(index.has_index(&tab));

        index.store_snapshot(&page("https://other.test", "Other")).await.unwrap();
        assert!(!index.has_index(&tab));
        assert_eq!(index.snapshot(&tab).await.unwrap().unwrap().content, "Other");
    }

    #[tokio::test]
    async fn test_clear_drops_index_and_snapshot() {
        let index = index();
        let tab = TabId::from("7");
        let p = page("https://acme.test", MULTI);
        index.store_snapshot(&p).await.unwrap();
        index.ensure_index(&p).await.unwrap();

        index.clear(&tab).await.unwrap();
        assert!(!index.has_index(&tab));
        assert!(index.snapshot(&tab).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_embedder_failure_surfaces() {
        let index = RetrievalIndex::new(
            Arc::new(MockKvStore::new()),
            BoxEmbedder::new(MockEmbedder::failing()),
            PageChunker::new(60, 0).unwrap(),
        );
        let err = index.ensure_index(&page("https://acme.test", MULTI)).await.unwrap_err();
        assert!(matches!(err, RetrievalError::Embedding(_)));
        assert!(!index.has_index(&TabId::from("7")));
    }
}
