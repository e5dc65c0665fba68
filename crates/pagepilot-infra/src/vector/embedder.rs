//! Embedding backends.
//!
//! [`HashingEmbedder`] needs no model files and is the default; it projects
//! lowercase word unigrams and bigrams into a fixed number of signed buckets.
//! [`FastEmbedEmbedder`] (feature `fastembed`) runs BGE-small locally via
//! ONNX and downloads the model on first use.

use pagepilot_core::retrieval::embedder::Embedder;
use pagepilot_types::error::RetrievalError;

pub const DEFAULT_HASHING_DIMENSION: usize = 384;

/// Deterministic feature-hashing embedder.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimension: usize,
}

impl HashingEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    fn vectorize(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; self.dimension];
        let lowered = text.to_lowercase();
        let words: Vec<&str> = lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .collect();

        for word in &words {
            self.add_feature(&mut v, word.as_bytes(), 1.0);
        }
        for pair in words.windows(2) {
            let bigram = format!("{} {}", pair[0], pair[1]);
            self.add_feature(&mut v, bigram.as_bytes(), 0.5);
        }

        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            v.iter_mut().for_each(|x| *x /= norm);
        }
        v
    }

    fn add_feature(&self, v: &mut [f32], feature: &[u8], weight: f32) {
        let hash = fnv1a(feature);
        let bucket = (hash % self.dimension as u64) as usize;
        // Top bit picks the sign so collisions tend to cancel.
        let sign = if hash >> 63 == 0 { 1.0 } else { -1.0 };
        v[bucket] += sign * weight;
    }
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(DEFAULT_HASHING_DIMENSION)
    }
}

fn fnv1a(bytes: &[u8]) -> u64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;
    bytes
        .iter()
        .fold(OFFSET, |hash, b| (hash ^ u64::from(*b)).wrapping_mul(PRIME))
}

impl Embedder for HashingEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RetrievalError> {
        Ok(texts.iter().map(|t| self.vectorize(t)).collect())
    }

    fn model_name(&self) -> &str {
        "feature-hashing"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

#[cfg(feature = "fastembed")]
pub use self::local::FastEmbedEmbedder;

#[cfg(feature = "fastembed")]
mod local {
    use std::sync::{Arc, Mutex, PoisonError};

    use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
    use tokio::sync::OnceCell;

    use pagepilot_core::retrieval::embedder::Embedder;
    use pagepilot_types::error::RetrievalError;

    const BGE_SMALL_DIMENSION: usize = 384;

    /// BGE-small-en-v1.5 through fastembed, loaded lazily on a blocking thread.
    #[derive(Clone, Default)]
    pub struct FastEmbedEmbedder {
        model: Arc<OnceCell<Arc<Mutex<TextEmbedding>>>>,
    }

    impl FastEmbedEmbedder {
        pub fn new() -> Self {
            Self::default()
        }

        async fn model(&self) -> Result<Arc<Mutex<TextEmbedding>>, RetrievalError> {
            let model = self
                .model
                .get_or_try_init(|| async {
                    let loaded = tokio::task::spawn_blocking(|| {
                        TextEmbedding::try_new(
                            InitOptions::new(EmbeddingModel::BGESmallENV15)
                                .with_show_download_progress(false),
                        )
                    })
                    .await
                    .map_err(|e| RetrievalError::Embedding(e.to_string()))?
                    .map_err(|e| RetrievalError::Embedding(e.to_string()))?;
                    tracing::info!("embedding model loaded (BGESmallENV15)");
                    Ok::<_, RetrievalError>(Arc::new(Mutex::new(loaded)))
                })
                .await?;
            Ok(Arc::clone(model))
        }
    }

    impl Embedder for FastEmbedEmbedder {
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RetrievalError> {
            if texts.is_empty() {
                return Ok(Vec::new());
            }
            let model = self.model().await?;
            let batch = texts.to_vec();
            tokio::task::spawn_blocking(move || {
                let mut guard = model.lock().unwrap_or_else(PoisonError::into_inner);
                guard
                    .embed(batch, None)
                    .map_err(|e| RetrievalError::Embedding(e.to_string()))
            })
            .await
            .map_err(|e| RetrievalError::Embedding(e.to_string()))?
        }

        fn model_name(&self) -> &str {
            "BAAI/bge-small-en-v1.5"
        }

        fn dimension(&self) -> usize {
            BGE_SMALL_DIMENSION
        }
    }
}
