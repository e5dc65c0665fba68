//! Splits page text into overlapping fixed-size chunks.
//!
//! `text-splitter` picks the largest semantic unit that fits (paragraph,
//! then sentence, then word) so chunks rarely cut words in half. Sizes are
//! measured in characters.

use pagepilot_types::chat::TabId;
use pagepilot_types::error::RetrievalError;
use pagepilot_types::page::PageContent;
use pagepilot_types::retrieval::{ChunkMetadata, DocumentChunk};
use text_splitter::{ChunkConfig, TextSplitter};

/// Chunking parameters, validated once at construction.
pub struct PageChunker {
    splitter: TextSplitter<text_splitter::Characters>,
    chunk_size: usize,
    chunk_overlap: usize,
}

impl PageChunker {
    /// Fails if `chunk_size` is zero or `chunk_overlap >= chunk_size`.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self, RetrievalError> {
        if chunk_size == 0 {
            return Err(RetrievalError::Chunking("chunk size must be positive".to_string()));
        }
        let config = ChunkConfig::new(chunk_size)
            .with_overlap(chunk_overlap)
            .map_err(|e| RetrievalError::Chunking(e.to_string()))?;
        Ok(Self {
            splitter: TextSplitter::new(config),
            chunk_size,
            chunk_overlap,
        })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    /// Chunk a page. Empty or whitespace-only text yields no chunks.
    pub fn chunk(&self, tab: &TabId, page: &PageContent) -> Vec<DocumentChunk> {
        let texts: Vec<&str> = self.splitter.chunks(&page.content).collect();
        let total = texts.len() as u32;
        texts
            .into_iter()
            .enumerate()
            .map(|(i, text)| DocumentChunk {
                text: text.to_string(),
                metadata: ChunkMetadata {
                    url: page.url.clone(),
                    title: page.title.clone(),
                },
                tab_id: tab.clone(),
                chunk_index: i as u32,
                total_chunks: total,
            })
            .collect()
    }
}
