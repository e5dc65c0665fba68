//! Retrieval types: page chunks, ranked search hits, grounding context.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::chat::TabId;

/// Where a chunk came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub url: String,
    pub title: String,
}

/// A bounded contiguous slice of page text, the unit of retrieval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentChunk {
    pub text: String,
    pub metadata: ChunkMetadata,
    pub tab_id: TabId,
    pub chunk_index: u32,
    pub total_chunks: u32,
}

/// A chunk returned by a similarity search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedChunk {
    pub chunk: DocumentChunk,
    /// Cosine similarity to the query, in [-1.0, 1.0].
    pub similarity: f32,
}

/// Untruncated page text persisted alongside the index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageSnapshot {
    pub url: String,
    pub title: String,
    pub content: String,
    pub captured_at: DateTime<Utc>,
}

/// Page-derived text supplied to the model for one turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GroundingContext {
    /// Chunks that cleared the relevance threshold, most similar first.
    Focused { chunks: Vec<RankedChunk> },
    /// The full page text, verbatim.
    FullPage { text: String },
    /// Nothing known about the page.
    Empty,
}

impl GroundingContext {
    pub fn is_empty(&self) -> bool {
        match self {
            GroundingContext::Focused { chunks } => chunks.is_empty(),
            GroundingContext::FullPage { text } => text.is_empty(),
            GroundingContext::Empty => true,
        }
    }

    /// Render as the text block placed in front of the model.
    pub fn render(&self) -> String {
        match self {
            GroundingContext::Focused { chunks } => chunks
                .iter()
                .map(|rc| {
                    format!(
                        "[chunk {}/{} | relevance {:.2}]\n{}",
                        rc.chunk.chunk_index + 1,
                        rc.chunk.total_chunks,
                        rc.similarity,
                        rc.chunk.text
                    )
                })
                .collect::<Vec<_>>()
                .join("\n\n"),
            GroundingContext::FullPage { text } => text.clone(),
            GroundingContext::Empty => String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(text: &str, index: u32) -> RankedChunk {
        RankedChunk {
            chunk: DocumentChunk {
                text: text.to_string(),
                metadata: ChunkMetadata {
                    url: "https://acme.test".to_string(),
                    title: "Acme".to_string(),
                },
                tab_id: TabId::from("7"),
                chunk_index: index,
                total_chunks: 2,
            },
            similarity: 0.5,
        }
    }

    #[test]
    fn test_full_page_renders_verbatim() {
        let ctx = GroundingContext::FullPage {
            text: "Acme Corp develops routers.".to_string(),
        };
        assert_eq!(ctx.render(), "Acme Corp develops routers.");
        assert!(!ctx.is_empty());
    }

    #[test]
    fn test_focused_renders_in_order() {
        let ctx = GroundingContext::Focused {
            chunks: vec![chunk("second", 1), chunk("first", 0)],
        };
        let rendered = ctx.render();
        assert!(rendered.find("second").unwrap() < rendered.find("first").unwrap());
        assert!(rendered.contains("[chunk 2/2"));
    }

    #[test]
    fn test_empty_context() {
        assert!(GroundingContext::Empty.is_empty());
        assert!(GroundingContext::Focused { chunks: vec![] }.is_empty());
        assert_eq!(GroundingContext::Empty.render(), "");
    }
}
