//! In-process retrieval over the page open in each tab.
//!
//! - `chunker`: overlapping fixed-size chunks on semantic boundaries
//! - `embedder` / `box_embedder`: the embedding port and its boxed form
//! - `index`: per-tab chunk embeddings plus persisted page snapshots
//! - `context`: two-tier grounding context assembly

pub mod box_embedder;
pub mod chunker;
pub mod context;
pub mod embedder;
pub mod index;
