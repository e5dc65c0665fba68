//! Embedding backends for the page retrieval index.

pub mod embedder;
