//! Shared domain types for PagePilot.
//!
//! This crate contains the types exchanged between the content, background
//! and UI contexts: message envelopes, chat sessions, page snapshots,
//! retrieval chunks, LLM request/response shapes, configuration, and the
//! error enums that travel with them.
//!
//! Zero infrastructure dependencies -- only serde, uuid, chrono, thiserror, url.

pub mod chat;
pub mod config;
pub mod envelope;
pub mod error;
pub mod llm;
pub mod page;
pub mod retrieval;
pub mod storage;
