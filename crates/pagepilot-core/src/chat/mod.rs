//! Per-tab chat session storage.

pub mod session_store;
