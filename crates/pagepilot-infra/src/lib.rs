//! Infrastructure layer for PagePilot.
//!
//! Implementations of the ports defined in `pagepilot-core`: SQLite and
//! in-memory key-value stores, the OpenAI-compatible model provider,
//! embedders, environment credentials, and page adapters for runs without
//! a browser.

pub mod config;
pub mod credentials;
pub mod llm;
pub mod memory;
pub mod page;
pub mod sqlite;
pub mod vector;
