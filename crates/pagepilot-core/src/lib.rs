//! Business logic and port definitions for PagePilot.
//!
//! This crate defines the "ports" (collaborator traits) that the
//! infrastructure layer implements: key-value storage, embedders, model
//! providers, credentials, and page access. It depends only on
//! `pagepilot-types` and pure libraries -- never on `pagepilot-infra` or any
//! database/IO crate.

pub mod agent;
pub mod chat;
pub mod credentials;
pub mod handlers;
pub mod llm;
pub mod message;
pub mod orchestrator;
pub mod page;
pub mod retrieval;
pub mod storage;

#[cfg(test)]
pub(crate) mod test_support;
