//! Key-value store trait.
//!
//! Defines the interface for namespaced key-value storage.
//! Implementations live in pagepilot-infra.

use pagepilot_types::error::RepositoryError;

/// Trait for persistent key-value storage scoped by `(namespace, key)`.
///
/// Stores arbitrary JSON values. Writing JSON `null` deletes the key.
/// Uses RPITIT (native async fn in traits, Rust 2024 edition).
pub trait KvStore: Send + Sync + 'static {
    /// Get a value by key. Returns None if the key does not exist.
    fn get(
        &self,
        namespace: &str,
        key: &str,
    ) -> impl std::future::Future<Output = Result<Option<serde_json::Value>, RepositoryError>> + Send;

    /// Set a value for a key (upsert). A `null` value deletes the key.
    fn set(
        &self,
        namespace: &str,
        key: &str,
        value: &serde_json::Value,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Delete a key. No-op if key does not exist.
    fn delete(
        &self,
        namespace: &str,
        key: &str,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;
}
