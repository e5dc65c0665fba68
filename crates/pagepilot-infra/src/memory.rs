//! Process-local key-value store for ephemeral runs (`--ephemeral`, tests).

use dashmap::DashMap;
use pagepilot_core::storage::kv_store::KvStore;
use pagepilot_types::error::RepositoryError;
use serde_json::Value;

/// `KvStore` held entirely in memory; contents vanish with the process.
#[derive(Default)]
pub struct MemoryKvStore {
    entries: DashMap<(String, String), Value>,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn id(namespace: &str, key: &str) -> (String, String) {
    (namespace.to_string(), key.to_string())
}

impl KvStore for MemoryKvStore {
    async fn get(&self, namespace: &str, key: &str) -> Result<Option<Value>, RepositoryError> {
        Ok(self.entries.get(&id(namespace, key)).map(|e| e.value().clone()))
    }

    async fn set(&self, namespace: &str, key: &str, value: &Value) -> Result<(), RepositoryError> {
        if value.is_null() {
            self.entries.remove(&id(namespace, key));
            return Ok(());
        }
        self.entries.insert(id(namespace, key), value.clone());
        Ok(())
    }

    async fn delete(&self, namespace: &str, key: &str) -> Result<(), RepositoryError> {
        self.entries.remove(&id(namespace, key));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_null_deletes() {
        let kv = MemoryKvStore::new();
        kv.set("sessions", "b", &json!(1)).await.unwrap();
        kv.set("sessions", "a", &json!(2)).await.unwrap();

        kv.set("sessions", "a", &Value::Null).await.unwrap();
        assert_eq!(kv.get("sessions", "a").await.unwrap(), None);
        assert_eq!(kv.len(), 1);
    }

    #[tokio::test]
    async fn test_set_overwrites_and_namespaces_are_isolated() {
        let kv = MemoryKvStore::new();
        kv.set("n", "k", &json!(1)).await.unwrap();
        kv.set("n", "k", &json!(2)).await.unwrap();
        kv.set("other", "k", &json!(3)).await.unwrap();
        assert_eq!(kv.get("n", "k").await.unwrap(), Some(json!(2)));
        assert_eq!(kv.get("other", "k").await.unwrap(), Some(json!(3)));
        kv.delete("n", "k").await.unwrap();
        assert!(kv.get("n", "k").await.unwrap().is_none());
    }
}
