//! SQLite storage layer: WAL-mode pool and the key-value store.

pub mod kv;
pub mod pool;
