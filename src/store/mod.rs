//! Durable local store shared by the cache engine and the action queue
//!
//! A namespaced key-value store. Each consumer keeps its data in its own
//! namespaces (`cache/<generation>`, `actions`, `meta`, ...) and no component
//! writes into another's namespace.

pub mod key;
pub mod memory;
pub mod sqlite;

use chrono::{DateTime, Utc};

use crate::error::StoreError;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// A value read back from the store
#[derive(Debug, Clone, PartialEq)]
pub struct StoredEntry {
    pub key: String,
    pub data: Vec<u8>,
    pub stored_at: DateTime<Utc>,
}

/// Namespaced key-value storage.
///
/// `put` on an existing key replaces it (last write wins). `list` returns
/// entries in ascending key order.
pub trait LocalStore: Send + Sync {
    fn get(&self, namespace: &str, key: &str) -> StoreResult<Option<StoredEntry>>;

    fn put(&self, namespace: &str, key: &str, data: &[u8]) -> StoreResult<()>;

    /// Returns whether an entry was removed
    fn delete(&self, namespace: &str, key: &str) -> StoreResult<bool>;

    fn list(&self, namespace: &str) -> StoreResult<Vec<StoredEntry>>;

    /// Namespaces holding at least one entry
    fn namespaces(&self) -> StoreResult<Vec<String>>;

    /// Remove every entry in a namespace, returning how many were removed
    fn clear_namespace(&self, namespace: &str) -> StoreResult<usize>;

    /// Atomically replace the contents of `to` with those of `from`, leaving
    /// `from` empty. Returns how many entries `to` now holds.
    fn replace_namespace(&self, from: &str, to: &str) -> StoreResult<usize>;

    /// Next value of a named, strictly increasing counter starting at 1
    fn next_sequence(&self, name: &str) -> StoreResult<u64>;
}
