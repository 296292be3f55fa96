//! In-memory store for tests and ephemeral sessions

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use chrono::Utc;

use super::{LocalStore, StoreResult, StoredEntry};
use crate::error::StoreError;

#[derive(Default)]
struct Inner {
    namespaces: BTreeMap<String, BTreeMap<String, StoredEntry>>,
    sequences: HashMap<String, u64>,
}

/// Volatile [`LocalStore`]; contents vanish with the value
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|_| StoreError::Io("memory store lock poisoned".to_string()))
    }
}

impl LocalStore for MemoryStore {
    fn get(&self, namespace: &str, key: &str) -> StoreResult<Option<StoredEntry>> {
        let inner = self.lock()?;
        Ok(inner
            .namespaces
            .get(namespace)
            .and_then(|ns| ns.get(key))
            .cloned())
    }

    fn put(&self, namespace: &str, key: &str, data: &[u8]) -> StoreResult<()> {
        let mut inner = self.lock()?;
        inner.namespaces.entry(namespace.to_string()).or_default().insert(
            key.to_string(),
            StoredEntry {
                key: key.to_string(),
                data: data.to_vec(),
                stored_at: Utc::now(),
            },
        );
        Ok(())
    }

    fn delete(&self, namespace: &str, key: &str) -> StoreResult<bool> {
        let mut inner = self.lock()?;
        let Some(ns) = inner.namespaces.get_mut(namespace) else {
            return Ok(false);
        };
        let removed = ns.remove(key).is_some();
        if ns.is_empty() {
            inner.namespaces.remove(namespace);
        }
        Ok(removed)
    }

    fn list(&self, namespace: &str) -> StoreResult<Vec<StoredEntry>> {
        let inner = self.lock()?;
        Ok(inner
            .namespaces
            .get(namespace)
            .map(|ns| ns.values().cloned().collect())
            .unwrap_or_default())
    }

    fn namespaces(&self) -> StoreResult<Vec<String>> {
        let inner = self.lock()?;
        Ok(inner.namespaces.keys().cloned().collect())
    }

    fn clear_namespace(&self, namespace: &str) -> StoreResult<usize> {
        let mut inner = self.lock()?;
        Ok(inner
            .namespaces
            .remove(namespace)
            .map(|ns| ns.len())
            .unwrap_or(0))
    }

    fn replace_namespace(&self, from: &str, to: &str) -> StoreResult<usize> {
        let mut inner = self.lock()?;
        match inner.namespaces.remove(from) {
            Some(entries) => {
                let count = entries.len();
                inner.namespaces.insert(to.to_string(), entries);
                Ok(count)
            }
            None => {
                inner.namespaces.remove(to);
                Ok(0)
            }
        }
    }

    fn next_sequence(&self, name: &str) -> StoreResult<u64> {
        let mut inner = self.lock()?;
        let value = inner.sequences.entry(name.to_string()).or_insert(0);
        *value += 1;
        Ok(*value)
    }
}
