/*!
Local save stores.

This module defines the port through which the coordinator reaches the host's
local persistence, and the adapters that implement it. Hosts with a
callback-style handler plug it in through [`CallbackStore`]; hosts that can
await directly implement [`LocalSaveStore`] themselves.
*/

pub mod callback;
pub mod file;

use crate::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

pub use callback::{CallbackStore, LoadFailure, LoadSuccess, SaveHandler};
pub use file::LocalFileStore;

/// Async local storage contract used by the coordinator
///
/// Values are keyed by the game identifier (save bytes) and by
/// `TYPE_<game>` (the one-element save type array).
#[async_trait]
pub trait LocalSaveStore: Send + Sync {
    /// Persist `bytes` under `key`
    ///
    /// # Arguments
    /// * `key` - Game identifier or derived type key
    /// * `bytes` - Value to store
    async fn save(&self, key: &str, bytes: &[u8]) -> Result<()>;

    /// Load the value stored under `key`
    ///
    /// Hosts that keep values in wider containers may hand back elements
    /// above `0xFF`; the coordinator masks them before use.
    ///
    /// # Returns
    /// `Ok(None)` when nothing is stored under `key`
    async fn load(&self, key: &str) -> Result<Option<Vec<u32>>>;
}

#[async_trait]
impl<T: LocalSaveStore + ?Sized> LocalSaveStore for Arc<T> {
    async fn save(&self, key: &str, bytes: &[u8]) -> Result<()> {
        (**self).save(key, bytes).await
    }

    async fn load(&self, key: &str) -> Result<Option<Vec<u32>>> {
        (**self).load(key).await
    }
}

/// Memory-based save store
///
/// Keeps values in a map behind a mutex. Useful for tests and for hosts
/// that persist elsewhere between sessions.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    data: Arc<Mutex<HashMap<String, Vec<u32>>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a raw value, including elements wider than a byte
    pub fn insert_raw<S: Into<String>>(&self, key: S, value: Vec<u32>) {
        self.lock().insert(key.into(), value);
    }

    /// Raw value currently stored under `key`
    pub fn get_raw(&self, key: &str) -> Option<Vec<u32>> {
        self.lock().get(key).cloned()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.lock().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Vec<u32>>> {
        self.data.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl LocalSaveStore for MemoryStore {
    async fn save(&self, key: &str, bytes: &[u8]) -> Result<()> {
        let value = bytes.iter().map(|&b| u32::from(b)).collect();
        self.lock().insert(key.to_string(), value);
        Ok(())
    }

    async fn load(&self, key: &str) -> Result<Option<Vec<u32>>> {
        Ok(self.lock().get(key).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_store_roundtrip() {
        let store = MemoryStore::new();
        assert!(store.is_empty());

        store.save("ZELDA", &[1, 2, 255]).await.unwrap();
        assert_eq!(store.load("ZELDA").await.unwrap(), Some(vec![1, 2, 255]));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_memory_store_missing_key() {
        let store = MemoryStore::new();
        assert_eq!(store.load("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_memory_store_keeps_wide_values() {
        let store = MemoryStore::new();
        store.insert_raw("wide", vec![0x1FF, 0x100]);
        assert_eq!(store.load("wide").await.unwrap(), Some(vec![0x1FF, 0x100]));
    }

    #[tokio::test]
    async fn test_arc_store_delegates() {
        let store = Arc::new(MemoryStore::new());
        let shared: Arc<dyn LocalSaveStore> = store.clone();
        shared.save("k", &[9]).await.unwrap();
        assert!(store.contains("k"));
    }
}
