// # Memory Pending Store
//
// In-memory implementation of PendingStore.
//
// ## Purpose
//
// Keeps pending records for perform and cleanup running in the same
// process. Nothing survives a restart; cleanup then falls back to removing
// only the challenge value.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::Error;
use crate::challenge::PendingRecord;
use crate::traits::pending_store::PendingStore;

/// In-memory pending store
///
/// Cloning shares the stored records.
///
/// # Example
///
/// ```rust
/// use dns01_core::{MemoryPendingStore, PendingRecord, ZoneConfig};
/// use dns01_core::traits::PendingStore;
///
/// # tokio_test::block_on(async {
/// let store = MemoryPendingStore::new();
/// let zone = ZoneConfig::new("example.com", "sub", "rg");
/// let record = PendingRecord::new("example.com", zone, "_acme-challenge", "token", true);
///
/// store.put(&record).await.unwrap();
/// assert_eq!(store.take(&record.key()).await.unwrap(), Some(record));
/// # });
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryPendingStore {
    inner: Arc<RwLock<HashMap<String, PendingRecord>>>,
}

impl MemoryPendingStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records
    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    /// Whether the store is empty
    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }
}

#[async_trait]
impl PendingStore for MemoryPendingStore {
    async fn get(&self, key: &str) -> Result<Option<PendingRecord>, Error> {
        Ok(self.inner.read().await.get(key).cloned())
    }

    async fn put(&self, record: &PendingRecord) -> Result<(), Error> {
        self.inner
            .write()
            .await
            .insert(record.key(), record.clone());
        Ok(())
    }

    async fn take(&self, key: &str) -> Result<Option<PendingRecord>, Error> {
        Ok(self.inner.write().await.remove(key))
    }

    async fn keys(&self) -> Result<Vec<String>, Error> {
        Ok(self.inner.read().await.keys().cloned().collect())
    }

    async fn flush(&self) -> Result<(), Error> {
        Ok(())
    }
}
