// # Pending Store Trait
//
// Keeps the [`PendingRecord`]s written during `perform` so that `cleanup`
// can tell a freshly created record set from an appended value.
//
// ## Implementations
//
// - In-memory: [`crate::state::MemoryPendingStore`] (single process)
// - File-based: [`crate::state::FilePendingStore`] (perform and cleanup in
//   separate invocations)
//
// A missing entry is not an error: cleanup then falls back to removing only
// the challenge value, which is correct for both cases.

use async_trait::async_trait;

use crate::challenge::PendingRecord;

/// Trait for pending-record storage
///
/// All methods must be safe to call concurrently from multiple tasks.
#[async_trait]
pub trait PendingStore: Send + Sync {
    /// Get the pending record stored under `key`
    async fn get(&self, key: &str) -> Result<Option<PendingRecord>, crate::Error>;

    /// Store (or replace) a pending record
    async fn put(&self, record: &PendingRecord) -> Result<(), crate::Error>;

    /// Remove and return the pending record stored under `key`
    async fn take(&self, key: &str) -> Result<Option<PendingRecord>, crate::Error>;

    /// List all stored keys
    async fn keys(&self) -> Result<Vec<String>, crate::Error>;

    /// Persist any buffered changes
    async fn flush(&self) -> Result<(), crate::Error>;
}
