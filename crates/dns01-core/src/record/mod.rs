//! Record Manager
//!
//! Adds and removes single TXT values within a record set that other writers
//! may share. Every change is a read-modify-write:
//!
//! 1. Read the current set (missing means empty)
//! 2. Compute the new value list
//! 3. Write it back with the etag that was read (`If-Match`), or
//!    `If-None-Match: *` when creating
//!
//! Writes from this process to the same `(zone, record)` are serialized by a
//! per-record lock held across all three steps. Writers in other processes
//! are caught by the etag precondition; a 412 is retried from step 1 after a
//! randomized backoff. Nothing protects against a writer that ignores etags.
//!
//! ## Pinned records
//!
//! A zone mapping that names a TXT record is shared with the operator. Its
//! record set is never deleted: when the last challenge value goes away it
//! is rewritten to the [`PLACEHOLDER_VALUE`], which is ignored when reading.

pub mod memory;

pub use memory::{ApiOp, MemoryRecordApi};

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use rand::Rng;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info, warn};

use crate::challenge::{PendingRecord, record_lock_key};
use crate::config::{RetryConfig, ZoneConfig};
use crate::error::{ApiErrorKind, Error, Result};
use crate::traits::{RecordSetApi, TxtRecordSet, WriteCondition};

/// Value left in a pinned record set that has no challenge values
pub const PLACEHOLDER_VALUE: &str = "-";

/// Challenge values of a record set, placeholder excluded
fn live_values(set: Option<&TxtRecordSet>) -> Vec<String> {
    set.map(|s| {
        s.values
            .iter()
            .filter(|v| v.as_str() != PLACEHOLDER_VALUE)
            .cloned()
            .collect()
    })
    .unwrap_or_default()
}

/// Record Manager
///
/// Shared by all concurrent challenge flows of a run. The record set API is
/// shared read-only; the lock table is the only mutable state.
pub struct RecordManager {
    api: Arc<dyn RecordSetApi>,
    ttl: u32,
    retry: RetryConfig,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl RecordManager {
    /// Create a manager writing record sets with `ttl` seconds
    pub fn new(api: Arc<dyn RecordSetApi>, ttl: u32, retry: RetryConfig) -> Self {
        Self {
            api,
            ttl,
            retry,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// The underlying record set API
    pub fn api(&self) -> &Arc<dyn RecordSetApi> {
        &self.api
    }

    /// Add `value` to the TXT record set `record_name` in `zone`
    ///
    /// Idempotent: when `value` is already present nothing is written. A set
    /// whose only value is `value` is reported as created, so a retried
    /// upsert that finds its own earlier write still cleans up the whole set.
    ///
    /// # Returns
    ///
    /// - `Ok(PendingRecord)`: value present; `created_new` tells cleanup
    ///   whether this flow owns the record set
    /// - `Err(Error)`: non-retryable failure, or attempts exhausted
    pub async fn upsert(
        &self,
        domain: &str,
        zone: &ZoneConfig,
        record_name: &str,
        value: &str,
    ) -> Result<PendingRecord> {
        let _guard = self.lock(&record_lock_key(zone, record_name)).await;

        let created_new = self
            .with_retry("upsert", record_name, || self.try_upsert(zone, record_name, value))
            .await?;

        info!(
            domain,
            zone = %zone.zone_name,
            record = record_name,
            created_new,
            "TXT challenge value written"
        );
        Ok(PendingRecord::new(domain, zone.clone(), record_name, value, created_new))
    }

    /// Remove the value described by `pending` from its record set
    ///
    /// Re-reads the set first so values added by other flows since perform
    /// survive. A set that no longer contains the value, or no longer
    /// exists, is left alone: calling this twice is not an error.
    pub async fn remove(&self, pending: &PendingRecord) -> Result<()> {
        let _guard = self.lock(&pending.lock_key()).await;

        self.with_retry("remove", &pending.record_name, || self.try_remove(pending))
            .await
    }

    async fn try_upsert(&self, zone: &ZoneConfig, record_name: &str, value: &str) -> Result<bool> {
        let current = self.api.get_txt(zone, record_name).await?;
        let mut values = live_values(current.as_ref());

        if values.iter().any(|v| v == value) {
            debug!(record = record_name, "Challenge value already present");
            return Ok(values.len() == 1);
        }

        let created_new = values.is_empty();
        values.push(value.to_string());

        let condition = match &current {
            Some(set) => WriteCondition::for_existing(set),
            None => WriteCondition::IfNoneMatch,
        };
        self.api
            .put_txt(zone, record_name, &values, self.ttl, &condition)
            .await?;
        Ok(created_new)
    }

    async fn try_remove(&self, pending: &PendingRecord) -> Result<()> {
        let zone = &pending.zone;
        let record_name = pending.record_name.as_str();

        let Some(current) = self.api.get_txt(zone, record_name).await? else {
            debug!(record = record_name, "TXT record set already gone");
            return Ok(());
        };

        let before = live_values(Some(&current));
        let remaining: Vec<String> = before
            .iter()
            .filter(|v| **v != pending.value)
            .cloned()
            .collect();
        if remaining.len() == before.len() {
            debug!(record = record_name, "Challenge value already removed");
            return Ok(());
        }

        let condition = WriteCondition::for_existing(&current);

        if !remaining.is_empty() {
            if pending.created_new {
                warn!(
                    record = record_name,
                    siblings = remaining.len(),
                    "Record set gained values after it was created; removing only ours"
                );
            }
            self.api
                .put_txt(zone, record_name, &remaining, self.ttl, &condition)
                .await?;
            info!(zone = %zone.zone_name, record = record_name, "TXT challenge value removed");
            return Ok(());
        }

        if !zone.can_delete() {
            self.api
                .put_txt(
                    zone,
                    record_name,
                    &[PLACEHOLDER_VALUE.to_string()],
                    self.ttl,
                    &condition,
                )
                .await?;
            info!(zone = %zone.zone_name, record = record_name, "Pinned TXT record reset to placeholder");
            return Ok(());
        }

        match self.api.delete_txt(zone, record_name, &condition).await {
            Ok(()) => {}
            Err(e) if e.api_kind() == Some(ApiErrorKind::NotFound) => {
                debug!(record = record_name, "TXT record set deleted concurrently");
            }
            Err(e) => return Err(e),
        }
        info!(zone = %zone.zone_name, record = record_name, "TXT record set deleted");
        Ok(())
    }

    /// Run `op` until it succeeds, fails permanently, or attempts run out
    async fn with_retry<T, F, Fut>(&self, action: &str, record_name: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt < self.retry.max_attempts => {
                    let delay = self.jittered_backoff(attempt);
                    warn!(
                        action,
                        record = record_name,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "Record set operation failed, retrying: {}",
                        e
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    if e.is_retryable() {
                        warn!(action, record = record_name, attempt, "Giving up after {} attempts", attempt);
                    }
                    return Err(e);
                }
            }
        }
    }

    /// Uniformly random delay in the upper half of the backoff window
    fn jittered_backoff(&self, attempt: u32) -> std::time::Duration {
        let window = self.retry.backoff(attempt).as_millis() as u64;
        let millis = if window == 0 {
            0
        } else {
            rand::thread_rng().gen_range(window / 2..=window)
        };
        std::time::Duration::from_millis(millis)
    }

    /// Acquire the lock for one record set
    async fn lock(&self, key: &str) -> OwnedMutexGuard<()> {
        let entry = {
            let mut locks = self.locks.lock().await;
            locks
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        entry.lock_owned().await
    }
}

impl std::fmt::Debug for RecordManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordManager")
            .field("api", &self.api.api_name())
            .field("ttl", &self.ttl)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn zone() -> ZoneConfig {
        ZoneConfig::new("example.com", "sub", "rg")
    }

    fn fast_retry() -> RetryConfig {
        RetryConfig {
            max_attempts: 3,
            base_delay_ms: 1,
            max_delay_ms: 2,
        }
    }

    fn manager(api: &MemoryRecordApi) -> RecordManager {
        RecordManager::new(Arc::new(api.clone()), 120, fast_retry())
    }

    #[tokio::test]
    async fn upsert_creates_new_set() {
        let api = MemoryRecordApi::new();
        let pending = manager(&api)
            .upsert("example.com", &zone(), "_acme-challenge", "v1")
            .await
            .unwrap();

        assert!(pending.created_new);
        assert_eq!(api.values(&zone(), "_acme-challenge").await, Some(vec!["v1".to_string()]));
    }

    #[tokio::test]
    async fn upsert_appends_to_existing_set() {
        let api = MemoryRecordApi::new();
        api.seed(&zone(), "_acme-challenge", &["other"]).await;

        let pending = manager(&api)
            .upsert("example.com", &zone(), "_acme-challenge", "v1")
            .await
            .unwrap();

        assert!(!pending.created_new);
        assert_eq!(
            api.values(&zone(), "_acme-challenge").await,
            Some(vec!["other".to_string(), "v1".to_string()])
        );
    }

    #[tokio::test]
    async fn upsert_twice_adds_value_once() {
        let api = MemoryRecordApi::new();
        let manager = manager(&api);

        let first = manager.upsert("example.com", &zone(), "_acme-challenge", "v1").await.unwrap();
        let second = manager.upsert("example.com", &zone(), "_acme-challenge", "v1").await.unwrap();

        assert!(first.created_new);
        assert!(second.created_new);
        assert_eq!(api.values(&zone(), "_acme-challenge").await, Some(vec!["v1".to_string()]));
        assert_eq!(api.call_count(ApiOp::Put).await, 1);
    }

    #[tokio::test]
    async fn transient_failures_are_retried() {
        let api = MemoryRecordApi::new();
        api.fail_next(ApiOp::Put, ApiErrorKind::Transient, 2).await;

        manager(&api)
            .upsert("example.com", &zone(), "_acme-challenge", "v1")
            .await
            .unwrap();
        assert_eq!(api.call_count(ApiOp::Put).await, 3);
    }

    #[tokio::test]
    async fn conflict_rereads_before_writing_again() {
        let api = MemoryRecordApi::new();
        api.fail_next(ApiOp::Put, ApiErrorKind::Conflict, 1).await;

        manager(&api)
            .upsert("example.com", &zone(), "_acme-challenge", "v1")
            .await
            .unwrap();
        assert_eq!(api.call_count(ApiOp::Get).await, 2);
    }

    #[tokio::test]
    async fn unauthorized_is_not_retried() {
        let api = MemoryRecordApi::new();
        api.fail_next(ApiOp::Get, ApiErrorKind::Unauthorized, 1).await;

        let err = manager(&api)
            .upsert("example.com", &zone(), "_acme-challenge", "v1")
            .await
            .unwrap_err();
        assert_eq!(err.api_kind(), Some(ApiErrorKind::Unauthorized));
        assert_eq!(api.call_count(ApiOp::Get).await, 1);
    }

    #[tokio::test]
    async fn attempts_are_bounded() {
        let api = MemoryRecordApi::new();
        api.fail_next(ApiOp::Get, ApiErrorKind::Transient, 10).await;

        let err = manager(&api)
            .upsert("example.com", &zone(), "_acme-challenge", "v1")
            .await
            .unwrap_err();
        assert_eq!(err.api_kind(), Some(ApiErrorKind::Transient));
        assert_eq!(api.call_count(ApiOp::Get).await, 3);
    }

    #[tokio::test]
    async fn remove_created_set_deletes_it() {
        let api = MemoryRecordApi::new();
        let manager = manager(&api);
        let pending = manager.upsert("example.com", &zone(), "_acme-challenge", "v1").await.unwrap();

        manager.remove(&pending).await.unwrap();
        assert!(api.is_empty().await);
    }

    #[tokio::test]
    async fn remove_appended_value_keeps_siblings() {
        let api = MemoryRecordApi::new();
        api.seed(&zone(), "_acme-challenge", &["other"]).await;
        let manager = manager(&api);
        let pending = manager.upsert("example.com", &zone(), "_acme-challenge", "v1").await.unwrap();

        manager.remove(&pending).await.unwrap();
        assert_eq!(api.values(&zone(), "_acme-challenge").await, Some(vec!["other".to_string()]));
    }

    #[tokio::test]
    async fn remove_created_set_keeps_late_siblings() {
        let api = MemoryRecordApi::new();
        let manager = manager(&api);
        let pending = manager.upsert("example.com", &zone(), "_acme-challenge", "v1").await.unwrap();
        api.seed(&zone(), "_acme-challenge", &["v1", "late"]).await;

        manager.remove(&pending).await.unwrap();
        assert_eq!(api.values(&zone(), "_acme-challenge").await, Some(vec!["late".to_string()]));
    }

    #[tokio::test]
    async fn remove_is_idempotent() {
        let api = MemoryRecordApi::new();
        let manager = manager(&api);
        let pending = manager.upsert("example.com", &zone(), "_acme-challenge", "v1").await.unwrap();

        manager.remove(&pending).await.unwrap();
        manager.remove(&pending).await.unwrap();
        assert_eq!(api.call_count(ApiOp::Delete).await, 1);
    }

    #[tokio::test]
    async fn pinned_record_is_reset_to_placeholder() {
        let api = MemoryRecordApi::new();
        let pinned = zone().with_pinned_record("_acme-shared");
        api.seed(&pinned, "_acme-shared", &[PLACEHOLDER_VALUE]).await;
        let manager = manager(&api);

        let pending = manager.upsert("www.example.com", &pinned, "_acme-shared", "v1").await.unwrap();
        assert!(pending.created_new);
        assert_eq!(api.values(&pinned, "_acme-shared").await, Some(vec!["v1".to_string()]));

        manager.remove(&pending).await.unwrap();
        assert_eq!(
            api.values(&pinned, "_acme-shared").await,
            Some(vec![PLACEHOLDER_VALUE.to_string()])
        );
    }
}
