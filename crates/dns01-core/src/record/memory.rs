// # Memory Record Set API
//
// In-memory implementation of RecordSetApi.
//
// ## Purpose
//
// Behaves like the remote management API as far as the Record Manager can
// tell: record sets carry etags that change on every write, preconditions
// are enforced, and a missing record set is NotFound on delete. Used by the
// hook's dry-run mode and by tests.
//
// ## Fault Injection
//
// [`MemoryRecordApi::fail_next`] queues errors for a given operation so
// tests can exercise retry and best-effort paths without a network.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use crate::challenge::record_lock_key;
use crate::config::ZoneConfig;
use crate::error::{ApiErrorKind, Error};
use crate::traits::record_api::{RecordSetApi, TxtRecordSet, WriteCondition};

/// Operation on the record set API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApiOp {
    /// Read a record set
    Get,
    /// Create or replace a record set
    Put,
    /// Delete a record set
    Delete,
}

#[derive(Debug, Clone)]
struct StoredSet {
    values: Vec<String>,
    ttl: u32,
    etag: String,
}

impl StoredSet {
    fn snapshot(&self) -> TxtRecordSet {
        TxtRecordSet {
            values: self.values.clone(),
            ttl: Some(self.ttl),
            etag: Some(self.etag.clone()),
        }
    }
}

#[derive(Debug, Default)]
struct Inner {
    sets: HashMap<String, StoredSet>,
    faults: VecDeque<(ApiOp, ApiErrorKind)>,
    calls: HashMap<ApiOp, usize>,
    next_etag: u64,
}

impl Inner {
    fn record_call(&mut self, op: ApiOp) -> Result<(), Error> {
        *self.calls.entry(op).or_default() += 1;
        if let Some(pos) = self.faults.iter().position(|(fault_op, _)| *fault_op == op) {
            if let Some((_, kind)) = self.faults.remove(pos) {
                return Err(Error::api(kind, status_for(kind), format!("injected {op:?} failure")));
            }
        }
        Ok(())
    }

    fn fresh_etag(&mut self) -> String {
        self.next_etag += 1;
        format!("\"{}\"", self.next_etag)
    }
}

fn status_for(kind: ApiErrorKind) -> Option<u16> {
    match kind {
        ApiErrorKind::Transient => Some(503),
        ApiErrorKind::Conflict => Some(412),
        ApiErrorKind::NotFound => Some(404),
        ApiErrorKind::Unauthorized => Some(403),
        ApiErrorKind::Fatal => Some(400),
    }
}

fn precondition_failed(record_name: &str) -> Error {
    Error::api_status(412, format!("precondition failed for TXT record set {record_name}"))
}

/// In-memory record set API
///
/// Cloning shares the underlying record sets.
///
/// # Example
///
/// ```rust
/// use dns01_core::{MemoryRecordApi, ZoneConfig};
///
/// # tokio_test::block_on(async {
/// let api = MemoryRecordApi::new();
/// let zone = ZoneConfig::new("example.com", "sub", "rg");
/// api.seed(&zone, "_acme-challenge", &["other"]).await;
/// assert_eq!(api.values(&zone, "_acme-challenge").await, Some(vec!["other".to_string()]));
/// # });
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryRecordApi {
    inner: Arc<RwLock<Inner>>,
}

impl MemoryRecordApi {
    /// Create an API with no record sets
    pub fn new() -> Self {
        Self::default()
    }

    /// Create or replace a record set directly, as an external writer would
    pub async fn seed(&self, zone: &ZoneConfig, record_name: &str, values: &[&str]) {
        let mut guard = self.inner.write().await;
        let etag = guard.fresh_etag();
        guard.sets.insert(
            record_lock_key(zone, record_name),
            StoredSet {
                values: values.iter().map(|v| v.to_string()).collect(),
                ttl: 3600,
                etag,
            },
        );
    }

    /// Current values of a record set, `None` if it does not exist
    pub async fn values(&self, zone: &ZoneConfig, record_name: &str) -> Option<Vec<String>> {
        let guard = self.inner.read().await;
        guard
            .sets
            .get(&record_lock_key(zone, record_name))
            .map(|set| set.values.clone())
    }

    /// Number of record sets
    pub async fn len(&self) -> usize {
        self.inner.read().await.sets.len()
    }

    /// Whether no record set exists
    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.sets.is_empty()
    }

    /// Make the next `times` calls of `op` fail with `kind`
    pub async fn fail_next(&self, op: ApiOp, kind: ApiErrorKind, times: usize) {
        let mut guard = self.inner.write().await;
        for _ in 0..times {
            guard.faults.push_back((op, kind));
        }
    }

    /// How many times `op` was called, failed calls included
    pub async fn call_count(&self, op: ApiOp) -> usize {
        self.inner.read().await.calls.get(&op).copied().unwrap_or(0)
    }
}

#[async_trait]
impl RecordSetApi for MemoryRecordApi {
    async fn get_txt(
        &self,
        zone: &ZoneConfig,
        record_name: &str,
    ) -> Result<Option<TxtRecordSet>, Error> {
        let snapshot = {
            let mut guard = self.inner.write().await;
            guard.record_call(ApiOp::Get)?;
            guard
                .sets
                .get(&record_lock_key(zone, record_name))
                .map(StoredSet::snapshot)
        };
        // Give other tasks a chance to interleave between read and write
        tokio::task::yield_now().await;
        Ok(snapshot)
    }

    async fn put_txt(
        &self,
        zone: &ZoneConfig,
        record_name: &str,
        values: &[String],
        ttl: u32,
        condition: &WriteCondition,
    ) -> Result<TxtRecordSet, Error> {
        let mut guard = self.inner.write().await;
        guard.record_call(ApiOp::Put)?;

        let key = record_lock_key(zone, record_name);
        let current_etag = guard.sets.get(&key).map(|set| set.etag.clone());
        match (condition, current_etag) {
            (WriteCondition::IfNoneMatch, Some(_)) => return Err(precondition_failed(record_name)),
            (WriteCondition::IfMatch(expected), Some(actual)) if *expected != actual => {
                return Err(precondition_failed(record_name));
            }
            (WriteCondition::IfMatch(_), None) => return Err(precondition_failed(record_name)),
            _ => {}
        }

        let etag = guard.fresh_etag();
        let stored = StoredSet {
            values: values.to_vec(),
            ttl,
            etag,
        };
        let snapshot = stored.snapshot();
        guard.sets.insert(key, stored);
        debug!(zone = %zone.zone_name, record = record_name, values = values.len(), "Stored TXT record set");
        Ok(snapshot)
    }

    async fn delete_txt(
        &self,
        zone: &ZoneConfig,
        record_name: &str,
        condition: &WriteCondition,
    ) -> Result<(), Error> {
        let mut guard = self.inner.write().await;
        guard.record_call(ApiOp::Delete)?;

        let key = record_lock_key(zone, record_name);
        let current_etag = match guard.sets.get(&key) {
            Some(set) => set.etag.clone(),
            None => {
                return Err(Error::api_status(
                    404,
                    format!("TXT record set {record_name} not found"),
                ));
            }
        };
        match condition {
            WriteCondition::IfMatch(expected) if *expected != current_etag => {
                return Err(precondition_failed(record_name));
            }
            WriteCondition::IfNoneMatch => return Err(precondition_failed(record_name)),
            _ => {}
        }

        guard.sets.remove(&key);
        debug!(zone = %zone.zone_name, record = record_name, "Deleted TXT record set");
        Ok(())
    }

    fn api_name(&self) -> &'static str {
        "memory"
    }
}
