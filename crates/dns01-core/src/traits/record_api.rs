// # Record Set API Trait
//
// Defines the interface to the DNS management API that owns the challenge
// zones.
//
// ## Implementations
//
// - Azure DNS: `dns01-provider-azure` crate
// - In-memory: [`crate::record::MemoryRecordApi`] (tests and dry runs)
//
// ## Usage
//
// ```rust,ignore
// use dns01_core::traits::{RecordSetApi, WriteCondition};
//
// let current = api.get_txt(&zone, "_acme-challenge").await?;
// api.put_txt(&zone, "_acme-challenge", &["token".to_string()], 120, &WriteCondition::IfNoneMatch).await?;
// ```

use async_trait::async_trait;

use crate::config::ZoneConfig;

/// A TXT record set as stored by the management API
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TxtRecordSet {
    /// TXT values, one entry per TXT record (multi-string records are joined)
    pub values: Vec<String>,
    /// TTL in seconds, if reported
    pub ttl: Option<u32>,
    /// Entity tag for optimistic concurrency
    pub etag: Option<String>,
}

impl TxtRecordSet {
    /// Whether `value` is one of the TXT values
    pub fn contains(&self, value: &str) -> bool {
        self.values.iter().any(|v| v == value)
    }
}

/// Precondition attached to a write
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteCondition {
    /// Only succeed if the record set does not exist yet (`If-None-Match: *`)
    IfNoneMatch,
    /// Only succeed if the record set still has this etag (`If-Match`)
    IfMatch(String),
    /// No precondition
    Unconditional,
}

impl WriteCondition {
    /// Condition for rewriting a record set that was read as `current`
    pub fn for_existing(current: &TxtRecordSet) -> Self {
        match &current.etag {
            Some(etag) => WriteCondition::IfMatch(etag.clone()),
            None => WriteCondition::Unconditional,
        }
    }
}

/// Trait for DNS management API implementations
///
/// # Trust Level: Untrusted
///
/// Implementations are single-shot adapters around a remote API:
///
/// - ✅ Perform HTTP calls to their management endpoint only
/// - ✅ Map HTTP statuses to [`crate::ApiErrorKind`] classifications
/// - ❌ Retry, back off or sleep (owned by `RecordManager`)
/// - ❌ Merge or deduplicate values (owned by `RecordManager`)
/// - ❌ Hold locks across calls (owned by `RecordManager`)
///
/// A failed call returns an error and the Record Manager decides whether to
/// try again.
#[async_trait]
pub trait RecordSetApi: Send + Sync {
    /// Read the TXT record set `record_name` in `zone`
    ///
    /// # Returns
    ///
    /// - `Ok(Some(set))`: the record set exists
    /// - `Ok(None)`: no TXT record set at that name
    /// - `Err(Error)`: the request failed
    async fn get_txt(
        &self,
        zone: &ZoneConfig,
        record_name: &str,
    ) -> Result<Option<TxtRecordSet>, crate::Error>;

    /// Create or replace the TXT record set with exactly `values`
    ///
    /// A failed precondition is reported as an
    /// [`crate::ApiErrorKind::Conflict`] error.
    async fn put_txt(
        &self,
        zone: &ZoneConfig,
        record_name: &str,
        values: &[String],
        ttl: u32,
        condition: &WriteCondition,
    ) -> Result<TxtRecordSet, crate::Error>;

    /// Delete the TXT record set
    ///
    /// A missing record set is reported as an
    /// [`crate::ApiErrorKind::NotFound`] error.
    async fn delete_txt(
        &self,
        zone: &ZoneConfig,
        record_name: &str,
        condition: &WriteCondition,
    ) -> Result<(), crate::Error>;

    /// API name for logging
    fn api_name(&self) -> &'static str;
}
