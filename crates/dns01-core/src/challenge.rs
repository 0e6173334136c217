//! Challenge data model
//!
//! A [`ChallengeRequest`] is what the host tool asks for; a
//! [`PendingRecord`] is what the Record Manager wrote for it and the only
//! state carried from perform to cleanup.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::{ZoneConfig, normalize_name};

/// Label prepended to the domain to form the challenge record name
pub const CHALLENGE_LABEL: &str = "_acme-challenge";

/// One (domain, validation token) pair to fulfil
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChallengeRequest {
    /// Domain as requested, possibly with a `*.` wildcard marker
    pub domain: String,
    /// Fully qualified challenge record name, without trailing dot
    pub validation_name: String,
    /// TXT value the ACME server expects
    pub validation_value: String,
}

impl ChallengeRequest {
    /// Build a request, deriving `_acme-challenge.<domain>` with any wildcard
    /// marker stripped
    pub fn new(domain: impl Into<String>, validation_value: impl Into<String>) -> Self {
        let domain = domain.into();
        let validation_name = format!("{}.{}", CHALLENGE_LABEL, strip_wildcard(&domain));
        Self {
            domain,
            validation_name,
            validation_value: validation_value.into(),
        }
    }

    /// Domain with the wildcard marker stripped and normalized
    pub fn base_domain(&self) -> String {
        strip_wildcard(&self.domain)
    }

    /// Key identifying this challenge in a [`crate::traits::PendingStore`]
    pub fn key(&self) -> String {
        challenge_key(&self.base_domain(), &self.validation_value)
    }
}

/// Strip a leading `*.` and normalize the name
pub fn strip_wildcard(domain: &str) -> String {
    let normalized = normalize_name(domain);
    match normalized.strip_prefix("*.") {
        Some(rest) => rest.to_string(),
        None => normalized,
    }
}

fn challenge_key(domain: &str, value: &str) -> String {
    format!("{}#{}", domain, value)
}

/// A TXT value written by perform and awaiting cleanup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingRecord {
    /// Domain the record was written for (wildcard stripped)
    pub domain: String,
    /// Zone the record lives in
    pub zone: ZoneConfig,
    /// Record name relative to the zone
    pub record_name: String,
    /// The TXT value that was added
    pub value: String,
    /// Whether perform created the record set rather than appending to it
    pub created_new: bool,
    /// When the value was written
    pub created_at: DateTime<Utc>,
}

impl PendingRecord {
    /// Create a pending record stamped with the current time
    pub fn new(
        domain: impl Into<String>,
        zone: ZoneConfig,
        record_name: impl Into<String>,
        value: impl Into<String>,
        created_new: bool,
    ) -> Self {
        Self {
            domain: domain.into(),
            zone,
            record_name: record_name.into(),
            value: value.into(),
            created_new,
            created_at: Utc::now(),
        }
    }

    /// Key identifying this record in a [`crate::traits::PendingStore`]
    pub fn key(&self) -> String {
        challenge_key(&self.domain, &self.value)
    }

    /// Key used to serialize writes to the same record set
    pub fn lock_key(&self) -> String {
        record_lock_key(&self.zone, &self.record_name)
    }
}

/// Lock key for a record set: zone resource id plus lowercase record name
pub fn record_lock_key(zone: &ZoneConfig, record_name: &str) -> String {
    format!("{}/TXT/{}", zone.zone_id(), record_name.to_ascii_lowercase())
}

/// Lifecycle of a single challenge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChallengeState {
    /// Received, nothing done yet
    Pending,
    /// Zone selected
    ZoneResolved,
    /// TXT value written
    RecordWritten,
    /// Value observed through public resolution
    Propagated,
    /// Success reported to the host tool
    Verified,
    /// Value removed again
    Cleaned,
    /// Perform failed for this challenge
    Failed,
}
