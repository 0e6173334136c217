//! Zone resolution
//!
//! Maps a requested domain to the most specific configured zone. Matching is
//! label-wise: `example.com` covers `a.example.com` but not `badexample.com`.

use crate::challenge::{ChallengeRequest, strip_wildcard};
use crate::config::ZoneConfig;
use crate::error::{Error, Result};

/// Resolve `domain` against `zones`
///
/// A leading `*.` is stripped first. Among zones whose suffix equals the
/// domain or is a dot-boundary suffix of it, the one with the most labels
/// wins. Two zones configured with the winning suffix are a configuration
/// error.
pub fn resolve<'a>(domain: &str, zones: &'a [ZoneConfig]) -> Result<&'a ZoneConfig> {
    let name = strip_wildcard(domain);

    let mut best: Option<&ZoneConfig> = None;
    let mut best_labels = 0usize;
    let mut tied = false;

    for zone in zones.iter().filter(|z| suffix_matches(&name, &z.suffix)) {
        let labels = label_count(&zone.suffix);
        match best {
            Some(current) if labels == best_labels && current.suffix == zone.suffix => {
                tied = true;
            }
            Some(_) if labels <= best_labels => {}
            _ => {
                best = Some(zone);
                best_labels = labels;
                tied = false;
            }
        }
    }

    match best {
        Some(zone) if tied => Err(Error::config(format!(
            "Zone suffix {} is configured more than once; cannot choose a zone for {}",
            zone.suffix, domain
        ))),
        Some(zone) => Ok(zone),
        None => Err(Error::no_matching_zone(domain)),
    }
}

fn suffix_matches(name: &str, suffix: &str) -> bool {
    if suffix.is_empty() {
        return false;
    }
    name == suffix
        || name
            .strip_suffix(suffix)
            .is_some_and(|head| head.ends_with('.'))
}

fn label_count(name: &str) -> usize {
    name.split('.').filter(|l| !l.is_empty()).count()
}

/// Where a challenge value goes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordTarget {
    /// Zone holding the record
    pub zone: ZoneConfig,
    /// Record name relative to the zone
    pub record_name: String,
}

/// Zone resolver over an immutable set of zone mappings
#[derive(Debug, Clone)]
pub struct ZoneResolver {
    zones: Vec<ZoneConfig>,
}

impl ZoneResolver {
    /// Create a resolver; zones keep their configured order
    pub fn new(zones: Vec<ZoneConfig>) -> Self {
        Self { zones }
    }

    /// Configured zones
    pub fn zones(&self) -> &[ZoneConfig] {
        &self.zones
    }

    /// Resolve a domain to its zone
    pub fn resolve(&self, domain: &str) -> Result<&ZoneConfig> {
        resolve(domain, &self.zones)
    }

    /// Resolve a challenge to its zone and relative record name
    ///
    /// Deterministic: cleanup calls this again with the same request and gets
    /// the same target perform used.
    pub fn target(&self, request: &ChallengeRequest) -> Result<RecordTarget> {
        let zone = self.resolve(&request.domain)?;
        Ok(RecordTarget {
            record_name: zone.relative_record_name(&request.validation_name),
            zone: zone.clone(),
        })
    }
}
