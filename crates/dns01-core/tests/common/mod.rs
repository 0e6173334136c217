//! Test doubles and common utilities for contract tests
//!
//! The record set API double is the library's own [`MemoryRecordApi`]; this
//! module adds resolvers and configuration helpers around it.

#![allow(dead_code)]

use dns01_core::error::Result;
use dns01_core::traits::{RecordSetApi, TxtResolver};
use dns01_core::{
    ChallengeEvent, ChallengeOrchestrator, CredentialSpec, Dns01Config, MemoryPendingStore,
    MemoryRecordApi, PendingStore, RetryConfig, ZoneConfig, ZoneResolver,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::mpsc;

/// Resolver that answers from the memory record API, so values are visible
/// as soon as they are written
pub struct EchoResolver {
    api: MemoryRecordApi,
    zones: ZoneResolver,
    lookups: Arc<AtomicUsize>,
}

impl EchoResolver {
    pub fn new(api: MemoryRecordApi, zones: Vec<ZoneConfig>) -> Self {
        Self {
            api,
            zones: ZoneResolver::new(zones),
            lookups: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn lookup_count(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl TxtResolver for EchoResolver {
    async fn lookup_txt(&self, fqdn: &str) -> Result<Vec<String>> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        let zone = self.zones.resolve(fqdn)?;
        let record_name = zone.relative_record_name(fqdn);
        Ok(self
            .api
            .get_txt(zone, &record_name)
            .await?
            .map(|set| set.values)
            .unwrap_or_default())
    }
}

/// Resolver that never sees the expected value
pub struct NeverResolver {
    lookups: Arc<AtomicUsize>,
}

impl NeverResolver {
    pub fn new() -> Self {
        Self {
            lookups: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn lookup_count(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl TxtResolver for NeverResolver {
    async fn lookup_txt(&self, _fqdn: &str) -> Result<Vec<String>> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        Ok(vec!["somebody-else".to_string()])
    }
}

/// Resolver that sees values only for names in `visible`
pub struct SelectiveResolver {
    inner: EchoResolver,
    visible: Vec<String>,
}

impl SelectiveResolver {
    pub fn new(inner: EchoResolver, visible: &[&str]) -> Self {
        Self {
            inner,
            visible: visible.iter().map(|s| s.to_string()).collect(),
        }
    }
}

#[async_trait::async_trait]
impl TxtResolver for SelectiveResolver {
    async fn lookup_txt(&self, fqdn: &str) -> Result<Vec<String>> {
        if self.visible.iter().any(|v| v == fqdn) {
            self.inner.lookup_txt(fqdn).await
        } else {
            Ok(Vec::new())
        }
    }
}

pub fn zone(suffix: &str) -> ZoneConfig {
    ZoneConfig::new(suffix, "00000000-0000-0000-0000-000000000000", "dns-rg")
}

/// Configuration with short retry delays and a 30s/5s propagation policy
pub fn test_config(zones: Vec<ZoneConfig>) -> Dns01Config {
    let mut config = Dns01Config::new(CredentialSpec::Default, zones);
    config.retry = RetryConfig {
        max_attempts: 3,
        base_delay_ms: 1,
        max_delay_ms: 5,
    };
    config.propagation.timeout_secs = 30;
    config.propagation.poll_interval_secs = 5;
    config
}

/// Orchestrator over a memory API whose writes are immediately visible
pub fn echo_orchestrator(
    config: &Dns01Config,
    api: &MemoryRecordApi,
    store: Arc<dyn PendingStore>,
) -> (ChallengeOrchestrator, mpsc::Receiver<ChallengeEvent>) {
    let resolver = EchoResolver::new(api.clone(), config.zones.clone());
    ChallengeOrchestrator::new(config, Arc::new(api.clone()), Arc::new(resolver), store)
        .expect("orchestrator construction succeeds")
}

pub fn memory_store() -> Arc<MemoryPendingStore> {
    Arc::new(MemoryPendingStore::new())
}

/// Drain every event currently queued
pub fn drain_events(rx: &mut mpsc::Receiver<ChallengeEvent>) -> Vec<ChallengeEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
