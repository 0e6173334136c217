//! Challenge Orchestrator
//!
//! Sequences zone resolution, record writes and propagation checks for a
//! batch of challenges, and removes the written values again on cleanup.
//!
//! ## Architecture
//!
//! ```text
//!                 ChallengeRequest (domain, value)
//!                                │
//!                                ▼
//!                     ┌──────────────────────┐
//!                     │ ChallengeOrchestrator│
//!                     └──────────────────────┘
//!                                │
//!      ┌─────────────────┬───────┴──────────┬──────────────────┐
//!      ▼                 ▼                  ▼                  ▼
//! ┌─────────────┐ ┌───────────────┐ ┌─────────────────┐ ┌──────────────┐
//! │ ZoneResolver│ │ RecordManager │ │PropagationWaiter│ │ PendingStore │
//! │ (target)    │ │ (upsert)      │ │ (wait)          │ │ (remember)   │
//! └─────────────┘ └───────────────┘ └─────────────────┘ └──────────────┘
//! ```
//!
//! ## Perform
//!
//! 1. Resolve every request to a zone up front. An ambiguous zone
//!    configuration aborts the batch before anything is written; a domain
//!    without a zone fails alone.
//! 2. Upsert each value, at most `max_concurrency` writes at a time. Writes
//!    to the same record set are serialized by the Record Manager.
//! 3. Remember the resulting [`PendingRecord`] in the [`PendingStore`].
//! 4. Wait for public DNS to show the value.
//!
//! An authentication failure in any flow cancels the remaining flows.
//!
//! ## Cleanup
//!
//! Every request is attempted, whatever happened to the others or to
//! perform. Without a stored pending record the target is re-derived from
//! the domain and only the challenge value is removed.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Semaphore, mpsc};
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::challenge::{ChallengeRequest, ChallengeState, PendingRecord};
use crate::config::{Dns01Config, PropagationConfig};
use crate::error::{Error, Result};
use crate::propagation::PropagationWaiter;
use crate::record::RecordManager;
use crate::traits::{PendingStore, RecordSetApi, TxtResolver};
use crate::zone::{RecordTarget, ZoneResolver};

/// Events emitted by the orchestrator
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChallengeEvent {
    /// A zone was selected for the domain
    ZoneResolved {
        domain: String,
        zone: String,
        record_name: String,
    },

    /// The challenge value was written
    RecordWritten {
        domain: String,
        record_name: String,
        created_new: bool,
    },

    /// The value is visible through public DNS
    Propagated { domain: String },

    /// Perform failed for the domain
    Failed { domain: String, error: String },

    /// The value was removed again
    Cleaned { domain: String },

    /// Removing the value failed
    CleanupFailed { domain: String, error: String },
}

/// Result of performing one challenge
#[derive(Debug)]
pub struct ChallengeOutcome {
    /// The request this outcome belongs to
    pub request: ChallengeRequest,
    /// `Verified` (or `RecordWritten` without propagation checks) on
    /// success, `Failed` otherwise
    pub state: ChallengeState,
    /// What was written, if anything
    pub pending: Option<PendingRecord>,
    /// Why the challenge failed
    pub error: Option<Error>,
}

impl ChallengeOutcome {
    /// Whether the challenge is ready for validation
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Result of [`ChallengeOrchestrator::perform`], in request order
#[derive(Debug, Default)]
pub struct PerformReport {
    /// One outcome per request
    pub outcomes: Vec<ChallengeOutcome>,
}

impl PerformReport {
    /// Whether every challenge succeeded
    pub fn is_success(&self) -> bool {
        self.outcomes.iter().all(ChallengeOutcome::is_success)
    }

    /// Outcomes that failed
    pub fn failures(&self) -> impl Iterator<Item = &ChallengeOutcome> {
        self.outcomes.iter().filter(|o| !o.is_success())
    }

    /// First error that is fatal for the whole run
    pub fn fatal_error(&self) -> Option<&Error> {
        self.outcomes
            .iter()
            .filter_map(|o| o.error.as_ref())
            .find(|e| e.is_fatal_for_run())
    }
}

/// A removal that failed during cleanup
#[derive(Debug)]
pub struct CleanupFailure {
    /// Domain as requested
    pub domain: String,
    /// Why removal failed
    pub error: Error,
}

/// Result of [`ChallengeOrchestrator::cleanup`]
#[derive(Debug, Default)]
pub struct CleanupReport {
    /// Domains whose value is gone
    pub cleaned: Vec<String>,
    /// Domains whose value may still be published
    pub failures: Vec<CleanupFailure>,
}

impl CleanupReport {
    /// Whether every removal succeeded
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

struct Shared {
    records: RecordManager,
    waiter: Option<PropagationWaiter>,
    store: Arc<dyn PendingStore>,
    propagation: PropagationConfig,
    event_tx: mpsc::Sender<ChallengeEvent>,
}

/// Challenge Orchestrator
///
/// ## Lifecycle
///
/// 1. Create with [`ChallengeOrchestrator::new()`]
/// 2. [`perform()`](Self::perform) a batch of challenges
/// 3. [`cleanup()`](Self::cleanup) the same batch, possibly in another
///    process sharing the pending store
///
/// ## Load Resistance
///
/// - **Bounded writes**: at most `max_concurrency` record writes in flight
/// - **Bounded event channel**: events are dropped with a warning when the
///   receiver falls behind
pub struct ChallengeOrchestrator {
    zones: ZoneResolver,
    max_concurrency: usize,
    shared: Arc<Shared>,
}

impl ChallengeOrchestrator {
    /// Create an orchestrator
    ///
    /// # Parameters
    ///
    /// - `config`: validated run configuration
    /// - `api`: record set API for the configured zones
    /// - `resolver`: public DNS resolver for propagation checks
    /// - `store`: where pending records are kept between perform and cleanup
    ///
    /// # Returns
    ///
    /// A tuple of (orchestrator, event_receiver)
    pub fn new(
        config: &Dns01Config,
        api: Arc<dyn RecordSetApi>,
        resolver: Arc<dyn TxtResolver>,
        store: Arc<dyn PendingStore>,
    ) -> Result<(Self, mpsc::Receiver<ChallengeEvent>)> {
        config.validate()?;

        let (tx, rx) = mpsc::channel(config.event_channel_capacity);

        let shared = Shared {
            records: RecordManager::new(api, config.ttl, config.retry.clone()),
            waiter: Some(PropagationWaiter::new(resolver)),
            store,
            propagation: config.propagation.clone(),
            event_tx: tx,
        };

        let orchestrator = Self {
            zones: ZoneResolver::new(config.zones.clone()),
            max_concurrency: config.max_concurrency,
            shared: Arc::new(shared),
        };

        Ok((orchestrator, rx))
    }

    /// Skip propagation checks; perform succeeds once values are written
    pub fn without_propagation(mut self) -> Self {
        if let Some(shared) = Arc::get_mut(&mut self.shared) {
            shared.waiter = None;
        }
        self
    }

    /// The zone resolver used for targets
    pub fn zones(&self) -> &ZoneResolver {
        &self.zones
    }

    /// Publish every challenge and wait until it is visible
    ///
    /// # Returns
    ///
    /// - `Ok(PerformReport)`: one outcome per request; individual domains
    ///   may have failed
    /// - `Err(Error::Config)`: the zone configuration is ambiguous for one of
    ///   the requests; nothing was written
    pub async fn perform(
        &self,
        requests: &[ChallengeRequest],
        cancel: &CancellationToken,
    ) -> Result<PerformReport> {
        let mut outcomes: Vec<(usize, ChallengeOutcome)> = Vec::with_capacity(requests.len());
        let mut planned = Vec::with_capacity(requests.len());

        for (index, request) in requests.iter().enumerate() {
            match self.zones.target(request) {
                Ok(target) => {
                    debug!(
                        domain = %request.domain,
                        zone = %target.zone.zone_name,
                        record = %target.record_name,
                        "Zone resolved"
                    );
                    self.shared.emit_event(ChallengeEvent::ZoneResolved {
                        domain: request.domain.clone(),
                        zone: target.zone.zone_name.clone(),
                        record_name: target.record_name.clone(),
                    });
                    planned.push((index, request.clone(), target));
                }
                Err(e @ Error::Config(_)) => return Err(e),
                Err(e) => {
                    outcomes.push((index, self.shared.fail(request.clone(), None, e)));
                }
            }
        }

        let run_cancel = cancel.child_token();
        let semaphore = Arc::new(Semaphore::new(self.max_concurrency));
        let mut tasks = JoinSet::new();
        let mut running = HashMap::with_capacity(planned.len());

        for (index, request, target) in planned {
            let shared = self.shared.clone();
            let semaphore = semaphore.clone();
            let cancel = run_cancel.clone();
            let task_request = request.clone();
            let handle = tasks.spawn(async move {
                let outcome = shared.perform_one(task_request, target, semaphore, cancel).await;
                (index, outcome)
            });
            running.insert(handle.id(), (index, request));
        }

        while let Some(joined) = tasks.join_next_with_id().await {
            match joined {
                Ok((id, (index, outcome))) => {
                    running.remove(&id);
                    if outcome.error.as_ref().is_some_and(Error::is_fatal_for_run) {
                        warn!("Fatal error, cancelling remaining challenges");
                        run_cancel.cancel();
                    }
                    outcomes.push((index, outcome));
                }
                Err(e) => match running.remove(&e.id()) {
                    // A lost task must never read as a success
                    Some((index, request)) => {
                        outcomes.push((index, self.shared.fail(request, None, task_error(&e))));
                    }
                    None => error!("Challenge task failed to complete: {}", e),
                },
            }
        }

        self.shared.flush_store().await;

        outcomes.sort_by_key(|(index, _)| *index);
        let report = PerformReport {
            outcomes: outcomes.into_iter().map(|(_, outcome)| outcome).collect(),
        };
        info!(
            total = requests.len(),
            failed = report.failures().count(),
            "Perform finished"
        );
        Ok(report)
    }

    /// Remove the values written for `requests`
    ///
    /// Never fails: every request is attempted and failures are collected in
    /// the report. Requests that were never performed, or were already
    /// cleaned, are no-ops.
    pub async fn cleanup(&self, requests: &[ChallengeRequest]) -> CleanupReport {
        let semaphore = Arc::new(Semaphore::new(self.max_concurrency));
        let mut tasks = JoinSet::new();
        let mut running = HashMap::new();
        let mut report = CleanupReport::default();

        for request in requests {
            let pending = match self.shared.take_pending(request).await {
                Some(pending) => pending,
                None => match self.zones.target(request) {
                    Ok(RecordTarget { zone, record_name }) => PendingRecord::new(
                        request.base_domain(),
                        zone,
                        record_name,
                        request.validation_value.clone(),
                        false,
                    ),
                    Err(e) => {
                        self.shared.cleanup_failed(&mut report, &request.domain, e);
                        continue;
                    }
                },
            };

            let shared = self.shared.clone();
            let semaphore = semaphore.clone();
            let domain = request.domain.clone();
            let kept = pending.clone();
            let handle = tasks.spawn(async move {
                let result = match semaphore.acquire_owned().await {
                    Ok(_permit) => shared.records.remove(&pending).await,
                    Err(_) => Err(Error::Other("cleanup semaphore closed".to_string())),
                };
                if result.is_err() {
                    // Keep it so a later cleanup can try again
                    if let Err(e) = shared.store.put(&pending).await {
                        warn!(domain = %domain, "Failed to keep pending record: {}", e);
                    }
                }
                (domain, result)
            });
            running.insert(handle.id(), (request.domain.clone(), kept));
        }

        while let Some(joined) = tasks.join_next_with_id().await {
            match joined {
                Ok((id, (domain, result))) => {
                    running.remove(&id);
                    match result {
                        Ok(()) => {
                            self.shared.emit_event(ChallengeEvent::Cleaned {
                                domain: domain.clone(),
                            });
                            report.cleaned.push(domain);
                        }
                        Err(e) => self.shared.cleanup_failed(&mut report, &domain, e),
                    }
                }
                Err(e) => match running.remove(&e.id()) {
                    Some((domain, pending)) => {
                        if let Err(put) = self.shared.store.put(&pending).await {
                            warn!(domain = %domain, "Failed to keep pending record: {}", put);
                        }
                        self.shared.cleanup_failed(&mut report, &domain, task_error(&e));
                    }
                    None => error!("Cleanup task failed to complete: {}", e),
                },
            }
        }

        self.shared.flush_store().await;

        info!(
            cleaned = report.cleaned.len(),
            failed = report.failures.len(),
            "Cleanup finished"
        );
        report
    }
}

fn task_error(e: &JoinError) -> Error {
    if e.is_panic() {
        Error::Other(format!("challenge task panicked: {}", e))
    } else {
        Error::Other(format!("challenge task was aborted: {}", e))
    }
}

impl Shared {
    async fn perform_one(
        &self,
        request: ChallengeRequest,
        target: RecordTarget,
        semaphore: Arc<Semaphore>,
        cancel: CancellationToken,
    ) -> ChallengeOutcome {
        let domain = request.base_domain();

        let written = {
            let _permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => return self.fail(request, None, Error::Cancelled),
                permit = semaphore.acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => {
                        return self.fail(request, None, Error::Other("semaphore closed".to_string()));
                    }
                },
            };
            self.records
                .upsert(&domain, &target.zone, &target.record_name, &request.validation_value)
                .await
        };

        let pending = match written {
            Ok(pending) => pending,
            Err(e) => return self.fail(request, None, e),
        };

        if let Err(e) = self.store.put(&pending).await {
            warn!(domain = %request.domain, "Failed to remember pending record: {}", e);
        }
        self.emit_event(ChallengeEvent::RecordWritten {
            domain: request.domain.clone(),
            record_name: pending.record_name.clone(),
            created_new: pending.created_new,
        });

        let Some(waiter) = &self.waiter else {
            return ChallengeOutcome {
                request,
                state: ChallengeState::RecordWritten,
                pending: Some(pending),
                error: None,
            };
        };

        let initial_delay = self.propagation.initial_delay();
        if !initial_delay.is_zero() {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return self.fail(request, Some(pending), Error::Cancelled),
                _ = tokio::time::sleep(initial_delay) => {}
            }
        }

        let waited = waiter
            .wait_for(
                &request.validation_name,
                &request.validation_value,
                self.propagation.timeout(),
                self.propagation.poll_interval(),
                &cancel,
            )
            .await;
        if let Err(e) = waited {
            return self.fail(request, Some(pending), e);
        }

        self.emit_event(ChallengeEvent::Propagated {
            domain: request.domain.clone(),
        });
        info!(domain = %request.domain, "Challenge ready for validation");

        ChallengeOutcome {
            request,
            state: ChallengeState::Verified,
            pending: Some(pending),
            error: None,
        }
    }

    fn fail(
        &self,
        request: ChallengeRequest,
        pending: Option<PendingRecord>,
        error: Error,
    ) -> ChallengeOutcome {
        error!(domain = %request.domain, "Challenge failed: {}", error);
        self.emit_event(ChallengeEvent::Failed {
            domain: request.domain.clone(),
            error: error.to_string(),
        });
        ChallengeOutcome {
            request,
            state: ChallengeState::Failed,
            pending,
            error: Some(error),
        }
    }

    async fn take_pending(&self, request: &ChallengeRequest) -> Option<PendingRecord> {
        match self.store.take(&request.key()).await {
            Ok(pending) => pending,
            Err(e) => {
                warn!(domain = %request.domain, "Failed to read pending record: {}", e);
                None
            }
        }
    }

    fn cleanup_failed(&self, report: &mut CleanupReport, domain: &str, error: Error) {
        error!(domain, "Cleanup failed: {}", error);
        self.emit_event(ChallengeEvent::CleanupFailed {
            domain: domain.to_string(),
            error: error.to_string(),
        });
        report.failures.push(CleanupFailure {
            domain: domain.to_string(),
            error,
        });
    }

    async fn flush_store(&self) {
        if let Err(e) = self.store.flush().await {
            warn!("Failed to flush pending records: {}", e);
        }
    }

    fn emit_event(&self, event: ChallengeEvent) {
        if self.event_tx.try_send(event).is_err() {
            warn!("Event channel full, dropping event. Consider increasing event_channel_capacity.");
        }
    }
}

impl std::fmt::Debug for ChallengeOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChallengeOrchestrator")
            .field("zones", &self.zones.zones().len())
            .field("max_concurrency", &self.max_concurrency)
            .field("records", &self.shared.records)
            .finish_non_exhaustive()
    }
}
