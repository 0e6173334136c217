//! Propagation Waiter
//!
//! Polls public DNS until a challenge value is visible. Lookup failures of
//! any kind count as "not visible yet". The wait ends at the first of:
//!
//! - the expected value appears among the TXT values
//! - the deadline passes ([`Error::PropagationTimeout`])
//! - the cancellation token fires ([`Error::Cancelled`])
//!
//! A lookup in flight is bounded by the time left before the deadline, so a
//! hanging resolver cannot stretch the wait.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::traits::TxtResolver;

/// Propagation Waiter
#[derive(Clone)]
pub struct PropagationWaiter {
    resolver: Arc<dyn TxtResolver>,
}

impl PropagationWaiter {
    /// Create a waiter using `resolver` for lookups
    pub fn new(resolver: Arc<dyn TxtResolver>) -> Self {
        Self { resolver }
    }

    /// Wait until `expected` is published at `record_name`
    ///
    /// # Parameters
    ///
    /// - `record_name`: fully qualified name to look up
    /// - `expected`: TXT value that must appear
    /// - `timeout`: overall deadline, measured from the call
    /// - `poll_interval`: pause between lookups
    /// - `cancel`: aborts the wait promptly when cancelled
    pub async fn wait_for(
        &self,
        record_name: &str,
        expected: &str,
        timeout: Duration,
        poll_interval: Duration,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let started = Instant::now();
        let deadline = started + timeout;
        let mut last_seen: Vec<String> = Vec::new();
        let mut polls = 0u32;

        loop {
            polls += 1;
            let remaining = deadline.saturating_duration_since(Instant::now());
            let lookup = tokio::time::timeout(remaining, self.resolver.lookup_txt(record_name));

            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!(record = record_name, "Propagation wait cancelled");
                    return Err(Error::Cancelled);
                }
                outcome = lookup => match outcome {
                    Ok(Ok(values)) => {
                        if values.iter().any(|v| v == expected) {
                            info!(
                                record = record_name,
                                polls,
                                elapsed_ms = started.elapsed().as_millis() as u64,
                                "TXT challenge value visible"
                            );
                            return Ok(());
                        }
                        debug!(record = record_name, polls, seen = values.len(), "TXT value not visible yet");
                        last_seen = values;
                    }
                    Ok(Err(e)) => {
                        debug!(record = record_name, polls, "TXT lookup failed: {}", e);
                    }
                    Err(_) => {
                        debug!(record = record_name, polls, "TXT lookup timed out");
                    }
                },
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(Error::PropagationTimeout {
                    record_name: record_name.to_string(),
                    expected: expected.to_string(),
                    last_seen,
                    waited: now - started,
                });
            }

            let pause = poll_interval.min(deadline - now);
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!(record = record_name, "Propagation wait cancelled");
                    return Err(Error::Cancelled);
                }
                _ = tokio::time::sleep(pause) => {}
            }
        }
    }
}

impl std::fmt::Debug for PropagationWaiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PropagationWaiter").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Publishes `value` from the `visible_after`-th lookup on
    struct DelayedResolver {
        value: String,
        visible_after: u32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl TxtResolver for DelayedResolver {
        async fn lookup_txt(&self, _fqdn: &str) -> Result<Vec<String>> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if n >= self.visible_after {
                Ok(vec!["unrelated".to_string(), self.value.clone()])
            } else if n % 2 == 0 {
                Err(Error::Other("SERVFAIL".to_string()))
            } else {
                Ok(vec!["stale".to_string()])
            }
        }
    }

    struct HangingResolver;

    #[async_trait]
    impl TxtResolver for HangingResolver {
        async fn lookup_txt(&self, _fqdn: &str) -> Result<Vec<String>> {
            std::future::pending().await
        }
    }

    fn delayed(visible_after: u32) -> Arc<DelayedResolver> {
        Arc::new(DelayedResolver {
            value: "token".to_string(),
            visible_after,
            calls: AtomicU32::new(0),
        })
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_once_value_appears() {
        let resolver = delayed(4);
        let waiter = PropagationWaiter::new(resolver.clone());

        waiter
            .wait_for(
                "_acme-challenge.example.com",
                "token",
                Duration::from_secs(60),
                Duration::from_secs(5),
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(resolver.calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn times_out_with_last_seen_values() {
        let waiter = PropagationWaiter::new(delayed(u32::MAX));
        let started = Instant::now();

        let err = waiter
            .wait_for(
                "_acme-challenge.example.com",
                "token",
                Duration::from_secs(30),
                Duration::from_secs(7),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();

        assert!(started.elapsed() <= Duration::from_secs(30 + 7));
        match err {
            Error::PropagationTimeout { last_seen, expected, .. } => {
                assert_eq!(expected, "token");
                assert_eq!(last_seen, vec!["stale".to_string()]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn hanging_lookup_is_bounded_by_deadline() {
        let waiter = PropagationWaiter::new(Arc::new(HangingResolver));
        let started = Instant::now();

        let err = waiter
            .wait_for(
                "_acme-challenge.example.com",
                "token",
                Duration::from_secs(10),
                Duration::from_secs(2),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, Error::PropagationTimeout { .. }));
        assert!(started.elapsed() <= Duration::from_secs(12));
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_stops_wait_promptly() {
        let waiter = PropagationWaiter::new(delayed(u32::MAX));
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(3)).await;
            trigger.cancel();
        });
        let started = Instant::now();

        let err = waiter
            .wait_for(
                "_acme-challenge.example.com",
                "token",
                Duration::from_secs(600),
                Duration::from_secs(5),
                &cancel,
            )
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Cancelled));
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
