//! Contract Test: Zone Resolution
//!
//! Verifies that every challenge lands in the most specific configured zone
//! and that configuration problems stop the batch before anything is written.
//!
//! Constraints verified:
//! - Longest matching suffix wins, regardless of configuration order
//! - Wildcard domains resolve like their base domain
//! - A duplicated suffix is a configuration error at resolution time
//! - A domain without a zone fails alone; the rest of the batch proceeds
//! - Cleanup re-derives the same target without stored state

mod common;

use common::*;
use dns01_core::record::ApiOp;
use dns01_core::{ChallengeRequest, Error, MemoryRecordApi};
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn nested_zones_pick_longest_suffix() {
    let api = MemoryRecordApi::new();
    let config = test_config(vec![zone("example.com"), zone("sub.example.com")]);
    let (orchestrator, _events) = echo_orchestrator(&config, &api, memory_store());

    let report = orchestrator
        .perform(
            &[
                ChallengeRequest::new("a.sub.example.com", "deep"),
                ChallengeRequest::new("a.example.com", "shallow"),
            ],
            &CancellationToken::new(),
        )
        .await
        .unwrap();
    assert!(report.is_success());

    let sub = report.outcomes[0].pending.as_ref().unwrap();
    assert_eq!(sub.zone.zone_name, "sub.example.com");
    assert_eq!(sub.record_name, "_acme-challenge.a");

    let top = report.outcomes[1].pending.as_ref().unwrap();
    assert_eq!(top.zone.zone_name, "example.com");
    assert_eq!(top.record_name, "_acme-challenge.a");

    assert_eq!(
        api.values(&zone("sub.example.com"), "_acme-challenge.a").await,
        Some(vec!["deep".to_string()])
    );
    assert_eq!(
        api.values(&zone("example.com"), "_acme-challenge.a").await,
        Some(vec!["shallow".to_string()])
    );
}

#[tokio::test]
async fn wildcard_and_apex_share_a_record() {
    let api = MemoryRecordApi::new();
    let config = test_config(vec![zone("example.com")]);
    let (orchestrator, _events) = echo_orchestrator(&config, &api, memory_store());

    let report = orchestrator
        .perform(
            &[
                ChallengeRequest::new("*.example.com", "wild"),
                ChallengeRequest::new("example.com", "apex"),
            ],
            &CancellationToken::new(),
        )
        .await
        .unwrap();
    assert!(report.is_success());

    let mut values = api
        .values(&zone("example.com"), "_acme-challenge")
        .await
        .unwrap();
    values.sort();
    assert_eq!(values, vec!["apex".to_string(), "wild".to_string()]);
}

#[tokio::test]
async fn duplicate_suffix_aborts_before_writing() {
    let api = MemoryRecordApi::new();
    let config = test_config(vec![zone("example.com"), zone("example.com")]);
    let (orchestrator, _events) = echo_orchestrator(&config, &api, memory_store());

    let err = orchestrator
        .perform(
            &[ChallengeRequest::new("www.example.com", "token")],
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Config(_)));
    assert_eq!(api.call_count(ApiOp::Get).await, 0);
    assert_eq!(api.call_count(ApiOp::Put).await, 0);
}

#[tokio::test]
async fn unmatched_domain_fails_alone() {
    let api = MemoryRecordApi::new();
    let config = test_config(vec![zone("example.com")]);
    let (orchestrator, _events) = echo_orchestrator(&config, &api, memory_store());

    let report = orchestrator
        .perform(
            &[
                ChallengeRequest::new("example.org", "lost"),
                ChallengeRequest::new("www.example.com", "kept"),
            ],
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert!(!report.is_success());
    assert!(matches!(
        report.outcomes[0].error,
        Some(Error::NoMatchingZone { .. })
    ));
    assert!(report.outcomes[1].is_success());
    assert!(report.fatal_error().is_none());
}

#[tokio::test]
async fn cleanup_rederives_target_without_stored_state() {
    let api = MemoryRecordApi::new();
    let config = test_config(vec![zone("example.com"), zone("sub.example.com")]);
    let requests = vec![ChallengeRequest::new("*.a.sub.example.com", "token")];

    let (performer, _events) = echo_orchestrator(&config, &api, memory_store());
    performer
        .perform(&requests, &CancellationToken::new())
        .await
        .unwrap();
    assert!(!api.is_empty().await);

    // Fresh store: nothing remembered from perform
    let (cleaner, _events) = echo_orchestrator(&config, &api, memory_store());
    assert!(cleaner.cleanup(&requests).await.is_clean());
    assert!(api.is_empty().await);
}
