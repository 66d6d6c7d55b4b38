//! Behaviour Contract Test: Retry on Next Trigger
//!
//! This test verifies that failed pushes are retried by the pipeline, not
//! by the client.
//!
//! Constraints verified:
//! - A failed push leaves last_update unadvanced
//! - A failed push is attempted exactly once per trigger (no in-call retry)
//! - The next trigger (record save, address change, engine start)
//!   re-attempts the push
//! - Provider failures never surface as errors from the engine
//!
//! If this test fails, failures are either lost or retried in a hidden loop.

mod common;

use chrono::Utc;
use common::*;
use ddnsbroker_core::EngineEvent;

#[tokio::test]
async fn failed_push_leaves_update_marker_behind() {
    let mut fixture = Fixture::new().await;
    fixture.client.set_failing(true);
    fixture.set_host_ipv4("203.0.113.5").await;
    let record = fixture.add_record("www.example.com", 32, "0.0.0.0").await;

    // provider failure is contained
    fixture.engine.process_record(record.id).await.unwrap();

    assert_eq!(fixture.client.push_count(), 1);
    let stored = fixture.record(record.id).await;
    assert!(stored.last_ipv4_update.is_none());
    assert!(stored.last_ipv4_change.is_some());

    let failed = fixture
        .drain_events()
        .into_iter()
        .filter(|e| matches!(e, EngineEvent::PushFailed { .. }))
        .count();
    assert_eq!(failed, 1);
}

#[tokio::test]
async fn next_trigger_retries_failed_push() {
    let mut fixture = Fixture::new().await;
    let record = fixture.add_record("www.example.com", 32, "0.0.0.0").await;
    fixture.pump().await;
    assert_eq!(fixture.client.push_count(), 0, "no address yet");

    fixture.client.set_failing(true);
    assert!(fixture.set_host_ipv4("203.0.113.5").await);
    assert_eq!(fixture.pump().await, 1);
    assert_eq!(fixture.client.push_count(), 1);

    // same address again: the save reports no change and publishes nothing
    fixture.client.set_failing(false);
    assert!(!fixture.set_host_ipv4("203.0.113.5").await);
    assert_eq!(fixture.pump().await, 0);
    assert_eq!(fixture.client.push_count(), 1);

    // an administrative save of the record is the next trigger
    let mut stored = fixture.record(record.id).await;
    fixture.repo.save_record(&mut stored, Utc::now()).await.unwrap();
    assert_eq!(fixture.pump().await, 1);
    assert_eq!(fixture.client.push_count(), 2);

    let stored = fixture.record(record.id).await;
    assert!(stored.last_ipv4_update.is_some());
    assert!(stored.last_ipv4_update >= stored.last_ipv4_change);

    // and once it succeeded it stays quiet
    fixture.engine.reconcile().await.unwrap();
    assert_eq!(fixture.client.push_count(), 2);
}

#[tokio::test]
async fn address_change_after_failure_pushes_new_address() {
    let mut fixture = Fixture::new().await;
    fixture.add_record("www.example.com", 32, "0.0.0.0").await;

    fixture.client.set_failing(true);
    fixture.set_host_ipv4("203.0.113.5").await;
    fixture.pump().await;

    fixture.client.set_failing(false);
    assert!(fixture.set_host_ipv4("203.0.113.6").await);
    fixture.pump().await;

    let addresses: Vec<String> = fixture
        .client
        .requests()
        .into_iter()
        .map(|r| r.address.to_string())
        .collect();
    assert_eq!(addresses, vec!["203.0.113.5", "203.0.113.6"]);
}

#[tokio::test]
async fn one_failing_record_does_not_block_others() {
    let fixture = Fixture::new().await;
    fixture.add_record("mail.example.com", 32, "0.0.0.0").await;
    fixture.add_record("www.example.com", 24, "0.0.0.42").await;

    fixture.client.set_failing(true);
    fixture.set_host_ipv4("192.0.2.1").await;
    fixture.engine.process_host(fixture.host.id).await.unwrap();

    assert_eq!(fixture.client.push_count(), 2);
}
