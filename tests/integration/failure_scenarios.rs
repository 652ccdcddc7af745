//! Failure tests for the pipeline
//!
//! These tests verify that the system handles failures gracefully:
//! - Sampling failures and the degraded mode
//! - Broken storage
//! - Slow and disconnected dashboards

use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use async_trait::async_trait;
use pretty_assertions::assert_eq;
use system_monitor::{
    Snapshot,
    actors::messages::{Event, PublisherState, SourceStatus, StatusEvent, TickOutcome},
    alerts::Alert,
    error::{StorageError, StorageResult},
    storage::{Record, RecordKind, StorageSink},
};

use crate::helpers::*;

/// Sink that rejects everything
struct BrokenSink;

#[async_trait]
impl StorageSink for BrokenSink {
    async fn append_snapshot(&self, _snapshot: &Snapshot) -> StorageResult<()> {
        Err(StorageError::Unavailable("connection refused".into()))
    }

    async fn append_alert(&self, _alert: &Alert) -> StorageResult<()> {
        Err(StorageError::Unavailable("connection refused".into()))
    }

    async fn query_recent(&self, _kind: RecordKind, _limit: usize) -> StorageResult<Vec<Record>> {
        Err(StorageError::QueryFailed("connection refused".into()))
    }
}

#[tokio::test]
async fn test_degraded_status_emitted_exactly_once() {
    let test = spawn_pipeline(test_config()).await;
    let (conn, mut client) = fake_connection("dashboard");
    test.pipeline.gateway().attach(conn).await.unwrap();
    assert_matches!(client.next().await, Event::Status(_));
    assert_matches!(client.next().await, Event::Metrics(_));

    test.sampler.push_failures(5);
    let mut outcomes = vec![];
    for _ in 0..5 {
        outcomes.push(test.pipeline.publisher().tick_now().await.unwrap());
    }

    assert_eq!(
        outcomes,
        vec![
            TickOutcome::Skipped,
            TickOutcome::Skipped,
            TickOutcome::BecameDegraded,
            TickOutcome::StillDegraded,
            TickOutcome::StillDegraded,
        ]
    );

    assert_matches!(
        client.next().await,
        Event::Status(StatusEvent { status: SourceStatus::Degraded, consecutive_failures: 3, .. })
    );
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(client.rx.try_recv().is_err(), "no further events expected");

    let health = test.pipeline.health().await;
    assert_eq!(health.publisher_state, PublisherState::Degraded);
    assert_eq!(health.consecutive_failures, 5);

    test.pipeline.shutdown().await;
}

#[tokio::test]
async fn test_recovery_is_announced_before_snapshot() {
    let test = spawn_pipeline(test_config()).await;

    test.sampler.push_failures(3);
    for _ in 0..3 {
        test.pipeline.publisher().tick_now().await.unwrap();
    }

    let (conn, mut client) = fake_connection("dashboard");
    test.pipeline.gateway().attach(conn).await.unwrap();
    assert_matches!(client.next().await, Event::Status(StatusEvent { status: SourceStatus::Connected, .. }));
    assert_matches!(client.next().await, Event::Metrics(_));

    test.sampler.push_sample(20, 30.0);
    assert_eq!(
        test.pipeline.publisher().tick_now().await.unwrap(),
        TickOutcome::Recovered
    );

    assert_matches!(
        client.next().await,
        Event::Status(StatusEvent { status: SourceStatus::Recovered, .. })
    );
    assert_eq!(client.next().await, Event::Metrics(snapshot_at(20, 30.0)));
    assert_eq!(
        test.pipeline.health().await.publisher_state,
        PublisherState::Idle
    );

    test.pipeline.shutdown().await;
}

#[tokio::test]
async fn test_broken_storage_does_not_block_distribution() {
    let test = spawn_pipeline_with_sink(test_config(), Some(Arc::new(BrokenSink))).await;
    let (conn, mut client) = fake_connection("dashboard");
    test.pipeline.gateway().attach(conn).await.unwrap();

    test.sampler.push_sample(5, 99.0);
    assert_eq!(
        test.pipeline.publisher().tick_now().await.unwrap(),
        TickOutcome::Published
    );

    assert_eq!(client.next_data().await, Event::Metrics(snapshot_at(0, 5.0)));
    assert_eq!(client.next_data().await, Event::Metrics(snapshot_at(5, 99.0)));
    assert_matches!(client.next_data().await, Event::Alert(_));

    let storage_actor = test.pipeline.storage_actor().clone();
    eventually(|| {
        let storage_actor = storage_actor.clone();
        async move {
            storage_actor
                .get_stats()
                .await
                .is_some_and(|stats| stats.failures == 1)
        }
    })
    .await;

    test.pipeline.shutdown().await;
}

#[tokio::test]
async fn test_stalled_dashboard_is_dropped() {
    let mut config = test_config();
    config.gateway.send_timeout_ms = 50;
    let test = spawn_pipeline(config).await;

    let (stalled, stalled_client) = stalled_connection("stalled");
    let (healthy, mut client) = fake_connection("healthy");
    test.pipeline.gateway().attach(stalled).await.unwrap();
    test.pipeline.gateway().attach(healthy).await.unwrap();

    for secs in 1..=3 {
        test.sampler.push_sample(secs, 10.0);
        test.pipeline.publisher().tick_now().await.unwrap();
    }

    assert_eq!(client.next_data().await, Event::Metrics(snapshot_at(0, 5.0)));
    for secs in 1..=3 {
        assert_eq!(client.next_data().await, Event::Metrics(snapshot_at(secs, 10.0)));
    }

    let gateway = test.pipeline.gateway().clone();
    eventually(|| {
        let gateway = gateway.clone();
        async move { gateway.connected_clients().await == 1 }
    })
    .await;
    assert!(stalled_client.is_closed());
    assert!(!client.is_closed());

    test.pipeline.shutdown().await;
    assert!(client.is_closed());
}
