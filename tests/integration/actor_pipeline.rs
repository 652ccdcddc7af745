//! End-to-end tests of the actor pipeline
//!
//! These tests verify that:
//! - Snapshots reach the alert engine, the gateway and storage
//! - Alerts reach dashboards and storage
//! - The cooldown scenario produces exactly the expected alerts

use assert_matches::assert_matches;
use pretty_assertions::assert_eq;
use system_monitor::{
    MetricPath,
    actors::{
        gateway::GREETING,
        messages::{Event, PublisherState, SourceStatus, StatusEvent, TickOutcome},
    },
    alerts::{AlertRule, Severity},
    storage::RecordKind,
};

use crate::helpers::*;

#[tokio::test]
async fn test_snapshot_and_alert_reach_dashboard() {
    let test = spawn_pipeline(test_config()).await;
    let (conn, mut client) = fake_connection("dashboard");
    test.pipeline.gateway().attach(conn).await.unwrap();

    assert_matches!(
        client.next().await,
        Event::Status(StatusEvent { status: SourceStatus::Connected, ref message, .. }) if message == GREETING
    );
    // catch-up: the snapshot of the first tick
    assert_eq!(client.next().await, Event::Metrics(snapshot_at(0, 5.0)));

    test.sampler.push_sample(5, 85.0);
    assert_eq!(
        test.pipeline.publisher().tick_now().await.unwrap(),
        TickOutcome::Published
    );

    assert_eq!(client.next().await, Event::Metrics(snapshot_at(5, 85.0)));
    assert_matches!(client.next().await, Event::Alert(alert) => {
        assert_eq!(alert.kind, MetricPath::CpuPercent);
        assert_eq!(alert.severity, Severity::Warning);
        assert_eq!(alert.message, "High CPU usage: 85.0%");
        assert_eq!(alert.value, 85.0);
    });

    test.pipeline.shutdown().await;
}

#[tokio::test]
async fn test_snapshots_and_alerts_are_stored() {
    let test = spawn_pipeline(test_config()).await;

    test.sampler.push_sample(5, 95.0);
    test.pipeline.publisher().tick_now().await.unwrap();

    let store = test.store.clone();
    eventually(|| {
        let store = store.clone();
        async move { store.len(RecordKind::Alert) == 1 && store.len(RecordKind::Snapshot) == 2 }
    })
    .await;

    let stats = test.pipeline.storage_actor().get_stats().await.unwrap();
    assert_eq!(stats.alerts_appended, 1);

    test.pipeline.shutdown().await;
}

#[tokio::test]
async fn test_cooldown_scenario() {
    let mut config = test_config();
    config.rules = vec![AlertRule::new(MetricPath::CpuPercent, 80.0, Severity::Warning)];
    let test = spawn_pipeline(config).await;

    for (secs, cpu) in [(0, 70.0), (2, 85.0), (4, 90.0), (30, 88.0), (65, 88.0)] {
        test.sampler.push_sample(secs, cpu);
        test.pipeline.publisher().tick_now().await.unwrap();
    }

    let store = test.store.clone();
    eventually(|| {
        let store = store.clone();
        async move { store.len(RecordKind::Alert) >= 2 }
    })
    .await;

    let fired: Vec<u64> = test
        .pipeline
        .recent_alerts(10)
        .await
        .into_iter()
        .map(|alert| alert.timestamp.monotonic().as_secs())
        .collect();
    assert_eq!(fired, vec![2, 65]);

    let rules = test.pipeline.alerts().get_state().await.unwrap();
    assert!(rules[0].state.currently_breached);

    test.pipeline.shutdown().await;
}

#[tokio::test]
async fn test_latest_snapshot_and_health() {
    let test = spawn_pipeline(test_config()).await;

    test.sampler.push_sample(5, 42.0);
    test.pipeline.publisher().tick_now().await.unwrap();

    let pipeline = test.pipeline.clone();
    eventually(|| {
        let pipeline = pipeline.clone();
        async move { pipeline.latest_snapshot().await == Some(snapshot_at(5, 42.0)) }
    })
    .await;

    let health = test.pipeline.health().await;
    assert_eq!(health.publisher_state, PublisherState::Idle);
    assert_eq!(health.consecutive_failures, 0);
    assert_eq!(health.connected_clients, 0);

    test.pipeline.shutdown().await;
}
