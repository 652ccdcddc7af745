//! Integration tests for API endpoints
//!
//! These tests verify that:
//! - All REST endpoints return correct responses
//! - Health status follows the publisher state
//! - WebSocket streaming sends the greeting and catch-up first

use std::net::SocketAddr;
use std::sync::Arc;

use futures::StreamExt;
use pretty_assertions::assert_eq;
use serde_json::Value;
use system_monitor::{
    actors::messages::{Event, SourceStatus, StatusEvent},
    api::{ApiConfig, ApiState, HealthResponse, spawn_api_server},
    pipeline::Pipeline,
    storage::{MemoryStore, RecordKind},
};
use tokio::net::TcpStream;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, tungstenite::Message};

use crate::helpers::*;

async fn spawn_test_api(pipeline: Pipeline) -> SocketAddr {
    let config = ApiConfig {
        bind_addr: "127.0.0.1:0".parse().unwrap(),
        enable_cors: true,
        static_dir: None,
    };

    spawn_api_server(config, ApiState::new(pipeline))
        .await
        .expect("api server starts")
}

async fn next_event(socket: &mut WebSocketStream<MaybeTlsStream<TcpStream>>) -> Event {
    loop {
        let message = tokio::time::timeout(std::time::Duration::from_secs(2), socket.next())
            .await
            .expect("timed out waiting for message")
            .expect("stream ended")
            .expect("websocket error");
        if let Message::Text(text) = message {
            return serde_json::from_str(&text).expect("event is valid json");
        }
    }
}

async fn get(addr: SocketAddr, path: &str) -> reqwest::Response {
    reqwest::get(format!("http://{addr}{path}"))
        .await
        .expect("request succeeds")
}

#[tokio::test]
async fn test_health_endpoint() {
    let test = spawn_pipeline(test_config()).await;
    let addr = spawn_test_api(test.pipeline.clone()).await;

    let response = get(addr, "/api/health").await;
    assert_eq!(response.status(), reqwest::StatusCode::OK);

    let health: HealthResponse = response.json().await.unwrap();
    assert_eq!(health.status, "healthy");
    assert_eq!(health.consecutive_failures, 0);
    assert_eq!(health.connected_clients, 0);

    test.pipeline.shutdown().await;
}

#[tokio::test]
async fn test_health_reports_degraded_source() {
    let mut config = test_config();
    config.failure_threshold = 1;
    let test = spawn_pipeline(config).await;
    let addr = spawn_test_api(test.pipeline.clone()).await;

    test.sampler.push_failures(1);
    test.pipeline.publisher().tick_now().await.unwrap();

    let health: HealthResponse = get(addr, "/api/health").await.json().await.unwrap();
    assert_eq!(health.status, "degraded");
    assert_eq!(health.consecutive_failures, 1);

    test.pipeline.shutdown().await;
}

#[tokio::test]
async fn test_latest_metrics_before_and_after_first_sample() {
    // build by hand so the very first tick fails
    let sampler = ScriptedSampler::new();
    sampler.push_failures(1);
    let store = Arc::new(MemoryStore::default());
    let pipeline = Pipeline::spawn(&test_config(), Box::new(sampler.clone()), store);
    let publisher = pipeline.publisher().clone();
    eventually(|| {
        let publisher = publisher.clone();
        async move { publisher.status().ticks >= 1 }
    })
    .await;

    let addr = spawn_test_api(pipeline.clone()).await;

    let response = get(addr, "/api/metrics/latest").await;
    assert_eq!(response.status(), reqwest::StatusCode::NOT_FOUND);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], "No metrics available");

    sampler.push_sample(42, 12.5);
    pipeline.publisher().tick_now().await.unwrap();

    let response = get(addr, "/api/metrics/latest").await;
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["cpu"]["percent"], 12.5);
    assert_eq!(body["processes"], 250);

    pipeline.shutdown().await;
}

#[tokio::test]
async fn test_metrics_history_oldest_first_with_limit() {
    let test = spawn_pipeline(test_config()).await;
    let addr = spawn_test_api(test.pipeline.clone()).await;

    for secs in 1..=4 {
        test.sampler.push_sample(secs, secs as f64);
        test.pipeline.publisher().tick_now().await.unwrap();
    }

    // snapshots reach storage through the publisher's writer task
    let store = test.store.clone();
    eventually(|| {
        let store = store.clone();
        async move { store.len(RecordKind::Snapshot) == 5 }
    })
    .await;

    let body: Vec<Value> = get(addr, "/api/metrics/history?limit=3")
        .await
        .json()
        .await
        .unwrap();
    let cpu: Vec<f64> = body
        .iter()
        .map(|snapshot| snapshot["cpu"]["percent"].as_f64().unwrap())
        .collect();
    assert_eq!(cpu, vec![2.0, 3.0, 4.0]);

    // baseline snapshot plus the four above
    let body: Vec<Value> = get(addr, "/api/metrics/history").await.json().await.unwrap();
    assert_eq!(body.len(), 5);

    test.pipeline.shutdown().await;
}

#[tokio::test]
async fn test_alerts_newest_first() {
    let test = spawn_pipeline(test_config()).await;
    let addr = spawn_test_api(test.pipeline.clone()).await;

    test.sampler.push_sample(10, 91.0);
    test.sampler.push_sample(100, 97.0);
    for _ in 0..2 {
        test.pipeline.publisher().tick_now().await.unwrap();
    }

    let store = test.store.clone();
    eventually(|| {
        let store = store.clone();
        async move { store.len(RecordKind::Alert) == 2 }
    })
    .await;

    let body: Vec<Value> = get(addr, "/api/alerts").await.json().await.unwrap();
    assert_eq!(body.len(), 2);
    assert_eq!(body[0]["value"], 97.0);
    assert_eq!(body[1]["value"], 91.0);
    assert_eq!(body[0]["type"], "cpu.percent");
    assert_eq!(body[0]["severity"], "warning");

    let body: Vec<Value> = get(addr, "/api/alerts?limit=1").await.json().await.unwrap();
    assert_eq!(body.len(), 1);

    test.pipeline.shutdown().await;
}

#[tokio::test]
async fn test_websocket_stream() {
    let test = spawn_pipeline(test_config()).await;
    let addr = spawn_test_api(test.pipeline.clone()).await;

    let (mut socket, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/api/stream"))
        .await
        .expect("websocket handshake");

    let greeting = next_event(&mut socket).await;
    assert!(matches!(
        greeting,
        Event::Status(StatusEvent {
            status: SourceStatus::Connected,
            ..
        })
    ));

    // catch-up snapshot from the first tick
    assert!(matches!(next_event(&mut socket).await, Event::Metrics(_)));

    let pipeline = test.pipeline.clone();
    eventually(|| {
        let pipeline = pipeline.clone();
        async move { pipeline.gateway().connected_clients().await == 1 }
    })
    .await;

    test.sampler.push_sample(50, 33.0);
    test.pipeline.publisher().tick_now().await.unwrap();

    match next_event(&mut socket).await {
        Event::Metrics(snapshot) => assert_eq!(snapshot.cpu.percent, 33.0),
        other => panic!("expected snapshot, got {other:?}"),
    }

    test.pipeline.shutdown().await;
}

#[tokio::test]
async fn test_zero_limit_is_rejected() {
    let test = spawn_pipeline(test_config()).await;
    let addr = spawn_test_api(test.pipeline.clone()).await;

    for path in ["/api/alerts?limit=0", "/api/metrics/history?limit=0"] {
        let response = get(addr, path).await;
        assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["error"], "limit must be at least 1");
    }

    test.pipeline.shutdown().await;
}
