//! Concurrency tests for the broker and the pipeline
//!
//! These tests verify that:
//! - Concurrent subscribers each see every event in publish order
//! - Subscribing and unsubscribing while publishing is safe
//! - Shutdown ends every pending receive

use std::time::Duration;

use assert_matches::assert_matches;
use pretty_assertions::assert_eq;
use system_monitor::{
    actors::messages::{Event, METRICS_TOPIC, PublisherState},
    broker::Broker,
    error::BrokerError,
};

use crate::helpers::*;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_subscribers_see_publish_order() {
    let broker = Broker::new(256);
    let topic = broker.create_topic(METRICS_TOPIC);

    let mut readers = vec![];
    for _ in 0..10 {
        let mut subscription = broker.subscribe(&topic);
        readers.push(tokio::spawn(async move {
            let mut seen = vec![];
            while let Ok(Event::Metrics(snapshot)) = subscription.recv().await {
                seen.push(snapshot.timestamp.monotonic().as_secs());
            }
            seen
        }));
    }

    let publisher = {
        let broker = broker.clone();
        let topic = topic.clone();
        tokio::spawn(async move {
            for secs in 0..200 {
                broker.publish(&topic, Event::Metrics(snapshot_at(secs, 1.0)));
                if secs % 20 == 0 {
                    tokio::task::yield_now().await;
                }
            }
        })
    };
    publisher.await.unwrap();
    broker.shutdown();

    let expected: Vec<u64> = (0..200).collect();
    for reader in readers {
        assert_eq!(reader.await.unwrap(), expected);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_subscribe_churn_while_publishing() {
    let broker = Broker::new(16);
    let topic = broker.create_topic(METRICS_TOPIC);
    let mut steady = broker.subscribe(&topic);

    let churn = {
        let broker = broker.clone();
        let topic = topic.clone();
        tokio::spawn(async move {
            for _ in 0..500 {
                let subscription = broker.subscribe(&topic);
                tokio::task::yield_now().await;
                drop(subscription);
            }
        })
    };

    let reader = tokio::spawn(async move {
        let mut count = 0;
        while steady.recv().await.is_ok() {
            count += 1;
        }
        (count, steady.dropped())
    });

    for secs in 0..500 {
        broker.publish(&topic, Event::Metrics(snapshot_at(secs, 1.0)));
        if secs % 10 == 0 {
            tokio::task::yield_now().await;
        }
    }

    churn.await.unwrap();
    broker.shutdown();

    let (received, dropped) = reader.await.unwrap();
    assert_eq!(received + dropped, 500);
    assert_eq!(topic.subscriber_count(), 0);
}

#[tokio::test]
async fn test_shutdown_ends_pending_receives() {
    let broker = Broker::new(8);
    let topic = broker.create_topic(METRICS_TOPIC);

    let waiters: Vec<_> = (0..5)
        .map(|_| {
            let mut subscription = broker.subscribe(&topic);
            tokio::spawn(async move { subscription.recv().await })
        })
        .collect();

    tokio::time::sleep(Duration::from_millis(10)).await;
    broker.shutdown();

    for waiter in waiters {
        assert_matches!(waiter.await.unwrap(), Err(BrokerError::Closed));
    }

    // publishing after close is a silent no-op
    assert_eq!(broker.publish(&topic, Event::Metrics(snapshot_at(1, 1.0))), 0);
}

#[tokio::test]
async fn test_pipeline_shutdown_closes_everything() {
    let test = spawn_pipeline(test_config()).await;
    let (conn, client) = fake_connection("dashboard");
    test.pipeline.gateway().attach(conn).await.unwrap();

    tokio::time::timeout(Duration::from_secs(2), test.pipeline.shutdown())
        .await
        .expect("shutdown should not hang");

    assert_eq!(
        test.pipeline.publisher().status().state,
        PublisherState::Stopped
    );
    assert!(test.pipeline.broker().is_closed());
    assert!(client.is_closed());
    assert!(test.pipeline.publisher().tick_now().await.is_err());
}
