//! Wiring of the whole pipeline
//!
//! [`Pipeline::spawn`] creates the broker, both topics and every actor. All
//! subscribers are attached before the publisher starts, so the very first
//! snapshot already reaches the alert engine, the gateway and storage.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info};

use crate::actors::alert::AlertHandle;
use crate::actors::gateway::GatewayHandle;
use crate::actors::messages::{ALERTS_TOPIC, METRICS_TOPIC, PublisherState};
use crate::actors::publisher::PublisherHandle;
use crate::actors::storage::StorageHandle;
use crate::alerts::Alert;
use crate::broker::Broker;
use crate::config::Config;
use crate::monitors::Sampler;
use crate::storage::StorageSink;
use crate::Snapshot;

/// Point-in-time health of the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HealthSummary {
    pub publisher_state: PublisherState,
    pub consecutive_failures: usize,
    pub connected_clients: usize,
}

/// Handles of every running component
#[derive(Clone)]
pub struct Pipeline {
    broker: Broker,
    publisher: PublisherHandle,
    alerts: AlertHandle,
    storage_actor: StorageHandle,
    gateway: GatewayHandle,
    storage: Arc<dyn StorageSink>,
}

impl Pipeline {
    pub fn spawn(config: &Config, sampler: Box<dyn Sampler>, storage: Arc<dyn StorageSink>) -> Self {
        let broker = Broker::new(config.queue_capacity);
        let metrics = broker.create_topic(METRICS_TOPIC);
        let alerts_topic = broker.create_topic(ALERTS_TOPIC);

        let alerts = AlertHandle::spawn(
            config.rules.clone(),
            broker.clone(),
            &metrics,
            alerts_topic.clone(),
        );
        let storage_actor = StorageHandle::spawn(storage.clone(), &broker, &alerts_topic);
        let gateway = GatewayHandle::spawn(
            broker.clone(),
            metrics.clone(),
            alerts_topic,
            config.gateway(),
        );

        let publisher = PublisherHandle::spawn(
            sampler,
            broker.clone(),
            metrics,
            storage.clone(),
            config.publisher(),
        );

        info!(
            "pipeline started: interval {}s, {} alert rules",
            config.interval,
            config.rules.len()
        );

        Self {
            broker,
            publisher,
            alerts,
            storage_actor,
            gateway,
            storage,
        }
    }

    pub fn broker(&self) -> &Broker {
        &self.broker
    }

    pub fn publisher(&self) -> &PublisherHandle {
        &self.publisher
    }

    pub fn alerts(&self) -> &AlertHandle {
        &self.alerts
    }

    pub fn storage_actor(&self) -> &StorageHandle {
        &self.storage_actor
    }

    pub fn gateway(&self) -> &GatewayHandle {
        &self.gateway
    }

    pub fn storage(&self) -> &Arc<dyn StorageSink> {
        &self.storage
    }

    pub async fn latest_snapshot(&self) -> Option<Snapshot> {
        self.gateway.latest_snapshot().await
    }

    /// Most recent alerts, oldest first
    pub async fn recent_alerts(&self, limit: usize) -> Vec<Alert> {
        self.gateway.recent_alerts(limit).await
    }

    pub async fn health(&self) -> HealthSummary {
        let status = self.publisher.status();
        HealthSummary {
            publisher_state: status.state,
            consecutive_failures: status.consecutive_failures,
            connected_clients: self.gateway.connected_clients().await,
        }
    }

    /// Stop everything
    ///
    /// The publisher finishes its in-flight tick, then every topic is closed
    /// and finally all dashboard connections are closed. The alert and storage
    /// actors drain what is still queued and stop on their own.
    pub async fn shutdown(&self) {
        debug!("stopping publisher");
        self.publisher.shutdown().await;

        debug!("closing broker");
        self.broker.shutdown();

        debug!("closing dashboard connections");
        self.gateway.shutdown().await;

        info!("pipeline stopped");
    }
}
