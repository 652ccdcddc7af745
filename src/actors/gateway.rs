//! GatewayActor - Fans events out to dashboard connections
//!
//! ## Architecture
//!
//! ```text
//!                       ┌──────────────────────────────┐
//!   metrics topic ────▶ │ GatewayActor                 │
//!   alerts topic  ────▶ │  latest snapshot, alert tail │
//!                       │  registry of writers         │
//!                       └──────────────┬───────────────┘
//!                                      │ attach
//!               ┌──────────────────────┼──────────────────────┐
//!               ▼                      ▼                      ▼
//!          writer task            writer task            writer task
//!      (own subscriptions)    (own subscriptions)    (own subscriptions)
//!               │                      │                      │
//!           Connection             Connection             Connection
//! ```
//!
//! The actor keeps the catch-up state (latest snapshot, the most recent
//! alerts and whether the metrics source is currently degraded). Every
//! attached connection gets its own writer task with its own pair of broker
//! subscriptions, so a slow client only ever fills its own bounded queues. A
//! write that fails or exceeds the send timeout closes the
//! connection and releases its subscriptions.
//!
//! ## Catch-up
//!
//! On attach the writer's subscriptions are taken first, then the cache is
//! brought up to date. Events already covered by the catch-up are skipped by
//! the writer, so nothing is lost or sent twice.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, trace, warn};

use crate::alerts::Alert;
use crate::broker::{Broker, Subscription, TopicHandle};
use crate::error::{BrokerError, DeliveryError};
use crate::monitors::Clock;
use crate::Snapshot;

use super::messages::{Event, GatewayCommand, SourceStatus, StatusEvent};

/// Greeting sent before the catch-up state
pub const GREETING: &str = "Connected to System Monitor";

/// A single dashboard connection
#[async_trait]
pub trait Connection: Send {
    /// Peer description for logging
    fn peer(&self) -> String;

    /// Write one serialized event
    async fn send(&mut self, text: String) -> Result<(), DeliveryError>;

    /// Close the connection, errors are ignored
    async fn close(&mut self);
}

/// Source of new dashboard connections
#[async_trait]
pub trait Transport: Send {
    /// Wait for the next connection, `None` once the transport is closed
    async fn accept(&mut self) -> Option<Box<dyn Connection>>;
}

#[async_trait]
impl Transport for mpsc::Receiver<Box<dyn Connection>> {
    async fn accept(&mut self) -> Option<Box<dyn Connection>> {
        self.recv().await
    }
}

/// Gateway settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GatewayConfig {
    /// Alerts replayed to a new connection
    pub catchup_alerts: usize,

    /// Alerts kept for catch-up and queries
    pub recent_alerts: usize,

    /// Upper bound for a single write
    pub send_timeout: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            catchup_alerts: 10,
            recent_alerts: 50,
            send_timeout: Duration::from_secs(5),
        }
    }
}

/// State replayed to a freshly attached connection
#[derive(Debug, Clone, Default)]
struct CatchUp {
    /// Degraded notice still in effect
    degraded: Option<StatusEvent>,
    snapshot: Option<Snapshot>,
    alerts: Vec<Alert>,
}

impl CatchUp {
    /// Whether the event was already part of the catch-up
    fn covers(&self, event: &Event) -> bool {
        match event {
            Event::Metrics(snapshot) => self
                .snapshot
                .as_ref()
                .is_some_and(|latest| snapshot.timestamp <= latest.timestamp),
            Event::Alert(alert) => self.alerts.contains(alert),
            Event::Status(status) => self.degraded.as_ref() == Some(status),
        }
    }
}

/// Actor owning the connection registry and the catch-up cache
pub struct GatewayActor {
    broker: Broker,
    metrics_topic: TopicHandle,
    alerts_topic: TopicHandle,

    /// Cache subscriptions
    metrics: Subscription,
    alerts: Subscription,

    latest: Option<Snapshot>,
    recent: VecDeque<Alert>,
    degraded: Option<StatusEvent>,

    /// Writer tasks by connection id
    connections: HashMap<u64, JoinHandle<()>>,
    next_connection: u64,

    /// Writers report their id here when they exit
    closed_tx: mpsc::UnboundedSender<u64>,
    closed_rx: mpsc::UnboundedReceiver<u64>,

    shutdown_tx: watch::Sender<bool>,
    command_rx: mpsc::Receiver<GatewayCommand>,
    config: GatewayConfig,
    clock: Clock,
}

impl GatewayActor {
    pub fn new(
        broker: Broker,
        metrics_topic: TopicHandle,
        alerts_topic: TopicHandle,
        command_rx: mpsc::Receiver<GatewayCommand>,
        config: GatewayConfig,
    ) -> Self {
        let (closed_tx, closed_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, _) = watch::channel(false);

        Self {
            metrics: broker.subscribe(&metrics_topic),
            alerts: broker.subscribe(&alerts_topic),
            broker,
            metrics_topic,
            alerts_topic,
            latest: None,
            recent: VecDeque::with_capacity(config.recent_alerts),
            degraded: None,
            connections: HashMap::new(),
            next_connection: 0,
            closed_tx,
            closed_rx,
            shutdown_tx,
            command_rx,
            config,
            clock: Clock::new(),
        }
    }

    /// Run the actor's main loop
    #[instrument(skip(self))]
    pub async fn run(mut self) {
        debug!("starting gateway actor");

        let mut metrics_open = true;
        let mut alerts_open = true;

        loop {
            tokio::select! {
                result = self.metrics.recv(), if metrics_open => {
                    match result {
                        Ok(event) => self.cache(event),
                        Err(BrokerError::Closed) => {
                            debug!("metrics topic closed");
                            metrics_open = false;
                        }
                    }
                }

                result = self.alerts.recv(), if alerts_open => {
                    match result {
                        Ok(event) => self.cache(event),
                        Err(BrokerError::Closed) => {
                            debug!("alerts topic closed");
                            alerts_open = false;
                        }
                    }
                }

                Some(id) = self.closed_rx.recv() => {
                    if self.connections.remove(&id).is_some() {
                        debug!("connection {id} removed, {} remaining", self.connections.len());
                    }
                }

                cmd = self.command_rx.recv() => {
                    match cmd {
                        Some(GatewayCommand::Attach { connection }) => self.attach(connection),

                        Some(GatewayCommand::LatestSnapshot { respond_to }) => {
                            self.drain();
                            let _ = respond_to.send(self.latest.clone());
                        }

                        Some(GatewayCommand::RecentAlerts { limit, respond_to }) => {
                            self.drain();
                            let _ = respond_to.send(self.recent_alerts(limit));
                        }

                        Some(GatewayCommand::ConnectedClients { respond_to }) => {
                            let _ = respond_to.send(self.connections.len());
                        }

                        Some(GatewayCommand::Shutdown { respond_to }) => {
                            debug!("received shutdown command");
                            self.close_all().await;
                            let _ = respond_to.send(());
                            break;
                        }

                        None => {
                            warn!("command channel closed, shutting down");
                            self.close_all().await;
                            break;
                        }
                    }
                }
            }
        }

        debug!("gateway actor stopped");
    }

    fn cache(&mut self, event: Event) {
        match event {
            Event::Metrics(snapshot) => self.latest = Some(snapshot),
            Event::Alert(alert) => {
                if self.recent.len() == self.config.recent_alerts {
                    self.recent.pop_front();
                }
                self.recent.push_back(alert);
            }
            Event::Status(status) => match status.status {
                SourceStatus::Degraded => self.degraded = Some(status),
                SourceStatus::Recovered => self.degraded = None,
                SourceStatus::Connected => {}
            },
        }
    }

    /// Apply every event already queued on the cache subscriptions
    fn drain(&mut self) {
        while let Some(Ok(event)) = self.metrics.try_recv() {
            self.cache(event);
        }
        while let Some(Ok(event)) = self.alerts.try_recv() {
            self.cache(event);
        }
    }

    /// Last `limit` alerts, oldest first
    fn recent_alerts(&self, limit: usize) -> Vec<Alert> {
        let skip = self.recent.len().saturating_sub(limit);
        self.recent.iter().skip(skip).cloned().collect()
    }

    fn attach(&mut self, connection: Box<dyn Connection>) {
        let id = self.next_connection;
        self.next_connection += 1;

        // subscribe before draining, anything published from here on reaches
        // the writer even if the cache also sees it
        let metrics = self.broker.subscribe(&self.metrics_topic);
        let alerts = self.broker.subscribe(&self.alerts_topic);

        self.drain();

        let catch_up = CatchUp {
            degraded: self.degraded.clone(),
            snapshot: self.latest.clone(),
            alerts: self.recent_alerts(self.config.catchup_alerts),
        };

        let greeting = StatusEvent {
            timestamp: self.clock.now(),
            status: SourceStatus::Connected,
            consecutive_failures: 0,
            message: GREETING.to_string(),
        };

        info!("dashboard connected: {} (connection {id})", connection.peer());

        let writer = Writer {
            id,
            connection,
            metrics,
            alerts,
            shutdown: self.shutdown_tx.subscribe(),
            send_timeout: self.config.send_timeout,
        };

        let closed_tx = self.closed_tx.clone();
        let task = tokio::spawn(async move {
            writer.run(greeting, catch_up).await;
            let _ = closed_tx.send(id);
        });

        self.connections.insert(id, task);
    }

    async fn close_all(&mut self) {
        let _ = self.shutdown_tx.send(true);

        let count = self.connections.len();
        for (_, task) in self.connections.drain() {
            let _ = task.await;
        }

        if count > 0 {
            info!("closed {count} dashboard connections");
        }
    }
}

/// Per-connection delivery task
struct Writer {
    id: u64,
    connection: Box<dyn Connection>,
    metrics: Subscription,
    alerts: Subscription,
    shutdown: watch::Receiver<bool>,
    send_timeout: Duration,
}

impl Writer {
    #[instrument(skip_all, fields(connection = self.id))]
    async fn run(mut self, greeting: StatusEvent, catch_up: CatchUp) {
        if let Err(e) = self.deliver(greeting, catch_up).await {
            warn!("dropping {}: {e}", self.connection.peer());
        }

        // releases both subscriptions before the connection goes away
        let Writer {
            mut connection,
            metrics,
            alerts,
            ..
        } = self;
        drop((metrics, alerts));
        connection.close().await;

        debug!("connection closed");
    }

    async fn deliver(&mut self, greeting: StatusEvent, catch_up: CatchUp) -> Result<(), DeliveryError> {
        self.send(&Event::Status(greeting)).await?;

        if let Some(degraded) = &catch_up.degraded {
            self.send(&Event::Status(degraded.clone())).await?;
        }
        if let Some(snapshot) = &catch_up.snapshot {
            self.send(&Event::Metrics(snapshot.clone())).await?;
        }
        for alert in &catch_up.alerts {
            self.send(&Event::Alert(alert.clone())).await?;
        }

        loop {
            // snapshots first, an alert is always derived from an earlier snapshot
            let event = tokio::select! {
                biased;

                _ = self.shutdown.changed() => {
                    trace!("gateway shutting down");
                    return Ok(());
                }

                result = self.metrics.recv() => result,

                result = self.alerts.recv() => result,
            };

            let Ok(event) = event else {
                trace!("broker closed");
                return Ok(());
            };

            if catch_up.covers(&event) {
                trace!("skipping event already sent in catch-up");
                continue;
            }

            self.send(&event).await?;
        }
    }

    async fn send(&mut self, event: &Event) -> Result<(), DeliveryError> {
        let text = match serde_json::to_string(event) {
            Ok(text) => text,
            Err(e) => {
                warn!("failed to serialize event: {e}");
                return Ok(());
            }
        };

        match tokio::time::timeout(self.send_timeout, self.connection.send(text)).await {
            Ok(result) => result,
            Err(_) => Err(DeliveryError::Timeout(self.send_timeout.as_millis())),
        }
    }
}

/// Handle for controlling a GatewayActor
#[derive(Clone)]
pub struct GatewayHandle {
    sender: mpsc::Sender<GatewayCommand>,
}

impl GatewayHandle {
    /// Spawn a new gateway actor subscribed to both topics
    pub fn spawn(
        broker: Broker,
        metrics_topic: TopicHandle,
        alerts_topic: TopicHandle,
        config: GatewayConfig,
    ) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(32);

        let actor = GatewayActor::new(broker, metrics_topic, alerts_topic, cmd_rx, config);

        tokio::spawn(actor.run());

        Self { sender: cmd_tx }
    }

    /// Register a connection
    pub async fn attach(&self, connection: Box<dyn Connection>) -> anyhow::Result<()> {
        self.sender
            .send(GatewayCommand::Attach { connection })
            .await
            .map_err(|_| anyhow::anyhow!("gateway is not running"))
    }

    /// Attach every connection the transport accepts until it closes
    pub fn serve<T>(&self, mut transport: T) -> JoinHandle<()>
    where
        T: Transport + 'static,
    {
        let handle = self.clone();
        tokio::spawn(async move {
            while let Some(connection) = transport.accept().await {
                if handle.attach(connection).await.is_err() {
                    debug!("gateway stopped, no longer accepting connections");
                    break;
                }
            }
        })
    }

    pub async fn latest_snapshot(&self) -> Option<Snapshot> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(GatewayCommand::LatestSnapshot { respond_to: tx })
            .await
            .ok()?;

        rx.await.ok()?
    }

    /// Most recent alerts, oldest first
    pub async fn recent_alerts(&self, limit: usize) -> Vec<Alert> {
        let (tx, rx) = oneshot::channel();
        if self
            .sender
            .send(GatewayCommand::RecentAlerts {
                limit,
                respond_to: tx,
            })
            .await
            .is_err()
        {
            return vec![];
        }

        rx.await.unwrap_or_default()
    }

    pub async fn connected_clients(&self) -> usize {
        let (tx, rx) = oneshot::channel();
        if self
            .sender
            .send(GatewayCommand::ConnectedClients { respond_to: tx })
            .await
            .is_err()
        {
            return 0;
        }

        rx.await.unwrap_or_default()
    }

    /// Close every connection and stop the actor
    pub async fn shutdown(&self) {
        let (tx, rx) = oneshot::channel();
        if self
            .sender
            .send(GatewayCommand::Shutdown { respond_to: tx })
            .await
            .is_ok()
        {
            let _ = rx.await;
        }
    }
}
