//! StorageActor - Persists alerts to the storage sink
//!
//! Snapshots are appended by the publisher itself. Alerts are produced on the
//! alert topic, so this actor subscribes to it and hands every alert to the
//! sink. An append failure is counted and logged; the actor keeps going.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, instrument, trace, warn};

use crate::alerts::Alert;
use crate::broker::{Broker, Subscription, TopicHandle};
use crate::error::BrokerError;
use crate::storage::StorageSink;

use super::messages::{Event, StorageCommand, StorageStats};

/// Actor feeding the alert topic into a storage sink
pub struct StorageActor {
    sink: Arc<dyn StorageSink>,
    alerts: Subscription,
    command_rx: mpsc::Receiver<StorageCommand>,
    stats: StorageStats,
}

impl StorageActor {
    pub fn new(
        sink: Arc<dyn StorageSink>,
        alerts: Subscription,
        command_rx: mpsc::Receiver<StorageCommand>,
    ) -> Self {
        Self {
            sink,
            alerts,
            command_rx,
            stats: StorageStats::default(),
        }
    }

    /// Run the actor's main loop
    #[instrument(skip(self), fields(subscription = %self.alerts.id()))]
    pub async fn run(mut self) {
        debug!("starting storage actor");

        loop {
            tokio::select! {
                result = self.alerts.recv() => {
                    match result {
                        Ok(Event::Alert(alert)) => self.store_alert(alert).await,
                        Ok(other) => trace!("ignoring event: {other:?}"),
                        Err(BrokerError::Closed) => {
                            debug!("alert topic closed, shutting down");
                            break;
                        }
                    }
                }

                Some(cmd) = self.command_rx.recv() => {
                    match cmd {
                        StorageCommand::GetStats { respond_to } => {
                            let _ = respond_to.send(self.stats.clone());
                        }

                        StorageCommand::Shutdown => {
                            debug!("received shutdown command");
                            break;
                        }
                    }
                }

                else => {
                    warn!("command channel closed, shutting down");
                    break;
                }
            }
        }

        debug!(
            "storage actor stopped ({} alerts stored, {} failures)",
            self.stats.alerts_appended, self.stats.failures
        );
    }

    async fn store_alert(&mut self, alert: Alert) {
        match self.sink.append_alert(&alert).await {
            Ok(()) => {
                self.stats.alerts_appended += 1;
                trace!("stored alert {}", alert.kind);
            }
            Err(e) => {
                // don't crash the actor, the next alert is tried again
                self.stats.failures += 1;
                error!("failed to store alert: {e}");
            }
        }
    }
}

/// Handle for controlling a StorageActor
#[derive(Clone)]
pub struct StorageHandle {
    sender: mpsc::Sender<StorageCommand>,
}

impl StorageHandle {
    /// Spawn a new storage actor subscribed to `alerts_topic`
    pub fn spawn(sink: Arc<dyn StorageSink>, broker: &Broker, alerts_topic: &TopicHandle) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(32);

        let actor = StorageActor::new(sink, broker.subscribe(alerts_topic), cmd_rx);

        tokio::spawn(actor.run());

        Self { sender: cmd_tx }
    }

    /// Get storage statistics
    pub async fn get_stats(&self) -> Option<StorageStats> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(StorageCommand::GetStats { respond_to: tx })
            .await
            .ok()?;

        rx.await.ok()
    }

    /// Shutdown the storage actor
    pub async fn shutdown(&self) {
        let _ = self.sender.send(StorageCommand::Shutdown).await;
    }
}
