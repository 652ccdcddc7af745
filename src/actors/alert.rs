//! AlertActor - Evaluates snapshots and publishes alerts
//!
//! The actor is the single owner of the [`AlertEngine`] and therefore of all
//! rule state. Snapshots are evaluated strictly in arrival order; every alert a
//! snapshot produces is published to the alert topic before the next snapshot
//! is looked at.
//!
//! Status events on the metrics topic are ignored.

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, instrument, trace, warn};

use crate::alerts::{AlertEngine, AlertRule, RuleStatus};
use crate::broker::{Broker, Subscription, TopicHandle};
use crate::error::BrokerError;

use super::messages::{AlertCommand, Event};

/// Actor that evaluates snapshots and publishes alerts
pub struct AlertActor {
    engine: AlertEngine,

    /// Metrics topic subscription
    metrics: Subscription,

    broker: Broker,

    /// Destination of produced alerts
    alerts_topic: TopicHandle,

    command_rx: mpsc::Receiver<AlertCommand>,
}

impl AlertActor {
    pub fn new(
        rules: Vec<AlertRule>,
        broker: Broker,
        metrics_topic: &TopicHandle,
        alerts_topic: TopicHandle,
        command_rx: mpsc::Receiver<AlertCommand>,
    ) -> Self {
        Self {
            engine: AlertEngine::new(rules),
            metrics: broker.subscribe(metrics_topic),
            broker,
            alerts_topic,
            command_rx,
        }
    }

    /// Run the actor's main loop
    #[instrument(skip(self), fields(subscription = %self.metrics.id()))]
    pub async fn run(mut self) {
        debug!("starting alert actor");

        loop {
            tokio::select! {
                result = self.metrics.recv() => {
                    match result {
                        Ok(Event::Metrics(snapshot)) => {
                            for alert in self.engine.evaluate(&snapshot) {
                                trace!("publishing alert: {}", alert.message);
                                self.broker.publish(&self.alerts_topic, Event::Alert(alert));
                            }
                        }
                        Ok(other) => {
                            trace!("ignoring non-snapshot event: {other:?}");
                        }
                        Err(BrokerError::Closed) => {
                            debug!("metrics topic closed, shutting down");
                            break;
                        }
                    }
                }

                Some(cmd) = self.command_rx.recv() => {
                    match cmd {
                        AlertCommand::GetState { respond_to } => {
                            let _ = respond_to.send(self.engine.statuses());
                        }

                        AlertCommand::Shutdown => {
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

        let dropped = self.metrics.dropped();
        if dropped > 0 {
            warn!("alert actor dropped {dropped} events while overloaded");
        }
        debug!("alert actor stopped");
    }
}

/// Handle for controlling an AlertActor
#[derive(Clone)]
pub struct AlertHandle {
    sender: mpsc::Sender<AlertCommand>,
}

impl AlertHandle {
    /// Spawn a new alert actor
    ///
    /// The metrics subscription is taken before this returns, so no snapshot
    /// published afterwards is missed.
    pub fn spawn(
        rules: Vec<AlertRule>,
        broker: Broker,
        metrics_topic: &TopicHandle,
        alerts_topic: TopicHandle,
    ) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(32);

        let actor = AlertActor::new(rules, broker, metrics_topic, alerts_topic, cmd_rx);

        tokio::spawn(actor.run());

        Self { sender: cmd_tx }
    }

    /// Get the state of every rule, in configuration order
    pub async fn get_state(&self) -> Option<Vec<RuleStatus>> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(AlertCommand::GetState { respond_to: tx })
            .await
            .ok()?;

        rx.await.ok()
    }

    /// Shutdown the alert actor
    pub async fn shutdown(&self) {
        let _ = self.sender.send(AlertCommand::Shutdown).await;
    }
}
