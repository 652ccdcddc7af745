//! PublisherActor - Samples the host and publishes snapshots
//!
//! ## State Machine
//!
//! ```text
//!            tick                 Ok(snapshot)
//!   Idle ──────────▶ Sampling ─────────────────▶ Publishing ──▶ Idle
//!     ▲                  │
//!     │                  │ Err(SourceUnavailable)
//!     │                  ▼
//!     │      consecutive_failures += 1
//!     │      == failure_threshold → publish "source degraded" once ──▶ Degraded
//!     │
//!     └──── Degraded keeps sampling, first success publishes "source recovered"
//! ```
//!
//! Every successful snapshot goes to the metrics topic first and is then
//! queued for storage. A separate writer task drains that queue into the
//! sink, so a slow sink never delays a tick. When the queue is full the
//! snapshot is not stored; a storage failure is logged and does not affect
//! the loop.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, error, info, instrument, trace, warn};

use crate::broker::{Broker, TopicHandle};
use crate::monitors::{Clock, Sampler};
use crate::Snapshot;
use crate::storage::StorageSink;

use super::messages::{
    Event, PublisherCommand, PublisherState, PublisherStatus, SourceStatus, StatusEvent,
    TickOutcome,
};

/// Publisher settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublisherConfig {
    /// Sampling period
    pub interval: Duration,

    /// Consecutive failures before switching to degraded
    pub failure_threshold: usize,
}

/// Snapshots waiting for the storage writer
const STORAGE_QUEUE_CAPACITY: usize = 32;

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            failure_threshold: 3,
        }
    }
}

/// Actor driving the sampler on a fixed period
pub struct PublisherActor {
    sampler: Box<dyn Sampler>,
    broker: Broker,
    topic: TopicHandle,
    storage_tx: mpsc::Sender<Snapshot>,
    command_rx: mpsc::Receiver<PublisherCommand>,
    status_tx: watch::Sender<PublisherStatus>,
    config: PublisherConfig,
    clock: Clock,
    degraded: bool,
}

impl PublisherActor {
    pub fn new(
        sampler: Box<dyn Sampler>,
        broker: Broker,
        topic: TopicHandle,
        storage_tx: mpsc::Sender<Snapshot>,
        command_rx: mpsc::Receiver<PublisherCommand>,
        status_tx: watch::Sender<PublisherStatus>,
        config: PublisherConfig,
    ) -> Self {
        Self {
            sampler,
            broker,
            topic,
            storage_tx,
            command_rx,
            status_tx,
            config,
            clock: Clock::new(),
            degraded: false,
        }
    }

    /// Run the actor's main loop
    ///
    /// Runs until a Shutdown command is received or every handle is dropped.
    /// A tick that has started always completes first.
    #[instrument(skip(self), fields(topic = %self.topic.name()))]
    pub async fn run(mut self) {
        debug!("starting publisher actor");

        let mut ticker = Self::ticker(self.config.interval);

        loop {
            tokio::select! {
                // Timer tick - sample and publish
                _ = ticker.tick() => {
                    self.tick().await;
                }

                cmd = self.command_rx.recv() => {
                    match cmd {
                        Some(PublisherCommand::TickNow { respond_to }) => {
                            debug!("received TickNow command");
                            let outcome = self.tick().await;
                            let _ = respond_to.send(outcome);
                        }

                        Some(PublisherCommand::UpdateInterval { interval_secs }) => {
                            debug!("updating interval to {interval_secs}s");
                            self.config.interval = Duration::from_secs(interval_secs.max(1));
                            ticker = Self::ticker(self.config.interval);
                        }

                        Some(PublisherCommand::Shutdown) => {
                            debug!("received shutdown command");
                            break;
                        }

                        // every handle is gone
                        None => {
                            warn!("command channel closed, shutting down");
                            break;
                        }
                    }
                }
            }
        }

        self.set_state(PublisherState::Stopped);
        info!("publisher actor stopped");
    }

    fn ticker(period: Duration) -> tokio::time::Interval {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker
    }

    /// Execute one sampling tick
    async fn tick(&mut self) -> TickOutcome {
        self.set_state(PublisherState::Sampling);
        self.status_tx.send_modify(|status| status.ticks += 1);

        let sample = self.sampler.sample();

        let outcome = match sample {
            Ok(snapshot) => {
                self.set_state(PublisherState::Publishing);

                let recovered = std::mem::take(&mut self.degraded);
                if recovered {
                    info!("metrics source recovered");
                    self.publish_status(SourceStatus::Recovered, 0, "metrics source recovered");
                }
                self.status_tx
                    .send_modify(|status| status.consecutive_failures = 0);

                trace!("publishing snapshot taken at {}", snapshot.timestamp);
                self.broker
                    .publish(&self.topic, Event::Metrics(snapshot.clone()));

                self.queue_for_storage(snapshot);

                if recovered {
                    TickOutcome::Recovered
                } else {
                    TickOutcome::Published
                }
            }

            Err(e) => {
                let mut failures = 0;
                self.status_tx.send_modify(|status| {
                    status.consecutive_failures += 1;
                    failures = status.consecutive_failures;
                });

                warn!("sampling failed ({failures} in a row): {e}");

                if self.degraded {
                    TickOutcome::StillDegraded
                } else if failures >= self.config.failure_threshold {
                    self.degraded = true;
                    error!("metrics source degraded after {failures} consecutive failures");
                    self.publish_status(
                        SourceStatus::Degraded,
                        failures,
                        &format!("metrics source degraded: {e}"),
                    );
                    TickOutcome::BecameDegraded
                } else {
                    TickOutcome::Skipped
                }
            }
        };

        self.set_state(if self.degraded {
            PublisherState::Degraded
        } else {
            PublisherState::Idle
        });

        outcome
    }

    fn queue_for_storage(&self, snapshot: Snapshot) {
        match self.storage_tx.try_send(snapshot) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(snapshot)) => {
                warn!(
                    "storage is falling behind, not storing snapshot taken at {}",
                    snapshot.timestamp
                );
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                error!("storage writer is gone, snapshot not stored");
            }
        }
    }

    fn publish_status(&mut self, status: SourceStatus, consecutive_failures: usize, message: &str) {
        let event = Event::Status(StatusEvent {
            timestamp: self.clock.now(),
            status,
            consecutive_failures,
            message: message.to_string(),
        });
        self.broker.publish(&self.topic, event);
    }

    fn set_state(&self, state: PublisherState) {
        self.status_tx.send_modify(|status| status.state = state);
    }
}

/// Drain queued snapshots into the sink until the publisher stops
async fn write_snapshots(storage: Arc<dyn StorageSink>, mut rx: mpsc::Receiver<Snapshot>) {
    while let Some(snapshot) = rx.recv().await {
        if let Err(e) = storage.append_snapshot(&snapshot).await {
            error!("failed to store snapshot: {e}");
        }
    }
    trace!("snapshot writer stopped");
}

/// Handle for controlling a PublisherActor
#[derive(Clone)]
pub struct PublisherHandle {
    sender: mpsc::Sender<PublisherCommand>,
    status_rx: watch::Receiver<PublisherStatus>,
}

impl PublisherHandle {
    /// Spawn a new publisher actor
    pub fn spawn(
        sampler: Box<dyn Sampler>,
        broker: Broker,
        topic: TopicHandle,
        storage: Arc<dyn StorageSink>,
        config: PublisherConfig,
    ) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(32);
        let (status_tx, status_rx) = watch::channel(PublisherStatus::default());
        let (storage_tx, storage_rx) = mpsc::channel(STORAGE_QUEUE_CAPACITY);

        let actor =
            PublisherActor::new(sampler, broker, topic, storage_tx, cmd_rx, status_tx, config);

        tokio::spawn(write_snapshots(storage, storage_rx));
        tokio::spawn(actor.run());

        Self {
            sender: cmd_tx,
            status_rx,
        }
    }

    /// Run a tick immediately and report its outcome
    pub async fn tick_now(&self) -> Result<TickOutcome> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(PublisherCommand::TickNow { respond_to: tx })
            .await
            .context("failed to send TickNow command")?;

        rx.await.context("failed to receive tick outcome")
    }

    /// Update the sampling period
    pub async fn update_interval(&self, interval_secs: u64) -> Result<()> {
        self.sender
            .send(PublisherCommand::UpdateInterval { interval_secs })
            .await
            .context("failed to send UpdateInterval command")?;
        Ok(())
    }

    /// Current status
    pub fn status(&self) -> PublisherStatus {
        *self.status_rx.borrow()
    }

    /// Stop the publisher and wait until its loop has exited
    pub async fn shutdown(&self) {
        let _ = self.sender.send(PublisherCommand::Shutdown).await;

        let mut status_rx = self.status_rx.clone();
        // the sender is dropped when the actor exits, which also ends the wait
        let _ = status_rx
            .wait_for(|status| status.state == PublisherState::Stopped)
            .await;
    }
}
