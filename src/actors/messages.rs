//! Message types for actor communication
//!
//! ## Design Principles
//!
//! 1. **Commands**: Request/response messages sent to specific actors via mpsc
//! 2. **Events**: Topic payloads published through the [`Broker`](crate::broker::Broker)
//! 3. **Immutability**: Events are cloneable values, one clone per subscriber

use std::fmt;

use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

use crate::alerts::{Alert, RuleStatus};
use crate::actors::gateway::Connection;
use crate::{Snapshot, Timestamp};

/// Topic carrying snapshots and publisher status events
pub const METRICS_TOPIC: &str = "system_metrics";

/// Topic carrying alerts
pub const ALERTS_TOPIC: &str = "system_alerts";

/// Payload of a broker topic
///
/// Serialized as `{"event": <kind>, "data": <payload>}` for dashboard clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum Event {
    #[serde(rename = "metrics_update")]
    Metrics(Snapshot),

    #[serde(rename = "alert_update")]
    Alert(Alert),

    #[serde(rename = "status")]
    Status(StatusEvent),
}

/// Status notification for dashboards
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusEvent {
    pub timestamp: Timestamp,
    pub status: SourceStatus,
    pub consecutive_failures: usize,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceStatus {
    /// Greeting sent to a freshly attached connection
    Connected,
    /// Sampling failed for the configured number of consecutive ticks
    Degraded,
    /// First successful sample after being degraded
    Recovered,
}

/// Commands that can be sent to the PublisherActor
#[derive(Debug)]
pub enum PublisherCommand {
    /// Run a tick immediately (bypassing the interval timer)
    TickNow {
        respond_to: oneshot::Sender<TickOutcome>,
    },

    /// Update the sampling period, takes effect after the current tick
    UpdateInterval { interval_secs: u64 },

    /// Stop after any in-flight tick
    Shutdown,
}

/// States of the publisher loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PublisherState {
    Idle,
    Sampling,
    Publishing,
    Degraded,
    Stopped,
}

impl fmt::Display for PublisherState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PublisherState::Idle => "idle",
            PublisherState::Sampling => "sampling",
            PublisherState::Publishing => "publishing",
            PublisherState::Degraded => "degraded",
            PublisherState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Observable publisher status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublisherStatus {
    pub state: PublisherState,
    pub consecutive_failures: usize,
    pub ticks: u64,
}

impl Default for PublisherStatus {
    fn default() -> Self {
        Self {
            state: PublisherState::Idle,
            consecutive_failures: 0,
            ticks: 0,
        }
    }
}

/// Result of a single publisher tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Snapshot published
    Published,
    /// Sampling failed, below the degraded threshold
    Skipped,
    /// Sampling failed and the threshold was just reached
    BecameDegraded,
    /// Sampling failed while already degraded
    StillDegraded,
    /// Sampling succeeded after being degraded, snapshot published
    Recovered,
}

/// Commands that can be sent to the AlertActor
#[derive(Debug)]
pub enum AlertCommand {
    /// Get the state of every rule
    GetState {
        respond_to: oneshot::Sender<Vec<RuleStatus>>,
    },

    /// Gracefully shut down the alert actor
    Shutdown,
}

/// Commands that can be sent to the StorageActor
#[derive(Debug)]
pub enum StorageCommand {
    GetStats {
        respond_to: oneshot::Sender<StorageStats>,
    },

    /// Gracefully shut down the storage actor
    Shutdown,
}

/// Storage actor statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StorageStats {
    /// Alerts handed to the sink
    pub alerts_appended: u64,

    /// Appends the sink rejected
    pub failures: u64,
}

/// Commands that can be sent to the GatewayActor
pub enum GatewayCommand {
    /// Register a new dashboard connection
    Attach { connection: Box<dyn Connection> },

    LatestSnapshot {
        respond_to: oneshot::Sender<Option<Snapshot>>,
    },

    RecentAlerts {
        limit: usize,
        respond_to: oneshot::Sender<Vec<Alert>>,
    },

    ConnectedClients {
        respond_to: oneshot::Sender<usize>,
    },

    /// Close every connection and stop
    Shutdown { respond_to: oneshot::Sender<()> },
}

impl fmt::Debug for GatewayCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GatewayCommand::Attach { connection } => f
                .debug_struct("Attach")
                .field("peer", &connection.peer())
                .finish(),
            GatewayCommand::LatestSnapshot { .. } => f.write_str("LatestSnapshot"),
            GatewayCommand::RecentAlerts { limit, .. } => {
                f.debug_struct("RecentAlerts").field("limit", limit).finish()
            }
            GatewayCommand::ConnectedClients { .. } => f.write_str("ConnectedClients"),
            GatewayCommand::Shutdown { .. } => f.write_str("Shutdown"),
        }
    }
}
