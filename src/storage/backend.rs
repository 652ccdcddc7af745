//! Storage sink trait definition

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::Snapshot;
use crate::alerts::Alert;
use crate::error::StorageResult;

/// Kind of record to query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Snapshot,
    Alert,
}

/// A stored snapshot or alert
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Record {
    Snapshot(Snapshot),
    Alert(Alert),
}

impl Record {
    pub fn kind(&self) -> RecordKind {
        match self {
            Record::Snapshot(_) => RecordKind::Snapshot,
            Record::Alert(_) => RecordKind::Alert,
        }
    }

    pub fn into_snapshot(self) -> Option<Snapshot> {
        match self {
            Record::Snapshot(snapshot) => Some(snapshot),
            Record::Alert(_) => None,
        }
    }

    pub fn into_alert(self) -> Option<Alert> {
        match self {
            Record::Alert(alert) => Some(alert),
            Record::Snapshot(_) => None,
        }
    }
}

/// Trait for storage sinks
///
/// Implementations must be `Send + Sync` since the publisher, the storage
/// actor and the HTTP layer share one instance.
///
/// ## Error Handling
///
/// Callers log a [`StorageError`](crate::error::StorageError) and carry on;
/// no append failure is ever propagated into the pipeline.
#[async_trait]
pub trait StorageSink: Send + Sync {
    /// Append a snapshot
    async fn append_snapshot(&self, snapshot: &Snapshot) -> StorageResult<()>;

    /// Append an alert
    async fn append_alert(&self, alert: &Alert) -> StorageResult<()>;

    /// Get up to `limit` of the most recent records of a kind, newest first
    async fn query_recent(&self, kind: RecordKind, limit: usize) -> StorageResult<Vec<Record>>;
}
