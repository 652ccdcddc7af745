//! In-memory storage (no persistence)
//!
//! Keeps the most recent snapshots and alerts in ring buffers. Entries older
//! than the retention window, measured against the newest appended record,
//! are evicted on every append.
//!
//! ## Limitations
//!
//! - **No persistence**: All data lost on restart
//! - **Limited capacity**: Ring buffer size is fixed

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::trace;

use super::backend::{Record, RecordKind, StorageSink};
use crate::Snapshot;
use crate::Timestamp;
use crate::alerts::Alert;
use crate::error::StorageResult;

/// Default number of records kept per kind
pub const DEFAULT_CAPACITY: usize = 1000;

/// Default retention window
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Default)]
struct Buffers {
    snapshots: VecDeque<Snapshot>,
    alerts: VecDeque<Alert>,
}

/// In-memory storage sink
pub struct MemoryStore {
    buffers: RwLock<Buffers>,
    capacity: usize,
    retention: Duration,
}

impl MemoryStore {
    pub fn new(capacity: usize, retention: Duration) -> Self {
        Self {
            buffers: RwLock::new(Buffers::default()),
            capacity: capacity.max(1),
            retention,
        }
    }

    pub fn len(&self, kind: RecordKind) -> usize {
        let buffers = self.buffers.read();
        match kind {
            RecordKind::Snapshot => buffers.snapshots.len(),
            RecordKind::Alert => buffers.alerts.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        let buffers = self.buffers.read();
        buffers.snapshots.is_empty() && buffers.alerts.is_empty()
    }

    fn push<T>(
        buffer: &mut VecDeque<T>,
        item: T,
        capacity: usize,
        retention: Duration,
        timestamp: impl Fn(&T) -> Timestamp,
    ) {
        let newest = timestamp(&item).wall();
        buffer.push_back(item);

        while buffer.len() > capacity {
            buffer.pop_front();
        }

        // a window reaching before the representable range keeps everything
        let Some(cutoff) = chrono::Duration::from_std(retention)
            .ok()
            .and_then(|retention| newest.checked_sub_signed(retention))
        else {
            return;
        };
        while buffer
            .front()
            .is_some_and(|oldest| timestamp(oldest).wall() < cutoff)
        {
            buffer.pop_front();
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY, DEFAULT_RETENTION)
    }
}

#[async_trait]
impl StorageSink for MemoryStore {
    async fn append_snapshot(&self, snapshot: &Snapshot) -> StorageResult<()> {
        let mut buffers = self.buffers.write();
        Self::push(
            &mut buffers.snapshots,
            snapshot.clone(),
            self.capacity,
            self.retention,
            |s| s.timestamp,
        );
        trace!("stored snapshot, {} kept", buffers.snapshots.len());
        Ok(())
    }

    async fn append_alert(&self, alert: &Alert) -> StorageResult<()> {
        let mut buffers = self.buffers.write();
        Self::push(
            &mut buffers.alerts,
            alert.clone(),
            self.capacity,
            self.retention,
            |a| a.timestamp,
        );
        trace!("stored alert, {} kept", buffers.alerts.len());
        Ok(())
    }

    async fn query_recent(&self, kind: RecordKind, limit: usize) -> StorageResult<Vec<Record>> {
        let buffers = self.buffers.read();

        let records = match kind {
            RecordKind::Snapshot => buffers
                .snapshots
                .iter()
                .rev()
                .take(limit)
                .cloned()
                .map(Record::Snapshot)
                .collect(),
            RecordKind::Alert => buffers
                .alerts
                .iter()
                .rev()
                .take(limit)
                .cloned()
                .map(Record::Alert)
                .collect(),
        };

        Ok(records)
    }
}
