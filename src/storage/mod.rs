//! Storage collaborator for snapshots and alerts
//!
//! The pipeline only needs an append-and-query-recent sink. Nothing in the
//! distribution path waits on it, so a failing sink never stalls sampling or
//! fan-out.
//!
//! ## Backends
//!
//! - **In-Memory** (default): bounded ring buffers with a retention window
//!
//! ## Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use system_monitor::storage::{MemoryStore, StorageSink};
//!
//! let sink: Arc<dyn StorageSink> = Arc::new(MemoryStore::default());
//! ```

pub mod backend;
pub mod memory;

pub use backend::{Record, RecordKind, StorageSink};
pub use memory::MemoryStore;
pub use crate::error::{StorageError, StorageResult};
