//! Error taxonomy of the pipeline
//!
//! Every error is contained where it happens:
//!
//! - [`SamplerError`] is transient, the publisher retries on the next tick
//! - [`BrokerError::Closed`] marks the end of a subscription, not a failure
//! - [`DeliveryError`] drops a single dashboard connection
//! - [`StorageError`] is logged, the in-memory pipeline does not depend on it

use thiserror::Error;

/// Failure to read the OS metrics source
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SamplerError {
    #[error("metrics source unavailable: {0}")]
    SourceUnavailable(String),
}

/// Terminal signal of a broker subscription
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum BrokerError {
    #[error("broker closed")]
    Closed,
}

/// A dashboard connection could not accept a write
#[derive(Debug, Clone, Error, PartialEq)]
pub enum DeliveryError {
    #[error("connection closed by peer")]
    Disconnected,

    #[error("write timed out after {0}ms")]
    Timeout(u128),

    #[error("transport error: {0}")]
    Transport(String),
}

/// Result type alias for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors of the storage collaborator
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage backend unavailable: {0}")]
    Unavailable(String),

    #[error("storage query failed: {0}")]
    QueryFailed(String),
}
