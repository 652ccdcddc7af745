//! API response and query types

use serde::{Deserialize, Serialize};

use crate::actors::messages::PublisherState;
use crate::api::error::ApiError;

/// Response for GET /api/health
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
    pub publisher_state: PublisherState,
    pub consecutive_failures: usize,
    pub connected_clients: usize,
}

/// `?limit=N` query parameter
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<usize>,
}

impl LimitQuery {
    /// Requested limit, `default` when absent; zero is rejected
    pub fn limit_or(&self, default: usize) -> Result<usize, ApiError> {
        match self.limit {
            Some(0) => Err(ApiError::InvalidLimit),
            Some(limit) => Ok(limit),
            None => Ok(default),
        }
    }
}
