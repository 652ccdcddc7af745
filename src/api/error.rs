//! Mapping of pipeline errors to HTTP responses
//!
//! Every error renders as `{"error": "<message>"}` with a matching status code.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::error::StorageError;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Nothing has been sampled yet
    #[error("No metrics available")]
    NoMetrics,

    #[error("limit must be at least 1")]
    InvalidLimit,
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Storage(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::NoMetrics => StatusCode::NOT_FOUND,
            ApiError::InvalidLimit => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("request failed: {self}");
        }

        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
