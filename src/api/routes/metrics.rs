//! Snapshot endpoints

use axum::{
    Json,
    extract::{Query, State},
};

use crate::Snapshot;
use crate::api::{
    error::{ApiError, ApiResult},
    state::ApiState,
    types::LimitQuery,
};
use crate::storage::{Record, RecordKind};

/// Snapshots returned by the history endpoint without `limit`
const DEFAULT_HISTORY_LIMIT: usize = 100;

/// GET /api/metrics/latest
pub async fn get_latest_metrics(State(state): State<ApiState>) -> ApiResult<Json<Snapshot>> {
    state
        .pipeline
        .latest_snapshot()
        .await
        .map(Json)
        .ok_or(ApiError::NoMetrics)
}

/// GET /api/metrics/history?limit=N
///
/// Most recent snapshots, oldest first
pub async fn get_metrics_history(
    State(state): State<ApiState>,
    Query(query): Query<LimitQuery>,
) -> ApiResult<Json<Vec<Snapshot>>> {
    let records = state
        .pipeline
        .storage()
        .query_recent(RecordKind::Snapshot, query.limit_or(DEFAULT_HISTORY_LIMIT)?)
        .await?;

    let mut snapshots: Vec<Snapshot> = records
        .into_iter()
        .filter_map(Record::into_snapshot)
        .collect();
    snapshots.reverse();

    Ok(Json(snapshots))
}
