//! Alert endpoint

use axum::{
    Json,
    extract::{Query, State},
};

use crate::alerts::Alert;
use crate::api::{error::ApiResult, state::ApiState, types::LimitQuery};
use crate::storage::{Record, RecordKind};

const DEFAULT_ALERT_LIMIT: usize = 50;

/// GET /api/alerts?limit=N
///
/// Most recent alerts, newest first
pub async fn get_alerts(
    State(state): State<ApiState>,
    Query(query): Query<LimitQuery>,
) -> ApiResult<Json<Vec<Alert>>> {
    let alerts = state
        .pipeline
        .storage()
        .query_recent(RecordKind::Alert, query.limit_or(DEFAULT_ALERT_LIMIT)?)
        .await?
        .into_iter()
        .filter_map(Record::into_alert)
        .collect();

    Ok(Json(alerts))
}
