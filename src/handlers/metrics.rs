//! # Metrics Query Handlers

use axum::{
    extract::{Path, Query, State},
    response::Json,
};
use serde::Deserialize;
use uuid::Uuid;

use super::params::parse_timestamp;
use crate::auth::OperatorAuth;
use crate::error::{ApiError, EngineError};
use crate::models::metrics_snapshot;
use crate::repositories::MetricsRepository;
use crate::server::AppState;

#[derive(Debug, Deserialize)]
pub struct MetricsHistoryQuery {
    /// Earliest `period_start` (RFC 3339)
    pub start: Option<String>,
    /// Latest `period_end` (RFC 3339)
    pub end: Option<String>,
}

/// Latest metrics snapshot by period end, then computation time
#[utoipa::path(
    get,
    path = "/businesses/{business_id}/metrics/latest",
    security(("bearer_auth" = [])),
    params(("business_id" = Uuid, Path, description = "Business identifier")),
    responses(
        (status = 200, description = "Latest snapshot", body = metrics_snapshot::Model),
        (status = 401, description = "Missing or invalid bearer token", body = ApiError),
        (status = 404, description = "No snapshot yet", body = ApiError)
    ),
    tag = "metrics"
)]
pub async fn latest_metrics(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    Path(business_id): Path<Uuid>,
) -> Result<Json<metrics_snapshot::Model>, ApiError> {
    let snapshot = MetricsRepository::new(state.db.clone())
        .latest(business_id)
        .await?
        .ok_or_else(|| EngineError::NotFound(format!("no metrics snapshot for {business_id}")))?;
    Ok(Json(snapshot))
}

/// Snapshot history within an optional period range, oldest first
#[utoipa::path(
    get,
    path = "/businesses/{business_id}/metrics",
    security(("bearer_auth" = [])),
    params(
        ("business_id" = Uuid, Path, description = "Business identifier"),
        ("start" = Option<String>, Query, description = "Earliest period start (RFC 3339)"),
        ("end" = Option<String>, Query, description = "Latest period end (RFC 3339)")
    ),
    responses(
        (status = 200, description = "Snapshot history", body = [metrics_snapshot::Model]),
        (status = 400, description = "Invalid range", body = ApiError),
        (status = 401, description = "Missing or invalid bearer token", body = ApiError)
    ),
    tag = "metrics"
)]
pub async fn metrics_history(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    Path(business_id): Path<Uuid>,
    Query(params): Query<MetricsHistoryQuery>,
) -> Result<Json<Vec<metrics_snapshot::Model>>, ApiError> {
    let start = parse_timestamp("start", params.start.as_deref())?;
    let end = parse_timestamp("end", params.end.as_deref())?;
    if let (Some(start), Some(end)) = (start, end)
        && start >= end
    {
        return Err(EngineError::validation("start must be before end").into());
    }

    let snapshots = MetricsRepository::new(state.db.clone())
        .history(business_id, start, end)
        .await?;
    Ok(Json(snapshots))
}
