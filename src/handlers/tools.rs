//! # Agent Tool Handlers
//!
//! Thin read-only wrappers over [`ToolService`].

use axum::{
    extract::{Path, Query, State},
    response::Json,
};
use serde::Deserialize;
use uuid::Uuid;

use super::params::parse_limit;
use crate::auth::OperatorAuth;
use crate::error::ApiError;
use crate::models::recommendation;
use crate::server::AppState;
use crate::tools::{MetricSummary, ReadinessBreakdown, ToolService};

#[derive(Debug, Deserialize)]
pub struct TopRecommendationsQuery {
    /// Maximum number of recommendations (default: 3, max: 20)
    pub limit: Option<u32>,
}

/// Latest score with per-factor contributions
#[utoipa::path(
    get,
    path = "/tools/businesses/{business_id}/readiness-breakdown",
    security(("bearer_auth" = [])),
    params(("business_id" = Uuid, Path, description = "Business identifier")),
    responses(
        (status = 200, description = "Score breakdown", body = ReadinessBreakdown),
        (status = 401, description = "Missing or invalid bearer token", body = ApiError),
        (status = 404, description = "No score yet", body = ApiError)
    ),
    tag = "tools"
)]
pub async fn readiness_breakdown(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    Path(business_id): Path<Uuid>,
) -> Result<Json<ReadinessBreakdown>, ApiError> {
    let breakdown = ToolService::new(state.db.clone())
        .readiness_breakdown(business_id)
        .await?;
    Ok(Json(breakdown))
}

/// Latest metrics in a flat, agent-friendly shape
#[utoipa::path(
    get,
    path = "/tools/businesses/{business_id}/metric-summary",
    security(("bearer_auth" = [])),
    params(("business_id" = Uuid, Path, description = "Business identifier")),
    responses(
        (status = 200, description = "Metric summary", body = MetricSummary),
        (status = 401, description = "Missing or invalid bearer token", body = ApiError),
        (status = 404, description = "No snapshot yet", body = ApiError)
    ),
    tag = "tools"
)]
pub async fn metric_summary(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    Path(business_id): Path<Uuid>,
) -> Result<Json<MetricSummary>, ApiError> {
    let summary = ToolService::new(state.db.clone())
        .metric_summary(business_id)
        .await?;
    Ok(Json(summary))
}

/// Highest-ranked pending recommendations
#[utoipa::path(
    get,
    path = "/tools/businesses/{business_id}/top-recommendations",
    security(("bearer_auth" = [])),
    params(
        ("business_id" = Uuid, Path, description = "Business identifier"),
        ("limit" = Option<u32>, Query, description = "Maximum number of results (default 3, max 20)")
    ),
    responses(
        (status = 200, description = "Ranked pending recommendations", body = [recommendation::Model]),
        (status = 400, description = "Invalid limit", body = ApiError),
        (status = 401, description = "Missing or invalid bearer token", body = ApiError)
    ),
    tag = "tools"
)]
pub async fn top_recommendations(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    Path(business_id): Path<Uuid>,
    Query(params): Query<TopRecommendationsQuery>,
) -> Result<Json<Vec<recommendation::Model>>, ApiError> {
    let limit = parse_limit(params.limit, 3, 1, 20)?;
    let recommendations = ToolService::new(state.db.clone())
        .top_recommendations(business_id, limit as usize)
        .await?;
    Ok(Json(recommendations))
}
