//! # Readiness Query Handlers

use axum::{
    extract::{Path, Query, State},
    response::Json,
};
use serde::Deserialize;
use uuid::Uuid;

use super::params::parse_limit;
use crate::auth::OperatorAuth;
use crate::error::{ApiError, EngineError};
use crate::models::readiness_score;
use crate::repositories::ReadinessRepository;
use crate::server::AppState;

#[derive(Debug, Deserialize)]
pub struct ReadinessHistoryQuery {
    /// Maximum number of scores to return (default: 30, max: 200)
    pub limit: Option<u32>,
}

/// Current readiness score
#[utoipa::path(
    get,
    path = "/businesses/{business_id}/readiness/latest",
    security(("bearer_auth" = [])),
    params(("business_id" = Uuid, Path, description = "Business identifier")),
    responses(
        (status = 200, description = "Most recent score", body = readiness_score::Model),
        (status = 401, description = "Missing or invalid bearer token", body = ApiError),
        (status = 404, description = "No score yet", body = ApiError)
    ),
    tag = "readiness"
)]
pub async fn latest_readiness(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    Path(business_id): Path<Uuid>,
) -> Result<Json<readiness_score::Model>, ApiError> {
    let score = ReadinessRepository::new(state.db.clone())
        .latest(business_id)
        .await?
        .ok_or_else(|| EngineError::NotFound(format!("no readiness score for {business_id}")))?;
    Ok(Json(score))
}

/// Score history, newest first
#[utoipa::path(
    get,
    path = "/businesses/{business_id}/readiness",
    security(("bearer_auth" = [])),
    params(
        ("business_id" = Uuid, Path, description = "Business identifier"),
        ("limit" = Option<u32>, Query, description = "Maximum number of scores (default 30, max 200)")
    ),
    responses(
        (status = 200, description = "Score history", body = [readiness_score::Model]),
        (status = 400, description = "Invalid limit", body = ApiError),
        (status = 401, description = "Missing or invalid bearer token", body = ApiError)
    ),
    tag = "readiness"
)]
pub async fn readiness_history(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    Path(business_id): Path<Uuid>,
    Query(params): Query<ReadinessHistoryQuery>,
) -> Result<Json<Vec<readiness_score::Model>>, ApiError> {
    let limit = parse_limit(params.limit, 30, 1, 200)?;
    let scores = ReadinessRepository::new(state.db.clone())
        .history(business_id, u64::from(limit))
        .await?;
    Ok(Json(scores))
}
