//! # Recommendation Handlers

use axum::{
    extract::{Path, Query, State, rejection::JsonRejection},
    response::Json,
};
use chrono::Utc;
use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;

use super::params::{parse_priority, parse_status};
use crate::auth::{CallerContext, OperatorAuth};
use crate::error::ApiError;
use crate::models::recommendation::{self, RecommendationStatus};
use crate::recommendations::RecommendationEngine;
use crate::repositories::RecommendationRepository;
use crate::server::AppState;

#[derive(Debug, Deserialize)]
pub struct RecommendationListQuery {
    /// Filter by lifecycle status (pending, accepted, dismissed)
    pub status: Option<String>,
    /// Filter by priority (high, medium, low)
    pub priority: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateRecommendationRequest {
    pub status: RecommendationStatus,
}

/// Recommendations for a business, newest first
#[utoipa::path(
    get,
    path = "/businesses/{business_id}/recommendations",
    security(("bearer_auth" = [])),
    params(
        ("business_id" = Uuid, Path, description = "Business identifier"),
        ("status" = Option<String>, Query, description = "pending, accepted or dismissed"),
        ("priority" = Option<String>, Query, description = "high, medium or low")
    ),
    responses(
        (status = 200, description = "Recommendations", body = [recommendation::Model]),
        (status = 400, description = "Invalid filter", body = ApiError),
        (status = 401, description = "Missing or invalid bearer token", body = ApiError)
    ),
    tag = "recommendations"
)]
pub async fn list_recommendations(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    Path(business_id): Path<Uuid>,
    Query(params): Query<RecommendationListQuery>,
) -> Result<Json<Vec<recommendation::Model>>, ApiError> {
    let status = parse_status(params.status.as_deref())?;
    let priority = parse_priority(params.priority.as_deref())?;

    let recommendations = RecommendationRepository::new(state.db.clone())
        .list(business_id, status, priority)
        .await?;
    Ok(Json(recommendations))
}

/// Accept or dismiss a recommendation
///
/// Setting the current status again is a no-op that returns the stored record.
#[utoipa::path(
    patch,
    path = "/recommendations/{id}",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Recommendation identifier")),
    request_body = UpdateRecommendationRequest,
    responses(
        (status = 200, description = "Updated recommendation", body = recommendation::Model),
        (status = 400, description = "Invalid transition or body", body = ApiError),
        (status = 401, description = "Missing or invalid bearer token", body = ApiError),
        (status = 404, description = "Recommendation not found", body = ApiError)
    ),
    tag = "recommendations"
)]
pub async fn update_recommendation(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    caller: CallerContext,
    Path(id): Path<Uuid>,
    payload: Result<Json<UpdateRecommendationRequest>, JsonRejection>,
) -> Result<Json<recommendation::Model>, ApiError> {
    let Json(request) = payload?;

    let engine = RecommendationEngine::new(
        state.db.clone(),
        state.config.recommendation_suppression_days,
    );
    let updated = engine.update_status(id, request.status, Utc::now()).await?;

    tracing::info!(
        recommendation_id = %id,
        status = ?updated.status,
        user_id = ?caller.user_id,
        "Recommendation status set"
    );
    Ok(Json(updated))
}
