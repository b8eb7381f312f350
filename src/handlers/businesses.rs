//! # Business Enrollment Handlers

use axum::{
    extract::{Path, State},
    response::Json,
};
use chrono::Utc;
use uuid::Uuid;

use crate::auth::{CallerContext, OperatorAuth};
use crate::error::{ApiError, EngineError};
use crate::models::sync_state;
use crate::repositories::SyncStateRepository;
use crate::server::AppState;

/// Enroll a business for scheduled pipeline passes (idempotent)
#[utoipa::path(
    put,
    path = "/businesses/{business_id}/sync",
    security(("bearer_auth" = [])),
    params(("business_id" = Uuid, Path, description = "Business identifier")),
    responses(
        (status = 200, description = "Current sync state", body = sync_state::Model),
        (status = 401, description = "Missing or invalid bearer token", body = ApiError)
    ),
    tag = "businesses"
)]
pub async fn enroll(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    caller: CallerContext,
    Path(business_id): Path<Uuid>,
) -> Result<Json<sync_state::Model>, ApiError> {
    SyncStateRepository::enroll(&state.db, business_id, Utc::now()).await?;
    let sync_state = SyncStateRepository::new(state.db.clone())
        .get(business_id)
        .await?
        .ok_or_else(|| EngineError::inconsistency(format!("enrollment of {business_id} vanished")))?;

    tracing::info!(%business_id, user_id = ?caller.user_id, "Enrollment requested");
    Ok(Json(sync_state))
}

/// Clear a dead-lettered business for the next scheduled pass
#[utoipa::path(
    post,
    path = "/businesses/{business_id}/resync",
    security(("bearer_auth" = [])),
    params(("business_id" = Uuid, Path, description = "Business identifier")),
    responses(
        (status = 200, description = "Updated sync state", body = sync_state::Model),
        (status = 401, description = "Missing or invalid bearer token", body = ApiError),
        (status = 404, description = "Business is not enrolled", body = ApiError)
    ),
    tag = "businesses"
)]
pub async fn resync(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    caller: CallerContext,
    Path(business_id): Path<Uuid>,
) -> Result<Json<sync_state::Model>, ApiError> {
    let sync_state = state.scheduler.resync(business_id, Utc::now()).await?;
    tracing::info!(%business_id, user_id = ?caller.user_id, "Manual resync requested");
    Ok(Json(sync_state))
}
