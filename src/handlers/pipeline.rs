//! # Pipeline Operations Handlers

use axum::{
    extract::{Query, State},
    response::Json,
};
use serde::Deserialize;

use super::params::parse_limit;
use crate::auth::OperatorAuth;
use crate::error::ApiError;
use crate::models::pipeline_run;
use crate::repositories::PipelineRunRepository;
use crate::server::AppState;

#[derive(Debug, Deserialize)]
pub struct DeadLetterQuery {
    /// Maximum number of runs (default: 50, max: 200)
    pub limit: Option<u32>,
}

/// Stage runs that exhausted their retries or failed permanently
#[utoipa::path(
    get,
    path = "/pipeline/dead-letters",
    security(("bearer_auth" = [])),
    params(("limit" = Option<u32>, Query, description = "Maximum number of runs (default 50, max 200)")),
    responses(
        (status = 200, description = "Dead-lettered runs, newest first", body = [pipeline_run::Model]),
        (status = 400, description = "Invalid limit", body = ApiError),
        (status = 401, description = "Missing or invalid bearer token", body = ApiError)
    ),
    tag = "pipeline"
)]
pub async fn dead_letters(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    Query(params): Query<DeadLetterQuery>,
) -> Result<Json<Vec<pipeline_run::Model>>, ApiError> {
    let limit = parse_limit(params.limit, 50, 1, 200)?;
    let runs = PipelineRunRepository::new(state.db.clone())
        .dead_letters(u64::from(limit))
        .await?;
    Ok(Json(runs))
}
