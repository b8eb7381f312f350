//! # Webhook Ingestion Handler
//!
//! Signed provider pushes. The body is verified against the raw bytes before
//! it is parsed, so it is taken as [`Bytes`] rather than JSON.

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::Json,
};
use chrono::Utc;
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::ApiError;
use crate::ingestion::{IngestOutcome, IngestionService, WebhookSettings};
use crate::server::AppState;
use crate::webhook_verification::SIGNATURE_HEADER;

#[derive(Debug, Serialize, ToSchema)]
pub struct WebhookAccepted {
    pub outcome: IngestOutcome,
}

/// Accept one signed provider event for a business
#[utoipa::path(
    post,
    path = "/webhooks/{business_id}",
    params(
        ("business_id" = Uuid, Path, description = "Business the event belongs to"),
        ("X-Readiness-Signature" = String, Header, description = "t=<unix seconds>,v1=<hex hmac-sha256 of t.business_id.body>")
    ),
    request_body(content = String, content_type = "application/json", description = "Provider event envelope"),
    responses(
        (status = 202, description = "Event stored or recognised as a duplicate", body = WebhookAccepted),
        (status = 400, description = "Malformed event payload", body = ApiError),
        (status = 401, description = "Signature verification failed", body = ApiError)
    ),
    tag = "webhooks"
)]
pub async fn ingest_webhook(
    State(state): State<AppState>,
    Path(business_id): Path<Uuid>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<WebhookAccepted>), ApiError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok());

    let ingestion =
        IngestionService::new(state.db.clone(), WebhookSettings::from_config(&state.config));
    let outcome = ingestion
        .ingest_webhook(business_id, &body, signature, Utc::now())
        .await?;

    Ok((StatusCode::ACCEPTED, Json(WebhookAccepted { outcome })))
}
