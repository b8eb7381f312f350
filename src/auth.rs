//! # Authentication
//!
//! Operator bearer authentication for the protected API surface. Identity and
//! membership are enforced upstream; the optional `X-User-Id` header is carried
//! through for audit logging only.

use std::sync::Arc;

use axum::{
    extract::{FromRef, FromRequestParts, Request, State},
    http::{HeaderMap, header::AUTHORIZATION, request::Parts},
    middleware::Next,
    response::Response,
};
use subtle::ConstantTimeEq;

use crate::config::AppConfig;
use crate::error::{ApiError, unauthorized, validation_error};
use crate::server::AppState;

pub const USER_ID_HEADER: &str = "X-User-Id";

/// Marker type for authenticated operator requests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperatorAuth;

/// Caller identity forwarded by the identity collaborator, if any.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallerContext {
    pub user_id: Option<String>,
}

impl FromRef<AppState> for Arc<AppConfig> {
    fn from_ref(app_state: &AppState) -> Self {
        Arc::clone(&app_state.config)
    }
}

/// Validates the operator bearer token and records the forwarded caller.
pub async fn auth_middleware(
    State(config): State<Arc<AppConfig>>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let headers = request.headers();
    let token = extract_bearer_token(headers)?;
    validate_token(&config, token)?;

    let caller = extract_caller(headers)?;
    tracing::info!(
        user_id = caller.user_id.as_deref().unwrap_or("-"),
        path = %request.uri().path(),
        "Authenticated operator request"
    );

    request.extensions_mut().insert(caller);
    request.extensions_mut().insert(OperatorAuth);

    Ok(next.run(request).await)
}

fn extract_bearer_token(headers: &HeaderMap) -> Result<&str, ApiError> {
    let header = headers
        .get(AUTHORIZATION)
        .ok_or_else(|| unauthorized(Some("Missing Authorization header")))?
        .to_str()
        .map_err(|_| unauthorized(Some("Invalid Authorization header")))?;

    header
        .strip_prefix("Bearer ")
        .ok_or_else(|| unauthorized(Some("Authorization header must use Bearer scheme")))
}

fn validate_token(config: &AppConfig, token: &str) -> Result<(), ApiError> {
    let is_valid = config
        .operator_tokens
        .iter()
        .any(|configured| ConstantTimeEq::ct_eq(token.as_bytes(), configured.as_bytes()).into());

    if is_valid {
        Ok(())
    } else {
        Err(unauthorized(Some("Invalid bearer token")))
    }
}

fn extract_caller(headers: &HeaderMap) -> Result<CallerContext, ApiError> {
    let Some(value) = headers.get(USER_ID_HEADER) else {
        return Ok(CallerContext::default());
    };

    let user_id = value.to_str().map_err(|_| {
        validation_error(
            "Invalid user header",
            serde_json::json!({ USER_ID_HEADER: "Header must be valid UTF-8" }),
        )
    })?;

    let user_id = user_id.trim();
    Ok(CallerContext {
        user_id: (!user_id.is_empty()).then(|| user_id.to_string()),
    })
}

impl<S> FromRequestParts<S> for OperatorAuth
where
    Arc<AppConfig>: FromRef<S>,
    S: Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<OperatorAuth>()
            .copied()
            .ok_or_else(|| unauthorized(Some("Operator authentication required")))
    }
}

impl<S> FromRequestParts<S> for CallerContext
where
    S: Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts
            .extensions
            .get::<CallerContext>()
            .cloned()
            .unwrap_or_default())
    }
}
