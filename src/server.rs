//! # Server Configuration
//!
//! Router assembly, shared state and the OpenAPI document for the readiness API.

use std::sync::Arc;

use axum::{
    Router,
    middleware::{from_fn, from_fn_with_state},
    routing::{get, patch, post, put},
};
use sea_orm::DatabaseConnection;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use utoipa::{
    Modify, OpenApi,
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
};
use utoipa_swagger_ui::SwaggerUi;

use crate::auth::auth_middleware;
use crate::config::AppConfig;
use crate::handlers;
use crate::pipeline::PipelineScheduler;
use crate::telemetry::trace_id_middleware;

/// Application state containing shared resources
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub db: DatabaseConnection,
    pub scheduler: PipelineScheduler,
}

/// Creates and configures the Axum application router
///
/// Webhooks authenticate by signature, so they sit outside the bearer layer.
pub fn create_app(state: AppState) -> Router {
    let protected = Router::new()
        .route("/businesses/{business_id}/sync", put(handlers::businesses::enroll))
        .route(
            "/businesses/{business_id}/resync",
            post(handlers::businesses::resync),
        )
        .route(
            "/businesses/{business_id}/metrics",
            get(handlers::metrics::metrics_history),
        )
        .route(
            "/businesses/{business_id}/metrics/latest",
            get(handlers::metrics::latest_metrics),
        )
        .route(
            "/businesses/{business_id}/readiness",
            get(handlers::readiness::readiness_history),
        )
        .route(
            "/businesses/{business_id}/readiness/latest",
            get(handlers::readiness::latest_readiness),
        )
        .route(
            "/businesses/{business_id}/recommendations",
            get(handlers::recommendations::list_recommendations),
        )
        .route(
            "/recommendations/{id}",
            patch(handlers::recommendations::update_recommendation),
        )
        .route(
            "/tools/businesses/{business_id}/readiness-breakdown",
            get(handlers::tools::readiness_breakdown),
        )
        .route(
            "/tools/businesses/{business_id}/metric-summary",
            get(handlers::tools::metric_summary),
        )
        .route(
            "/tools/businesses/{business_id}/top-recommendations",
            get(handlers::tools::top_recommendations),
        )
        .route("/pipeline/dead-letters", get(handlers::pipeline::dead_letters))
        .route_layer(from_fn_with_state(
            Arc::clone(&state.config),
            auth_middleware,
        ));

    Router::new()
        .route("/", get(handlers::root))
        .route("/healthz", get(handlers::healthz))
        .route(
            "/webhooks/{business_id}",
            post(handlers::webhooks::ingest_webhook),
        )
        .merge(protected)
        .with_state(state)
        .merge(SwaggerUi::new("/docs").url("/openapi.json", ApiDoc::openapi()))
        .layer(TraceLayer::new_for_http())
        .layer(from_fn(trace_id_middleware))
}

/// Serves until `shutdown` is cancelled, then drains in-flight requests.
pub async fn run_server(state: AppState, shutdown: CancellationToken) -> anyhow::Result<()> {
    let addr = state.config.bind_addr()?;
    let profile = state.config.profile.clone();
    let app = create_app(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, %profile, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(HttpBuilder::new().scheme(HttpAuthScheme::Bearer).build()),
            );
        }
    }
}

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    paths(
        crate::handlers::root,
        crate::handlers::healthz,
        crate::handlers::webhooks::ingest_webhook,
        crate::handlers::businesses::enroll,
        crate::handlers::businesses::resync,
        crate::handlers::metrics::latest_metrics,
        crate::handlers::metrics::metrics_history,
        crate::handlers::readiness::latest_readiness,
        crate::handlers::readiness::readiness_history,
        crate::handlers::recommendations::list_recommendations,
        crate::handlers::recommendations::update_recommendation,
        crate::handlers::tools::readiness_breakdown,
        crate::handlers::tools::metric_summary,
        crate::handlers::tools::top_recommendations,
        crate::handlers::pipeline::dead_letters,
    ),
    components(
        schemas(
            crate::models::ServiceInfo,
            crate::handlers::HealthStatus,
            crate::handlers::webhooks::WebhookAccepted,
            crate::handlers::recommendations::UpdateRecommendationRequest,
            crate::ingestion::IngestOutcome,
            crate::models::sync_state::Model,
            crate::models::metrics_snapshot::Model,
            crate::models::readiness_score::Model,
            crate::models::readiness_score::Tier,
            crate::models::readiness_score::ScoreComponents,
            crate::models::recommendation::Model,
            crate::models::recommendation::Priority,
            crate::models::recommendation::Category,
            crate::models::recommendation::RecommendationStatus,
            crate::models::pipeline_run::Model,
            crate::models::pipeline_run::JobKind,
            crate::models::pipeline_run::RunStatus,
            crate::tools::ReadinessBreakdown,
            crate::tools::MetricSummary,
            crate::error::ApiError,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "root", description = "Service information and health"),
        (name = "webhooks", description = "Signed provider event pushes"),
        (name = "businesses", description = "Pipeline enrollment and resync"),
        (name = "metrics", description = "Aggregated metrics snapshots"),
        (name = "readiness", description = "Readiness scores"),
        (name = "recommendations", description = "Recommendation lifecycle"),
        (name = "tools", description = "Read-only agent tool surface"),
        (name = "pipeline", description = "Pipeline operations"),
    ),
    info(
        title = "Funding Readiness API",
        description = "Payment event ingestion, metrics, readiness scoring and recommendations",
        version = env!("CARGO_PKG_VERSION"),
    )
)]
pub struct ApiDoc;
