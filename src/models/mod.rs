//! # Data Models
//!
//! SeaORM entities for the readiness engine. Every relation is keyed by `business_id`.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub mod metrics_snapshot;
pub mod pipeline_run;
pub mod raw_event;
pub mod readiness_score;
pub mod recommendation;
pub mod sync_state;

pub use metrics_snapshot::Entity as MetricsSnapshot;
pub use pipeline_run::Entity as PipelineRun;
pub use raw_event::Entity as RawEvent;
pub use readiness_score::Entity as ReadinessScore;
pub use recommendation::Entity as Recommendation;
pub use sync_state::Entity as SyncState;

/// Basic service information response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ServiceInfo {
    /// The name of the service
    pub service: String,
    /// The version of the service
    pub version: String,
}

impl Default for ServiceInfo {
    fn default() -> Self {
        Self {
            service: "readiness".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}
