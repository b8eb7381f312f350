//! # Repository Layer
//!
//! Repository implementations that encapsulate SeaORM operations per entity.
//! Reads go through the owned pool; writes that must share a transaction take
//! the connection explicitly.

pub mod event;
pub mod metrics;
pub mod pipeline_run;
pub mod readiness;
pub mod recommendation;
pub mod sync_state;

pub use event::EventRepository;
pub use metrics::MetricsRepository;
pub use pipeline_run::PipelineRunRepository;
pub use readiness::ReadinessRepository;
pub use recommendation::RecommendationRepository;
pub use sync_state::SyncStateRepository;
