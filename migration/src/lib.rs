//! Database migrations for the readiness engine.
//!
//! Every relation is keyed by `business_id`; the four data relations are
//! append-only, `pipeline_runs` and `sync_states` hold scheduler bookkeeping.

pub use sea_orm_migration::prelude::*;

mod m2026_01_05_090000_create_raw_events;
mod m2026_01_05_090100_create_metrics_snapshots;
mod m2026_01_05_090200_create_readiness_scores;
mod m2026_01_05_090300_create_recommendations;
mod m2026_01_05_090400_create_pipeline_runs;
mod m2026_01_05_090500_create_sync_states;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m2026_01_05_090000_create_raw_events::Migration),
            Box::new(m2026_01_05_090100_create_metrics_snapshots::Migration),
            Box::new(m2026_01_05_090200_create_readiness_scores::Migration),
            Box::new(m2026_01_05_090300_create_recommendations::Migration),
            Box::new(m2026_01_05_090400_create_pipeline_runs::Migration),
            Box::new(m2026_01_05_090500_create_sync_states::Migration),
        ]
    }
}
