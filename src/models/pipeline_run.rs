//! PipelineRun entity model
//!
//! Scheduler bookkeeping: one row per stage execution attempt. `attempt` counts
//! consecutive failures of the same `(business_id, job_kind)` and
//! `next_eligible_at` carries the retry backoff across restarts.

use std::fmt;

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize, ToSchema)]
#[sea_orm(table_name = "pipeline_runs")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub business_id: Uuid,
    pub job_kind: JobKind,
    pub attempt: i32,
    pub status: RunStatus,
    #[schema(value_type = String)]
    pub started_at: DateTimeWithTimeZone,
    #[schema(value_type = Option<String>)]
    pub finished_at: Option<DateTimeWithTimeZone>,
    /// Earliest time a failed stage may be retried
    #[schema(value_type = Option<String>)]
    pub next_eligible_at: Option<DateTimeWithTimeZone>,
    /// Structured error details (`kind`, `message`, `retryable`)
    #[sea_orm(column_type = "JsonBinary")]
    #[schema(value_type = Option<Object>)]
    pub error: Option<JsonValue>,
}

/// The four pipeline stages, in dependency order.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
    ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    #[sea_orm(string_value = "sync")]
    Sync,
    #[sea_orm(string_value = "aggregate")]
    Aggregate,
    #[sea_orm(string_value = "score")]
    Score,
    #[sea_orm(string_value = "recommend")]
    Recommend,
}

impl JobKind {
    pub const ORDERED: [JobKind; 4] = [
        JobKind::Sync,
        JobKind::Aggregate,
        JobKind::Score,
        JobKind::Recommend,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            JobKind::Sync => "sync",
            JobKind::Aggregate => "aggregate",
            JobKind::Score => "score",
            JobKind::Recommend => "recommend",
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize, ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    #[sea_orm(string_value = "running")]
    Running,
    #[sea_orm(string_value = "succeeded")]
    Succeeded,
    #[sea_orm(string_value = "failed")]
    Failed,
    #[sea_orm(string_value = "skipped")]
    Skipped,
    #[sea_orm(string_value = "dead_lettered")]
    DeadLettered,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
