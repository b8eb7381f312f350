//! # PipelineRun Repository
//!
//! Stage attempt bookkeeping for the scheduler.

use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, Set,
};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::db::to_db_time;
use crate::error::EngineError;
use crate::models::pipeline_run::{ActiveModel, Column, Entity, JobKind, Model, RunStatus};

#[derive(Clone)]
pub struct PipelineRunRepository {
    db: DatabaseConnection,
}

impl PipelineRunRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Record a stage as started.
    pub async fn start(
        &self,
        business_id: Uuid,
        job_kind: JobKind,
        attempt: i32,
        now: DateTime<Utc>,
    ) -> Result<Model, EngineError> {
        let run = ActiveModel {
            id: Set(Uuid::new_v4()),
            business_id: Set(business_id),
            job_kind: Set(job_kind),
            attempt: Set(attempt),
            status: Set(RunStatus::Running),
            started_at: Set(to_db_time(now)),
            finished_at: Set(None),
            next_eligible_at: Set(None),
            error: Set(None),
        };
        Ok(run.insert(&self.db).await?)
    }

    /// Record a stage that was never attempted in this pass.
    pub async fn record_skipped(
        &self,
        business_id: Uuid,
        job_kind: JobKind,
        now: DateTime<Utc>,
        reason: JsonValue,
    ) -> Result<Model, EngineError> {
        let run = ActiveModel {
            id: Set(Uuid::new_v4()),
            business_id: Set(business_id),
            job_kind: Set(job_kind),
            attempt: Set(0),
            status: Set(RunStatus::Skipped),
            started_at: Set(to_db_time(now)),
            finished_at: Set(Some(to_db_time(now))),
            next_eligible_at: Set(None),
            error: Set(Some(reason)),
        };
        Ok(run.insert(&self.db).await?)
    }

    pub async fn finish(
        &self,
        run: Model,
        status: RunStatus,
        finished_at: DateTime<Utc>,
        next_eligible_at: Option<DateTime<Utc>>,
        error: Option<JsonValue>,
    ) -> Result<Model, EngineError> {
        let mut active: ActiveModel = run.into();
        active.status = Set(status);
        active.finished_at = Set(Some(to_db_time(finished_at)));
        active.next_eligible_at = Set(next_eligible_at.map(to_db_time));
        active.error = Set(error);
        Ok(active.update(&self.db).await?)
    }

    /// Latest attempted run (skips excluded) for one stage of a business.
    pub async fn latest_attempt(
        &self,
        business_id: Uuid,
        job_kind: JobKind,
    ) -> Result<Option<Model>, EngineError> {
        let run = Entity::find()
            .filter(Column::BusinessId.eq(business_id))
            .filter(Column::JobKind.eq(job_kind))
            .filter(Column::Status.ne(RunStatus::Skipped))
            .order_by_desc(Column::StartedAt)
            .order_by_desc(Column::Attempt)
            .one(&self.db)
            .await?;
        Ok(run)
    }

    /// Latest attempted run for every stage of a business.
    pub async fn latest_attempts(&self, business_id: Uuid) -> Result<Vec<Model>, EngineError> {
        let mut latest = Vec::with_capacity(JobKind::ORDERED.len());
        for kind in JobKind::ORDERED {
            if let Some(run) = self.latest_attempt(business_id, kind).await? {
                latest.push(run);
            }
        }
        Ok(latest)
    }

    pub async fn list_for_business(
        &self,
        business_id: Uuid,
        limit: u64,
    ) -> Result<Vec<Model>, EngineError> {
        let runs = Entity::find()
            .filter(Column::BusinessId.eq(business_id))
            .order_by_desc(Column::StartedAt)
            .limit(limit)
            .all(&self.db)
            .await?;
        Ok(runs)
    }

    /// Dead-lettered runs, newest first.
    pub async fn dead_letters(&self, limit: u64) -> Result<Vec<Model>, EngineError> {
        let runs = Entity::find()
            .filter(Column::Status.eq(RunStatus::DeadLettered))
            .order_by_desc(Column::StartedAt)
            .limit(limit)
            .all(&self.db)
            .await?;
        Ok(runs)
    }
}
