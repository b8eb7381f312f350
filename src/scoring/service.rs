use chrono::{DateTime, Utc};
use sea_orm::DatabaseConnection;
use tracing::{info, instrument};

use super::score;
use crate::db::from_db_time;
use crate::error::EngineError;
use crate::models::{metrics_snapshot, readiness_score};
use crate::repositories::{MetricsRepository, ReadinessRepository};

/// Scores snapshots and appends the result to the score history.
pub struct ReadinessScorer {
    db: DatabaseConnection,
    metrics: MetricsRepository,
}

impl ReadinessScorer {
    pub fn new(db: DatabaseConnection) -> Self {
        Self {
            metrics: MetricsRepository::new(db.clone()),
            db,
        }
    }

    /// Score `snapshot` against the latest earlier, non-overlapping period.
    #[instrument(skip(self, snapshot), fields(business_id = %snapshot.business_id, snapshot_id = %snapshot.id))]
    pub async fn score_snapshot(
        &self,
        snapshot: &metrics_snapshot::Model,
        now: DateTime<Utc>,
    ) -> Result<readiness_score::Model, EngineError> {
        let previous = self
            .metrics
            .latest_ending_by(snapshot.business_id, from_db_time(snapshot.period_start))
            .await?;

        let row = score(snapshot, previous.as_ref(), now)?;
        let stored = ReadinessRepository::insert(&self.db, row).await?;

        info!(
            score = stored.score,
            tier = ?stored.tier,
            has_previous = previous.is_some(),
            "Computed readiness score"
        );
        Ok(stored)
    }
}
