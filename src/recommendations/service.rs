use chrono::{DateTime, Duration, Utc};
use sea_orm::{DatabaseConnection, IntoActiveModel, TransactionTrait};
use tracing::{debug, info, instrument};
use uuid::Uuid;

use super::{generate, transition};
use crate::error::EngineError;
use crate::models::recommendation::{self, RecommendationStatus};
use crate::models::{metrics_snapshot, readiness_score};
use crate::repositories::RecommendationRepository;

/// Persists generated recommendations and applies status transitions.
pub struct RecommendationEngine {
    db: DatabaseConnection,
    recommendations: RecommendationRepository,
    suppression: Duration,
}

impl RecommendationEngine {
    pub fn new(db: DatabaseConnection, suppression_days: i64) -> Self {
        Self {
            recommendations: RecommendationRepository::new(db.clone()),
            db,
            suppression: Duration::days(suppression_days),
        }
    }

    /// Evaluate rules for `score`/`snapshot` and store what is newly issued, atomically.
    #[instrument(skip(self, score, snapshot), fields(business_id = %score.business_id))]
    pub async fn recommend(
        &self,
        score: &readiness_score::Model,
        snapshot: &metrics_snapshot::Model,
        now: DateTime<Utc>,
    ) -> Result<Vec<recommendation::Model>, EngineError> {
        let business_id = score.business_id;
        let existing = self.recommendations.for_business(business_id).await?;
        let issued = generate(business_id, score, snapshot, &existing, now)?;

        if issued.is_empty() {
            debug!("No new recommendations");
            return Ok(issued);
        }

        let txn = self.db.begin().await?;
        let mut stored = Vec::with_capacity(issued.len());
        for rec in issued {
            stored.push(RecommendationRepository::insert(&txn, rec).await?);
        }
        txn.commit().await?;

        info!(count = stored.len(), "Issued recommendations");
        Ok(stored)
    }

    /// Idempotent status change. Re-applying the current status returns the stored record.
    #[instrument(skip(self))]
    pub async fn update_status(
        &self,
        id: Uuid,
        status: RecommendationStatus,
        now: DateTime<Utc>,
    ) -> Result<recommendation::Model, EngineError> {
        let current = self
            .recommendations
            .find(id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("recommendation {id}")))?;

        let Some(updated) = transition(&current, status, now, self.suppression)? else {
            debug!(?status, "Status unchanged");
            return Ok(current);
        };

        let mut active = current.into_active_model();
        active.status = sea_orm::Set(updated.status);
        active.updated_at = sea_orm::Set(updated.updated_at);
        active.suppressed_until = sea_orm::Set(updated.suppressed_until);

        let stored = RecommendationRepository::update(&self.db, active).await?;
        info!(?status, business_id = %stored.business_id, "Recommendation status updated");
        Ok(stored)
    }
}
