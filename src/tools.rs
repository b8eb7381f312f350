//! # Agent Tool Surface
//!
//! Read-only projections consumed by the conversational agent. Nothing here
//! writes; every figure comes straight from the latest stored rows.

use sea_orm::DatabaseConnection;
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::EngineError;
use crate::models::metrics_snapshot;
use crate::models::readiness_score::{ScoreComponents, Tier};
use crate::models::recommendation::{self, RecommendationStatus};
use crate::repositories::{MetricsRepository, ReadinessRepository, RecommendationRepository};
use crate::scoring::BASE_SCORE;

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ReadinessBreakdown {
    pub business_id: Uuid,
    pub score: i32,
    pub tier: Tier,
    pub base: i32,
    pub components: ScoreComponents,
    /// When the score was computed (RFC 3339)
    pub computed_at: String,
    pub snapshot_id: Uuid,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct MetricSummary {
    pub business_id: Uuid,
    pub period_start: String,
    pub period_end: String,
    pub revenue_total: i64,
    pub revenue_volatility: f64,
    pub chargeback_ratio: f64,
    pub refund_ratio: f64,
    pub payout_reliability: f64,
    pub transaction_count: i32,
    pub average_transaction_size: f64,
}

impl From<&metrics_snapshot::Model> for MetricSummary {
    fn from(snapshot: &metrics_snapshot::Model) -> Self {
        Self {
            business_id: snapshot.business_id,
            period_start: snapshot.period_start.to_rfc3339(),
            period_end: snapshot.period_end.to_rfc3339(),
            revenue_total: snapshot.revenue_total,
            revenue_volatility: snapshot.revenue_volatility,
            chargeback_ratio: snapshot.chargeback_ratio,
            refund_ratio: snapshot.refund_ratio,
            payout_reliability: snapshot.payout_reliability,
            transaction_count: snapshot.transaction_count,
            average_transaction_size: snapshot.average_transaction_size,
        }
    }
}

pub struct ToolService {
    metrics: MetricsRepository,
    scores: ReadinessRepository,
    recommendations: RecommendationRepository,
}

impl ToolService {
    pub fn new(db: DatabaseConnection) -> Self {
        Self {
            metrics: MetricsRepository::new(db.clone()),
            scores: ReadinessRepository::new(db.clone()),
            recommendations: RecommendationRepository::new(db),
        }
    }

    pub async fn readiness_breakdown(
        &self,
        business_id: Uuid,
    ) -> Result<ReadinessBreakdown, EngineError> {
        let score = self
            .scores
            .latest(business_id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("no readiness score for {business_id}")))?;

        Ok(ReadinessBreakdown {
            business_id,
            score: score.score,
            tier: score.tier,
            base: BASE_SCORE,
            components: score.decoded_components()?,
            computed_at: score.computed_at.to_rfc3339(),
            snapshot_id: score.snapshot_id,
        })
    }

    pub async fn metric_summary(&self, business_id: Uuid) -> Result<MetricSummary, EngineError> {
        let snapshot = self
            .metrics
            .latest(business_id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("no metrics snapshot for {business_id}")))?;
        Ok(MetricSummary::from(&snapshot))
    }

    /// Pending recommendations, highest priority then largest impact first.
    pub async fn top_recommendations(
        &self,
        business_id: Uuid,
        limit: usize,
    ) -> Result<Vec<recommendation::Model>, EngineError> {
        let pending = self
            .recommendations
            .list(business_id, Some(RecommendationStatus::Pending), None)
            .await?;
        Ok(rank_recommendations(pending, limit))
    }
}

pub fn rank_recommendations(
    mut recommendations: Vec<recommendation::Model>,
    limit: usize,
) -> Vec<recommendation::Model> {
    recommendations.sort_by(|a, b| {
        a.priority
            .rank()
            .cmp(&b.priority.rank())
            .then_with(|| b.estimated_impact.cmp(&a.estimated_impact))
            .then_with(|| a.rule_id.cmp(&b.rule_id))
    });
    recommendations.truncate(limit);
    recommendations
}
