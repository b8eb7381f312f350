use chrono::{DateTime, Utc};
use sea_orm::DatabaseConnection;
use tracing::{debug, instrument};
use uuid::Uuid;

use super::{AggregationPolicy, WindowEvent, compute_metrics, validate_period};
use crate::db::to_db_time;
use crate::error::EngineError;
use crate::models::metrics_snapshot;
use crate::repositories::{EventRepository, MetricsRepository};

/// Reads a window of stored events and appends one metrics snapshot.
pub struct MetricsAggregator {
    db: DatabaseConnection,
    events: EventRepository,
    policy: AggregationPolicy,
}

impl MetricsAggregator {
    pub fn new(db: DatabaseConnection, policy: AggregationPolicy) -> Self {
        Self {
            events: EventRepository::new(db.clone()),
            db,
            policy,
        }
    }

    /// Aggregate `[period_start, period_end)` and persist the result as a new snapshot.
    ///
    /// Earlier snapshots for the same period are kept; the newest `computed_at` wins.
    #[instrument(skip(self), fields(business_id = %business_id))]
    pub async fn aggregate(
        &self,
        business_id: Uuid,
        period_start: DateTime<Utc>,
        period_end: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<metrics_snapshot::Model, EngineError> {
        validate_period(period_start, period_end)?;

        let rows = self
            .events
            .list_in_window(business_id, period_start, period_end)
            .await?;
        let events = rows
            .iter()
            .map(WindowEvent::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        let values = compute_metrics(&events, period_start, period_end, self.policy)?;
        debug!(
            events = events.len(),
            revenue_total = values.revenue_total,
            transaction_count = values.transaction_count,
            "Computed metrics window"
        );

        let snapshot = metrics_snapshot::Model {
            id: Uuid::new_v4(),
            business_id,
            period_start: to_db_time(values.period_start),
            period_end: to_db_time(values.period_end),
            revenue_total: values.revenue_total,
            revenue_volatility: values.revenue_volatility,
            chargeback_count: values.chargeback_count,
            chargeback_ratio: values.chargeback_ratio,
            refund_count: values.refund_count,
            refund_ratio: values.refund_ratio,
            payout_reliability: values.payout_reliability,
            transaction_count: values.transaction_count,
            average_transaction_size: values.average_transaction_size,
            computed_at: to_db_time(now),
        };

        MetricsRepository::insert(&self.db, snapshot).await
    }
}
