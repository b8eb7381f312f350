//! MetricsSnapshot entity model
//!
//! One immutable aggregation result for a business over `[period_start, period_end)`.
//! Re-aggregating a period appends a new row; the latest is selected by
//! `period_end` then `computed_at`.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize, ToSchema)]
#[sea_orm(table_name = "metrics_snapshots")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub business_id: Uuid,
    #[schema(value_type = String, example = "2025-01-01T00:00:00Z")]
    pub period_start: DateTimeWithTimeZone,
    #[schema(value_type = String, example = "2025-01-31T00:00:00Z")]
    pub period_end: DateTimeWithTimeZone,
    /// Sum of successful charge amounts, in minor units
    pub revenue_total: i64,
    /// Coefficient of variation of per-day revenue
    #[sea_orm(column_type = "Double")]
    pub revenue_volatility: f64,
    pub chargeback_count: i32,
    #[sea_orm(column_type = "Double")]
    pub chargeback_ratio: f64,
    pub refund_count: i32,
    #[sea_orm(column_type = "Double")]
    pub refund_ratio: f64,
    /// Fraction of payouts settled within tolerance of the expected date
    #[sea_orm(column_type = "Double")]
    pub payout_reliability: f64,
    /// Number of successful charges
    pub transaction_count: i32,
    #[sea_orm(column_type = "Double")]
    pub average_transaction_size: f64,
    #[schema(value_type = String, example = "2025-01-31T00:05:00Z")]
    pub computed_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
