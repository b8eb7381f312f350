//! ReadinessScore entity model

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::EngineError;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize, ToSchema)]
#[sea_orm(table_name = "readiness_scores")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub business_id: Uuid,
    /// Snapshot this score was derived from
    pub snapshot_id: Uuid,
    /// Bounded to `[0, 100]`
    pub score: i32,
    pub tier: Tier,
    /// Signed contribution of each adjustment, see [`ScoreComponents`]
    #[sea_orm(column_type = "JsonBinary")]
    #[schema(value_type = ScoreComponents)]
    pub components: JsonValue,
    #[schema(value_type = String, example = "2025-01-31T00:05:00Z")]
    pub computed_at: DateTimeWithTimeZone,
}

/// Score bands, inclusive lower bound.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize, ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    /// 0..=40
    #[sea_orm(string_value = "not_ready")]
    NotReady,
    /// 41..=70
    #[sea_orm(string_value = "improving")]
    Improving,
    /// 71..=85
    #[sea_orm(string_value = "funding_ready")]
    FundingReady,
    /// 86..=100
    #[sea_orm(string_value = "highly_attractive")]
    HighlyAttractive,
}

/// Per-factor adjustments applied on top of the base score.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ScoreComponents {
    pub trend: i32,
    pub volatility: i32,
    pub chargeback: i32,
    pub payout: i32,
}

impl ScoreComponents {
    pub fn total(&self) -> i32 {
        self.trend + self.volatility + self.chargeback + self.payout
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub fn decoded_components(&self) -> Result<ScoreComponents, EngineError> {
        serde_json::from_value(self.components.clone()).map_err(|err| {
            EngineError::inconsistency(format!(
                "score {} has unreadable components: {err}",
                self.id
            ))
        })
    }
}
