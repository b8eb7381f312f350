//! Recommendation entity model
//!
//! Lifecycle is `pending -> accepted | dismissed`. A dismissed recommendation
//! carries `suppressed_until`, before which its rule is not re-issued.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize, ToSchema)]
#[sea_orm(table_name = "recommendations")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub business_id: Uuid,
    /// Stable identifier of the rule that produced this recommendation
    pub rule_id: String,
    pub title: String,
    pub description: String,
    pub priority: Priority,
    pub category: Category,
    pub status: RecommendationStatus,
    /// Absolute score impact the rule is associated with
    pub estimated_impact: i32,
    #[schema(value_type = String, example = "2025-01-31T00:05:00Z")]
    pub created_at: DateTimeWithTimeZone,
    #[schema(value_type = String, example = "2025-01-31T00:05:00Z")]
    pub updated_at: DateTimeWithTimeZone,
    #[schema(value_type = Option<String>, example = "2025-03-02T00:05:00Z")]
    pub suppressed_until: Option<DateTimeWithTimeZone>,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize, ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    #[sea_orm(string_value = "high")]
    High,
    #[sea_orm(string_value = "medium")]
    Medium,
    #[sea_orm(string_value = "low")]
    Low,
}

impl Priority {
    /// Lower rank sorts first.
    pub fn rank(self) -> u8 {
        match self {
            Priority::High => 0,
            Priority::Medium => 1,
            Priority::Low => 2,
        }
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize, ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "snake_case")]
pub enum Category {
    #[sea_orm(string_value = "risk")]
    Risk,
    #[sea_orm(string_value = "revenue")]
    Revenue,
    #[sea_orm(string_value = "operations")]
    Operations,
    #[sea_orm(string_value = "general")]
    General,
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
    ToSchema,
    Default,
)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "snake_case")]
pub enum RecommendationStatus {
    #[sea_orm(string_value = "pending")]
    #[default]
    Pending,
    #[sea_orm(string_value = "accepted")]
    Accepted,
    #[sea_orm(string_value = "dismissed")]
    Dismissed,
}

impl RecommendationStatus {
    pub fn is_resolved(self) -> bool {
        !matches!(self, RecommendationStatus::Pending)
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
