//! SyncState entity model
//!
//! Per-business pull-sync high-water mark. A row's existence enrolls the
//! business in the scheduled pipeline.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize, ToSchema)]
#[sea_orm(table_name = "sync_states")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub business_id: Uuid,

    /// Opaque provider cursor of the last durably stored page
    pub cursor: Option<String>,

    #[schema(value_type = Option<String>)]
    pub last_synced_at: Option<DateTimeWithTimeZone>,

    /// Raised when a stage is dead-lettered; cleared by a manual resync
    pub needs_resync: bool,

    /// Last manual resync; dead-lettered runs finished before it no longer block passes
    #[schema(value_type = Option<String>)]
    pub resynced_at: Option<DateTimeWithTimeZone>,

    #[schema(value_type = String)]
    pub enrolled_at: DateTimeWithTimeZone,

    #[schema(value_type = String)]
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
