//! RawEvent entity model
//!
//! Append-only ledger of normalized provider events. Rows are never updated;
//! `(business_id, provider_event_id)` is unique.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::EngineError;
use crate::normalization::EventPayload;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "raw_events")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Tenant boundary; every query is scoped by it
    pub business_id: Uuid,

    /// Provider-assigned event id, the idempotency key within a business
    pub provider_event_id: String,

    pub event_type: EventType,

    /// When the event happened at the provider (drives windowing)
    pub occurred_at: DateTimeWithTimeZone,

    /// Normalized [`EventPayload`] as JSON
    #[sea_orm(column_type = "JsonBinary")]
    pub payload: JsonValue,

    /// When this engine first stored the event
    pub received_at: DateTimeWithTimeZone,
}

/// Normalized event families.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize, ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    #[sea_orm(string_value = "charge")]
    Charge,
    #[sea_orm(string_value = "refund")]
    Refund,
    #[sea_orm(string_value = "chargeback")]
    Chargeback,
    #[sea_orm(string_value = "payout")]
    Payout,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Decode the stored payload back into its tagged form.
    pub fn decoded_payload(&self) -> Result<EventPayload, EngineError> {
        serde_json::from_value(self.payload.clone()).map_err(|err| {
            EngineError::inconsistency(format!(
                "stored payload for event {} is unreadable: {err}",
                self.provider_event_id
            ))
        })
    }
}
