//! # RawEvent Repository
//!
//! Append-only access to the event store. Inserts are idempotent on
//! `(business_id, provider_event_id)`.

use chrono::{DateTime, Utc};
use sea_orm::sea_query::OnConflict;
use sea_orm::{
    ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set,
};
use uuid::Uuid;

use crate::db::to_db_time;
use crate::error::{EngineError, is_unique_violation};
use crate::models::raw_event::{ActiveModel, Column, Entity, Model};
use crate::normalization::NormalizedEvent;

pub struct EventRepository {
    db: DatabaseConnection,
}

impl EventRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Insert `event` unless its idempotency key is already stored.
    ///
    /// Returns `true` when a row was written, `false` for a duplicate delivery.
    pub async fn insert_if_absent<C: ConnectionTrait>(
        conn: &C,
        business_id: Uuid,
        event: &NormalizedEvent,
        received_at: DateTime<Utc>,
    ) -> Result<bool, EngineError> {
        let payload = serde_json::to_value(&event.payload).map_err(|err| {
            EngineError::inconsistency(format!("failed to encode event payload: {err}"))
        })?;

        let row = ActiveModel {
            id: Set(Uuid::new_v4()),
            business_id: Set(business_id),
            provider_event_id: Set(event.provider_event_id.clone()),
            event_type: Set(event.event_type()),
            occurred_at: Set(to_db_time(event.occurred_at)),
            payload: Set(payload),
            received_at: Set(to_db_time(received_at)),
        };

        let result = Entity::insert(row)
            .on_conflict(
                OnConflict::columns([Column::BusinessId, Column::ProviderEventId])
                    .do_nothing()
                    .to_owned(),
            )
            .exec_without_returning(conn)
            .await;

        match result {
            Ok(rows) => Ok(rows > 0),
            Err(err) if is_unique_violation(&err) => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    /// Events with `occurred_at` in `[start, end)` in fold order.
    pub async fn list_in_window(
        &self,
        business_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Model>, EngineError> {
        let events = Entity::find()
            .filter(Column::BusinessId.eq(business_id))
            .filter(Column::OccurredAt.gte(to_db_time(start)))
            .filter(Column::OccurredAt.lt(to_db_time(end)))
            .order_by_asc(Column::OccurredAt)
            .order_by_asc(Column::ProviderEventId)
            .all(&self.db)
            .await?;
        Ok(events)
    }

    pub async fn count_for_business(&self, business_id: Uuid) -> Result<u64, EngineError> {
        let count = Entity::find()
            .filter(Column::BusinessId.eq(business_id))
            .count(&self.db)
            .await?;
        Ok(count)
    }
}
