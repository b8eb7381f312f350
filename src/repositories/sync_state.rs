//! # SyncState Repository
//!
//! Enrollment and pull-sync cursor bookkeeping.

use chrono::{DateTime, Utc};
use sea_orm::sea_query::OnConflict;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, QuerySelect, Set,
};
use uuid::Uuid;

use crate::db::to_db_time;
use crate::error::EngineError;
use crate::models::sync_state::{ActiveModel, Column, Entity, Model};

pub struct SyncStateRepository {
    db: DatabaseConnection,
}

impl SyncStateRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Enroll a business for scheduled passes. Re-enrolling is a no-op.
    pub async fn enroll<C: ConnectionTrait>(
        conn: &C,
        business_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<(), EngineError> {
        let row = ActiveModel {
            business_id: Set(business_id),
            cursor: Set(None),
            last_synced_at: Set(None),
            needs_resync: Set(false),
            resynced_at: Set(None),
            enrolled_at: Set(to_db_time(now)),
            updated_at: Set(to_db_time(now)),
        };

        let result = Entity::insert(row)
            .on_conflict(
                OnConflict::column(Column::BusinessId)
                    .do_nothing()
                    .to_owned(),
            )
            .exec_without_returning(conn)
            .await?;

        if result > 0 {
            tracing::info!(%business_id, "Business enrolled for scheduled passes");
        }
        Ok(())
    }

    pub async fn get(&self, business_id: Uuid) -> Result<Option<Model>, EngineError> {
        Ok(Entity::find_by_id(business_id).one(&self.db).await?)
    }

    /// One page of enrolled businesses ordered by id, starting after `after`.
    pub async fn list_enrolled(
        &self,
        after: Option<Uuid>,
        limit: u64,
    ) -> Result<Vec<Model>, EngineError> {
        let mut query = Entity::find().order_by_asc(Column::BusinessId);
        if let Some(after) = after {
            query = query.filter(Column::BusinessId.gt(after));
        }
        Ok(query.limit(limit).all(&self.db).await?)
    }

    /// Move the high-water mark. Callers run this in the transaction that stored the page.
    pub async fn advance_cursor<C: ConnectionTrait>(
        conn: &C,
        business_id: Uuid,
        cursor: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<(), EngineError> {
        let existing = Entity::find_by_id(business_id)
            .one(conn)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("business {business_id} is not enrolled")))?;

        let mut active: ActiveModel = existing.into();
        if cursor.is_some() {
            active.cursor = Set(cursor);
        }
        active.last_synced_at = Set(Some(to_db_time(now)));
        active.updated_at = Set(to_db_time(now));
        active.update(conn).await?;
        Ok(())
    }

    /// Raise or clear the manual-resync flag. Clearing stamps `resynced_at`.
    /// Returns `NotFound` for unknown businesses.
    pub async fn set_needs_resync<C: ConnectionTrait>(
        conn: &C,
        business_id: Uuid,
        needs_resync: bool,
        now: DateTime<Utc>,
    ) -> Result<Model, EngineError> {
        let existing = Entity::find_by_id(business_id)
            .one(conn)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("business {business_id} is not enrolled")))?;

        let mut active: ActiveModel = existing.into();
        active.needs_resync = Set(needs_resync);
        if !needs_resync {
            active.resynced_at = Set(Some(to_db_time(now)));
        }
        active.updated_at = Set(to_db_time(now));
        Ok(active.update(conn).await?)
    }
}
