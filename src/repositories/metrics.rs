//! # MetricsSnapshot Repository

use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder,
};
use uuid::Uuid;

use crate::db::to_db_time;
use crate::error::EngineError;
use crate::models::metrics_snapshot::{ActiveModel, Column, Entity, Model};

pub struct MetricsRepository {
    db: DatabaseConnection,
}

impl MetricsRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub async fn insert<C: ConnectionTrait>(conn: &C, snapshot: Model) -> Result<Model, EngineError> {
        let active: ActiveModel = snapshot.into();
        Ok(active.insert(conn).await?)
    }

    /// Latest snapshot by `period_end`, then `computed_at`.
    pub async fn latest(&self, business_id: Uuid) -> Result<Option<Model>, EngineError> {
        let snapshot = Entity::find()
            .filter(Column::BusinessId.eq(business_id))
            .order_by_desc(Column::PeriodEnd)
            .order_by_desc(Column::ComputedAt)
            .one(&self.db)
            .await?;
        Ok(snapshot)
    }

    /// Most recent snapshot whose period ended at or before `period_start`.
    pub async fn latest_ending_by(
        &self,
        business_id: Uuid,
        period_start: DateTime<Utc>,
    ) -> Result<Option<Model>, EngineError> {
        let snapshot = Entity::find()
            .filter(Column::BusinessId.eq(business_id))
            .filter(Column::PeriodEnd.lte(to_db_time(period_start)))
            .order_by_desc(Column::PeriodEnd)
            .order_by_desc(Column::ComputedAt)
            .one(&self.db)
            .await?;
        Ok(snapshot)
    }

    /// Snapshots whose period lies within `[start, end]`, oldest first.
    pub async fn history(
        &self,
        business_id: Uuid,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<Vec<Model>, EngineError> {
        let mut query = Entity::find().filter(Column::BusinessId.eq(business_id));

        if let Some(start) = start {
            query = query.filter(Column::PeriodStart.gte(to_db_time(start)));
        }
        if let Some(end) = end {
            query = query.filter(Column::PeriodEnd.lte(to_db_time(end)));
        }

        let snapshots = query
            .order_by_asc(Column::PeriodEnd)
            .order_by_asc(Column::ComputedAt)
            .all(&self.db)
            .await?;
        Ok(snapshots)
    }
}
