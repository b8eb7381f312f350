//! # ReadinessScore Repository

use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, QuerySelect,
};
use uuid::Uuid;

use crate::error::EngineError;
use crate::models::readiness_score::{ActiveModel, Column, Entity, Model};

pub struct ReadinessRepository {
    db: DatabaseConnection,
}

impl ReadinessRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub async fn insert<C: ConnectionTrait>(conn: &C, score: Model) -> Result<Model, EngineError> {
        let active: ActiveModel = score.into();
        Ok(active.insert(conn).await?)
    }

    /// Current score is the most recent by `computed_at`.
    pub async fn latest(&self, business_id: Uuid) -> Result<Option<Model>, EngineError> {
        let score = Entity::find()
            .filter(Column::BusinessId.eq(business_id))
            .order_by_desc(Column::ComputedAt)
            .one(&self.db)
            .await?;
        Ok(score)
    }

    /// Up to `limit` scores, newest first.
    pub async fn history(&self, business_id: Uuid, limit: u64) -> Result<Vec<Model>, EngineError> {
        let scores = Entity::find()
            .filter(Column::BusinessId.eq(business_id))
            .order_by_desc(Column::ComputedAt)
            .limit(limit)
            .all(&self.db)
            .await?;
        Ok(scores)
    }
}
