//! # Recommendation Repository

use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder,
};
use uuid::Uuid;

use crate::error::EngineError;
use crate::models::recommendation::{
    ActiveModel, Column, Entity, Model, Priority, RecommendationStatus,
};

pub struct RecommendationRepository {
    db: DatabaseConnection,
}

impl RecommendationRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub async fn insert<C: ConnectionTrait>(
        conn: &C,
        recommendation: Model,
    ) -> Result<Model, EngineError> {
        let active: ActiveModel = recommendation.into();
        Ok(active.insert(conn).await?)
    }

    pub async fn find(&self, id: Uuid) -> Result<Option<Model>, EngineError> {
        Ok(Entity::find_by_id(id).one(&self.db).await?)
    }

    /// Every recommendation for the business, newest first.
    pub async fn for_business(&self, business_id: Uuid) -> Result<Vec<Model>, EngineError> {
        let recommendations = Entity::find()
            .filter(Column::BusinessId.eq(business_id))
            .order_by_desc(Column::CreatedAt)
            .all(&self.db)
            .await?;
        Ok(recommendations)
    }

    pub async fn list(
        &self,
        business_id: Uuid,
        status: Option<RecommendationStatus>,
        priority: Option<Priority>,
    ) -> Result<Vec<Model>, EngineError> {
        let mut query = Entity::find().filter(Column::BusinessId.eq(business_id));

        if let Some(status) = status {
            query = query.filter(Column::Status.eq(status));
        }
        if let Some(priority) = priority {
            query = query.filter(Column::Priority.eq(priority));
        }

        let recommendations = query.order_by_desc(Column::CreatedAt).all(&self.db).await?;
        Ok(recommendations)
    }

    pub async fn update<C: ConnectionTrait>(
        conn: &C,
        active: ActiveModel,
    ) -> Result<Model, EngineError> {
        Ok(active.update(conn).await?)
    }
}
