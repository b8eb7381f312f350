//! Migration to create the readiness_scores table.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(ReadinessScores::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ReadinessScores::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(ReadinessScores::BusinessId).uuid().not_null())
                    .col(ColumnDef::new(ReadinessScores::SnapshotId).uuid().not_null())
                    .col(ColumnDef::new(ReadinessScores::Score).integer().not_null())
                    .col(ColumnDef::new(ReadinessScores::Tier).text().not_null())
                    .col(
                        ColumnDef::new(ReadinessScores::Components)
                            .json_binary()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ReadinessScores::ComputedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_readiness_scores_business_computed")
                    .table(ReadinessScores::Table)
                    .col(ReadinessScores::BusinessId)
                    .col(ReadinessScores::ComputedAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(ReadinessScores::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum ReadinessScores {
    Table,
    Id,
    BusinessId,
    SnapshotId,
    Score,
    Tier,
    Components,
    ComputedAt,
}
