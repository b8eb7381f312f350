//! Migration to create the recommendations table.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Recommendations::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Recommendations::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Recommendations::BusinessId).uuid().not_null())
                    .col(ColumnDef::new(Recommendations::RuleId).text().not_null())
                    .col(ColumnDef::new(Recommendations::Title).text().not_null())
                    .col(ColumnDef::new(Recommendations::Description).text().not_null())
                    .col(ColumnDef::new(Recommendations::Priority).text().not_null())
                    .col(ColumnDef::new(Recommendations::Category).text().not_null())
                    .col(ColumnDef::new(Recommendations::Status).text().not_null())
                    .col(
                        ColumnDef::new(Recommendations::EstimatedImpact)
                            .integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Recommendations::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Recommendations::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Recommendations::SuppressedUntil)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_recommendations_business_rule_created")
                    .table(Recommendations::Table)
                    .col(Recommendations::BusinessId)
                    .col(Recommendations::RuleId)
                    .col(Recommendations::CreatedAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Recommendations::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Recommendations {
    Table,
    Id,
    BusinessId,
    RuleId,
    Title,
    Description,
    Priority,
    Category,
    Status,
    EstimatedImpact,
    CreatedAt,
    UpdatedAt,
    SuppressedUntil,
}
