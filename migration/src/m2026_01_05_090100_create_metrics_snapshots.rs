//! Migration to create the metrics_snapshots table.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(MetricsSnapshots::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(MetricsSnapshots::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(MetricsSnapshots::BusinessId).uuid().not_null())
                    .col(
                        ColumnDef::new(MetricsSnapshots::PeriodStart)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(MetricsSnapshots::PeriodEnd)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(MetricsSnapshots::RevenueTotal)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(MetricsSnapshots::RevenueVolatility)
                            .double()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(MetricsSnapshots::ChargebackCount)
                            .integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(MetricsSnapshots::ChargebackRatio)
                            .double()
                            .not_null(),
                    )
                    .col(ColumnDef::new(MetricsSnapshots::RefundCount).integer().not_null())
                    .col(ColumnDef::new(MetricsSnapshots::RefundRatio).double().not_null())
                    .col(
                        ColumnDef::new(MetricsSnapshots::PayoutReliability)
                            .double()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(MetricsSnapshots::TransactionCount)
                            .integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(MetricsSnapshots::AverageTransactionSize)
                            .double()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(MetricsSnapshots::ComputedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_metrics_snapshots_business_period")
                    .table(MetricsSnapshots::Table)
                    .col(MetricsSnapshots::BusinessId)
                    .col(MetricsSnapshots::PeriodEnd)
                    .col(MetricsSnapshots::ComputedAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(MetricsSnapshots::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum MetricsSnapshots {
    Table,
    Id,
    BusinessId,
    PeriodStart,
    PeriodEnd,
    RevenueTotal,
    RevenueVolatility,
    ChargebackCount,
    ChargebackRatio,
    RefundCount,
    RefundRatio,
    PayoutReliability,
    TransactionCount,
    AverageTransactionSize,
    ComputedAt,
}
