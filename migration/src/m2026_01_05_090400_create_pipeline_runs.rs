//! Migration to create the pipeline_runs bookkeeping table.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(PipelineRuns::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(PipelineRuns::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(PipelineRuns::BusinessId).uuid().not_null())
                    .col(ColumnDef::new(PipelineRuns::JobKind).text().not_null())
                    .col(ColumnDef::new(PipelineRuns::Attempt).integer().not_null())
                    .col(ColumnDef::new(PipelineRuns::Status).text().not_null())
                    .col(
                        ColumnDef::new(PipelineRuns::StartedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(PipelineRuns::FinishedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(PipelineRuns::NextEligibleAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(ColumnDef::new(PipelineRuns::Error).json_binary().null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_pipeline_runs_business_kind_started")
                    .table(PipelineRuns::Table)
                    .col(PipelineRuns::BusinessId)
                    .col(PipelineRuns::JobKind)
                    .col(PipelineRuns::StartedAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_pipeline_runs_status")
                    .table(PipelineRuns::Table)
                    .col(PipelineRuns::Status)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(PipelineRuns::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum PipelineRuns {
    Table,
    Id,
    BusinessId,
    JobKind,
    Attempt,
    Status,
    StartedAt,
    FinishedAt,
    NextEligibleAt,
    Error,
}
