//! Migration to create the sync_states table.
//!
//! One row per enrolled business: the pull-sync high-water mark plus the
//! manual-resync flag raised when a pipeline stage is dead-lettered.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(SyncStates::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(SyncStates::BusinessId)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(SyncStates::Cursor).text().null())
                    .col(
                        ColumnDef::new(SyncStates::LastSyncedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(SyncStates::NeedsResync)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(SyncStates::ResyncedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(SyncStates::EnrolledAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(SyncStates::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(SyncStates::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum SyncStates {
    Table,
    BusinessId,
    Cursor,
    LastSyncedAt,
    NeedsResync,
    ResyncedAt,
    EnrolledAt,
    UpdatedAt,
}
