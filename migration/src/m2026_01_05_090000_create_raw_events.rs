//! Migration to create the raw_events table.
//!
//! The unique index on `(business_id, provider_event_id)` is the idempotency
//! key for at-least-once event delivery.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(RawEvents::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(RawEvents::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(RawEvents::BusinessId).uuid().not_null())
                    .col(ColumnDef::new(RawEvents::ProviderEventId).text().not_null())
                    .col(ColumnDef::new(RawEvents::EventType).text().not_null())
                    .col(
                        ColumnDef::new(RawEvents::OccurredAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(RawEvents::Payload).json_binary().not_null())
                    .col(
                        ColumnDef::new(RawEvents::ReceivedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_raw_events_business_provider_event")
                    .table(RawEvents::Table)
                    .col(RawEvents::BusinessId)
                    .col(RawEvents::ProviderEventId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_raw_events_business_occurred")
                    .table(RawEvents::Table)
                    .col(RawEvents::BusinessId)
                    .col(RawEvents::OccurredAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(RawEvents::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum RawEvents {
    Table,
    Id,
    BusinessId,
    ProviderEventId,
    EventType,
    OccurredAt,
    Payload,
    ReceivedAt,
}
