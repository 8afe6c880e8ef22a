use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let flag = |col: Notifications, default: bool| {
            ColumnDef::new(col)
                .boolean()
                .not_null()
                .default(default)
                .to_owned()
        };

        manager
            .create_table(
                Table::create()
                    .table(Notifications::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Notifications::Id)
                            .uuid()
                            .primary_key()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Notifications::RecipientId).uuid().null())
                    .col(
                        ColumnDef::new(Notifications::RecipientType)
                            .string_len(32)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Notifications::NotificationType)
                            .string_len(48)
                            .not_null(),
                    )
                    .col(ColumnDef::new(Notifications::Title).string().not_null())
                    .col(ColumnDef::new(Notifications::Message).text().not_null())
                    .col(ColumnDef::new(Notifications::OrderId).uuid().null())
                    .col(ColumnDef::new(Notifications::ProductId).uuid().null())
                    .col(ColumnDef::new(Notifications::DeliveryId).uuid().null())
                    .col(ColumnDef::new(Notifications::Amount).decimal_len(12, 2).null())
                    .col(ColumnDef::new(Notifications::ActionUrl).string().null())
                    .col(ColumnDef::new(Notifications::Metadata).json().null())
                    .col(
                        ColumnDef::new(Notifications::Priority)
                            .string_len(16)
                            .not_null()
                            .default("medium"),
                    )
                    .col(flag(Notifications::ChannelPush, true))
                    .col(flag(Notifications::ChannelEmail, false))
                    .col(flag(Notifications::ChannelSms, false))
                    .col(flag(Notifications::ChannelInApp, true))
                    .col(
                        ColumnDef::new(Notifications::Status)
                            .string_len(16)
                            .not_null()
                            .default("pending"),
                    )
                    .col(flag(Notifications::IsRead, false))
                    .col(
                        ColumnDef::new(Notifications::ReadAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Notifications::SentAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Notifications::ExpiresAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Notifications::RetryCount)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Notifications::MaxRetries)
                            .integer()
                            .not_null()
                            .default(3),
                    )
                    .col(
                        ColumnDef::new(Notifications::FailedChannels)
                            .string_len(64)
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Notifications::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Notifications::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_notifications_recipient_read")
                    .table(Notifications::Table)
                    .col(Notifications::RecipientId)
                    .col(Notifications::IsRead)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_notifications_expires_at")
                    .table(Notifications::Table)
                    .col(Notifications::ExpiresAt)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Notifications::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden, Clone, Copy)]
pub enum Notifications {
    Table,
    Id,
    RecipientId,
    RecipientType,
    NotificationType,
    Title,
    Message,
    OrderId,
    ProductId,
    DeliveryId,
    Amount,
    ActionUrl,
    Metadata,
    Priority,
    ChannelPush,
    ChannelEmail,
    ChannelSms,
    ChannelInApp,
    Status,
    IsRead,
    ReadAt,
    SentAt,
    ExpiresAt,
    RetryCount,
    MaxRetries,
    FailedChannels,
    CreatedAt,
    UpdatedAt,
}
