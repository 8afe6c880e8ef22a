use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let money = |col: Earnings| {
            ColumnDef::new(col)
                .decimal_len(12, 2)
                .not_null()
                .default(0)
                .to_owned()
        };

        manager
            .create_table(
                Table::create()
                    .table(Earnings::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Earnings::Id).uuid().primary_key().not_null())
                    .col(ColumnDef::new(Earnings::UserId).uuid().not_null())
                    .col(ColumnDef::new(Earnings::UserType).string_len(32).not_null())
                    .col(ColumnDef::new(Earnings::OrderId).uuid().not_null())
                    .col(ColumnDef::new(Earnings::DeliveryAssignmentId).uuid().null())
                    .col(
                        ColumnDef::new(Earnings::TransactionType)
                            .string_len(16)
                            .not_null(),
                    )
                    .col(money(Earnings::GrossAmount))
                    .col(
                        ColumnDef::new(Earnings::CommissionRate)
                            .decimal_len(5, 2)
                            .not_null()
                            .default(0),
                    )
                    .col(money(Earnings::CommissionAmount))
                    .col(
                        ColumnDef::new(Earnings::TaxRate)
                            .decimal_len(5, 2)
                            .not_null()
                            .default(0),
                    )
                    .col(money(Earnings::TaxAmount))
                    .col(money(Earnings::PlatformFee))
                    .col(money(Earnings::ProcessingFee))
                    .col(money(Earnings::Penalty))
                    .col(money(Earnings::OtherDeductions))
                    .col(money(Earnings::NetAmount))
                    .col(
                        ColumnDef::new(Earnings::Currency)
                            .string_len(3)
                            .not_null()
                            .default("INR"),
                    )
                    .col(
                        ColumnDef::new(Earnings::Status)
                            .string_len(16)
                            .not_null()
                            .default("pending"),
                    )
                    .col(ColumnDef::new(Earnings::PaymentMethod).string_len(16).null())
                    .col(ColumnDef::new(Earnings::PaymentReference).string().null())
                    .col(
                        ColumnDef::new(Earnings::PaidAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(ColumnDef::new(Earnings::PeriodYear).integer().not_null())
                    .col(ColumnDef::new(Earnings::PeriodMonth).integer().not_null())
                    .col(ColumnDef::new(Earnings::PeriodWeek).integer().not_null())
                    .col(ColumnDef::new(Earnings::PeriodDay).integer().not_null())
                    .col(ColumnDef::new(Earnings::Description).text().null())
                    .col(
                        ColumnDef::new(Earnings::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Earnings::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_earnings_user_period")
                    .table(Earnings::Table)
                    .col(Earnings::UserId)
                    .col(Earnings::PeriodYear)
                    .col(Earnings::PeriodMonth)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Earnings::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden, Clone, Copy)]
pub enum Earnings {
    Table,
    Id,
    UserId,
    UserType,
    OrderId,
    DeliveryAssignmentId,
    TransactionType,
    GrossAmount,
    CommissionRate,
    CommissionAmount,
    TaxRate,
    TaxAmount,
    PlatformFee,
    ProcessingFee,
    Penalty,
    OtherDeductions,
    NetAmount,
    Currency,
    Status,
    PaymentMethod,
    PaymentReference,
    PaidAt,
    PeriodYear,
    PeriodMonth,
    PeriodWeek,
    PeriodDay,
    Description,
    CreatedAt,
    UpdatedAt,
}
