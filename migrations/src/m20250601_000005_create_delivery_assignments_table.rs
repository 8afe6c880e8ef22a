use sea_orm_migration::prelude::*;

use super::m20250601_000004_create_orders_tables::Orders;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(DeliveryAssignments::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(DeliveryAssignments::Id)
                            .uuid()
                            .primary_key()
                            .not_null(),
                    )
                    .col(ColumnDef::new(DeliveryAssignments::OrderId).uuid().not_null())
                    .col(
                        ColumnDef::new(DeliveryAssignments::DeliveryPartnerId)
                            .uuid()
                            .not_null(),
                    )
                    .col(ColumnDef::new(DeliveryAssignments::VendorId).uuid().not_null())
                    .col(ColumnDef::new(DeliveryAssignments::CustomerId).uuid().not_null())
                    .col(
                        ColumnDef::new(DeliveryAssignments::Status)
                            .string_len(32)
                            .not_null()
                            .default("assigned"),
                    )
                    .col(
                        ColumnDef::new(DeliveryAssignments::Priority)
                            .string_len(16)
                            .not_null()
                            .default("medium"),
                    )
                    .col(
                        ColumnDef::new(DeliveryAssignments::PickupAddress)
                            .text()
                            .not_null(),
                    )
                    .col(ColumnDef::new(DeliveryAssignments::PickupLatitude).double().null())
                    .col(ColumnDef::new(DeliveryAssignments::PickupLongitude).double().null())
                    .col(ColumnDef::new(DeliveryAssignments::PickupContactName).string().null())
                    .col(ColumnDef::new(DeliveryAssignments::PickupContactPhone).string().null())
                    .col(
                        ColumnDef::new(DeliveryAssignments::DeliveryAddress)
                            .text()
                            .not_null(),
                    )
                    .col(ColumnDef::new(DeliveryAssignments::DeliveryLatitude).double().null())
                    .col(ColumnDef::new(DeliveryAssignments::DeliveryLongitude).double().null())
                    .col(
                        ColumnDef::new(DeliveryAssignments::DeliveryContactName)
                            .string()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(DeliveryAssignments::DeliveryContactPhone)
                            .string()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(DeliveryAssignments::ScheduledPickupTime)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(DeliveryAssignments::ActualPickupTime)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(DeliveryAssignments::ScheduledDeliveryTime)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(DeliveryAssignments::ActualDeliveryTime)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(DeliveryAssignments::DistanceKm)
                            .double()
                            .not_null()
                            .default(0.0),
                    )
                    .col(
                        ColumnDef::new(DeliveryAssignments::EstimatedDurationMinutes)
                            .integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(DeliveryAssignments::DeliveryFee)
                            .decimal_len(12, 2)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(DeliveryAssignments::Tips)
                            .decimal_len(12, 2)
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(DeliveryAssignments::TotalEarnings)
                            .decimal_len(12, 2)
                            .not_null(),
                    )
                    .col(ColumnDef::new(DeliveryAssignments::ProofOfPickup).json().null())
                    .col(ColumnDef::new(DeliveryAssignments::ProofOfDelivery).json().null())
                    .col(ColumnDef::new(DeliveryAssignments::CurrentLatitude).double().null())
                    .col(ColumnDef::new(DeliveryAssignments::CurrentLongitude).double().null())
                    .col(ColumnDef::new(DeliveryAssignments::Speed).double().null())
                    .col(ColumnDef::new(DeliveryAssignments::Heading).double().null())
                    .col(
                        ColumnDef::new(DeliveryAssignments::LastTrackedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(ColumnDef::new(DeliveryAssignments::Issues).json().null())
                    .col(ColumnDef::new(DeliveryAssignments::CustomerRating).integer().null())
                    .col(ColumnDef::new(DeliveryAssignments::CustomerFeedback).text().null())
                    .col(
                        ColumnDef::new(DeliveryAssignments::PaymentStatus)
                            .string_len(16)
                            .not_null()
                            .default("pending"),
                    )
                    .col(
                        ColumnDef::new(DeliveryAssignments::DeliveryOtp)
                            .string_len(8)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(DeliveryAssignments::AssignedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(DeliveryAssignments::AcceptedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(DeliveryAssignments::CompletedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(DeliveryAssignments::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(DeliveryAssignments::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_delivery_assignments_order_id")
                            .from(DeliveryAssignments::Table, DeliveryAssignments::OrderId)
                            .to(Orders::Table, Orders::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_delivery_assignments_partner_status")
                    .table(DeliveryAssignments::Table)
                    .col(DeliveryAssignments::DeliveryPartnerId)
                    .col(DeliveryAssignments::Status)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_delivery_assignments_order_id")
                    .table(DeliveryAssignments::Table)
                    .col(DeliveryAssignments::OrderId)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(DeliveryAssignments::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum DeliveryAssignments {
    Table,
    Id,
    OrderId,
    DeliveryPartnerId,
    VendorId,
    CustomerId,
    Status,
    Priority,
    PickupAddress,
    PickupLatitude,
    PickupLongitude,
    PickupContactName,
    PickupContactPhone,
    DeliveryAddress,
    DeliveryLatitude,
    DeliveryLongitude,
    DeliveryContactName,
    DeliveryContactPhone,
    ScheduledPickupTime,
    ActualPickupTime,
    ScheduledDeliveryTime,
    ActualDeliveryTime,
    DistanceKm,
    EstimatedDurationMinutes,
    DeliveryFee,
    Tips,
    TotalEarnings,
    ProofOfPickup,
    ProofOfDelivery,
    CurrentLatitude,
    CurrentLongitude,
    Speed,
    Heading,
    LastTrackedAt,
    Issues,
    CustomerRating,
    CustomerFeedback,
    PaymentStatus,
    DeliveryOtp,
    AssignedAt,
    AcceptedAt,
    CompletedAt,
    CreatedAt,
    UpdatedAt,
}
