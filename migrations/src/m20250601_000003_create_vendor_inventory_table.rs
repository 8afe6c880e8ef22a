use sea_orm_migration::prelude::*;

use super::m20250601_000001_create_users_table::Users;
use super::m20250601_000002_create_products_table::Products;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(VendorInventory::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(VendorInventory::Id)
                            .uuid()
                            .primary_key()
                            .not_null(),
                    )
                    .col(ColumnDef::new(VendorInventory::VendorId).uuid().not_null())
                    .col(ColumnDef::new(VendorInventory::ProductId).uuid().not_null())
                    .col(
                        ColumnDef::new(VendorInventory::Stock)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(VendorInventory::ReservedStock)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(VendorInventory::AvailableStock)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(VendorInventory::MinStockLevel)
                            .integer()
                            .not_null()
                            .default(10),
                    )
                    .col(
                        ColumnDef::new(VendorInventory::MaxStockLevel)
                            .integer()
                            .not_null()
                            .default(1000),
                    )
                    .col(
                        ColumnDef::new(VendorInventory::CostPrice)
                            .decimal_len(12, 2)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(VendorInventory::SellingPrice)
                            .decimal_len(12, 2)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(VendorInventory::DiscountPercentage)
                            .decimal_len(5, 2)
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(VendorInventory::FinalPrice)
                            .decimal_len(12, 2)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(VendorInventory::IsActive)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(VendorInventory::LastRestocked)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(VendorInventory::ExpiryDate)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(ColumnDef::new(VendorInventory::BatchNumber).string().null())
                    .col(
                        ColumnDef::new(VendorInventory::ManufacturingDate)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(ColumnDef::new(VendorInventory::Supplier).string().null())
                    .col(ColumnDef::new(VendorInventory::Location).string().null())
                    .col(
                        ColumnDef::new(VendorInventory::LowStock)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(VendorInventory::NearExpiry)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(VendorInventory::OutOfStock)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(VendorInventory::Version)
                            .integer()
                            .not_null()
                            .default(1),
                    )
                    .col(
                        ColumnDef::new(VendorInventory::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(VendorInventory::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_vendor_inventory_vendor_id")
                            .from(VendorInventory::Table, VendorInventory::VendorId)
                            .to(Users::Table, Users::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_vendor_inventory_product_id")
                            .from(VendorInventory::Table, VendorInventory::ProductId)
                            .to(Products::Table, Products::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_vendor_inventory_vendor_product")
                    .table(VendorInventory::Table)
                    .col(VendorInventory::VendorId)
                    .col(VendorInventory::ProductId)
                    .unique()
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(VendorInventory::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum VendorInventory {
    Table,
    Id,
    VendorId,
    ProductId,
    Stock,
    ReservedStock,
    AvailableStock,
    MinStockLevel,
    MaxStockLevel,
    CostPrice,
    SellingPrice,
    DiscountPercentage,
    FinalPrice,
    IsActive,
    LastRestocked,
    ExpiryDate,
    BatchNumber,
    ManufacturingDate,
    Supplier,
    Location,
    LowStock,
    NearExpiry,
    OutOfStock,
    Version,
    CreatedAt,
    UpdatedAt,
}
