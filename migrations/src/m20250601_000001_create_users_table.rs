use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Users::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Users::Id).uuid().primary_key().not_null())
                    .col(ColumnDef::new(Users::Name).string().not_null())
                    .col(ColumnDef::new(Users::Email).string().not_null().unique_key())
                    .col(ColumnDef::new(Users::Phone).string().null())
                    .col(ColumnDef::new(Users::PasswordHash).string().not_null())
                    .col(ColumnDef::new(Users::Role).string_len(32).not_null())
                    .col(
                        ColumnDef::new(Users::IsVerified)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(Users::IsActive)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(ColumnDef::new(Users::Street).string().null())
                    .col(ColumnDef::new(Users::City).string().null())
                    .col(ColumnDef::new(Users::State).string().null())
                    .col(ColumnDef::new(Users::Pincode).string_len(6).null())
                    .col(ColumnDef::new(Users::Latitude).double().null())
                    .col(ColumnDef::new(Users::Longitude).double().null())
                    // vendor profile
                    .col(ColumnDef::new(Users::BusinessName).string().null())
                    .col(ColumnDef::new(Users::GstNumber).string().null())
                    .col(
                        ColumnDef::new(Users::CommissionRate)
                            .decimal_len(5, 2)
                            .not_null()
                            .default(10),
                    )
                    // delivery profile
                    .col(ColumnDef::new(Users::VehicleType).string().null())
                    .col(ColumnDef::new(Users::VehicleNumber).string().null())
                    .col(
                        ColumnDef::new(Users::IsAvailable)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(Users::ServiceRadiusKm)
                            .integer()
                            .not_null()
                            .default(10),
                    )
                    .col(
                        ColumnDef::new(Users::VerificationStatus)
                            .string_len(32)
                            .not_null()
                            .default("pending"),
                    )
                    .col(
                        ColumnDef::new(Users::RatingAverage)
                            .double()
                            .not_null()
                            .default(0.0),
                    )
                    .col(
                        ColumnDef::new(Users::RatingCount)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Users::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Users::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_users_role_available")
                    .table(Users::Table)
                    .col(Users::Role)
                    .col(Users::IsAvailable)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Users::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum Users {
    Table,
    Id,
    Name,
    Email,
    Phone,
    PasswordHash,
    Role,
    IsVerified,
    IsActive,
    Street,
    City,
    State,
    Pincode,
    Latitude,
    Longitude,
    BusinessName,
    GstNumber,
    CommissionRate,
    VehicleType,
    VehicleNumber,
    IsAvailable,
    ServiceRadiusKm,
    VerificationStatus,
    RatingAverage,
    RatingCount,
    CreatedAt,
    UpdatedAt,
}
