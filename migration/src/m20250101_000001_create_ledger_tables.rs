use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Create users table (FIRST - other tables reference this)
        manager
            .create_table(
                Table::create()
                    .table(Users::Table)
                    .if_not_exists()
                    .col(pk_auto(Users::Id))
                    .col(string(Users::Email).unique_key())
                    .col(string(Users::FirstName))
                    .col(string(Users::LastName))
                    .col(string(Users::Role).default("prospect"))
                    .col(integer(Users::AvailableSessions).default(0))
                    .col(boolean(Users::HasPurchasedBefore).default(false))
                    .col(timestamp_with_time_zone_null(Users::LastPurchaseDate))
                    .col(timestamp_with_time_zone(Users::CreatedAt).default(Expr::current_timestamp()))
                    .col(timestamp_with_time_zone(Users::UpdatedAt).default(Expr::current_timestamp()))
                    .check(Expr::col(Users::AvailableSessions).gte(0))
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Packages::Table)
                    .if_not_exists()
                    .col(pk_auto(Packages::Id))
                    .col(string(Packages::Name))
                    .col(text_null(Packages::Description))
                    .col(string(Packages::PackageType).default("fixed"))
                    .col(integer_null(Packages::Sessions))
                    .col(integer_null(Packages::TotalSessions))
                    .col(big_integer(Packages::PriceCents).default(0))
                    .col(big_integer_null(Packages::PricePerSessionCents))
                    .col(boolean(Packages::IsActive).default(true))
                    .col(timestamp_with_time_zone(Packages::CreatedAt).default(Expr::current_timestamp()))
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Carts::Table)
                    .if_not_exists()
                    .col(pk_auto(Carts::Id))
                    .col(integer(Carts::UserId))
                    .col(string(Carts::Status).default("active"))
                    .col(string(Carts::PaymentStatus).default("unpaid"))
                    .col(big_integer(Carts::TotalCents).default(0))
                    .col(boolean(Carts::SessionsGranted).default(false))
                    .col(timestamp_with_time_zone_null(Carts::CompletedAt))
                    .col(json_null(Carts::GrantNote))
                    .col(timestamp_with_time_zone(Carts::CreatedAt).default(Expr::current_timestamp()))
                    .col(timestamp_with_time_zone(Carts::UpdatedAt).default(Expr::current_timestamp()))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_carts_user_id")
                            .from(Carts::Table, Carts::UserId)
                            .to(Users::Table, Users::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(CartItems::Table)
                    .if_not_exists()
                    .col(pk_auto(CartItems::Id))
                    .col(integer(CartItems::CartId))
                    .col(integer(CartItems::PackageId))
                    .col(integer(CartItems::Quantity).default(1))
                    .col(big_integer(CartItems::PriceCents).default(0))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_cart_items_cart_id")
                            .from(CartItems::Table, CartItems::CartId)
                            .to(Carts::Table, Carts::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_cart_items_package_id")
                            .from(CartItems::Table, CartItems::PackageId)
                            .to(Packages::Table, Packages::Id)
                            .on_delete(ForeignKeyAction::Restrict),
                    )
                    .to_owned(),
            )
            .await?;

        // No foreign key on user_id: sessions may outlive the user row
        manager
            .create_table(
                Table::create()
                    .table(SessionRecords::Table)
                    .if_not_exists()
                    .col(pk_auto(SessionRecords::Id))
                    .col(integer_null(SessionRecords::UserId))
                    .col(integer_null(SessionRecords::TrainerId))
                    .col(timestamp_with_time_zone(SessionRecords::SessionDate))
                    .col(string(SessionRecords::Status).default("available"))
                    .col(boolean(SessionRecords::IsBlocked).default(false))
                    .col(boolean(SessionRecords::SessionDeducted).default(false))
                    .col(timestamp_with_time_zone_null(SessionRecords::DeductionDate))
                    .col(text_null(SessionRecords::Notes))
                    .col(timestamp_with_time_zone(SessionRecords::CreatedAt).default(Expr::current_timestamp()))
                    .col(timestamp_with_time_zone(SessionRecords::UpdatedAt).default(Expr::current_timestamp()))
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_carts_user_id")
                    .table(Carts::Table)
                    .col(Carts::UserId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_cart_items_cart_id")
                    .table(CartItems::Table)
                    .col(CartItems::CartId)
                    .to_owned(),
            )
            .await?;

        // Sweep scan: overdue, undeducted sessions
        manager
            .create_index(
                Index::create()
                    .name("idx_session_records_sweep")
                    .table(SessionRecords::Table)
                    .col(SessionRecords::SessionDeducted)
                    .col(SessionRecords::Status)
                    .col(SessionRecords::SessionDate)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_session_records_user_id")
                    .table(SessionRecords::Table)
                    .col(SessionRecords::UserId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(SessionRecords::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(CartItems::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Carts::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Packages::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Users::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub(crate) enum Users {
    Table,
    Id,
    Email,
    FirstName,
    LastName,
    Role,
    AvailableSessions,
    HasPurchasedBefore,
    LastPurchaseDate,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
pub(crate) enum Packages {
    Table,
    Id,
    Name,
    Description,
    PackageType,
    Sessions,
    TotalSessions,
    PriceCents,
    PricePerSessionCents,
    IsActive,
    CreatedAt,
}

#[derive(DeriveIden)]
pub(crate) enum Carts {
    Table,
    Id,
    UserId,
    Status,
    PaymentStatus,
    TotalCents,
    SessionsGranted,
    CompletedAt,
    GrantNote,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum CartItems {
    Table,
    Id,
    CartId,
    PackageId,
    Quantity,
    PriceCents,
}

#[derive(DeriveIden)]
enum SessionRecords {
    Table,
    Id,
    UserId,
    TrainerId,
    SessionDate,
    Status,
    IsBlocked,
    SessionDeducted,
    DeductionDate,
    Notes,
    CreatedAt,
    UpdatedAt,
}
