use sea_orm_migration::{prelude::*, schema::*};

use super::m20250101_000001_create_ledger_tables::{Carts, Packages, Users};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Orders::Table)
                    .if_not_exists()
                    .col(pk_auto(Orders::Id))
                    .col(integer(Orders::UserId))
                    .col(integer_null(Orders::CartId))
                    .col(string(Orders::OrderNumber).unique_key())
                    .col(big_integer(Orders::TotalAmountCents).default(0))
                    .col(string(Orders::Status).default("pending"))
                    .col(string(Orders::PaymentMethod))
                    .col(string_null(Orders::PaymentReference))
                    .col(uuid_null(Orders::IdempotencyKey))
                    .col(text_null(Orders::Notes))
                    .col(integer_null(Orders::PaymentAppliedBy))
                    .col(json_null(Orders::Metadata))
                    .col(timestamp_with_time_zone_null(Orders::CompletedAt))
                    .col(timestamp_with_time_zone(Orders::CreatedAt).default(Expr::current_timestamp()))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_orders_user_id")
                            .from(Orders::Table, Orders::UserId)
                            .to(Users::Table, Users::Id)
                            .on_delete(ForeignKeyAction::Restrict),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_orders_cart_id")
                            .from(Orders::Table, Orders::CartId)
                            .to(Carts::Table, Carts::Id)
                            .on_delete(ForeignKeyAction::SetNull),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(OrderItems::Table)
                    .if_not_exists()
                    .col(pk_auto(OrderItems::Id))
                    .col(integer(OrderItems::OrderId))
                    .col(integer(OrderItems::PackageId))
                    .col(string(OrderItems::Name))
                    .col(integer(OrderItems::Quantity).default(1))
                    .col(big_integer(OrderItems::PriceCents).default(0))
                    .col(big_integer(OrderItems::SubtotalCents).default(0))
                    .col(json_null(OrderItems::Metadata))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_order_items_order_id")
                            .from(OrderItems::Table, OrderItems::OrderId)
                            .to(Orders::Table, Orders::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_order_items_package_id")
                            .from(OrderItems::Table, OrderItems::PackageId)
                            .to(Packages::Table, Packages::Id)
                            .on_delete(ForeignKeyAction::Restrict),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(FinancialTransactions::Table)
                    .if_not_exists()
                    .col(pk_auto(FinancialTransactions::Id))
                    .col(integer(FinancialTransactions::UserId))
                    .col(integer(FinancialTransactions::OrderId))
                    .col(integer_null(FinancialTransactions::CartId))
                    .col(big_integer(FinancialTransactions::AmountCents))
                    .col(string(FinancialTransactions::Currency).default("USD"))
                    .col(string(FinancialTransactions::Status))
                    .col(string(FinancialTransactions::PaymentMethod))
                    .col(text(FinancialTransactions::Description))
                    .col(json_null(FinancialTransactions::Metadata))
                    .col(timestamp_with_time_zone(FinancialTransactions::ProcessedAt))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_financial_transactions_order_id")
                            .from(FinancialTransactions::Table, FinancialTransactions::OrderId)
                            .to(Orders::Table, Orders::Id)
                            .on_delete(ForeignKeyAction::Restrict),
                    )
                    .to_owned(),
            )
            .await?;

        // Duplicate-window lookup: recent completed orders per client
        manager
            .create_index(
                Index::create()
                    .name("idx_orders_user_completed_at")
                    .table(Orders::Table)
                    .col(Orders::UserId)
                    .col(Orders::CompletedAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_order_items_order_id")
                    .table(OrderItems::Table)
                    .col(OrderItems::OrderId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(FinancialTransactions::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(OrderItems::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Orders::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub(crate) enum Orders {
    Table,
    Id,
    UserId,
    CartId,
    OrderNumber,
    TotalAmountCents,
    Status,
    PaymentMethod,
    PaymentReference,
    IdempotencyKey,
    Notes,
    PaymentAppliedBy,
    Metadata,
    CompletedAt,
    CreatedAt,
}

#[derive(DeriveIden)]
enum OrderItems {
    Table,
    Id,
    OrderId,
    PackageId,
    Name,
    Quantity,
    PriceCents,
    SubtotalCents,
    Metadata,
}

#[derive(DeriveIden)]
enum FinancialTransactions {
    Table,
    Id,
    UserId,
    OrderId,
    CartId,
    AmountCents,
    Currency,
    Status,
    PaymentMethod,
    Description,
    Metadata,
    ProcessedAt,
}
