use sea_orm_migration::prelude::*;

use super::m20250101_000002_create_audit_tables::Orders;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Structural guard for recovery payments: one order per (client, token).
        // NULL keys (checkout grants) never collide.
        manager
            .create_index(
                Index::create()
                    .name("idx_orders_user_idempotency_key")
                    .table(Orders::Table)
                    .col(Orders::UserId)
                    .col(Orders::IdempotencyKey)
                    .unique()
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_orders_user_idempotency_key")
                    .table(Orders::Table)
                    .to_owned(),
            )
            .await
    }
}
