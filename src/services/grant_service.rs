use crate::{
    error::{LedgerError, Result},
    models::{
        common::{CartStatus, GrantSource, PaymentStatus},
        grant::GrantOutcome,
        package_ext::PackageExt,
    },
    services::audit_trail::{self, NewFinancialTransaction, NewOrder, NewOrderItem},
    utils::{rfc3339, rollback_quietly, OrderPrefix},
};
use anyhow::anyhow;
use sea_orm::{
    entity::*, query::*, sea_query::Expr, DatabaseConnection, DatabaseTransaction,
    TransactionTrait,
};
use serde_json::json;
use tracing::{error, info, instrument};

/// Converts a paid cart into session credits exactly once
pub struct GrantService {
    db: DatabaseConnection,
}

impl GrantService {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Grant the sessions purchased in `cart_id`.
    ///
    /// Safe to call from the checkout webhook, the verify endpoint and the
    /// reconciliation job in any order and any number of times: the cart row
    /// lock plus `sessions_granted` make every call after the first a no-op.
    #[instrument(skip(self), fields(granted_by = granted_by.as_str()))]
    pub async fn grant(
        &self,
        cart_id: i32,
        user_id: i32,
        granted_by: GrantSource,
    ) -> Result<GrantOutcome> {
        let txn = self.db.begin().await?;

        match self.grant_in_txn(cart_id, user_id, granted_by, &txn).await {
            Ok(outcome) if outcome.already_processed => {
                rollback_quietly(txn, "grant:already-processed").await;
                info!(
                    cart_id = cart_id,
                    user_id = user_id,
                    "Sessions already granted for cart, skipping (idempotent)"
                );
                Ok(outcome)
            }
            Ok(outcome) => {
                txn.commit().await?;
                info!(
                    cart_id = cart_id,
                    user_id = user_id,
                    sessions_added = outcome.sessions_added,
                    order_id = ?outcome.order_id,
                    "Granted sessions for cart"
                );
                Ok(outcome)
            }
            Err(e) => {
                error!(cart_id = cart_id, user_id = user_id, error = %e, "Session grant failed");
                rollback_quietly(txn, "grant").await;
                Err(e)
            }
        }
    }

    async fn grant_in_txn(
        &self,
        cart_id: i32,
        user_id: i32,
        granted_by: GrantSource,
        txn: &DatabaseTransaction,
    ) -> Result<GrantOutcome> {
        // Lock order: cart, then client
        let cart = entity::carts::Entity::find()
            .filter(entity::carts::Column::Id.eq(cart_id))
            .filter(entity::carts::Column::UserId.eq(user_id))
            .lock_exclusive()
            .one(txn)
            .await?
            .ok_or(LedgerError::CartNotFound { cart_id, user_id })?;

        // `status == completed` is not enough: a webhook may complete the cart
        // before the grant runs
        if cart.sessions_granted {
            return Ok(GrantOutcome::already_processed());
        }

        let lines = entity::cart_items::Entity::find()
            .filter(entity::cart_items::Column::CartId.eq(cart.id))
            .order_by_asc(entity::cart_items::Column::Id)
            .find_also_related(entity::packages::Entity)
            .all(txn)
            .await?;

        let sessions_to_add = total_sessions(&lines)?;

        let client = entity::users::Entity::find_by_id(user_id)
            .lock_exclusive()
            .one(txn)
            .await?
            .ok_or(LedgerError::ClientNotFound(user_id))?;

        let now = time::OffsetDateTime::now_utc();

        entity::users::Entity::update_many()
            .col_expr(
                entity::users::Column::AvailableSessions,
                Expr::col(entity::users::Column::AvailableSessions).add(sessions_to_add),
            )
            .col_expr(entity::users::Column::HasPurchasedBefore, Expr::value(true))
            .col_expr(entity::users::Column::LastPurchaseDate, Expr::value(now))
            .col_expr(entity::users::Column::UpdatedAt, Expr::value(now))
            .filter(entity::users::Column::Id.eq(client.id))
            .exec(txn)
            .await?;

        let total_cents = cart.total_cents;
        let mut cart_active: entity::carts::ActiveModel = cart.into();
        cart_active.status = Set(CartStatus::Completed.as_str().to_string());
        cart_active.payment_status = Set(PaymentStatus::Paid.as_str().to_string());
        cart_active.sessions_granted = Set(true);
        cart_active.completed_at = Set(Some(now));
        cart_active.grant_note = Set(Some(json!({
            "grantedBy": granted_by.as_str(),
            "grantedAt": rfc3339(now),
            "sessionsAdded": sessions_to_add,
            "previousBalance": client.available_sessions,
        })));
        cart_active.updated_at = Set(now);
        cart_active.update(txn).await?;

        let order = audit_trail::record_order(
            txn,
            NewOrder {
                user_id,
                cart_id: Some(cart_id),
                prefix: OrderPrefix::Checkout,
                total_amount_cents: total_cents,
                payment_method: "checkout",
                payment_reference: None,
                idempotency_key: None,
                notes: None,
                payment_applied_by: None,
                metadata: json!({ "grantedBy": granted_by.as_str() }),
                completed_at: now,
            },
        )
        .await?;

        for (line, package) in &lines {
            let sessions_per_unit = package.as_ref().map(|p| p.sessions_per_unit()).unwrap_or(0);
            let name = package
                .as_ref()
                .map(|p| p.name.clone())
                .unwrap_or_else(|| format!("Package #{}", line.package_id));

            audit_trail::record_order_item(
                txn,
                NewOrderItem {
                    order_id: order.id,
                    package_id: line.package_id,
                    name,
                    quantity: line.quantity,
                    price_cents: line.price_cents,
                    metadata: json!({
                        "sessionsGranted": sessions_per_unit * line.quantity,
                        "sessionsPerUnit": sessions_per_unit,
                    }),
                },
            )
            .await?;
        }

        audit_trail::record_financial_transaction(
            txn,
            NewFinancialTransaction {
                user_id,
                order_id: order.id,
                cart_id: Some(cart_id),
                amount_cents: total_cents,
                payment_method: "checkout",
                description: format!(
                    "Checkout cart #{} ({} sessions) via {}",
                    cart_id,
                    sessions_to_add,
                    granted_by.as_str()
                ),
                metadata: json!({
                    "grantedBy": granted_by.as_str(),
                    "sessionsAdded": sessions_to_add,
                }),
                processed_at: now,
            },
        )
        .await?;

        Ok(GrantOutcome {
            granted: true,
            sessions_added: sessions_to_add,
            already_processed: false,
            order_id: Some(order.id),
        })
    }
}

/// Σ(sessions per unit × quantity) over the cart lines
fn total_sessions(
    lines: &[(entity::cart_items::Model, Option<entity::packages::Model>)],
) -> Result<i32> {
    lines.iter().try_fold(0i32, |acc, (line, package)| {
        let per_unit = match package {
            Some(p) => p.sessions_per_unit(),
            None => {
                tracing::warn!(
                    cart_item_id = line.id,
                    package_id = line.package_id,
                    "Cart line has no resolvable package, granting 0 sessions for it"
                );
                0
            }
        };

        per_unit
            .checked_mul(line.quantity.max(0))
            .and_then(|line_total| acc.checked_add(line_total))
            .ok_or_else(|| {
                LedgerError::Internal(anyhow!("Session total overflow on cart line {}", line.id))
            })
    })
}
