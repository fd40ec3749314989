use crate::{
    config::LedgerConfig,
    error::{LedgerError, Result},
    models::{
        common::{CartStatus, PaymentStatus, Role},
        package_ext::PackageExt,
        recovery::{LastPackage, RecoveryOutcome, RecoveryPaymentRequest},
    },
    services::audit_trail::{self, NewFinancialTransaction, NewOrder, NewOrderItem},
    utils::{
        acquire_advisory_xact_lock, is_idempotency_key_violation, rfc3339, rollback_quietly,
        OrderPrefix,
    },
};
use sea_orm::{
    entity::*, query::*, sea_query::Expr, ConnectionTrait, DatabaseConnection,
    DatabaseTransaction, TransactionTrait,
};
use serde_json::json;
use std::time::Duration;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

/// Admin-initiated manual payments for a package
pub struct RecoveryService {
    db: DatabaseConnection,
    config: LedgerConfig,
}

/// Result of the in-transaction part of a recovery payment
enum Applied {
    /// New order written; the transaction must be committed
    Created(RecoveryOutcome),
    /// An earlier call with the same token already committed
    Replayed(RecoveryOutcome),
}

impl RecoveryService {
    pub fn new(db: DatabaseConnection, config: &LedgerConfig) -> Self {
        Self {
            db,
            config: config.clone(),
        }
    }

    /// Grant the credits of `package_id` to a client against an offline payment.
    ///
    /// Duplicate defence has two layers: a recent completed order for the same
    /// client+package is rejected unless `force` is set, and the
    /// `(user_id, idempotency_key)` unique index rejects a second order for the
    /// same token. A caller that loses that race is answered with the winner's order.
    #[instrument(
        skip(self, request),
        fields(
            client_id = request.client_id,
            package_id = request.package_id,
            admin_user_id = request.admin_user_id,
            force = request.force
        )
    )]
    pub async fn apply_package_payment(
        &self,
        request: RecoveryPaymentRequest,
    ) -> Result<RecoveryOutcome> {
        // No transaction is opened for invalid input
        let token = request.validate_with(&self.config)?;

        let txn = self.db.begin().await?;

        match self.apply_in_txn(&request, token, &txn).await {
            Ok(Applied::Replayed(outcome)) => {
                rollback_quietly(txn, "recovery:replay").await;
                info!(
                    order_id = outcome.order_id,
                    idempotency_token = %token,
                    "Idempotency token already applied, returning existing order"
                );
                Ok(outcome)
            }
            Ok(Applied::Created(outcome)) => match txn.commit().await {
                Ok(()) => {
                    info!(
                        order_id = outcome.order_id,
                        order_number = %outcome.order_number,
                        sessions_added = outcome.sessions_added,
                        new_balance = outcome.new_balance,
                        "Recovery payment applied"
                    );
                    Ok(outcome)
                }
                Err(e) if is_idempotency_key_violation(&e) => {
                    warn!(idempotency_token = %token, "Idempotency key collision at commit");
                    self.reconcile_idempotency_collision(request.client_id, token)
                        .await
                }
                Err(e) => {
                    error!(error = %e, "Recovery payment commit failed");
                    Err(e.into())
                }
            },
            Err(LedgerError::Database(e)) if is_idempotency_key_violation(&e) => {
                warn!(idempotency_token = %token, "Idempotency key collision, reconciling");
                rollback_quietly(txn, "recovery:collision").await;
                self.reconcile_idempotency_collision(request.client_id, token)
                    .await
            }
            Err(e) => {
                warn!(code = e.code(), error = %e, "Recovery payment rejected");
                rollback_quietly(txn, "recovery").await;
                Err(e)
            }
        }
    }

    async fn apply_in_txn(
        &self,
        request: &RecoveryPaymentRequest,
        token: Uuid,
        txn: &DatabaseTransaction,
    ) -> Result<Applied> {
        // Lock order: client row, then the client+package advisory lock
        let client = entity::users::Entity::find_by_id(request.client_id)
            .lock_exclusive()
            .one(txn)
            .await?
            .ok_or(LedgerError::ClientNotFound(request.client_id))?;

        let role = Role::from_str(&client.role);
        if !role.is_some_and(|r| r.can_hold_credits()) {
            return Err(LedgerError::NotAClient(client.id));
        }

        acquire_advisory_xact_lock(txn, request.client_id, request.package_id).await?;

        // Same token, already committed: the same request
        if let Some(existing) = find_order_by_token(txn, request.client_id, token).await? {
            return Ok(Applied::Replayed(replay_outcome(txn, existing).await?));
        }

        let now = time::OffsetDateTime::now_utc();

        if request.force {
            warn!(
                force_reason = request.force_reason.as_deref().unwrap_or_default(),
                "Duplicate-window check skipped by force"
            );
        } else {
            let window_secs = self.config.duplicate_window_secs as i64;
            let window_start = now - time::Duration::seconds(window_secs);

            let recent = entity::orders::Entity::find()
                .inner_join(entity::order_items::Entity)
                .filter(entity::orders::Column::UserId.eq(request.client_id))
                .filter(entity::orders::Column::Status.eq("completed"))
                .filter(entity::orders::Column::CompletedAt.gte(window_start))
                .filter(entity::order_items::Column::PackageId.eq(request.package_id))
                .order_by_desc(entity::orders::Column::CompletedAt)
                .one(txn)
                .await?;

            if let Some(recent) = recent {
                let completed_at = recent.completed_at.unwrap_or(recent.created_at);
                return Err(LedgerError::DuplicatePaymentWindow {
                    order_id: recent.id,
                    order_number: recent.order_number,
                    seconds_ago: (now - completed_at).whole_seconds().max(0),
                });
            }
        }

        let package = entity::packages::Entity::find_by_id(request.package_id)
            .one(txn)
            .await?
            .ok_or(LedgerError::PackageNotFound(request.package_id))?;

        if !package.is_active {
            return Err(LedgerError::PackageInactive(package.id));
        }

        let sessions_to_add = package.sessions_per_unit();
        if sessions_to_add <= 0 {
            return Err(LedgerError::PackageHasNoSessions(package.id));
        }

        let total_amount_cents = package.unit_price_cents();
        let method = request.payment_method.as_str();
        let reference = request.trimmed_reference();

        // Completed cart standing in for the checkout that never happened
        let recovery_cart = entity::carts::ActiveModel {
            user_id: Set(client.id),
            status: Set(CartStatus::Completed.as_str().to_string()),
            payment_status: Set(PaymentStatus::Paid.as_str().to_string()),
            total_cents: Set(total_amount_cents),
            sessions_granted: Set(true),
            completed_at: Set(Some(now)),
            grant_note: Set(Some(json!({
                "type": "admin_recovery",
                "grantedBy": "admin-recovery",
                "adminUserId": request.admin_user_id,
                "paymentMethod": method,
                "paymentReference": reference,
                "sessionsAdded": sessions_to_add,
                "createdAt": rfc3339(now),
            }))),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(txn)
        .await?;

        let order = audit_trail::record_order(
            txn,
            NewOrder {
                user_id: client.id,
                cart_id: Some(recovery_cart.id),
                prefix: OrderPrefix::Recovery,
                total_amount_cents,
                payment_method: method,
                payment_reference: reference,
                idempotency_key: Some(token),
                notes: Some(
                    request
                        .notes
                        .clone()
                        .unwrap_or_else(|| format!("Admin recovery payment via {}", method)),
                ),
                payment_applied_by: Some(request.admin_user_id),
                metadata: json!({
                    "type": "admin_recovery",
                    "forced": request.force,
                    "forceReason": request.force_reason,
                    "previousBalance": client.available_sessions,
                    "newBalance": client.available_sessions + sessions_to_add,
                }),
                completed_at: now,
            },
        )
        .await?;

        audit_trail::record_order_item(
            txn,
            NewOrderItem {
                order_id: order.id,
                package_id: package.id,
                name: package.name.clone(),
                quantity: 1,
                price_cents: total_amount_cents,
                metadata: json!({
                    "sessionsGranted": sessions_to_add,
                    "pricePerSessionCents": package.price_per_session_cents,
                    "adminRecovery": true,
                }),
            },
        )
        .await?;

        audit_trail::record_financial_transaction(
            txn,
            NewFinancialTransaction {
                user_id: client.id,
                order_id: order.id,
                cart_id: Some(recovery_cart.id),
                amount_cents: total_amount_cents,
                payment_method: method,
                description: format!(
                    "Admin recovery: {} ({} sessions) via {}",
                    package.name, sessions_to_add, method
                ),
                metadata: json!({
                    "type": "admin_recovery",
                    "adminUserId": request.admin_user_id,
                    "paymentReference": reference,
                    "packageId": package.id,
                    "packageName": package.name,
                    "sessionsAdded": sessions_to_add,
                }),
                processed_at: now,
            },
        )
        .await?;

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

        // First purchase turns a prospect into a client
        entity::users::Entity::update_many()
            .col_expr(
                entity::users::Column::Role,
                Expr::value(Role::Client.as_str()),
            )
            .filter(entity::users::Column::Id.eq(client.id))
            .filter(entity::users::Column::Role.eq(Role::Prospect.as_str()))
            .exec(txn)
            .await?;

        Ok(Applied::Created(RecoveryOutcome {
            order_id: order.id,
            order_number: order.order_number,
            sessions_added: sessions_to_add,
            previous_balance: client.available_sessions,
            new_balance: client.available_sessions + sessions_to_add,
            package_name: package.name,
            total_amount_cents,
            reconciled: false,
        }))
    }

    /// Look for the order that won an idempotency-key race, giving the winner
    /// time to commit. Waits `n × backoff` before the n-th lookup.
    #[instrument(skip(self))]
    pub async fn reconcile_idempotency_collision(
        &self,
        client_id: i32,
        token: Uuid,
    ) -> Result<RecoveryOutcome> {
        for attempt in 1..=self.config.reconcile_attempts {
            let backoff = self.config.reconcile_backoff_ms * u64::from(attempt);
            tokio::time::sleep(Duration::from_millis(backoff)).await;

            if let Some(winner) = find_order_by_token(&self.db, client_id, token).await? {
                info!(
                    order_id = winner.id,
                    attempt = attempt,
                    "Reconciled idempotency collision with winning order"
                );
                return replay_outcome(&self.db, winner).await;
            }
        }

        error!(
            client_id = client_id,
            idempotency_token = %token,
            "Idempotency collision without a visible winning order"
        );
        Err(LedgerError::IdempotencyReconciliationFailed(token))
    }

    /// Package of the client's most recent completed order, to pre-fill a recovery payment
    #[instrument(skip(self))]
    pub async fn client_last_package(&self, client_id: i32) -> Result<Option<LastPackage>> {
        let Some(order) = entity::orders::Entity::find()
            .filter(entity::orders::Column::UserId.eq(client_id))
            .filter(entity::orders::Column::Status.eq("completed"))
            .order_by_desc(entity::orders::Column::CreatedAt)
            .order_by_desc(entity::orders::Column::Id)
            .one(&self.db)
            .await?
        else {
            return Ok(None);
        };

        let item = entity::order_items::Entity::find()
            .filter(entity::order_items::Column::OrderId.eq(order.id))
            .order_by_asc(entity::order_items::Column::Id)
            .find_also_related(entity::packages::Entity)
            .one(&self.db)
            .await?;

        Ok(match item {
            Some((_, Some(package))) => Some(LastPackage {
                package_id: package.id,
                sessions: package.sessions_per_unit(),
                price_cents: package.price_cents,
                price_per_session_cents: package.price_per_session_cents,
                package_type: package.package_type,
                package_name: package.name,
                order_id: order.id,
            }),
            _ => None,
        })
    }
}

async fn find_order_by_token<C: ConnectionTrait>(
    conn: &C,
    client_id: i32,
    token: Uuid,
) -> Result<Option<entity::orders::Model>> {
    Ok(entity::orders::Entity::find()
        .filter(entity::orders::Column::UserId.eq(client_id))
        .filter(entity::orders::Column::IdempotencyKey.eq(token))
        .one(conn)
        .await?)
}

/// Describe an already-committed recovery order as if this call had created it
async fn replay_outcome<C: ConnectionTrait>(
    conn: &C,
    order: entity::orders::Model,
) -> Result<RecoveryOutcome> {
    let item = entity::order_items::Entity::find()
        .filter(entity::order_items::Column::OrderId.eq(order.id))
        .order_by_asc(entity::order_items::Column::Id)
        .find_also_related(entity::packages::Entity)
        .one(conn)
        .await?;

    let (package_name, sessions_added) = match item {
        Some((item, package)) => {
            let recorded = item
                .metadata
                .as_ref()
                .and_then(|m| m.get("sessionsGranted"))
                .and_then(|v| v.as_i64())
                .and_then(|v| i32::try_from(v).ok());
            let sessions = recorded.unwrap_or_else(|| {
                package.map(|p| p.sessions_per_unit()).unwrap_or(0) * item.quantity
            });
            (item.name, sessions)
        }
        None => (String::new(), 0),
    };

    // Balances as of the original commit; later sweeps or grants do not shift them
    let recorded_balance = |key: &str| {
        order
            .metadata
            .as_ref()
            .and_then(|m| m.get(key))
            .and_then(|v| v.as_i64())
            .and_then(|v| i32::try_from(v).ok())
    };
    let (previous_balance, new_balance) =
        match (recorded_balance("previousBalance"), recorded_balance("newBalance")) {
            (Some(previous), Some(new)) => (previous, new),
            (Some(previous), None) => (previous, previous + sessions_added),
            _ => {
                // Orders written without balance metadata: best effort from the live balance
                let balance = entity::users::Entity::find_by_id(order.user_id)
                    .one(conn)
                    .await?
                    .map(|c| c.available_sessions)
                    .unwrap_or(0);
                ((balance - sessions_added).max(0), balance)
            }
        };

    Ok(RecoveryOutcome {
        order_id: order.id,
        order_number: order.order_number,
        sessions_added,
        previous_balance,
        new_balance,
        package_name,
        total_amount_cents: order.total_amount_cents,
        reconciled: true,
    })
}
