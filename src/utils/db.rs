use sea_orm::{
    ConnectionTrait, DatabaseBackend, DatabaseTransaction, DbErr, SqlErr, Statement,
};
use tracing::warn;

/// Roll back, logging instead of returning a rollback failure so the
/// caller's original error is never masked.
pub async fn rollback_quietly(txn: DatabaseTransaction, context: &str) {
    if let Err(e) = txn.rollback().await {
        warn!(context = context, error = %e, "Transaction rollback failed");
    }
}

/// PostgreSQL 23505 / SQLite UNIQUE constraint failures
pub fn is_unique_violation(err: &DbErr) -> bool {
    if matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) {
        return true;
    }

    let msg = err.to_string().to_lowercase();
    msg.contains("23505") || msg.contains("duplicate key") || msg.contains("unique constraint")
}

/// Unique index guarding one recovery order per `(user_id, idempotency_key)`
pub const IDEMPOTENCY_KEY_INDEX: &str = "idx_orders_user_idempotency_key";

/// Unique violation raised by the idempotency-key index specifically.
/// Postgres names the index; SQLite names the indexed columns.
pub fn is_idempotency_key_violation(err: &DbErr) -> bool {
    if !is_unique_violation(err) {
        return false;
    }

    let names_key = |msg: &str| {
        msg.contains(IDEMPOTENCY_KEY_INDEX) || msg.contains("orders.idempotency_key")
    };

    match err.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(msg)) if names_key(&msg) => true,
        _ => names_key(&err.to_string()),
    }
}

/// Transaction-scoped advisory lock on a pair of integer keys, released at
/// commit or rollback. SQLite already serializes writers, so it is a no-op there.
pub async fn acquire_advisory_xact_lock(
    txn: &DatabaseTransaction,
    key1: i32,
    key2: i32,
) -> Result<(), DbErr> {
    if txn.get_database_backend() != DatabaseBackend::Postgres {
        return Ok(());
    }

    txn.execute(Statement::from_sql_and_values(
        DatabaseBackend::Postgres,
        "SELECT pg_advisory_xact_lock($1, $2)",
        [key1.into(), key2.into()],
    ))
    .await?;

    Ok(())
}
