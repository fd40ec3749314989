//! Append-only Order / OrderItem / FinancialTransaction rows written inside
//! the caller's transaction.

use sea_orm::{entity::*, DatabaseTransaction};
use uuid::Uuid;

use crate::{
    error::Result,
    utils::{generate_order_number, OrderPrefix},
};

pub const CURRENCY: &str = "USD";

/// Fields of a completed order
pub struct NewOrder<'a> {
    pub user_id: i32,
    pub cart_id: Option<i32>,
    pub prefix: OrderPrefix,
    pub total_amount_cents: i64,
    pub payment_method: &'a str,
    pub payment_reference: Option<&'a str>,
    pub idempotency_key: Option<Uuid>,
    pub notes: Option<String>,
    pub payment_applied_by: Option<i32>,
    pub metadata: serde_json::Value,
    pub completed_at: time::OffsetDateTime,
}

pub struct NewOrderItem {
    pub order_id: i32,
    pub package_id: i32,
    pub name: String,
    pub quantity: i32,
    pub price_cents: i64,
    pub metadata: serde_json::Value,
}

pub struct NewFinancialTransaction<'a> {
    pub user_id: i32,
    pub order_id: i32,
    pub cart_id: Option<i32>,
    pub amount_cents: i64,
    pub payment_method: &'a str,
    pub description: String,
    pub metadata: serde_json::Value,
    pub processed_at: time::OffsetDateTime,
}

pub async fn record_order(
    txn: &DatabaseTransaction,
    order: NewOrder<'_>,
) -> Result<entity::orders::Model> {
    let model = entity::orders::ActiveModel {
        user_id: Set(order.user_id),
        cart_id: Set(order.cart_id),
        order_number: Set(generate_order_number(order.prefix, order.completed_at)),
        total_amount_cents: Set(order.total_amount_cents),
        status: Set("completed".to_string()),
        payment_method: Set(order.payment_method.to_string()),
        payment_reference: Set(order.payment_reference.map(|s| s.to_string())),
        idempotency_key: Set(order.idempotency_key),
        notes: Set(order.notes),
        payment_applied_by: Set(order.payment_applied_by),
        metadata: Set(Some(order.metadata)),
        completed_at: Set(Some(order.completed_at)),
        created_at: Set(order.completed_at),
        ..Default::default()
    };

    Ok(model.insert(txn).await?)
}

pub async fn record_order_item(
    txn: &DatabaseTransaction,
    item: NewOrderItem,
) -> Result<entity::order_items::Model> {
    let model = entity::order_items::ActiveModel {
        order_id: Set(item.order_id),
        package_id: Set(item.package_id),
        name: Set(item.name),
        quantity: Set(item.quantity),
        price_cents: Set(item.price_cents),
        subtotal_cents: Set(item.price_cents * i64::from(item.quantity)),
        metadata: Set(Some(item.metadata)),
        ..Default::default()
    };

    Ok(model.insert(txn).await?)
}

pub async fn record_financial_transaction(
    txn: &DatabaseTransaction,
    entry: NewFinancialTransaction<'_>,
) -> Result<entity::financial_transactions::Model> {
    let model = entity::financial_transactions::ActiveModel {
        user_id: Set(entry.user_id),
        order_id: Set(entry.order_id),
        cart_id: Set(entry.cart_id),
        amount_cents: Set(entry.amount_cents),
        currency: Set(CURRENCY.to_string()),
        status: Set("succeeded".to_string()),
        payment_method: Set(entry.payment_method.to_string()),
        description: Set(entry.description),
        metadata: Set(Some(entry.metadata)),
        processed_at: Set(entry.processed_at),
        ..Default::default()
    };

    Ok(model.insert(txn).await?)
}
