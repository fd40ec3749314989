//! SeaORM entities for the session-credit ledger.

pub mod prelude;

pub mod cart_items;
pub mod carts;
pub mod financial_transactions;
pub mod order_items;
pub mod orders;
pub mod packages;
pub mod session_records;
pub mod users;
