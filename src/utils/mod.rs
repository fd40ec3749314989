pub mod db;
pub mod order_number;
pub mod timefmt;

pub use db::{
    acquire_advisory_xact_lock, is_idempotency_key_violation, is_unique_violation,
    rollback_quietly, IDEMPOTENCY_KEY_INDEX,
};
pub use order_number::{generate_order_number, OrderPrefix};
pub use timefmt::{append_note, rfc3339};
