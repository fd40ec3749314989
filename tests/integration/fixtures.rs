//! Test setup helpers: a migrated SQLite database per test plus row builders.

use migration::{Migrator, MigratorTrait};
use sea_orm::{entity::*, query::*, ConnectOptions, Database, DatabaseConnection};
use tempfile::TempDir;
use uuid::Uuid;

pub struct TestDb {
    pub db: DatabaseConnection,
    _dir: TempDir,
}

/// Fresh file-backed SQLite database with the full schema
pub async fn setup_test_db() -> TestDb {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let url = format!(
        "sqlite://{}?mode=rwc",
        dir.path().join("ledger.db").display()
    );

    let mut options = ConnectOptions::new(url);
    options
        .max_connections(1)
        .min_connections(1)
        .sqlx_logging(false);

    let db = Database::connect(options)
        .await
        .expect("Failed to connect to test database");

    Migrator::up(&db, None)
        .await
        .expect("Failed to run migrations");

    TestDb { db, _dir: dir }
}

pub fn now() -> time::OffsetDateTime {
    time::OffsetDateTime::now_utc()
}

pub async fn insert_user(
    db: &DatabaseConnection,
    role: &str,
    available_sessions: i32,
) -> entity::users::Model {
    entity::users::ActiveModel {
        email: Set(format!("client-{}@example.com", Uuid::new_v4())),
        first_name: Set("Test".to_string()),
        last_name: Set("Client".to_string()),
        role: Set(role.to_string()),
        available_sessions: Set(available_sessions),
        has_purchased_before: Set(false),
        last_purchase_date: Set(None),
        created_at: Set(now()),
        updated_at: Set(now()),
        ..Default::default()
    }
    .insert(db)
    .await
    .expect("Failed to insert user")
}

pub async fn insert_package(
    db: &DatabaseConnection,
    sessions: Option<i32>,
    price_cents: i64,
    is_active: bool,
) -> entity::packages::Model {
    entity::packages::ActiveModel {
        name: Set(format!("{} Session Pack", sessions.unwrap_or(0))),
        description: Set(None),
        package_type: Set("fixed".to_string()),
        sessions: Set(sessions),
        total_sessions: Set(None),
        price_cents: Set(price_cents),
        price_per_session_cents: Set(None),
        is_active: Set(is_active),
        created_at: Set(now()),
        ..Default::default()
    }
    .insert(db)
    .await
    .expect("Failed to insert package")
}

/// Pending, paid-at-gateway cart with `(package, quantity)` lines
pub async fn insert_cart(
    db: &DatabaseConnection,
    user_id: i32,
    lines: &[(&entity::packages::Model, i32)],
) -> entity::carts::Model {
    let total: i64 = lines
        .iter()
        .map(|(p, qty)| p.price_cents * i64::from(*qty))
        .sum();

    let cart = entity::carts::ActiveModel {
        user_id: Set(user_id),
        status: Set("pending".to_string()),
        payment_status: Set("pending".to_string()),
        total_cents: Set(total),
        sessions_granted: Set(false),
        completed_at: Set(None),
        grant_note: Set(None),
        created_at: Set(now()),
        updated_at: Set(now()),
        ..Default::default()
    }
    .insert(db)
    .await
    .expect("Failed to insert cart");

    for (package, quantity) in lines {
        entity::cart_items::ActiveModel {
            cart_id: Set(cart.id),
            package_id: Set(package.id),
            quantity: Set(*quantity),
            price_cents: Set(package.price_cents),
            ..Default::default()
        }
        .insert(db)
        .await
        .expect("Failed to insert cart item");
    }

    cart
}

pub async fn insert_session(
    db: &DatabaseConnection,
    user_id: Option<i32>,
    session_date: time::OffsetDateTime,
    status: &str,
) -> entity::session_records::Model {
    entity::session_records::ActiveModel {
        user_id: Set(user_id),
        trainer_id: Set(None),
        session_date: Set(session_date),
        status: Set(status.to_string()),
        is_blocked: Set(false),
        session_deducted: Set(false),
        deduction_date: Set(None),
        notes: Set(None),
        created_at: Set(now()),
        updated_at: Set(now()),
        ..Default::default()
    }
    .insert(db)
    .await
    .expect("Failed to insert session")
}

pub async fn user(db: &DatabaseConnection, id: i32) -> entity::users::Model {
    entity::users::Entity::find_by_id(id)
        .one(db)
        .await
        .expect("Failed to load user")
        .expect("User missing")
}

pub async fn balance(db: &DatabaseConnection, id: i32) -> i32 {
    user(db, id).await.available_sessions
}

pub async fn session(db: &DatabaseConnection, id: i32) -> entity::session_records::Model {
    entity::session_records::Entity::find_by_id(id)
        .one(db)
        .await
        .expect("Failed to load session")
        .expect("Session missing")
}

pub async fn order_count(db: &DatabaseConnection, user_id: i32) -> u64 {
    entity::orders::Entity::find()
        .filter(entity::orders::Column::UserId.eq(user_id))
        .count(db)
        .await
        .expect("Failed to count orders")
}
