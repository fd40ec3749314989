use crate::fixtures::*;
use sea_orm::{entity::*, query::*};
use session_ledger::{
    config::LedgerConfig,
    models::{common::PaymentMethod, recovery::RecoveryPaymentRequest},
    services::{DeductionService, RecoveryService},
    utils::{is_idempotency_key_violation, is_unique_violation},
};
use uuid::Uuid;

fn cash_request(client_id: i32, package_id: i32) -> RecoveryPaymentRequest {
    RecoveryPaymentRequest {
        client_id,
        package_id,
        payment_method: PaymentMethod::Cash,
        payment_reference: None,
        notes: Some("Paid at front desk".to_string()),
        idempotency_token: Uuid::new_v4().to_string(),
        force: false,
        force_reason: None,
        admin_user_id: 1,
    }
}

fn fast_config() -> LedgerConfig {
    LedgerConfig {
        reconcile_attempts: 2,
        reconcile_backoff_ms: 1,
        ..Default::default()
    }
}

#[tokio::test]
async fn test_recovery_payment_grants_package_and_upgrades_prospect() {
    let t = setup_test_db().await;
    let prospect = insert_user(&t.db, "prospect", 0).await;
    let package = insert_package(&t.db, Some(10), 90_000, true).await;

    let service = RecoveryService::new(t.db.clone(), &LedgerConfig::default());
    let request = cash_request(prospect.id, package.id);
    let token = request.idempotency_token.clone();

    let outcome = service.apply_package_payment(request).await.unwrap();

    assert!(outcome.order_number.starts_with("REC-"));
    assert_eq!(outcome.sessions_added, 10);
    assert_eq!(outcome.previous_balance, 0);
    assert_eq!(outcome.new_balance, 10);
    assert_eq!(outcome.total_amount_cents, 90_000);
    assert_eq!(outcome.package_name, package.name);
    assert!(!outcome.reconciled);

    let client = user(&t.db, prospect.id).await;
    assert_eq!(client.available_sessions, 10);
    assert_eq!(client.role, "client");
    assert!(client.has_purchased_before);

    let order = entity::orders::Entity::find_by_id(outcome.order_id)
        .one(&t.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(order.status, "completed");
    assert_eq!(order.payment_method, "cash");
    assert_eq!(order.payment_applied_by, Some(1));
    assert_eq!(order.idempotency_key.map(|k| k.to_string()), Some(token));

    let cart = entity::carts::Entity::find_by_id(order.cart_id.unwrap())
        .one(&t.db)
        .await
        .unwrap()
        .unwrap();
    assert!(cart.sessions_granted);
    assert_eq!(cart.status, "completed");
    assert_eq!(cart.grant_note.unwrap()["type"], "admin_recovery");

    let transactions = entity::financial_transactions::Entity::find()
        .filter(entity::financial_transactions::Column::OrderId.eq(order.id))
        .count(&t.db)
        .await
        .unwrap();
    assert_eq!(transactions, 1);
}

#[tokio::test]
async fn test_double_submit_within_window_is_rejected() {
    let t = setup_test_db().await;
    let client = insert_user(&t.db, "client", 2).await;
    let package = insert_package(&t.db, Some(5), 45_000, true).await;

    let service = RecoveryService::new(t.db.clone(), &LedgerConfig::default());
    let first = service
        .apply_package_payment(cash_request(client.id, package.id))
        .await
        .unwrap();

    let err = service
        .apply_package_payment(cash_request(client.id, package.id))
        .await
        .unwrap_err();

    assert_eq!(err.code(), "DUPLICATE_PAYMENT_WINDOW");
    assert!(err.to_string().contains(&first.order_number));
    assert_eq!(balance(&t.db, client.id).await, 7);
    assert_eq!(order_count(&t.db, client.id).await, 1);
}

#[tokio::test]
async fn test_window_only_applies_to_same_package() {
    let t = setup_test_db().await;
    let client = insert_user(&t.db, "client", 0).await;
    let five = insert_package(&t.db, Some(5), 45_000, true).await;
    let ten = insert_package(&t.db, Some(10), 80_000, true).await;

    let service = RecoveryService::new(t.db.clone(), &LedgerConfig::default());
    service
        .apply_package_payment(cash_request(client.id, five.id))
        .await
        .unwrap();
    service
        .apply_package_payment(cash_request(client.id, ten.id))
        .await
        .unwrap();

    assert_eq!(balance(&t.db, client.id).await, 15);
}

#[tokio::test]
async fn test_zero_window_allows_back_to_back_payments() {
    let t = setup_test_db().await;
    let client = insert_user(&t.db, "client", 0).await;
    let package = insert_package(&t.db, Some(5), 45_000, true).await;

    let config = LedgerConfig {
        duplicate_window_secs: 0,
        ..Default::default()
    };
    let service = RecoveryService::new(t.db.clone(), &config);

    service
        .apply_package_payment(cash_request(client.id, package.id))
        .await
        .unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    service
        .apply_package_payment(cash_request(client.id, package.id))
        .await
        .unwrap();

    assert_eq!(balance(&t.db, client.id).await, 10);
}

#[tokio::test]
async fn test_force_bypasses_window_with_reason() {
    let t = setup_test_db().await;
    let client = insert_user(&t.db, "client", 0).await;
    let package = insert_package(&t.db, Some(5), 45_000, true).await;

    let service = RecoveryService::new(t.db.clone(), &LedgerConfig::default());
    service
        .apply_package_payment(cash_request(client.id, package.id))
        .await
        .unwrap();

    let mut forced = cash_request(client.id, package.id);
    forced.force = true;
    forced.force_reason = Some("Client bought two packs in one visit".to_string());
    let outcome = service.apply_package_payment(forced).await.unwrap();

    assert_eq!(outcome.previous_balance, 5);
    assert_eq!(outcome.new_balance, 10);
    assert_eq!(balance(&t.db, client.id).await, 10);
    assert_eq!(order_count(&t.db, client.id).await, 2);
}

#[tokio::test]
async fn test_force_without_reason_is_rejected() {
    let t = setup_test_db().await;
    let client = insert_user(&t.db, "client", 0).await;
    let package = insert_package(&t.db, Some(5), 45_000, true).await;

    let mut request = cash_request(client.id, package.id);
    request.force = true;
    request.force_reason = Some("oops".to_string());

    let err = RecoveryService::new(t.db.clone(), &LedgerConfig::default())
        .apply_package_payment(request)
        .await
        .unwrap_err();

    assert_eq!(err.code(), "VALIDATION_ERROR");
    assert_eq!(order_count(&t.db, client.id).await, 0);
}

#[tokio::test]
async fn test_invalid_token_writes_nothing() {
    let t = setup_test_db().await;
    let client = insert_user(&t.db, "client", 0).await;
    let package = insert_package(&t.db, Some(5), 45_000, true).await;

    let mut request = cash_request(client.id, package.id);
    request.idempotency_token = "not-a-uuid".to_string();

    let err = RecoveryService::new(t.db.clone(), &LedgerConfig::default())
        .apply_package_payment(request)
        .await
        .unwrap_err();

    assert_eq!(err.code(), "VALIDATION_ERROR");
    assert_eq!(balance(&t.db, client.id).await, 0);
    assert_eq!(order_count(&t.db, client.id).await, 0);
}

#[tokio::test]
async fn test_check_payment_requires_reference() {
    let t = setup_test_db().await;
    let client = insert_user(&t.db, "client", 0).await;
    let package = insert_package(&t.db, Some(5), 45_000, true).await;
    let service = RecoveryService::new(t.db.clone(), &LedgerConfig::default());

    let mut request = cash_request(client.id, package.id);
    request.payment_method = PaymentMethod::Check;
    let err = service.apply_package_payment(request).await.unwrap_err();
    assert_eq!(err.code(), "VALIDATION_ERROR");

    let mut request = cash_request(client.id, package.id);
    request.payment_method = PaymentMethod::Check;
    request.payment_reference = Some("  CHK-1042 ".to_string());
    let outcome = service.apply_package_payment(request).await.unwrap();

    let order = entity::orders::Entity::find_by_id(outcome.order_id)
        .one(&t.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(order.payment_reference.as_deref(), Some("CHK-1042"));
}

#[tokio::test]
async fn test_rejects_unusable_package_or_client() {
    let t = setup_test_db().await;
    let client = insert_user(&t.db, "client", 0).await;
    let trainer = insert_user(&t.db, "trainer", 0).await;
    let inactive = insert_package(&t.db, Some(5), 45_000, false).await;
    let empty = insert_package(&t.db, None, 45_000, true).await;
    let active = insert_package(&t.db, Some(5), 45_000, true).await;

    let service = RecoveryService::new(t.db.clone(), &LedgerConfig::default());
    let code = |r: session_ledger::Result<_>| r.unwrap_err().code();

    assert_eq!(
        code(service.apply_package_payment(cash_request(client.id, inactive.id)).await),
        "PACKAGE_INACTIVE"
    );
    assert_eq!(
        code(service.apply_package_payment(cash_request(client.id, empty.id)).await),
        "PACKAGE_HAS_NO_SESSIONS"
    );
    assert_eq!(
        code(service.apply_package_payment(cash_request(client.id, active.id + 100)).await),
        "PACKAGE_NOT_FOUND"
    );
    assert_eq!(
        code(service.apply_package_payment(cash_request(client.id + 100, active.id)).await),
        "CLIENT_NOT_FOUND"
    );
    assert_eq!(
        code(service.apply_package_payment(cash_request(trainer.id, active.id)).await),
        "NOT_A_CLIENT"
    );

    assert_eq!(balance(&t.db, client.id).await, 0);
    assert_eq!(order_count(&t.db, client.id).await, 0);
}

#[tokio::test]
async fn test_same_token_replay_returns_existing_order() {
    let t = setup_test_db().await;
    let client = insert_user(&t.db, "client", 0).await;
    let package = insert_package(&t.db, Some(5), 45_000, true).await;
    let service = RecoveryService::new(t.db.clone(), &LedgerConfig::default());

    let request = cash_request(client.id, package.id);
    let first = service.apply_package_payment(request.clone()).await.unwrap();
    let replay = service.apply_package_payment(request).await.unwrap();

    assert_eq!(replay.order_id, first.order_id);
    assert_eq!(replay.order_number, first.order_number);
    assert_eq!(replay.sessions_added, 5);
    assert!(replay.reconciled);
    assert_eq!(balance(&t.db, client.id).await, 5);
    assert_eq!(order_count(&t.db, client.id).await, 1);
}

#[tokio::test]
async fn test_concurrent_same_token_credits_once() {
    let t = setup_test_db().await;
    let client = insert_user(&t.db, "client", 0).await;
    let package = insert_package(&t.db, Some(5), 45_000, true).await;
    let service = RecoveryService::new(t.db.clone(), &LedgerConfig::default());

    let request = cash_request(client.id, package.id);
    let (a, b) = tokio::join!(
        service.apply_package_payment(request.clone()),
        service.apply_package_payment(request)
    );
    let (a, b) = (a.unwrap(), b.unwrap());

    assert_eq!(a.order_id, b.order_id);
    assert!(a.reconciled ^ b.reconciled);
    assert_eq!(balance(&t.db, client.id).await, 5);
    assert_eq!(order_count(&t.db, client.id).await, 1);
}

#[tokio::test]
async fn test_reconcile_finds_winning_order() {
    let t = setup_test_db().await;
    let client = insert_user(&t.db, "client", 0).await;
    let package = insert_package(&t.db, Some(5), 45_000, true).await;
    let service = RecoveryService::new(t.db.clone(), &fast_config());

    let request = cash_request(client.id, package.id);
    let token = Uuid::parse_str(&request.idempotency_token).unwrap();
    let winner = service.apply_package_payment(request).await.unwrap();

    let reconciled = service
        .reconcile_idempotency_collision(client.id, token)
        .await
        .unwrap();
    assert_eq!(reconciled.order_id, winner.order_id);
    assert!(reconciled.reconciled);
}

#[tokio::test]
async fn test_reconcile_without_winner_fails() {
    let t = setup_test_db().await;
    let client = insert_user(&t.db, "client", 0).await;
    let service = RecoveryService::new(t.db.clone(), &fast_config());

    let err = service
        .reconcile_idempotency_collision(client.id, Uuid::new_v4())
        .await
        .unwrap_err();
    assert_eq!(err.code(), "IDEMPOTENCY_RECONCILIATION_FAILED");
}

#[tokio::test]
async fn test_storage_rejects_second_order_with_same_token() {
    let t = setup_test_db().await;
    let client = insert_user(&t.db, "client", 0).await;
    let token = Uuid::new_v4();

    let order = |number: &str| entity::orders::ActiveModel {
        user_id: Set(client.id),
        cart_id: Set(None),
        order_number: Set(number.to_string()),
        total_amount_cents: Set(1_000),
        status: Set("completed".to_string()),
        payment_method: Set("cash".to_string()),
        payment_reference: Set(None),
        idempotency_key: Set(Some(token)),
        notes: Set(None),
        payment_applied_by: Set(None),
        metadata: Set(None),
        completed_at: Set(Some(now())),
        created_at: Set(now()),
        ..Default::default()
    };

    order("REC-TEST-0001").insert(&t.db).await.unwrap();
    let err = order("REC-TEST-0002").insert(&t.db).await.unwrap_err();
    assert!(is_unique_violation(&err));
    assert!(is_idempotency_key_violation(&err));
}

#[tokio::test]
async fn test_order_number_clash_is_not_a_key_collision() {
    let t = setup_test_db().await;
    let client = insert_user(&t.db, "client", 0).await;

    let order = |token: Uuid| entity::orders::ActiveModel {
        user_id: Set(client.id),
        cart_id: Set(None),
        order_number: Set("REC-TEST-0001".to_string()),
        total_amount_cents: Set(1_000),
        status: Set("completed".to_string()),
        payment_method: Set("cash".to_string()),
        payment_reference: Set(None),
        idempotency_key: Set(Some(token)),
        notes: Set(None),
        payment_applied_by: Set(None),
        metadata: Set(None),
        completed_at: Set(Some(now())),
        created_at: Set(now()),
        ..Default::default()
    };

    order(Uuid::new_v4()).insert(&t.db).await.unwrap();
    let err = order(Uuid::new_v4()).insert(&t.db).await.unwrap_err();
    assert!(is_unique_violation(&err));
    assert!(!is_idempotency_key_violation(&err));
}

#[tokio::test]
async fn test_replay_reports_balances_as_of_original_payment() {
    let t = setup_test_db().await;
    let client = insert_user(&t.db, "client", 1).await;
    let package = insert_package(&t.db, Some(5), 45_000, true).await;
    let service = RecoveryService::new(t.db.clone(), &LedgerConfig::default());

    let request = cash_request(client.id, package.id);
    let first = service.apply_package_payment(request.clone()).await.unwrap();
    assert_eq!(first.previous_balance, 1);
    assert_eq!(first.new_balance, 6);

    // A sweep consumes credits between the payment and its retry
    insert_session(&t.db, Some(client.id), now() - time::Duration::hours(1), "scheduled").await;
    insert_session(&t.db, Some(client.id), now() - time::Duration::minutes(30), "scheduled").await;
    let report = DeductionService::new(t.db.clone())
        .run_deduction_sweep()
        .await
        .unwrap();
    assert_eq!(report.deducted, 2);
    assert_eq!(balance(&t.db, client.id).await, 4);

    let replay = service.apply_package_payment(request).await.unwrap();
    assert!(replay.reconciled);
    assert_eq!(replay.order_id, first.order_id);
    assert_eq!(replay.previous_balance, 1);
    assert_eq!(replay.new_balance, 6);
}

#[tokio::test]
async fn test_client_last_package() {
    let t = setup_test_db().await;
    let client = insert_user(&t.db, "client", 0).await;
    let five = insert_package(&t.db, Some(5), 45_000, true).await;
    let ten = insert_package(&t.db, Some(10), 80_000, true).await;
    let service = RecoveryService::new(t.db.clone(), &LedgerConfig::default());

    assert!(service.client_last_package(client.id).await.unwrap().is_none());

    service
        .apply_package_payment(cash_request(client.id, five.id))
        .await
        .unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    let latest = service
        .apply_package_payment(cash_request(client.id, ten.id))
        .await
        .unwrap();

    let last = service.client_last_package(client.id).await.unwrap().unwrap();
    assert_eq!(last.package_id, ten.id);
    assert_eq!(last.sessions, 10);
    assert_eq!(last.price_cents, 80_000);
    assert_eq!(last.order_id, latest.order_id);
}
