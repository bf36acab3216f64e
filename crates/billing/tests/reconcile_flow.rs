//! End-to-end reconciliation scenarios
//!
//! The directory-resolution tests are pure; the ledger tests need a real
//! Postgres and are ignored by default (`cargo test -- --ignored` with
//! DATABASE_URL set).

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

use std::collections::HashMap;

use sqlx::PgPool;
use stavitel_billing::{
    build_directory_index, resolve_duplicates, BillingError, DirectoryEntry, PriceIds,
    ReconcileOutcome, ReconciliationService, StripeClient, StripeConfig, TokenLedger,
};

fn entry(customer_id: &str, user_id: &str, created: i64) -> DirectoryEntry {
    DirectoryEntry {
        customer_id: customer_id.to_string(),
        user_id: user_id.to_string(),
        created,
    }
}

/// Two customers for the same user; only the newer one still has an active
/// subscription. The newer one must win the association.
#[test]
fn duplicate_customers_resolve_to_active_subscription_holder() {
    let mut index = build_directory_index(vec![
        entry("cus_A", "u1", 100),
        entry("cus_B", "u1", 200),
    ]);

    let mut has_active = HashMap::new();
    has_active.insert("cus_A".to_string(), false);
    has_active.insert("cus_B".to_string(), true);
    resolve_duplicates(&mut index, &has_active);

    assert_eq!(index.customer_for("u1"), Some("cus_B"));
    assert_eq!(index.len(), 1);
}

/// An older customer with an active subscription beats a newer one without.
#[test]
fn active_subscription_beats_recency() {
    let mut index = build_directory_index(vec![
        entry("cus_A", "u1", 100),
        entry("cus_B", "u1", 200),
        entry("cus_C", "u2", 300),
    ]);

    let mut has_active = HashMap::new();
    has_active.insert("cus_A".to_string(), true);
    has_active.insert("cus_B".to_string(), false);
    resolve_duplicates(&mut index, &has_active);

    assert_eq!(index.customer_for("u1"), Some("cus_A"));
    // Non-duplicate users are untouched by resolution
    assert_eq!(index.customer_for("u2"), Some("cus_C"));
}

// =============================================================================
// Database-backed scenarios
// =============================================================================

fn stub_stripe() -> StripeClient {
    StripeClient::new(StripeConfig {
        secret_key: "sk_test_offline".to_string(),
        price_ids: PriceIds {
            starter: "price_starter".to_string(),
            professional: "price_professional".to_string(),
            business: "price_business".to_string(),
            unlimited: "price_unlimited".to_string(),
            trial: None,
            pro: None,
            content_basic: None,
            content_pro: None,
            content_business: None,
        },
        app_base_url: "http://localhost:3000".to_string(),
    })
}

async fn test_pool() -> PgPool {
    let url = std::env::var("DATABASE_URL").expect("DATABASE_URL required");
    let pool = stavitel_shared::create_pool(&url).await.expect("pool");
    stavitel_shared::run_migrations(&pool).await.expect("migrations");
    pool
}

async fn seed_subscription(
    pool: &PgPool,
    user_id: &str,
    plan: &str,
    tokens_used: i64,
    tokens_limit: i64,
    credits: i64,
) {
    sqlx::query(
        r#"
        INSERT INTO user_subscriptions (user_id, plan, tokens_used, tokens_limit, credits)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (user_id) DO UPDATE SET
            plan = EXCLUDED.plan,
            tokens_used = EXCLUDED.tokens_used,
            tokens_limit = EXCLUDED.tokens_limit,
            credits = EXCLUDED.credits
        "#,
    )
    .bind(user_id)
    .bind(plan)
    .bind(tokens_used)
    .bind(tokens_limit)
    .bind(credits)
    .execute(pool)
    .await
    .expect("seed");
}

#[tokio::test]
#[ignore] // Requires database
async fn concurrent_consumption_never_exceeds_limit() {
    let pool = test_pool().await;
    let user_id = "test_concurrent_consume";
    seed_subscription(&pool, user_id, "professional", 0, 50, 0).await;

    let ledger = TokenLedger::new(pool.clone());

    let mut handles = Vec::new();
    for _ in 0..10 {
        let ledger = ledger.clone();
        handles.push(tokio::spawn(async move {
            ledger.consume(user_id, 10).await
        }));
    }

    let mut accepted = 0;
    let mut rejected = 0;
    for handle in handles {
        match handle.await.expect("join") {
            Ok(_) => accepted += 1,
            Err(BillingError::InsufficientTokens { .. }) => rejected += 1,
            Err(e) => panic!("unexpected error: {}", e),
        }
    }

    // 50 tokens of allowance, 10 per request: exactly 5 can land
    assert_eq!(accepted, 5);
    assert_eq!(rejected, 5);

    let row = ledger.get(user_id).await.expect("get").expect("row");
    assert_eq!(row.tokens_used, 50);
}

#[tokio::test]
#[ignore] // Requires database
async fn unlimited_plan_consumes_past_limit() {
    let pool = test_pool().await;
    let user_id = "test_unlimited_consume";
    seed_subscription(&pool, user_id, "unlimited", 90, 100, 0).await;

    let ledger = TokenLedger::new(pool.clone());

    // The limit column is not consulted for unlimited rows
    let row = ledger.consume(user_id, 50).await.expect("consume");
    assert_eq!(row.tokens_used, 140);
    assert!(row.tokens_used > row.tokens_limit);
}

#[tokio::test]
#[ignore] // Requires database
async fn credit_sweep_is_idempotent() {
    let pool = test_pool().await;
    seed_subscription(&pool, "test_sweep_stray", "starter", 0, 50_000, 50).await;

    let service = ReconciliationService::new(stub_stripe(), pool.clone());

    let first = service.fix_credits_all().await.expect("first sweep");
    assert!(first.fixed >= 1);
    assert_eq!(first.errors, 0);

    let second = service.fix_credits_all().await.expect("second sweep");
    assert_eq!(second.fixed, 0);
    assert_eq!(second.errors, 0);
}

#[tokio::test]
#[ignore] // Requires database
async fn customer_fix_applies_once() {
    let pool = test_pool().await;
    let user_id = "test_customer_fix";
    seed_subscription(&pool, user_id, "professional", 0, 100_000, 0).await;

    let service = ReconciliationService::new(stub_stripe(), pool.clone());

    let first = service
        .reconcile_user(user_id, Some("cus_authoritative"), true)
        .await
        .expect("first run");
    assert!(matches!(first, ReconcileOutcome::Fixed(_)));

    let second = service
        .reconcile_user(user_id, Some("cus_authoritative"), true)
        .await
        .expect("second run");
    assert_eq!(second, ReconcileOutcome::Unchanged);
}

#[tokio::test]
#[ignore] // Requires database
async fn missing_ledger_row_is_skipped() {
    let pool = test_pool().await;
    let service = ReconciliationService::new(stub_stripe(), pool);

    let outcome = service
        .reconcile_user("test_user_without_document", Some("cus_X"), true)
        .await
        .expect("run");
    assert!(matches!(outcome, ReconcileOutcome::Skipped(_)));
}
