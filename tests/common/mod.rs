//! Test utilities and fixtures for paytrail integration tests

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use axum::routing::{get, post};
use axum::Router;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, Connection};

pub use paytrail::config::{BitcoinConfig, Config, RateLimitSettings, RiskPolicy, StripeConfig};
pub use paytrail::db::{init_db, queries, AppState, DbPool};
pub use paytrail::error::AppError;
pub use paytrail::models::*;
pub use paytrail::payments::RefundIssuer;

/// Webhook secret used by the test Stripe config.
pub const STRIPE_TEST_WEBHOOK_SECRET: &str = "whsec_test_secret";
/// Webhook secret used by the test Bitcoin processor config.
pub const BITCOIN_TEST_WEBHOOK_SECRET: &str = "btc_test_secret";

pub const TEST_SCHEDULER_SECRET: &str = "test-scheduler-secret";
pub const TEST_ADMIN_SECRET: &str = "test-admin-secret";

/// A fully-populated config with no reachable external services.
pub fn test_config() -> Config {
    Config {
        host: "127.0.0.1".to_string(),
        port: 0,
        database_path: ":memory:".to_string(),
        base_url: "http://localhost:3000".to_string(),
        dev_mode: true,
        skip_webhook_verify: false,
        scheduler_secret: Some(TEST_SCHEDULER_SECRET.to_string()),
        admin_secret: Some(TEST_ADMIN_SECRET.to_string()),
        rate_limit: RateLimitSettings {
            strict_rpm: 10,
            standard_rpm: 60,
            relaxed_rpm: 120,
        },
        risk: RiskPolicy {
            min_bot_score: 30,
            amount_threshold_cents: 5000,
        },
        refund_staleness_hours: 24,
        sweep_batch_limit: 50,
        webhook_delivery_retention_days: 30,
        challenge_verify_url: None,
        challenge_secret: None,
        ip_reputation_url: None,
        ip_reputation_api_key: None,
        ip_reputation_ttl_secs: 900,
        stripe: Some(StripeConfig {
            secret_key: "sk_test_xxx".to_string(),
            webhook_secret: STRIPE_TEST_WEBHOOK_SECRET.to_string(),
        }),
        paypal: None,
        bitcoin: Some(BitcoinConfig {
            // Unreachable on purpose: refund calls in tests must fail fast.
            api_base: "http://127.0.0.1:1".to_string(),
            api_token: "test-token".to_string(),
            webhook_secret: BITCOIN_TEST_WEBHOOK_SECRET.to_string(),
        }),
        merchant_descriptor: "PAYTRAIL TEST".to_string(),
        policy_url: "https://example.com/refund-policy".to_string(),
        support_contact: "support@example.com".to_string(),
    }
}

/// Create an in-memory test database with schema initialized
pub fn setup_test_db() -> Connection {
    let conn = Connection::open_in_memory().expect("Failed to create in-memory database");
    init_db(&conn).expect("Failed to initialize schema");
    conn
}

/// Create an AppState for testing with an in-memory database.
///
/// Pool size is 1: every pooled connection to :memory: would otherwise be a
/// separate empty database.
pub fn create_test_app_state() -> AppState {
    let manager = SqliteConnectionManager::memory();
    let pool: DbPool = Pool::builder().max_size(1).build(manager).unwrap();
    {
        let conn = pool.get().unwrap();
        init_db(&conn).unwrap();
    }
    AppState::new(pool, test_config())
}

/// Create a Router with all public + webhook + ops endpoints, without rate
/// limiting (the governor layer needs connect info that oneshot requests
/// don't carry).
pub fn test_app(state: AppState) -> Router {
    Router::new()
        .route("/events", post(paytrail::handlers::events::collect_event))
        .route("/orders", post(paytrail::handlers::orders::create_order))
        .route("/confirm", get(paytrail::handlers::confirm::confirm_order))
        .route("/unlock", get(paytrail::handlers::unlock::check_unlock))
        .merge(paytrail::handlers::webhooks::router())
        .merge(paytrail::handlers::ops_router())
        .with_state(state)
}

/// Get the current timestamp
pub fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Get a past timestamp (hours ago)
pub fn hours_ago(hours: i64) -> i64 {
    now() - (hours * 3600)
}

/// Create a pending test order.
pub fn create_test_order(conn: &Connection, provider: ProviderKind, session_id: Option<&str>) -> Order {
    queries::create_order(
        conn,
        &CreateOrder {
            sku: "deep-sleep-course".to_string(),
            amount_cents: 4900,
            currency: "usd".to_string(),
            provider,
            session_id: session_id.map(|s| s.to_string()),
            attribution: AttributionSnapshot::default(),
            high_risk: false,
            risk_reasons: vec![],
        },
    )
    .expect("Failed to create test order")
}

/// Create an order already completed `completed_hours_ago` hours ago, with a
/// fulfillment issued, mimicking what webhook reconciliation produces.
pub fn create_completed_order(
    conn: &Connection,
    provider: ProviderKind,
    provider_order_id: &str,
    completed_hours_ago: i64,
) -> Order {
    let order = create_test_order(conn, provider, None);
    assert!(
        queries::mark_order_completed(conn, &order.id, Some(provider_order_id))
            .expect("Failed to complete test order")
    );
    queries::issue_fulfillment(conn, &order.id).expect("Failed to issue test fulfillment");

    // Backdate the completion so staleness predicates see it.
    conn.execute(
        "UPDATE orders SET completed_at = ?1 WHERE id = ?2",
        params![hours_ago(completed_hours_ago), order.id],
    )
    .expect("Failed to backdate test order");

    queries::get_order_by_id(conn, &order.id)
        .expect("Failed to reload test order")
        .expect("Test order should exist")
}

/// A session with attribution, created the way the collector does it.
pub fn create_test_session(conn: &Connection, session_id: &str, utm_source: &str) {
    let snapshot = AttributionSnapshot {
        utm_source: Some(utm_source.to_string()),
        utm_medium: Some("cpc".to_string()),
        utm_campaign: Some("sleep-launch".to_string()),
        landing_path: Some("/landing/deep-sleep".to_string()),
        ..Default::default()
    };
    queries::upsert_session(conn, session_id, &snapshot).expect("Failed to create test session");
}

/// Counting refund issuer for sweep tests. Orders listed in `fail_orders`
/// fail with a provider error; everything else succeeds.
#[derive(Default)]
pub struct MockRefunds {
    pub calls: AtomicUsize,
    pub fail_orders: Mutex<HashSet<String>>,
}

impl MockRefunds {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_for(order_id: &str) -> Self {
        let mock = Self::default();
        mock.fail_orders
            .lock()
            .unwrap()
            .insert(order_id.to_string());
        mock
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn clear_failures(&self) {
        self.fail_orders.lock().unwrap().clear();
    }
}

impl RefundIssuer for MockRefunds {
    async fn issue_refund(&self, order: &Order) -> paytrail::error::Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_orders.lock().unwrap().contains(&order.id) {
            return Err(AppError::Provider("mock refund failure".to_string()));
        }
        Ok(())
    }
}
