pub mod admin;
pub mod confirm;
pub mod events;
pub mod orders;
pub mod scheduler;
pub mod unlock;
pub mod webhooks;

use axum::{
    routing::{get, post},
    Router,
};
use serde::Serialize;
use subtle::ConstantTimeEq;

use crate::config::RateLimitSettings;
use crate::db::AppState;
use crate::extractors::Json;
use crate::rate_limit;

/// Constant-time shared-secret comparison. The length check leaks only the
/// length, which is not secret for our generated tokens.
pub(crate) fn secrets_match(provided: &str, expected: &str) -> bool {
    if provided.len() != expected.len() {
        return false;
    }
    provided.as_bytes().ct_eq(expected.as_bytes()).into()
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Public endpoints, rate-limited per IP by tier.
pub fn public_router(rate: RateLimitSettings) -> Router<AppState> {
    let strict = Router::new()
        .route("/orders", post(orders::create_order))
        .route_layer(rate_limit::strict_layer(rate.strict_rpm));

    let standard = Router::new()
        .route("/events", post(events::collect_event))
        .route("/confirm", get(confirm::confirm_order))
        .route("/unlock", get(unlock::check_unlock))
        .route_layer(rate_limit::standard_layer(rate.standard_rpm));

    let relaxed = Router::new()
        .route("/health", get(health))
        .route_layer(rate_limit::relaxed_layer(rate.relaxed_rpm));

    strict.merge(standard).merge(relaxed)
}

/// Operator endpoints: scheduler trigger and admin surface. Shared-secret
/// auth happens in the handlers, not a layer, so unauthorized requests get
/// the same JSON error shape as everything else.
pub fn ops_router() -> Router<AppState> {
    Router::new()
        .route("/scheduler/run", post(scheduler::run_scheduler))
        .route("/admin/orders/{id}/refund", post(admin::manual_refund))
        .route("/admin/orders/{id}/receipt", get(admin::get_receipt))
        .route("/admin/fulfillments/revoke", post(admin::revoke_fulfillment))
}
