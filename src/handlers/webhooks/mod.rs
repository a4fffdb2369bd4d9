mod bitcoin;
pub mod common;
mod paypal;
mod stripe;

pub use bitcoin::*;
pub use paypal::*;
pub use stripe::*;

use axum::{routing::post, Router};

use crate::db::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/webhooks/stripe", post(handle_stripe_webhook))
        .route("/webhooks/paypal", post(handle_paypal_webhook))
        .route("/webhooks/bitcoin", post(handle_bitcoin_webhook))
}
