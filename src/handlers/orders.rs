use std::str::FromStr;

use axum::{extract::State, http::HeaderMap};
use serde::{Deserialize, Serialize};

use crate::db::{queries, AppState};
use crate::error::{AppError, Result};
use crate::extractors::Json;
use crate::models::{CreateOrder, EventType, NewDeviceSignal, NewEvent, ProviderKind};
use crate::payments::{self, metadata::OrderRef};
use crate::risk;

#[derive(Debug, Deserialize)]
pub struct CreateOrderRequest {
    pub sku: String,
    pub amount_cents: i64,
    /// ISO 4217 code, e.g. "usd".
    pub currency: String,
    pub provider: String,
    #[serde(default)]
    pub session_id: Option<String>,
    /// Challenge-response token from the checkout page, verified
    /// server-side for the bot score.
    #[serde(default)]
    pub challenge_token: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CreateOrderResponse {
    pub order_id: String,
    pub high_risk: bool,
    /// Confirmation link for the post-purchase email.
    pub confirmation_url: String,
    /// Provider-specific blob the checkout flow must pass through to the
    /// provider unmodified, so the webhook can recover the order reference.
    pub checkout_metadata: serde_json::Value,
}

/// Client IP for risk scoring. The service runs behind a reverse proxy, so
/// the first x-forwarded-for hop is the client.
fn client_ip(headers: &HeaderMap) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .unwrap_or_else(|| "0.0.0.0".to_string())
}

/// Create an order: capture the device signal, score it against the risk
/// policy, persist the order with the session's current attribution, and
/// hand back the provider metadata blob for checkout.
///
/// High-risk orders are tagged, never blocked - blocking on risk signals
/// alone punishes legitimate privacy-conscious customers.
pub async fn create_order(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<CreateOrderRequest>,
) -> Result<Json<CreateOrderResponse>> {
    if request.sku.trim().is_empty() {
        return Err(AppError::BadRequest("sku is required".into()));
    }
    if request.amount_cents <= 0 {
        return Err(AppError::BadRequest("amount_cents must be positive".into()));
    }
    if request.currency.len() != 3 || !request.currency.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(AppError::BadRequest("currency must be a 3-letter code".into()));
    }

    let provider = ProviderKind::from_str(&request.provider)
        .map_err(|_| AppError::BadRequest(format!("Unknown provider: {}", request.provider)))?;
    if !state.payments.is_configured(provider) {
        return Err(AppError::BadRequest(format!(
            "Provider {} is not configured",
            provider
        )));
    }

    // Gather device signals. Both lookups degrade to neutral on failure -
    // an unreachable reputation service must not block checkout.
    let ip = client_ip(&headers);
    let bot_score = state
        .bot_checker
        .score(request.challenge_token.as_deref(), &ip)
        .await;
    let reputation = state.ip_reputation.lookup(&ip).await.unwrap_or_default();

    let signal = NewDeviceSignal {
        session_id: request.session_id.clone(),
        bot_score,
        vpn_suspected: reputation.vpn,
        proxy_suspected: reputation.proxy,
        tor_suspected: reputation.tor,
        ip_risk_score: reputation.risk_score,
        country: reputation.country,
        asn: reputation.asn,
    };

    let conn = state.db.get()?;
    queries::insert_device_signal(&conn, &signal)?;

    let assessment = risk::assess(&state.config.risk, &signal, request.amount_cents);
    if assessment.high_risk {
        tracing::warn!(
            "Order flagged high-risk (sku={}, amount={}): {}",
            request.sku,
            request.amount_cents,
            assessment.reasons.join("; ")
        );
    }

    // Attribution snapshot at order time: the session's last-touch, i.e.
    // what made the customer convert just now.
    let attribution = match request.session_id.as_deref() {
        Some(session_id) => queries::get_session(&conn, session_id)?
            .map(|s| s.last_touch)
            .unwrap_or_default(),
        None => Default::default(),
    };

    let order = queries::create_order(
        &conn,
        &CreateOrder {
            sku: request.sku.clone(),
            amount_cents: request.amount_cents,
            currency: request.currency.to_lowercase(),
            provider,
            session_id: request.session_id.clone(),
            attribution: attribution.clone(),
            high_risk: assessment.high_risk,
            risk_reasons: assessment.reasons,
        },
    )?;

    let mut event = NewEvent::new(EventType::OrderCreated)
        .order(order.id.clone())
        .attribution(attribution)
        .detail(serde_json::json!({
            "sku": order.sku,
            "provider": order.provider.as_str(),
            "amount_cents": order.amount_cents,
            "high_risk": order.high_risk,
        }));
    if let Some(session_id) = &order.session_id {
        event = event.session(session_id.clone());
    }
    queries::insert_event(&conn, &event)?;

    let order_ref = OrderRef::new(&order.id, order.session_id.clone());

    Ok(Json(CreateOrderResponse {
        confirmation_url: format!(
            "{}/confirm?token={}",
            state.config.base_url,
            urlencoding::encode(&order.confirmation_token)
        ),
        checkout_metadata: payments::checkout_metadata(provider, &order_ref),
        order_id: order.id,
        high_risk: order.high_risk,
    }))
}
