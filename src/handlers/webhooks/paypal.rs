use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};

use crate::db::AppState;
use crate::models::ProviderKind;
use crate::payments::metadata::OrderRef;
use crate::payments::{PaypalCapture, PaypalDispute, PaypalTransmission, PaypalWebhookEvent};

use super::common::{
    handle_webhook, CanonicalOutcome, OrderLookup, OutcomeData, WebhookEvent, WebhookProvider,
    WebhookResult,
};

/// PayPal webhook provider implementation.
pub struct PaypalWebhookProvider;

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Result<&'a str, WebhookResult> {
    headers
        .get(name)
        .ok_or((
            StatusCode::BAD_REQUEST,
            "Missing PayPal transmission headers",
        ))?
        .to_str()
        .map_err(|_| (StatusCode::BAD_REQUEST, "Invalid PayPal transmission header"))
}

impl WebhookProvider for PaypalWebhookProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Paypal
    }

    async fn verify(
        &self,
        state: &AppState,
        headers: &HeaderMap,
        body: &Bytes,
    ) -> Result<bool, WebhookResult> {
        let transmission = PaypalTransmission {
            transmission_id: header(headers, "paypal-transmission-id")?.to_string(),
            transmission_time: header(headers, "paypal-transmission-time")?.to_string(),
            transmission_sig: header(headers, "paypal-transmission-sig")?.to_string(),
            cert_url: header(headers, "paypal-cert-url")?.to_string(),
            auth_algo: header(headers, "paypal-auth-algo")?.to_string(),
        };

        let client = state
            .payments
            .paypal
            .as_ref()
            .ok_or((StatusCode::OK, "PayPal not configured"))?;

        // Verification API unreachable -> 5xx so PayPal redelivers; a
        // genuine event must not be dropped because our upstream blinked.
        client.verify_webhook(&transmission, body).await.map_err(|e| {
            tracing::error!("PayPal verification error: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Signature verification failed",
            )
        })
    }

    fn parse_event(&self, body: &Bytes) -> Result<WebhookEvent, WebhookResult> {
        let event: PaypalWebhookEvent = serde_json::from_slice(body).map_err(|e| {
            tracing::error!("Failed to parse PayPal webhook: {}", e);
            (StatusCode::BAD_REQUEST, "Invalid JSON")
        })?;

        match event.event_type.as_str() {
            "PAYMENT.CAPTURE.COMPLETED" => parse_capture(&event, CanonicalOutcome::Completed),
            "PAYMENT.CAPTURE.DENIED" => parse_capture(&event, CanonicalOutcome::Failed),
            "PAYMENT.CAPTURE.REFUNDED" => parse_capture(&event, CanonicalOutcome::Refunded),
            "CUSTOMER.DISPUTE.CREATED" => parse_dispute(&event),
            _ => Ok(WebhookEvent::Ignored),
        }
    }
}

fn parse_capture(
    event: &PaypalWebhookEvent,
    outcome: CanonicalOutcome,
) -> Result<WebhookEvent, WebhookResult> {
    let capture: PaypalCapture = serde_json::from_value(event.resource.clone()).map_err(|e| {
        tracing::error!("Failed to parse PayPal capture: {}", e);
        (StatusCode::BAD_REQUEST, "Invalid capture resource")
    })?;

    // custom_id carries the order-ref blob set at checkout; PayPal copies it
    // onto refund resources, so all three capture outcomes resolve the same
    // way.
    let Some(raw_ref) = capture.custom_id.as_deref() else {
        return Ok(WebhookEvent::Unresolvable {
            event_id: Some(event.id.clone()),
            reason: format!("capture {} missing custom_id", capture.id),
        });
    };

    let order_ref = match OrderRef::decode(raw_ref) {
        Ok(r) => r,
        Err(e) => {
            return Ok(WebhookEvent::Unresolvable {
                event_id: Some(event.id.clone()),
                reason: format!("undecodable custom_id on capture {}: {}", capture.id, e),
            });
        }
    };

    // On completion, the capture id becomes the provider order id used for
    // refund issuance. Refund events reference the refund id, not the
    // capture, so they do not overwrite it.
    let provider_order_id = match outcome {
        CanonicalOutcome::Refunded => None,
        _ => Some(capture.id),
    };

    Ok(WebhookEvent::Outcome(OutcomeData {
        event_id: event.id.clone(),
        order: OrderLookup::Ref(order_ref),
        outcome,
        provider_order_id,
    }))
}

fn parse_dispute(event: &PaypalWebhookEvent) -> Result<WebhookEvent, WebhookResult> {
    let dispute: PaypalDispute = serde_json::from_value(event.resource.clone()).map_err(|e| {
        tracing::error!("Failed to parse PayPal dispute: {}", e);
        (StatusCode::BAD_REQUEST, "Invalid dispute resource")
    })?;

    let Some(reference) = dispute
        .disputed_transactions
        .into_iter()
        .find_map(|t| t.seller_transaction_id)
    else {
        return Ok(WebhookEvent::Unresolvable {
            event_id: Some(event.id.clone()),
            reason: "dispute has no seller transaction id".to_string(),
        });
    };

    Ok(WebhookEvent::Outcome(OutcomeData {
        event_id: event.id.clone(),
        order: OrderLookup::ProviderOrderId(reference),
        outcome: CanonicalOutcome::Disputed,
        provider_order_id: None,
    }))
}

/// Axum handler for PayPal webhooks.
pub async fn handle_paypal_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    handle_webhook(&PaypalWebhookProvider, &state, headers, body).await
}
