use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};

use crate::db::AppState;
use crate::models::ProviderKind;
use crate::payments::metadata::{OrderRef, METADATA_KEY};
use crate::payments::{StripeCheckoutSession, StripeDispute, StripeRefund, StripeWebhookEvent};

use super::common::{
    handle_webhook, CanonicalOutcome, OrderLookup, OutcomeData, WebhookEvent, WebhookProvider,
    WebhookResult,
};

/// Stripe webhook provider implementation.
pub struct StripeWebhookProvider;

impl WebhookProvider for StripeWebhookProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Stripe
    }

    async fn verify(
        &self,
        state: &AppState,
        headers: &HeaderMap,
        body: &Bytes,
    ) -> Result<bool, WebhookResult> {
        let signature = headers
            .get("stripe-signature")
            .ok_or((StatusCode::BAD_REQUEST, "Missing stripe-signature header"))?
            .to_str()
            .map_err(|e| {
                tracing::debug!("Invalid UTF-8 in Stripe signature header: {}", e);
                (StatusCode::BAD_REQUEST, "Invalid signature header")
            })?;

        // Unconfigured provider: 200 OK so Stripe does not retry forever
        // against an endpoint that will never verify.
        let client = state
            .payments
            .stripe
            .as_ref()
            .ok_or((StatusCode::OK, "Stripe not configured"))?;

        client.verify_webhook_signature(body, signature).map_err(|e| {
            tracing::error!("Signature verification error: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Signature verification failed",
            )
        })
    }

    fn parse_event(&self, body: &Bytes) -> Result<WebhookEvent, WebhookResult> {
        let event: StripeWebhookEvent = serde_json::from_slice(body).map_err(|e| {
            tracing::error!("Failed to parse Stripe webhook: {}", e);
            (StatusCode::BAD_REQUEST, "Invalid JSON")
        })?;

        match event.event_type.as_str() {
            "checkout.session.completed" => parse_checkout(&event, CanonicalOutcome::Completed),
            "checkout.session.async_payment_failed" | "checkout.session.expired" => {
                parse_checkout(&event, CanonicalOutcome::Failed)
            }
            "refund.created" => parse_refund(&event),
            "charge.dispute.created" => parse_dispute(&event),
            _ => Ok(WebhookEvent::Ignored),
        }
    }
}

fn parse_checkout(
    event: &StripeWebhookEvent,
    outcome: CanonicalOutcome,
) -> Result<WebhookEvent, WebhookResult> {
    let session: StripeCheckoutSession = serde_json::from_value(event.data.object.clone())
        .map_err(|e| {
            tracing::error!("Failed to parse checkout session: {}", e);
            (StatusCode::BAD_REQUEST, "Invalid checkout session")
        })?;

    // A completed session that is not paid (async payment still pending)
    // will be followed by a paid or failed event later.
    if outcome == CanonicalOutcome::Completed && session.payment_status.as_deref() != Some("paid") {
        return Ok(WebhookEvent::Ignored);
    }

    let Some(raw_ref) = session.metadata.get(METADATA_KEY) else {
        return Ok(WebhookEvent::Unresolvable {
            event_id: Some(event.id.clone()),
            reason: format!("checkout session {} missing order ref metadata", session.id),
        });
    };

    let order_ref = match OrderRef::decode(raw_ref) {
        Ok(r) => r,
        Err(e) => {
            return Ok(WebhookEvent::Unresolvable {
                event_id: Some(event.id.clone()),
                reason: format!("undecodable order ref in session {}: {}", session.id, e),
            });
        }
    };

    // Store the payment intent as the provider order id: refunds and
    // disputes reference it, not the checkout session.
    let provider_order_id = session.payment_intent.or(Some(session.id));

    Ok(WebhookEvent::Outcome(OutcomeData {
        event_id: event.id.clone(),
        order: OrderLookup::Ref(order_ref),
        outcome,
        provider_order_id,
    }))
}

fn parse_refund(event: &StripeWebhookEvent) -> Result<WebhookEvent, WebhookResult> {
    let refund: StripeRefund = serde_json::from_value(event.data.object.clone()).map_err(|e| {
        tracing::error!("Failed to parse refund: {}", e);
        (StatusCode::BAD_REQUEST, "Invalid refund")
    })?;

    // Only succeeded refunds move the order; pending ones re-deliver later.
    if refund.status != "succeeded" {
        return Ok(WebhookEvent::Ignored);
    }

    let Some(reference) = refund.payment_intent.or(refund.charge) else {
        return Ok(WebhookEvent::Unresolvable {
            event_id: Some(event.id.clone()),
            reason: format!("refund {} has no payment_intent or charge", refund.id),
        });
    };

    Ok(WebhookEvent::Outcome(OutcomeData {
        event_id: event.id.clone(),
        order: OrderLookup::ProviderOrderId(reference),
        outcome: CanonicalOutcome::Refunded,
        provider_order_id: None,
    }))
}

fn parse_dispute(event: &StripeWebhookEvent) -> Result<WebhookEvent, WebhookResult> {
    let dispute: StripeDispute = serde_json::from_value(event.data.object.clone()).map_err(|e| {
        tracing::error!("Failed to parse dispute: {}", e);
        (StatusCode::BAD_REQUEST, "Invalid dispute")
    })?;

    let Some(reference) = dispute.payment_intent.or(dispute.charge) else {
        return Ok(WebhookEvent::Unresolvable {
            event_id: Some(event.id.clone()),
            reason: format!("dispute {} has no payment reference", dispute.id),
        });
    };

    Ok(WebhookEvent::Outcome(OutcomeData {
        event_id: event.id.clone(),
        order: OrderLookup::ProviderOrderId(reference),
        outcome: CanonicalOutcome::Disputed,
        provider_order_id: None,
    }))
}

/// Axum handler for Stripe webhooks.
pub async fn handle_stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    handle_webhook(&StripeWebhookProvider, &state, headers, body).await
}
