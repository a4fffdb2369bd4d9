use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};

use crate::db::AppState;
use crate::models::ProviderKind;
use crate::payments::metadata::{OrderRef, METADATA_KEY};
use crate::payments::BitcoinWebhookEvent;

use super::common::{
    handle_webhook, CanonicalOutcome, OrderLookup, OutcomeData, WebhookEvent, WebhookProvider,
    WebhookResult,
};

/// Bitcoin processor (BTCPay-compatible) webhook provider implementation.
pub struct BitcoinWebhookProvider;

impl WebhookProvider for BitcoinWebhookProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Bitcoin
    }

    async fn verify(
        &self,
        state: &AppState,
        headers: &HeaderMap,
        body: &Bytes,
    ) -> Result<bool, WebhookResult> {
        let signature = headers
            .get("btcpay-sig")
            .ok_or((StatusCode::BAD_REQUEST, "Missing btcpay-sig header"))?
            .to_str()
            .map_err(|_| (StatusCode::BAD_REQUEST, "Invalid signature header"))?;

        let client = state
            .payments
            .bitcoin
            .as_ref()
            .ok_or((StatusCode::OK, "Bitcoin processor not configured"))?;

        client.verify_webhook_signature(body, signature).map_err(|e| {
            tracing::error!("Signature verification error: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Signature verification failed",
            )
        })
    }

    fn parse_event(&self, body: &Bytes) -> Result<WebhookEvent, WebhookResult> {
        let event: BitcoinWebhookEvent = serde_json::from_slice(body).map_err(|e| {
            tracing::error!("Failed to parse processor webhook: {}", e);
            (StatusCode::BAD_REQUEST, "Invalid JSON")
        })?;

        let outcome = match event.event_type.as_str() {
            "InvoiceSettled" => CanonicalOutcome::Completed,
            // Expired and invalid invoices both mean the payment never
            // confirmed on-chain.
            "InvoiceExpired" | "InvoiceInvalid" => CanonicalOutcome::Failed,
            _ => return Ok(WebhookEvent::Ignored),
        };

        let Some(raw_ref) = event
            .metadata
            .get(METADATA_KEY)
            .and_then(|v| v.as_str())
        else {
            return Ok(WebhookEvent::Unresolvable {
                event_id: Some(event.delivery_id.clone()),
                reason: format!("invoice {} missing order ref metadata", event.invoice_id),
            });
        };

        let order_ref = match OrderRef::decode(raw_ref) {
            Ok(r) => r,
            Err(e) => {
                return Ok(WebhookEvent::Unresolvable {
                    event_id: Some(event.delivery_id.clone()),
                    reason: format!(
                        "undecodable order ref on invoice {}: {}",
                        event.invoice_id, e
                    ),
                });
            }
        };

        Ok(WebhookEvent::Outcome(OutcomeData {
            event_id: event.delivery_id,
            order: OrderLookup::Ref(order_ref),
            outcome,
            provider_order_id: Some(event.invoice_id),
        }))
    }
}

/// Axum handler for Bitcoin processor webhooks.
pub async fn handle_bitcoin_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    handle_webhook(&BitcoinWebhookProvider, &state, headers, body).await
}
