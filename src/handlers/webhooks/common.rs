//! Common webhook handling infrastructure for payment providers.
//!
//! Provider adapters implement `WebhookProvider` (signature verification and
//! payload parsing); the pipeline here is provider-agnostic: resolve the
//! order, dedup the delivery, apply the status transition, emit the canonical
//! event, and issue or revoke the fulfillment - all in one database
//! transaction so replay protection rolls back with the work it guards.

use std::future::Future;

use axum::{
    body::Bytes,
    http::{HeaderMap, StatusCode},
};
use rusqlite::Connection;

use crate::db::{queries, AppState};
use crate::id::is_valid_prefixed_id;
use crate::models::{EventType, NewEvent, Order, ProviderKind};
use crate::payments::metadata::OrderRef;

/// Result type for webhook operations: status + provider-visible message.
pub type WebhookResult = (StatusCode, &'static str);

/// Normalized transaction outcome, provider-agnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CanonicalOutcome {
    Completed,
    Failed,
    Refunded,
    Disputed,
}

impl CanonicalOutcome {
    /// The canonical event emitted for this outcome.
    pub fn event_type(&self) -> EventType {
        match self {
            Self::Completed => EventType::PaymentCompleted,
            Self::Failed => EventType::PaymentFailed,
            Self::Refunded => EventType::PaymentRefunded,
            Self::Disputed => EventType::PaymentDisputed,
        }
    }
}

/// How the webhook payload identifies the order.
#[derive(Debug)]
pub enum OrderLookup {
    /// The order-ref blob embedded in provider metadata at checkout time.
    Ref(OrderRef),
    /// The provider-side transaction id recorded at completion. Refund and
    /// dispute payloads reference this instead of carrying metadata.
    ProviderOrderId(String),
}

/// A payment outcome extracted from a verified webhook payload.
#[derive(Debug)]
pub struct OutcomeData {
    /// Provider's unique event id, the dedup key.
    pub event_id: String,
    pub order: OrderLookup,
    pub outcome: CanonicalOutcome,
    /// Provider transaction id to record on the order (set on completion so
    /// later refund/dispute webhooks can be linked back).
    pub provider_order_id: Option<String>,
}

/// Parsed webhook event.
#[derive(Debug)]
pub enum WebhookEvent {
    /// A payment outcome to reconcile.
    Outcome(OutcomeData),
    /// Verified and parsed, but the order reference cannot be recovered.
    /// Acknowledged to the provider (retrying will not fix the payload) and
    /// recorded as a reconcile_error event for operator review.
    Unresolvable {
        event_id: Option<String>,
        reason: String,
    },
    /// Event type not relevant to payment reconciliation.
    Ignored,
}

/// Trait for payment provider webhook handling.
///
/// Implementors verify authenticity and normalize payloads; the pipeline in
/// `handle_webhook` owns idempotency, status transitions, and event emission.
pub trait WebhookProvider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    /// Provider name for logging and the dedup ledger.
    fn provider_name(&self) -> &'static str {
        self.kind().as_str()
    }

    /// Verify the delivery's authenticity. Returns Ok(false) for a bad
    /// signature, Err for conditions with their own response (missing
    /// header, provider unconfigured, verification service unreachable).
    fn verify(
        &self,
        state: &AppState,
        headers: &HeaderMap,
        body: &Bytes,
    ) -> impl Future<Output = Result<bool, WebhookResult>> + Send;

    /// Parse the raw payload into a provider-agnostic event.
    fn parse_event(&self, body: &Bytes) -> Result<WebhookEvent, WebhookResult>;
}

/// Generic webhook handler that delegates to provider-specific implementations.
pub async fn handle_webhook<P: WebhookProvider>(
    provider: &P,
    state: &AppState,
    headers: HeaderMap,
    body: Bytes,
) -> WebhookResult {
    if state.config.skip_webhook_verify {
        tracing::warn!(
            "{} webhook accepted WITHOUT signature verification (dev override)",
            provider.provider_name()
        );
    } else {
        match provider.verify(state, &headers, &body).await {
            Ok(true) => {}
            Ok(false) => {
                // This is the financial source of truth; every rejection is
                // logged for security review.
                tracing::warn!(
                    "{} webhook rejected: invalid signature",
                    provider.provider_name()
                );
                return (StatusCode::UNAUTHORIZED, "Invalid signature");
            }
            Err(e) => return e,
        }
    }

    let event = match provider.parse_event(&body) {
        Ok(e) => e,
        Err(e) => return e,
    };

    let mut conn = match state.db.get() {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("DB connection error: {}", e);
            return (StatusCode::INTERNAL_SERVER_ERROR, "Database error");
        }
    };

    match event {
        WebhookEvent::Ignored => (StatusCode::OK, "Event ignored"),
        WebhookEvent::Unresolvable { event_id, reason } => {
            record_reconcile_error(
                &conn,
                provider.provider_name(),
                event_id.as_deref(),
                &reason,
            );
            (StatusCode::OK, "Unresolvable order reference")
        }
        WebhookEvent::Outcome(data) => {
            let order = match resolve_order(&conn, provider.kind(), &data.order) {
                Ok(Some(o)) => o,
                Ok(None) => {
                    record_reconcile_error(
                        &conn,
                        provider.provider_name(),
                        Some(&data.event_id),
                        "order not found for webhook reference",
                    );
                    return (StatusCode::OK, "Unknown order");
                }
                Err(e) => {
                    tracing::error!("DB error resolving order: {}", e);
                    return (StatusCode::INTERNAL_SERVER_ERROR, "Database error");
                }
            };

            apply_outcome(&mut conn, provider.provider_name(), &data, &order)
        }
    }
}

fn resolve_order(
    conn: &Connection,
    kind: ProviderKind,
    lookup: &OrderLookup,
) -> crate::error::Result<Option<Order>> {
    match lookup {
        OrderLookup::Ref(order_ref) => {
            if !is_valid_prefixed_id(&order_ref.order_id) {
                return Ok(None);
            }
            queries::get_order_by_id(conn, &order_ref.order_id)
        }
        OrderLookup::ProviderOrderId(provider_order_id) => {
            queries::get_order_by_provider_order_id(conn, kind, provider_order_id)
        }
    }
}

/// Apply a canonical outcome to an order ATOMICALLY: delivery dedup, status
/// transition, fulfillment issuance/revocation, and canonical event emission
/// all commit or roll back together, so a provider retry after a mid-flight
/// failure reprocesses cleanly.
fn apply_outcome(
    conn: &mut Connection,
    provider: &str,
    data: &OutcomeData,
    order: &Order,
) -> WebhookResult {
    let tx = match conn.transaction() {
        Ok(tx) => tx,
        Err(e) => {
            tracing::error!("Failed to start transaction: {}", e);
            return (StatusCode::INTERNAL_SERVER_ERROR, "Database error");
        }
    };

    // Delivery dedup first. Duplicate deliveries are the expected normal
    // case under at-least-once semantics, not errors.
    match queries::try_record_webhook_delivery(&tx, provider, &data.event_id) {
        Ok(true) => {}
        Ok(false) => {
            return (StatusCode::OK, "Already processed");
        }
        Err(e) => {
            tracing::error!("Failed to record webhook delivery: {}", e);
            return (StatusCode::INTERNAL_SERVER_ERROR, "Database error");
        }
    }

    // Guarded status transition. A false here means the order is already in
    // a state this outcome cannot follow (e.g. completed arriving after a
    // refund); the delivery is still recorded so the provider stops retrying.
    let transitioned = match data.outcome {
        CanonicalOutcome::Completed => {
            queries::mark_order_completed(&tx, &order.id, data.provider_order_id.as_deref())
        }
        CanonicalOutcome::Failed => {
            queries::mark_order_failed(&tx, &order.id, data.provider_order_id.as_deref())
        }
        CanonicalOutcome::Refunded => queries::mark_order_refunded(&tx, &order.id),
        CanonicalOutcome::Disputed => queries::mark_order_disputed(&tx, &order.id),
    };

    let transitioned = match transitioned {
        Ok(t) => t,
        Err(e) => {
            tracing::error!("Failed to update order status: {}", e);
            return (StatusCode::INTERNAL_SERVER_ERROR, "Database error");
        }
    };

    if !transitioned {
        tracing::warn!(
            "{} webhook {}: no status transition for order {} (currently {})",
            provider,
            data.event_id,
            order.id,
            order.status
        );
        if let Err(e) = tx.commit() {
            tracing::error!("Failed to commit webhook transaction: {}", e);
            return (StatusCode::INTERNAL_SERVER_ERROR, "Database error");
        }
        return (StatusCode::OK, "No status transition");
    }

    // Fulfillment reacts to the recorded outcome, never independently:
    // issuance on completion, revocation on refund or dispute.
    let fulfillment_result = match data.outcome {
        CanonicalOutcome::Completed => queries::issue_fulfillment(&tx, &order.id).map(|_| ()),
        CanonicalOutcome::Refunded | CanonicalOutcome::Disputed => {
            queries::revoke_fulfillment(&tx, &order.id).map(|_| ())
        }
        CanonicalOutcome::Failed => Ok(()),
    };
    if let Err(e) = fulfillment_result {
        tracing::error!("Fulfillment update failed: {}", e);
        return (StatusCode::INTERNAL_SERVER_ERROR, "Fulfillment error");
    }

    // Canonical event, carrying the attribution snapshot captured at order
    // creation so the funnel survives the provider round-trip.
    let mut event = NewEvent::new(data.outcome.event_type())
        .order(order.id.clone())
        .attribution(order.attribution.clone())
        .detail(serde_json::json!({
            "provider": provider,
            "provider_event_id": data.event_id,
            "provider_order_id": data.provider_order_id,
        }));
    if let Some(session_id) = &order.session_id {
        event = event.session(session_id.clone());
    }
    if let Err(e) = queries::insert_event(&tx, &event) {
        tracing::error!("Failed to record canonical event: {}", e);
        return (StatusCode::INTERNAL_SERVER_ERROR, "Database error");
    }

    if let Err(e) = tx.commit() {
        tracing::error!("Failed to commit webhook transaction: {}", e);
        return (StatusCode::INTERNAL_SERVER_ERROR, "Database error");
    }

    tracing::info!(
        "{} webhook reconciled: event={}, order={}, outcome={}",
        provider,
        data.event_id,
        order.id,
        data.outcome.event_type()
    );

    (StatusCode::OK, "OK")
}

/// Record an unrecoverable reconciliation problem for operator review.
/// Distinct from rejection: the provider gets a 200 so it stops retrying a
/// payload that will never parse differently.
fn record_reconcile_error(
    conn: &Connection,
    provider: &str,
    event_id: Option<&str>,
    reason: &str,
) {
    tracing::error!(
        "{} reconciliation error (event {:?}): {} - manual investigation required",
        provider,
        event_id,
        reason
    );

    let event = NewEvent::new(EventType::ReconcileError).detail(serde_json::json!({
        "provider": provider,
        "provider_event_id": event_id,
        "reason": reason,
    }));
    if let Err(e) = queries::insert_event(conn, &event) {
        tracing::error!("Failed to record reconcile_error event: {}", e);
    }
}
