//! Dispute-prevention sweep.
//!
//! A customer who completes checkout but never clicks the confirmation link
//! is statistically the customer most likely to file a chargeback later.
//! Refunding proactively costs one sale; a chargeback costs the sale, a fee,
//! and merchant-account standing. The sweep also compiles dispute-grade
//! receipt artifacts eagerly, since dispute response windows are short.
//!
//! The sweep exposes a run-once operation (triggered externally, e.g. by a
//! cron hitting the scheduler endpoint) rather than owning a timing loop.

use chrono::Utc;
use rusqlite::Connection;
use serde::Serialize;

use crate::config::Config;
use crate::db::{queries, DbPool};
use crate::error::Result;
use crate::models::{EventType, NewEvent, NewReceipt, Order};
use crate::payments::RefundIssuer;

/// Sweep policy, lifted out of `Config` so tests can construct it directly.
#[derive(Debug, Clone)]
pub struct SweepConfig {
    /// Seconds a completed order may sit unconfirmed before auto-refund.
    pub staleness_secs: i64,
    /// Maximum orders processed per duty per invocation.
    pub batch_limit: i64,
    pub merchant_descriptor: String,
    pub policy_url: String,
    pub support_contact: String,
}

impl SweepConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            staleness_secs: config.refund_staleness_secs(),
            batch_limit: config.sweep_batch_limit,
            merchant_descriptor: config.merchant_descriptor.clone(),
            policy_url: config.policy_url.clone(),
            support_contact: config.support_contact.clone(),
        }
    }
}

/// Summary returned to the scheduler trigger.
#[derive(Debug, Default, Serialize)]
pub struct SweepOutcome {
    /// Stale unconfirmed orders examined this run.
    pub examined: usize,
    pub refunded: usize,
    pub refund_failures: usize,
    pub receipts_generated: usize,
}

/// Run one bounded batch of sweep work.
///
/// Idempotent across runs: refunded orders drop out of the stale-order
/// predicate and receipts insert-if-absent, so an immediate re-run finds
/// nothing to do. Failures are per-item - one order's provider error never
/// aborts the batch.
pub async fn run_sweep<R: RefundIssuer>(
    db: &DbPool,
    config: &SweepConfig,
    refunds: &R,
) -> Result<SweepOutcome> {
    let mut outcome = SweepOutcome::default();

    let cutoff = Utc::now().timestamp() - config.staleness_secs;
    let stale = {
        let conn = db.get()?;
        queries::list_stale_unconfirmed_orders(&conn, cutoff, config.batch_limit)?
    };
    outcome.examined = stale.len();

    for order in &stale {
        // Provider first, state second: the order is only marked refunded
        // after the provider confirmed the refund. A failed call leaves the
        // order untouched for the next run.
        match refunds.issue_refund(order).await {
            Ok(()) => {
                let mut conn = db.get()?;
                match apply_refund(&mut conn, order, "auto_refund_sweep") {
                    Ok(()) => {
                        outcome.refunded += 1;
                        tracing::info!(
                            "Auto-refunded unconfirmed order {} ({} {}, completed_at={:?})",
                            order.id,
                            order.amount_cents,
                            order.currency,
                            order.completed_at
                        );
                    }
                    Err(e) => {
                        tracing::error!(
                            "Refund issued at provider but local transition failed for {}: {}",
                            order.id,
                            e
                        );
                        outcome.refund_failures += 1;
                    }
                }
            }
            Err(e) => {
                tracing::warn!("Auto-refund failed for order {}: {}", order.id, e);
                outcome.refund_failures += 1;
            }
        }
    }

    let pending_receipts = {
        let conn = db.get()?;
        queries::list_completed_orders_without_receipt(&conn, config.batch_limit)?
    };
    for order in &pending_receipts {
        let receipt = build_receipt(config, order);
        let conn = db.get()?;
        match queries::try_insert_receipt(&conn, &receipt) {
            Ok(true) => outcome.receipts_generated += 1,
            Ok(false) => {}
            Err(e) => {
                tracing::error!("Failed to generate receipt for {}: {}", order.id, e);
            }
        }
    }

    Ok(outcome)
}

/// Transition an order to refunded after the provider confirmed the refund:
/// status, fulfillment revocation, and the canonical event in one
/// transaction.
pub fn apply_refund(conn: &mut Connection, order: &Order, source: &str) -> Result<()> {
    let tx = conn.transaction()?;

    // Guarded transition: if a webhook already moved the order to refunded
    // or disputed, there is nothing left to do here.
    if queries::mark_order_refunded(&tx, &order.id)? {
        queries::revoke_fulfillment(&tx, &order.id)?;

        let mut event = NewEvent::new(EventType::PaymentRefunded)
            .order(order.id.clone())
            .attribution(order.attribution.clone())
            .detail(serde_json::json!({
                "provider": order.provider.as_str(),
                "source": source,
            }));
        if let Some(session_id) = &order.session_id {
            event = event.session(session_id.clone());
        }
        queries::insert_event(&tx, &event)?;
    }

    tx.commit()?;
    Ok(())
}

/// Compile the dispute-evidence artifact for a completed order.
pub fn build_receipt(config: &SweepConfig, order: &Order) -> NewReceipt {
    NewReceipt {
        order_id: order.id.clone(),
        merchant_descriptor: config.merchant_descriptor.clone(),
        policy_url: config.policy_url.clone(),
        support_contact: config.support_contact.clone(),
        body: serde_json::json!({
            "order_id": order.id,
            "items": [{
                "sku": order.sku,
                "amount_cents": order.amount_cents,
                "currency": order.currency,
            }],
            "total_cents": order.amount_cents,
            "currency": order.currency,
            "payment_provider": order.provider.as_str(),
            "provider_order_id": order.provider_order_id,
            "ordered_at": order.created_at,
            "completed_at": order.completed_at,
            "confirmed": order.confirmed_at.is_some(),
        }),
    }
}
