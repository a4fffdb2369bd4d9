use chrono::Utc;
use rusqlite::{params, Connection};

use crate::error::Result;
use crate::id::EntityType;
use crate::models::*;

use super::from_row::{
    query_all, query_one, DEVICE_SIGNAL_COLS, EVENT_COLS, FULFILLMENT_COLS, ORDER_COLS,
    RECEIPT_COLS, SESSION_COLS,
};

fn now() -> i64 {
    Utc::now().timestamp()
}

/// Serialize an attribution snapshot for storage. Empty snapshots are stored
/// as NULL so the events table stays compact.
fn attribution_json(snapshot: &AttributionSnapshot) -> Result<Option<String>> {
    if snapshot.is_empty() {
        Ok(None)
    } else {
        Ok(Some(serde_json::to_string(snapshot)?))
    }
}

// ============ Sessions ============

/// Create or touch a session.
///
/// New sessions record the snapshot as both first-touch and last-touch.
/// Existing sessions only have last-touch and last-seen overwritten - the
/// ON CONFLICT clause deliberately omits first_seen_at and first_touch, which
/// is what keeps first-touch attribution immutable.
pub fn upsert_session(
    conn: &Connection,
    session_id: &str,
    snapshot: &AttributionSnapshot,
) -> Result<()> {
    let touch = serde_json::to_string(snapshot)?;
    conn.execute(
        r#"INSERT INTO sessions (id, first_seen_at, last_seen_at, first_touch, last_touch)
           VALUES (?1, ?2, ?2, ?3, ?3)
           ON CONFLICT(id) DO UPDATE SET
               last_seen_at = excluded.last_seen_at,
               last_touch = excluded.last_touch"#,
        params![session_id, now(), touch],
    )?;
    Ok(())
}

pub fn get_session(conn: &Connection, id: &str) -> Result<Option<Session>> {
    query_one(
        conn,
        &format!("SELECT {} FROM sessions WHERE id = ?1", SESSION_COLS),
        &[&id],
    )
}

// ============ Events (append-only) ============

/// Append an event. There is intentionally no update or delete counterpart.
pub fn insert_event(conn: &Connection, input: &NewEvent) -> Result<Event> {
    let id = EntityType::Event.gen_id();
    let created_at = now();
    let attribution = attribution_json(&input.attribution)?;
    let detail = input
        .detail
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?;

    conn.execute(
        r#"INSERT INTO events (id, event_type, session_id, order_id, attribution, detail, created_at)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"#,
        params![
            id,
            input.event_type.as_str(),
            input.session_id,
            input.order_id,
            attribution,
            detail,
            created_at
        ],
    )?;

    Ok(Event {
        id,
        event_type: input.event_type,
        session_id: input.session_id.clone(),
        order_id: input.order_id.clone(),
        attribution: input.attribution.clone(),
        detail: input.detail.clone(),
        created_at,
    })
}

pub fn list_events_for_session(conn: &Connection, session_id: &str) -> Result<Vec<Event>> {
    query_all(
        conn,
        &format!(
            "SELECT {} FROM events WHERE session_id = ?1 ORDER BY created_at",
            EVENT_COLS
        ),
        &[&session_id],
    )
}

pub fn list_events_for_order(conn: &Connection, order_id: &str) -> Result<Vec<Event>> {
    query_all(
        conn,
        &format!(
            "SELECT {} FROM events WHERE order_id = ?1 ORDER BY created_at",
            EVENT_COLS
        ),
        &[&order_id],
    )
}

pub fn count_events_by_type(conn: &Connection, event_type: EventType) -> Result<i64> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM events WHERE event_type = ?1",
        params![event_type.as_str()],
        |row| row.get(0),
    )?;
    Ok(count)
}

// ============ Orders ============

pub fn create_order(conn: &Connection, input: &CreateOrder) -> Result<Order> {
    let id = EntityType::Order.gen_id();
    // Confirmation token doubles as a bearer credential in the confirmation
    // link, so it gets its own entropy rather than reusing the order id.
    let confirmation_token = format!("ptc_{}", uuid::Uuid::new_v4().as_simple());
    let created_at = now();
    let attribution = attribution_json(&input.attribution)?;
    let risk_reasons = serde_json::to_string(&input.risk_reasons)?;

    conn.execute(
        r#"INSERT INTO orders (id, sku, amount_cents, currency, provider, status, session_id,
                               attribution, high_risk, risk_reasons, confirmation_token, created_at)
           VALUES (?1, ?2, ?3, ?4, ?5, 'pending', ?6, ?7, ?8, ?9, ?10, ?11)"#,
        params![
            id,
            input.sku,
            input.amount_cents,
            input.currency,
            input.provider.as_str(),
            input.session_id,
            attribution,
            input.high_risk,
            risk_reasons,
            confirmation_token,
            created_at
        ],
    )?;

    Ok(Order {
        id,
        sku: input.sku.clone(),
        amount_cents: input.amount_cents,
        currency: input.currency.clone(),
        provider: input.provider,
        provider_order_id: None,
        status: OrderStatus::Pending,
        session_id: input.session_id.clone(),
        attribution: input.attribution.clone(),
        high_risk: input.high_risk,
        risk_reasons: input.risk_reasons.clone(),
        confirmation_token,
        confirmed_at: None,
        completed_at: None,
        created_at,
    })
}

pub fn get_order_by_id(conn: &Connection, id: &str) -> Result<Option<Order>> {
    query_one(
        conn,
        &format!("SELECT {} FROM orders WHERE id = ?1", ORDER_COLS),
        &[&id],
    )
}

pub fn get_order_by_provider_order_id(
    conn: &Connection,
    provider: ProviderKind,
    provider_order_id: &str,
) -> Result<Option<Order>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM orders WHERE provider = ?1 AND provider_order_id = ?2",
            ORDER_COLS
        ),
        &[&provider.as_str(), &provider_order_id],
    )
}

pub fn get_order_by_confirmation_token(conn: &Connection, token: &str) -> Result<Option<Order>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM orders WHERE confirmation_token = ?1",
            ORDER_COLS
        ),
        &[&token],
    )
}

/// Transition pending -> completed, recording the provider transaction id.
/// Returns false when the order was not in a state that allows the
/// transition (already terminal, or completed by an earlier delivery).
pub fn mark_order_completed(
    conn: &Connection,
    id: &str,
    provider_order_id: Option<&str>,
) -> Result<bool> {
    let affected = conn.execute(
        r#"UPDATE orders
           SET status = 'completed', completed_at = ?1,
               provider_order_id = COALESCE(?2, provider_order_id)
           WHERE id = ?3 AND status = 'pending'"#,
        params![now(), provider_order_id, id],
    )?;
    Ok(affected > 0)
}

/// Transition pending -> failed.
pub fn mark_order_failed(
    conn: &Connection,
    id: &str,
    provider_order_id: Option<&str>,
) -> Result<bool> {
    let affected = conn.execute(
        r#"UPDATE orders
           SET status = 'failed',
               provider_order_id = COALESCE(?1, provider_order_id)
           WHERE id = ?2 AND status = 'pending'"#,
        params![provider_order_id, id],
    )?;
    Ok(affected > 0)
}

/// Transition pending/completed -> refunded. Terminal.
pub fn mark_order_refunded(conn: &Connection, id: &str) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE orders SET status = 'refunded' WHERE id = ?1 AND status IN ('pending', 'completed')",
        params![id],
    )?;
    Ok(affected > 0)
}

/// Transition pending/completed -> disputed. Terminal.
pub fn mark_order_disputed(conn: &Connection, id: &str) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE orders SET status = 'disputed' WHERE id = ?1 AND status IN ('pending', 'completed')",
        params![id],
    )?;
    Ok(affected > 0)
}

/// Record the confirmation-link click. Idempotent: a second click is a no-op
/// and still counts as success.
pub fn confirm_order(conn: &Connection, confirmation_token: &str) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE orders SET confirmed_at = ?1 WHERE confirmation_token = ?2 AND confirmed_at IS NULL",
        params![now(), confirmation_token],
    )?;
    if affected > 0 {
        return Ok(true);
    }
    // Distinguish "already confirmed" (success) from "no such token".
    let exists: i64 = conn.query_row(
        "SELECT COUNT(*) FROM orders WHERE confirmation_token = ?1",
        params![confirmation_token],
        |row| row.get(0),
    )?;
    Ok(exists > 0)
}

/// Completed orders whose confirmation never arrived within the staleness
/// window. Refunded orders drop out of this predicate, which is what makes
/// the sweep idempotent across runs.
pub fn list_stale_unconfirmed_orders(
    conn: &Connection,
    cutoff: i64,
    limit: i64,
) -> Result<Vec<Order>> {
    query_all(
        conn,
        &format!(
            r#"SELECT {} FROM orders
               WHERE status = 'completed' AND confirmed_at IS NULL AND completed_at < ?1
               ORDER BY completed_at
               LIMIT ?2"#,
            ORDER_COLS
        ),
        &[&cutoff, &limit],
    )
}

/// Completed orders that do not yet have a receipt artifact.
pub fn list_completed_orders_without_receipt(conn: &Connection, limit: i64) -> Result<Vec<Order>> {
    query_all(
        conn,
        &format!(
            r#"SELECT {} FROM orders o
               WHERE o.status = 'completed'
                 AND NOT EXISTS (SELECT 1 FROM receipts r WHERE r.order_id = o.id)
               ORDER BY o.completed_at
               LIMIT ?1"#,
            ORDER_COLS
        ),
        &[&limit],
    )
}

// ============ Fulfillments ============

/// Issue-if-absent an unlock token for an order.
///
/// The UNIQUE(order_id) constraint plus INSERT OR IGNORE makes this safe
/// under concurrent duplicate deliveries: one insert wins, the rest fall
/// through to the SELECT and return the surviving row.
pub fn issue_fulfillment(conn: &Connection, order_id: &str) -> Result<Fulfillment> {
    let id = EntityType::Fulfillment.gen_id();
    let token = EntityType::UnlockToken.gen_id();
    conn.execute(
        r#"INSERT OR IGNORE INTO fulfillments (id, order_id, token, issued_at)
           VALUES (?1, ?2, ?3, ?4)"#,
        params![id, order_id, token, now()],
    )?;

    get_fulfillment_by_order(conn, order_id)?.ok_or_else(|| {
        crate::error::AppError::Internal(format!("fulfillment missing after issue: {}", order_id))
    })
}

pub fn get_fulfillment_by_order(conn: &Connection, order_id: &str) -> Result<Option<Fulfillment>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM fulfillments WHERE order_id = ?1",
            FULFILLMENT_COLS
        ),
        &[&order_id],
    )
}

pub fn get_fulfillment_by_token(conn: &Connection, token: &str) -> Result<Option<Fulfillment>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM fulfillments WHERE token = ?1",
            FULFILLMENT_COLS
        ),
        &[&token],
    )
}

/// Mark a fulfillment revoked. The row (and token value) is kept for audit;
/// access checks treat a revoked token as invalid.
pub fn revoke_fulfillment(conn: &Connection, order_id: &str) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE fulfillments SET revoked_at = ?1 WHERE order_id = ?2 AND revoked_at IS NULL",
        params![now(), order_id],
    )?;
    Ok(affected > 0)
}

pub fn count_fulfillments_for_order(conn: &Connection, order_id: &str) -> Result<i64> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM fulfillments WHERE order_id = ?1",
        params![order_id],
        |row| row.get(0),
    )?;
    Ok(count)
}

// ============ Device Signals ============

pub fn insert_device_signal(conn: &Connection, input: &NewDeviceSignal) -> Result<DeviceSignal> {
    let id = EntityType::DeviceSignal.gen_id();
    let captured_at = now();
    conn.execute(
        r#"INSERT INTO device_signals
           (id, session_id, bot_score, vpn_suspected, proxy_suspected, tor_suspected,
            ip_risk_score, country, asn, captured_at)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"#,
        params![
            id,
            input.session_id,
            input.bot_score,
            input.vpn_suspected,
            input.proxy_suspected,
            input.tor_suspected,
            input.ip_risk_score,
            input.country,
            input.asn,
            captured_at
        ],
    )?;

    Ok(DeviceSignal {
        id,
        session_id: input.session_id.clone(),
        bot_score: input.bot_score,
        vpn_suspected: input.vpn_suspected,
        proxy_suspected: input.proxy_suspected,
        tor_suspected: input.tor_suspected,
        ip_risk_score: input.ip_risk_score,
        country: input.country.clone(),
        asn: input.asn,
        captured_at,
    })
}

pub fn list_device_signals_for_session(
    conn: &Connection,
    session_id: &str,
) -> Result<Vec<DeviceSignal>> {
    query_all(
        conn,
        &format!(
            "SELECT {} FROM device_signals WHERE session_id = ?1 ORDER BY captured_at",
            DEVICE_SIGNAL_COLS
        ),
        &[&session_id],
    )
}

// ============ Webhook Deliveries ============

/// Record a webhook delivery for dedup. Returns true if this is the first
/// time (provider, event_id) has been seen. The INSERT OR IGNORE conflict is
/// the detection signal - there is deliberately no pre-check query, which is
/// what makes this safe under concurrent delivery.
pub fn try_record_webhook_delivery(
    conn: &Connection,
    provider: &str,
    event_id: &str,
) -> Result<bool> {
    let affected = conn.execute(
        "INSERT OR IGNORE INTO webhook_deliveries (provider, event_id, created_at) VALUES (?1, ?2, ?3)",
        params![provider, event_id, now()],
    )?;
    Ok(affected > 0)
}

/// Purge old webhook delivery rows beyond the retention period. These only
/// exist for replay protection; providers retry for days at most.
pub fn purge_old_webhook_deliveries(conn: &Connection, retention_days: i64) -> Result<usize> {
    let cutoff = now() - (retention_days * 86400);
    let deleted = conn.execute(
        "DELETE FROM webhook_deliveries WHERE created_at < ?1",
        params![cutoff],
    )?;
    Ok(deleted)
}

// ============ Receipts ============

/// Insert a receipt artifact if one does not already exist for the order.
/// Returns true if a row was created.
pub fn try_insert_receipt(conn: &Connection, input: &NewReceipt) -> Result<bool> {
    let id = EntityType::Receipt.gen_id();
    let body = serde_json::to_string(&input.body)?;
    let affected = conn.execute(
        r#"INSERT OR IGNORE INTO receipts
           (id, order_id, merchant_descriptor, policy_url, support_contact, body, generated_at)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"#,
        params![
            id,
            input.order_id,
            input.merchant_descriptor,
            input.policy_url,
            input.support_contact,
            body,
            now()
        ],
    )?;
    Ok(affected > 0)
}

pub fn get_receipt_for_order(conn: &Connection, order_id: &str) -> Result<Option<Receipt>> {
    query_one(
        conn,
        &format!("SELECT {} FROM receipts WHERE order_id = ?1", RECEIPT_COLS),
        &[&order_id],
    )
}
