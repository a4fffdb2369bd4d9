//! Row mapping trait and helpers for reducing boilerplate in queries.
//!
//! This module provides a `FromRow` trait that models can implement to
//! define how they are constructed from database rows, plus helper functions
//! for common query patterns.

use rusqlite::{Connection, OptionalExtension, Row, ToSql};

use crate::models::*;

/// Parse a string column into an enum type, converting parse errors to
/// rusqlite errors instead of panicking on corrupt data.
fn parse_enum<T: std::str::FromStr>(row: &Row, col: usize, col_name: &str) -> rusqlite::Result<T> {
    row.get::<_, String>(col)?.parse::<T>().map_err(|_| {
        rusqlite::Error::InvalidColumnType(col, col_name.to_string(), rusqlite::types::Type::Text)
    })
}

/// Parse a nullable JSON TEXT column into `T`, treating NULL as default.
fn parse_json_or_default<T: serde::de::DeserializeOwned + Default>(
    row: &Row,
    col: usize,
    col_name: &str,
) -> rusqlite::Result<T> {
    match row.get::<_, Option<String>>(col)? {
        Some(raw) => serde_json::from_str(&raw).map_err(|_| {
            rusqlite::Error::InvalidColumnType(
                col,
                col_name.to_string(),
                rusqlite::types::Type::Text,
            )
        }),
        None => Ok(T::default()),
    }
}

/// Trait for constructing a type from a database row.
pub trait FromRow: Sized {
    fn from_row(row: &Row) -> rusqlite::Result<Self>;
}

/// Query for a single optional result.
pub fn query_one<T: FromRow>(
    conn: &Connection,
    sql: &str,
    params: &[&dyn ToSql],
) -> crate::error::Result<Option<T>> {
    conn.query_row(sql, params, T::from_row)
        .optional()
        .map_err(Into::into)
}

/// Query for multiple results.
pub fn query_all<T: FromRow>(
    conn: &Connection,
    sql: &str,
    params: &[&dyn ToSql],
) -> crate::error::Result<Vec<T>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params, T::from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

// ============ SQL SELECT Constants ============

pub const EVENT_COLS: &str =
    "id, event_type, session_id, order_id, attribution, detail, created_at";

pub const SESSION_COLS: &str = "id, first_seen_at, last_seen_at, first_touch, last_touch";

pub const ORDER_COLS: &str = "id, sku, amount_cents, currency, provider, provider_order_id, status, session_id, attribution, high_risk, risk_reasons, confirmation_token, confirmed_at, completed_at, created_at";

pub const FULFILLMENT_COLS: &str = "id, order_id, token, issued_at, revoked_at";

pub const DEVICE_SIGNAL_COLS: &str = "id, session_id, bot_score, vpn_suspected, proxy_suspected, tor_suspected, ip_risk_score, country, asn, captured_at";

pub const RECEIPT_COLS: &str =
    "id, order_id, merchant_descriptor, policy_url, support_contact, body, generated_at";

// ============ FromRow Implementations ============

impl FromRow for Event {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        let detail: Option<String> = row.get(5)?;
        Ok(Event {
            id: row.get(0)?,
            event_type: parse_enum(row, 1, "event_type")?,
            session_id: row.get(2)?,
            order_id: row.get(3)?,
            attribution: parse_json_or_default(row, 4, "attribution")?,
            detail: detail.and_then(|d| serde_json::from_str(&d).ok()),
            created_at: row.get(6)?,
        })
    }
}

impl FromRow for Session {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Session {
            id: row.get(0)?,
            first_seen_at: row.get(1)?,
            last_seen_at: row.get(2)?,
            first_touch: parse_json_or_default(row, 3, "first_touch")?,
            last_touch: parse_json_or_default(row, 4, "last_touch")?,
        })
    }
}

impl FromRow for Order {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Order {
            id: row.get(0)?,
            sku: row.get(1)?,
            amount_cents: row.get(2)?,
            currency: row.get(3)?,
            provider: parse_enum(row, 4, "provider")?,
            provider_order_id: row.get(5)?,
            status: parse_enum(row, 6, "status")?,
            session_id: row.get(7)?,
            attribution: parse_json_or_default(row, 8, "attribution")?,
            high_risk: row.get(9)?,
            risk_reasons: parse_json_or_default(row, 10, "risk_reasons")?,
            confirmation_token: row.get(11)?,
            confirmed_at: row.get(12)?,
            completed_at: row.get(13)?,
            created_at: row.get(14)?,
        })
    }
}

impl FromRow for Fulfillment {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Fulfillment {
            id: row.get(0)?,
            order_id: row.get(1)?,
            token: row.get(2)?,
            issued_at: row.get(3)?,
            revoked_at: row.get(4)?,
        })
    }
}

impl FromRow for DeviceSignal {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(DeviceSignal {
            id: row.get(0)?,
            session_id: row.get(1)?,
            bot_score: row.get(2)?,
            vpn_suspected: row.get(3)?,
            proxy_suspected: row.get(4)?,
            tor_suspected: row.get(5)?,
            ip_risk_score: row.get(6)?,
            country: row.get(7)?,
            asn: row.get(8)?,
            captured_at: row.get(9)?,
        })
    }
}

impl FromRow for Receipt {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        let body: String = row.get(5)?;
        Ok(Receipt {
            id: row.get(0)?,
            order_id: row.get(1)?,
            merchant_descriptor: row.get(2)?,
            policy_url: row.get(3)?,
            support_contact: row.get(4)?,
            body: serde_json::from_str(&body).map_err(|_| {
                rusqlite::Error::InvalidColumnType(5, "body".into(), rusqlite::types::Type::Text)
            })?,
            generated_at: row.get(6)?,
        })
    }
}
