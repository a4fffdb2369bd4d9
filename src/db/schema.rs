use rusqlite::Connection;

/// Initialize the database schema.
///
/// All idempotency guarantees live here as unique constraints:
/// `webhook_deliveries(provider, event_id)` enforces exactly-once webhook
/// processing, `fulfillments(order_id)` enforces at-most-one unlock token
/// per order, `receipts(order_id)` makes receipt generation re-runnable.
/// Application code treats INSERT OR IGNORE conflicts as the
/// "already processed" signal rather than pre-checking.
pub fn init_db(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        PRAGMA foreign_keys = ON;

        -- Append-only analytics log. Source of truth for funnel
        -- reconstruction; no code path updates or deletes rows here.
        CREATE TABLE IF NOT EXISTS events (
            id TEXT PRIMARY KEY,
            event_type TEXT NOT NULL,
            session_id TEXT,
            order_id TEXT,
            attribution TEXT,             -- JSON snapshot, NULL when empty
            detail TEXT,                  -- JSON, server-emitted context
            created_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_events_session ON events(session_id);
        CREATE INDEX IF NOT EXISTS idx_events_type_time ON events(event_type, created_at);
        CREATE INDEX IF NOT EXISTS idx_events_order ON events(order_id);

        -- Visitor sessions. first_* columns are written only on INSERT;
        -- last_* columns are overwritten on every subsequent touch.
        CREATE TABLE IF NOT EXISTS sessions (
            id TEXT PRIMARY KEY,
            first_seen_at INTEGER NOT NULL,
            last_seen_at INTEGER NOT NULL,
            first_touch TEXT NOT NULL,    -- JSON snapshot, immutable once set
            last_touch TEXT NOT NULL      -- JSON snapshot
        );
        CREATE INDEX IF NOT EXISTS idx_sessions_last_seen ON sessions(last_seen_at);

        -- One row per checkout attempt. Status transitions are guarded in
        -- the UPDATE statements (WHERE status = ...), so refunded/disputed
        -- orders can never return to pending.
        CREATE TABLE IF NOT EXISTS orders (
            id TEXT PRIMARY KEY,
            sku TEXT NOT NULL,
            amount_cents INTEGER NOT NULL,
            currency TEXT NOT NULL,
            provider TEXT NOT NULL CHECK (provider IN ('paypal', 'stripe', 'bitcoin')),
            provider_order_id TEXT,
            status TEXT NOT NULL DEFAULT 'pending'
                CHECK (status IN ('pending', 'completed', 'failed', 'refunded', 'disputed')),
            session_id TEXT,
            attribution TEXT,             -- JSON snapshot at creation time
            high_risk INTEGER NOT NULL DEFAULT 0,
            risk_reasons TEXT NOT NULL DEFAULT '[]',
            confirmation_token TEXT NOT NULL UNIQUE,
            confirmed_at INTEGER,
            completed_at INTEGER,
            created_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_orders_session ON orders(session_id);
        CREATE INDEX IF NOT EXISTS idx_orders_sweep ON orders(status, completed_at)
            WHERE confirmed_at IS NULL;
        CREATE INDEX IF NOT EXISTS idx_orders_provider_order
            ON orders(provider, provider_order_id);

        -- Unlock tokens. UNIQUE(order_id) makes issuance a create-if-absent
        -- operation that survives concurrent duplicate deliveries.
        CREATE TABLE IF NOT EXISTS fulfillments (
            id TEXT PRIMARY KEY,
            order_id TEXT NOT NULL UNIQUE REFERENCES orders(id),
            token TEXT NOT NULL UNIQUE,
            issued_at INTEGER NOT NULL,
            revoked_at INTEGER
        );

        -- Point-in-time risk captures; immutable once written.
        CREATE TABLE IF NOT EXISTS device_signals (
            id TEXT PRIMARY KEY,
            session_id TEXT,
            bot_score INTEGER,
            vpn_suspected INTEGER NOT NULL DEFAULT 0,
            proxy_suspected INTEGER NOT NULL DEFAULT 0,
            tor_suspected INTEGER NOT NULL DEFAULT 0,
            ip_risk_score INTEGER,
            country TEXT,
            asn INTEGER,
            captured_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_device_signals_session ON device_signals(session_id);

        -- Dedup ledger for at-least-once webhook delivery.
        CREATE TABLE IF NOT EXISTS webhook_deliveries (
            provider TEXT NOT NULL,
            event_id TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            UNIQUE(provider, event_id)
        );

        -- Dispute evidence artifacts, generated eagerly by the sweep.
        CREATE TABLE IF NOT EXISTS receipts (
            id TEXT PRIMARY KEY,
            order_id TEXT NOT NULL UNIQUE REFERENCES orders(id),
            merchant_descriptor TEXT NOT NULL,
            policy_url TEXT NOT NULL,
            support_contact TEXT NOT NULL,
            body TEXT NOT NULL,
            generated_at INTEGER NOT NULL
        );
        "#,
    )?;
    Ok(())
}
