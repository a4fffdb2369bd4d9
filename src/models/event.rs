use serde::{Deserialize, Serialize};

/// Marketing parameters captured at a point in time.
///
/// Stored as a JSON snapshot on events, sessions, and orders so a funnel can
/// be reconstructed from the event log alone.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributionSnapshot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub utm_source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub utm_medium: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub utm_campaign: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub utm_content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub utm_term: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gclid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fbclid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub landing_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub referrer: Option<String>,
}

impl AttributionSnapshot {
    pub fn is_empty(&self) -> bool {
        self.utm_source.is_none()
            && self.utm_medium.is_none()
            && self.utm_campaign.is_none()
            && self.utm_content.is_none()
            && self.utm_term.is_none()
            && self.gclid.is_none()
            && self.fbclid.is_none()
            && self.landing_path.is_none()
            && self.referrer.is_none()
    }
}

/// Every event type the system records.
///
/// Client-originated types arrive through the collector; server-authoritative
/// types are only ever emitted internally (webhook reconciliation,
/// fulfillment, sweep) and are rejected at the collector so clients cannot
/// forge payment outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    // Client-originated
    PageView,
    LandingView,
    CtaClick,
    OutboundClick,
    // Server-authoritative
    OrderCreated,
    PaymentCompleted,
    PaymentFailed,
    PaymentRefunded,
    PaymentDisputed,
    ContentAccess,
    ReconcileError,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PageView => "page_view",
            Self::LandingView => "landing_view",
            Self::CtaClick => "cta_click",
            Self::OutboundClick => "outbound_click",
            Self::OrderCreated => "order_created",
            Self::PaymentCompleted => "payment_completed",
            Self::PaymentFailed => "payment_failed",
            Self::PaymentRefunded => "payment_refunded",
            Self::PaymentDisputed => "payment_disputed",
            Self::ContentAccess => "content_access",
            Self::ReconcileError => "reconcile_error",
        }
    }

    /// Whether this type may be submitted by a client through the collector.
    pub fn is_client_type(&self) -> bool {
        matches!(
            self,
            Self::PageView | Self::LandingView | Self::CtaClick | Self::OutboundClick
        )
    }
}

impl std::str::FromStr for EventType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "page_view" => Ok(Self::PageView),
            "landing_view" => Ok(Self::LandingView),
            "cta_click" => Ok(Self::CtaClick),
            "outbound_click" => Ok(Self::OutboundClick),
            "order_created" => Ok(Self::OrderCreated),
            "payment_completed" => Ok(Self::PaymentCompleted),
            "payment_failed" => Ok(Self::PaymentFailed),
            "payment_refunded" => Ok(Self::PaymentRefunded),
            "payment_disputed" => Ok(Self::PaymentDisputed),
            "content_access" => Ok(Self::ContentAccess),
            "reconcile_error" => Ok(Self::ReconcileError),
            _ => Err(()),
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An immutable fact in the append-only analytics log.
#[derive(Debug, Clone, Serialize)]
pub struct Event {
    pub id: String,
    pub event_type: EventType,
    pub session_id: Option<String>,
    pub order_id: Option<String>,
    pub attribution: AttributionSnapshot,
    /// Server-emitted context (provider, provider event id, error detail).
    pub detail: Option<serde_json::Value>,
    pub created_at: i64,
}

/// Data required to append a new event.
#[derive(Debug, Clone)]
pub struct NewEvent {
    pub event_type: EventType,
    pub session_id: Option<String>,
    pub order_id: Option<String>,
    pub attribution: AttributionSnapshot,
    pub detail: Option<serde_json::Value>,
}

impl NewEvent {
    pub fn new(event_type: EventType) -> Self {
        Self {
            event_type,
            session_id: None,
            order_id: None,
            attribution: AttributionSnapshot::default(),
            detail: None,
        }
    }

    pub fn session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn order(mut self, order_id: impl Into<String>) -> Self {
        self.order_id = Some(order_id.into());
        self
    }

    pub fn attribution(mut self, snapshot: AttributionSnapshot) -> Self {
        self.attribution = snapshot;
        self
    }

    pub fn detail(mut self, detail: serde_json::Value) -> Self {
        self.detail = Some(detail);
        self
    }
}
