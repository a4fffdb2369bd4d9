use serde::{Deserialize, Serialize};

use super::{AttributionSnapshot, ProviderKind};

/// Order lifecycle status.
///
/// Transitions are guarded at the storage layer: `refunded` and `disputed`
/// are terminal, and a completed order can only move to one of those two.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Completed,
    Failed,
    Refunded,
    Disputed,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Refunded => "refunded",
            Self::Disputed => "disputed",
        }
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "refunded" => Ok(Self::Refunded),
            "disputed" => Ok(Self::Disputed),
            _ => Err(()),
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single purchase intent, created before handoff to the payment provider.
#[derive(Debug, Clone, Serialize)]
pub struct Order {
    pub id: String,
    pub sku: String,
    pub amount_cents: i64,
    pub currency: String,
    pub provider: ProviderKind,
    /// Provider-side transaction id, recorded at reconciliation time
    /// (Stripe payment_intent, PayPal capture id, processor invoice id).
    pub provider_order_id: Option<String>,
    pub status: OrderStatus,
    pub session_id: Option<String>,
    /// Attribution captured at order-creation time (the session's last-touch).
    pub attribution: AttributionSnapshot,
    pub high_risk: bool,
    pub risk_reasons: Vec<String>,
    /// Token embedded in the confirmation link sent to the customer.
    #[serde(skip_serializing)]
    pub confirmation_token: String,
    pub confirmed_at: Option<i64>,
    pub completed_at: Option<i64>,
    pub created_at: i64,
}

/// Data required to create a new order.
#[derive(Debug, Clone)]
pub struct CreateOrder {
    pub sku: String,
    pub amount_cents: i64,
    pub currency: String,
    pub provider: ProviderKind,
    pub session_id: Option<String>,
    pub attribution: AttributionSnapshot,
    pub high_risk: bool,
    pub risk_reasons: Vec<String>,
}
