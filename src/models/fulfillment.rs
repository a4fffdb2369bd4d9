use serde::Serialize;

/// Granted access to a purchased digital asset.
///
/// At most one row exists per order (unique constraint on `order_id`);
/// issuance is create-if-absent. Revocation sets `revoked_at` and never
/// deletes - the token value is kept for audit.
#[derive(Debug, Clone, Serialize)]
pub struct Fulfillment {
    pub id: String,
    pub order_id: String,
    /// High-entropy unlock token handed to the content delivery layer.
    pub token: String,
    pub issued_at: i64,
    pub revoked_at: Option<i64>,
}

impl Fulfillment {
    pub fn is_revoked(&self) -> bool {
        self.revoked_at.is_some()
    }
}

/// Result of a token access check, consumed by the content delivery layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenStatus {
    Valid,
    Revoked,
    Invalid,
}

impl TokenStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Valid => "valid",
            Self::Revoked => "revoked",
            Self::Invalid => "invalid",
        }
    }
}
