//! Versioned order-reference blob embedded in provider metadata.
//!
//! Payment provider webhooks do not natively carry our order or session ids,
//! so order creation embeds this blob in the provider's custom/metadata field
//! and webhook reconciliation decodes it back. It is an explicit versioned
//! serialization contract: adding fields must be additive so in-flight orders
//! created by older code still reconcile against newer code.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Metadata key used for Stripe metadata maps and processor order metadata.
pub const METADATA_KEY: &str = "paytrail_ref";

/// Current encoding version.
pub const CURRENT_VERSION: u8 = 1;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum MetadataError {
    #[error("order ref is not valid JSON")]
    Malformed,
    #[error("unsupported order ref version {0}")]
    UnsupportedVersion(u8),
}

/// The internal identifiers recovered from a provider webhook.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRef {
    #[serde(rename = "v")]
    pub version: u8,
    #[serde(rename = "oid")]
    pub order_id: String,
    #[serde(rename = "sid", default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

impl OrderRef {
    pub fn new(order_id: impl Into<String>, session_id: Option<String>) -> Self {
        Self {
            version: CURRENT_VERSION,
            order_id: order_id.into(),
            session_id,
        }
    }

    /// Compact JSON encoding. PayPal's custom_id allows 255 chars; the
    /// short field names keep a worst-case blob well under that.
    pub fn encode(&self) -> String {
        serde_json::to_string(self).expect("order ref serialization cannot fail")
    }

    /// Decode a blob recovered from a webhook. Fails closed on unknown
    /// versions so a decode error becomes a reconciliation error, never a
    /// silently-wrong order id.
    pub fn decode(raw: &str) -> Result<Self, MetadataError> {
        let parsed: OrderRef = serde_json::from_str(raw).map_err(|_| MetadataError::Malformed)?;
        if parsed.version == 0 || parsed.version > CURRENT_VERSION {
            return Err(MetadataError::UnsupportedVersion(parsed.version));
        }
        Ok(parsed)
    }
}

/// The blob shape handed to the client for PayPal checkout: the encoded ref
/// goes through the order's `custom_id` field unmodified.
pub fn paypal_custom_id(order_ref: &OrderRef) -> String {
    order_ref.encode()
}

/// The blob shape for Stripe checkout: a metadata map on the session.
pub fn stripe_metadata(order_ref: &OrderRef) -> HashMap<String, String> {
    HashMap::from([(METADATA_KEY.to_string(), order_ref.encode())])
}

/// The blob shape for the Bitcoin processor: invoice metadata JSON.
pub fn processor_metadata(order_ref: &OrderRef) -> serde_json::Value {
    serde_json::json!({ METADATA_KEY: order_ref.encode() })
}
