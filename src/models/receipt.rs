use serde::Serialize;

/// Dispute-grade evidence artifact, generated eagerly for completed orders.
///
/// Dispute response windows are short; compiling the receipt at sweep time
/// means it is ready the moment a chargeback is filed.
#[derive(Debug, Clone, Serialize)]
pub struct Receipt {
    pub id: String,
    pub order_id: String,
    pub merchant_descriptor: String,
    pub policy_url: String,
    pub support_contact: String,
    /// Itemized charge detail (sku, amount, currency, provider, timestamps).
    pub body: serde_json::Value,
    pub generated_at: i64,
}

/// Data required to generate a receipt.
#[derive(Debug, Clone)]
pub struct NewReceipt {
    pub order_id: String,
    pub merchant_descriptor: String,
    pub policy_url: String,
    pub support_contact: String,
    pub body: serde_json::Value,
}
