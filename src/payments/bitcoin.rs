use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::Deserialize;
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::config::BitcoinConfig;
use crate::error::{AppError, Result};

type HmacSha256 = Hmac<Sha256>;

/// Client for the Bitcoin payment processor (BTCPay-compatible API).
///
/// The processor signs webhook bodies with a plain HMAC-SHA256 of the raw
/// payload, delivered as `sha256=<hex>` in the signature header.
#[derive(Debug, Clone)]
pub struct BitcoinClient {
    client: Client,
    config: BitcoinConfig,
}

impl BitcoinClient {
    pub fn new(config: &BitcoinConfig) -> Self {
        Self {
            client: Client::builder()
                .timeout(std::time::Duration::from_secs(10))
                .build()
                .expect("Failed to create HTTP client"),
            config: config.clone(),
        }
    }

    pub fn verify_webhook_signature(&self, payload: &[u8], signature: &str) -> Result<bool> {
        let Some(provided) = signature.strip_prefix("sha256=") else {
            return Ok(false);
        };

        let mut mac = HmacSha256::new_from_slice(self.config.webhook_secret.as_bytes())
            .map_err(|_| AppError::Internal("Invalid webhook secret".into()))?;
        mac.update(payload);
        let expected = hex::encode(mac.finalize().into_bytes());

        let expected_bytes = expected.as_bytes();
        let provided_bytes = provided.as_bytes();

        if expected_bytes.len() != provided_bytes.len() {
            return Ok(false);
        }

        Ok(expected_bytes.ct_eq(provided_bytes).into())
    }

    /// Request a refund for a settled invoice.
    ///
    /// Bitcoin refunds are pull-based: the processor issues a refund offer
    /// the customer claims to their own address. A rejected request is a
    /// provider failure like any other and is retried by the next sweep.
    pub async fn request_refund(&self, invoice_id: &str) -> Result<()> {
        let response = self
            .client
            .post(format!(
                "{}/api/v1/invoices/{}/refund",
                self.config.api_base, invoice_id
            ))
            .header("Authorization", format!("token {}", self.config.api_token))
            .json(&serde_json::json!({ "refundVariant": "Fiat" }))
            .send()
            .await
            .map_err(|e| AppError::Provider(format!("Bitcoin processor refund error: {}", e)))?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(AppError::Provider(format!(
                "Bitcoin processor refund rejected: {}",
                error_text
            )));
        }

        Ok(())
    }
}

// ============ Webhook payload shapes ============

/// Processor webhook event. Invoice metadata carries the order-ref blob
/// embedded at checkout time.
#[derive(Debug, Deserialize)]
pub struct BitcoinWebhookEvent {
    /// Delivery id, the dedup key.
    #[serde(rename = "deliveryId")]
    pub delivery_id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(rename = "invoiceId")]
    pub invoice_id: String,
    #[serde(default)]
    pub metadata: serde_json::Value,
}
