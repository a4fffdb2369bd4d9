use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::config::PaypalConfig;
use crate::error::{AppError, Result};

/// PayPal REST client.
///
/// PayPal signs webhooks with certificates rather than a shared HMAC secret,
/// so verification goes through its verify-webhook-signature API instead of
/// a local computation. Both verification and refunds need an OAuth token.
#[derive(Debug, Clone)]
pub struct PaypalClient {
    client: Client,
    config: PaypalConfig,
}

/// The transmission headers PayPal attaches to every webhook delivery.
#[derive(Debug, Clone)]
pub struct PaypalTransmission {
    pub transmission_id: String,
    pub transmission_time: String,
    pub transmission_sig: String,
    pub cert_url: String,
    pub auth_algo: String,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Serialize)]
struct VerifyRequest<'a> {
    auth_algo: &'a str,
    cert_url: &'a str,
    transmission_id: &'a str,
    transmission_sig: &'a str,
    transmission_time: &'a str,
    webhook_id: &'a str,
    webhook_event: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct VerifyResponse {
    verification_status: String,
}

impl PaypalClient {
    pub fn new(config: &PaypalConfig) -> Self {
        Self {
            client: Client::builder()
                .timeout(std::time::Duration::from_secs(10))
                .build()
                .expect("Failed to create HTTP client"),
            config: config.clone(),
        }
    }

    async fn access_token(&self) -> Result<String> {
        let response = self
            .client
            .post(format!("{}/v1/oauth2/token", self.config.api_base))
            .basic_auth(&self.config.client_id, Some(&self.config.client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await
            .map_err(|e| AppError::Provider(format!("PayPal token error: {}", e)))?;

        if !response.status().is_success() {
            return Err(AppError::Provider(format!(
                "PayPal token request failed: {}",
                response.status()
            )));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| AppError::Provider(format!("Failed to parse PayPal token: {}", e)))?;
        Ok(token.access_token)
    }

    /// Verify a webhook delivery against PayPal's verification API.
    ///
    /// An unreachable API is an error (not a false) so the caller returns
    /// 5xx and PayPal redelivers, rather than dropping a genuine event.
    pub async fn verify_webhook(
        &self,
        transmission: &PaypalTransmission,
        body: &[u8],
    ) -> Result<bool> {
        let webhook_event: serde_json::Value = serde_json::from_slice(body)
            .map_err(|_| AppError::BadRequest("Invalid PayPal webhook JSON".into()))?;

        let token = self.access_token().await?;
        let request = VerifyRequest {
            auth_algo: &transmission.auth_algo,
            cert_url: &transmission.cert_url,
            transmission_id: &transmission.transmission_id,
            transmission_sig: &transmission.transmission_sig,
            transmission_time: &transmission.transmission_time,
            webhook_id: &self.config.webhook_id,
            webhook_event,
        };

        let response = self
            .client
            .post(format!(
                "{}/v1/notifications/verify-webhook-signature",
                self.config.api_base
            ))
            .bearer_auth(&token)
            .json(&request)
            .send()
            .await
            .map_err(|e| AppError::Provider(format!("PayPal verify error: {}", e)))?;

        if !response.status().is_success() {
            return Err(AppError::Provider(format!(
                "PayPal verify request failed: {}",
                response.status()
            )));
        }

        let verify: VerifyResponse = response
            .json()
            .await
            .map_err(|e| AppError::Provider(format!("Failed to parse PayPal verify: {}", e)))?;

        Ok(verify.verification_status == "SUCCESS")
    }

    /// Refund a captured payment in full.
    pub async fn refund_capture(&self, capture_id: &str) -> Result<()> {
        let token = self.access_token().await?;
        let response = self
            .client
            .post(format!(
                "{}/v2/payments/captures/{}/refund",
                self.config.api_base, capture_id
            ))
            .bearer_auth(&token)
            .json(&serde_json::json!({}))
            .send()
            .await
            .map_err(|e| AppError::Provider(format!("PayPal refund error: {}", e)))?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(AppError::Provider(format!(
                "PayPal refund rejected: {}",
                error_text
            )));
        }

        Ok(())
    }
}

// ============ Webhook payload shapes ============

#[derive(Debug, Deserialize)]
pub struct PaypalWebhookEvent {
    /// Provider event id (WH-xxx), the dedup key.
    pub id: String,
    pub event_type: String,
    pub resource: serde_json::Value,
}

/// Capture resource for PAYMENT.CAPTURE.* events. `custom_id` carries the
/// order-ref blob embedded at checkout; refunds inherit it from the capture.
#[derive(Debug, Deserialize)]
pub struct PaypalCapture {
    pub id: String,
    pub custom_id: Option<String>,
}

/// Dispute resource for CUSTOMER.DISPUTE.* events. Disputes reference the
/// original transaction rather than carrying custom_id.
#[derive(Debug, Deserialize)]
pub struct PaypalDispute {
    #[serde(default)]
    pub disputed_transactions: Vec<PaypalDisputedTransaction>,
}

#[derive(Debug, Deserialize)]
pub struct PaypalDisputedTransaction {
    pub seller_transaction_id: Option<String>,
}
