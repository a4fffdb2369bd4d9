//! Payment provider integration: checkout metadata, webhook signature
//! verification, and refund issuance.

mod bitcoin;
pub mod metadata;
mod paypal;
mod stripe;

pub use bitcoin::*;
pub use paypal::*;
pub use stripe::*;

use std::future::Future;

use crate::config::Config;
use crate::error::{AppError, Result};
use crate::models::{Order, ProviderKind};
use metadata::OrderRef;

/// Issues provider refunds. A trait seam so the sweep can be exercised with
/// a counting mock; `PaymentClients` is the production implementation.
pub trait RefundIssuer: Send + Sync {
    fn issue_refund(&self, order: &Order) -> impl Future<Output = Result<()>> + Send;
}

/// The configured provider clients. A provider left unconfigured simply
/// rejects orders and webhooks addressed to it.
#[derive(Debug, Clone, Default)]
pub struct PaymentClients {
    pub stripe: Option<StripeClient>,
    pub paypal: Option<PaypalClient>,
    pub bitcoin: Option<BitcoinClient>,
}

impl PaymentClients {
    pub fn from_config(config: &Config) -> Self {
        Self {
            stripe: config.stripe.as_ref().map(StripeClient::new),
            paypal: config.paypal.as_ref().map(PaypalClient::new),
            bitcoin: config.bitcoin.as_ref().map(BitcoinClient::new),
        }
    }

    pub fn is_configured(&self, provider: ProviderKind) -> bool {
        match provider {
            ProviderKind::Stripe => self.stripe.is_some(),
            ProviderKind::Paypal => self.paypal.is_some(),
            ProviderKind::Bitcoin => self.bitcoin.is_some(),
        }
    }
}

impl RefundIssuer for PaymentClients {
    async fn issue_refund(&self, order: &Order) -> Result<()> {
        let provider_order_id = order.provider_order_id.as_deref().ok_or_else(|| {
            AppError::Provider(format!(
                "order {} has no provider transaction id to refund against",
                order.id
            ))
        })?;

        match order.provider {
            ProviderKind::Stripe => {
                let client = self.stripe.as_ref().ok_or_else(|| {
                    AppError::Provider("Stripe not configured".into())
                })?;
                client.refund_payment(provider_order_id).await
            }
            ProviderKind::Paypal => {
                let client = self.paypal.as_ref().ok_or_else(|| {
                    AppError::Provider("PayPal not configured".into())
                })?;
                client.refund_capture(provider_order_id).await
            }
            ProviderKind::Bitcoin => {
                let client = self.bitcoin.as_ref().ok_or_else(|| {
                    AppError::Provider("Bitcoin processor not configured".into())
                })?;
                client.request_refund(provider_order_id).await
            }
        }
    }
}

/// The provider-specific checkout blob returned by order creation. The
/// client-side checkout flow passes this through to the provider unmodified
/// so the webhook can recover the order reference.
pub fn checkout_metadata(provider: ProviderKind, order_ref: &OrderRef) -> serde_json::Value {
    match provider {
        ProviderKind::Paypal => serde_json::json!({
            "custom_id": metadata::paypal_custom_id(order_ref),
        }),
        ProviderKind::Stripe => serde_json::json!({
            "metadata": metadata::stripe_metadata(order_ref),
        }),
        ProviderKind::Bitcoin => serde_json::json!({
            "metadata": metadata::processor_metadata(order_ref),
        }),
    }
}
