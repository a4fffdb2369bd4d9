use std::env;

/// Stripe API credentials.
#[derive(Debug, Clone)]
pub struct StripeConfig {
    pub secret_key: String,
    pub webhook_secret: String,
}

/// PayPal REST API credentials.
///
/// `webhook_id` is the id PayPal assigned to our webhook endpoint; it is
/// required by the verify-webhook-signature API.
#[derive(Debug, Clone)]
pub struct PaypalConfig {
    pub client_id: String,
    pub client_secret: String,
    pub webhook_id: String,
    pub api_base: String,
}

/// Bitcoin payment processor (BTCPay-compatible) credentials.
#[derive(Debug, Clone)]
pub struct BitcoinConfig {
    pub api_base: String,
    pub api_token: String,
    pub webhook_secret: String,
}

/// Per-IP rate limit tiers (requests per minute).
#[derive(Debug, Clone, Copy)]
pub struct RateLimitSettings {
    pub strict_rpm: u32,
    pub standard_rpm: u32,
    pub relaxed_rpm: u32,
}

/// Risk-scoring policy. All thresholds are operator policy, not code.
#[derive(Debug, Clone, Copy)]
pub struct RiskPolicy {
    /// Minimum challenge confidence (0-100) below which an order is flagged.
    pub min_bot_score: i64,
    /// Orders above this amount are flagged when an anonymizer is suspected.
    pub amount_threshold_cents: i64,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub database_path: String,
    pub base_url: String,
    pub dev_mode: bool,

    /// Development-only override: accept webhooks without signature
    /// verification. Defaults to off; startup logs a warning when set.
    pub skip_webhook_verify: bool,

    pub scheduler_secret: Option<String>,
    pub admin_secret: Option<String>,

    pub rate_limit: RateLimitSettings,
    pub risk: RiskPolicy,

    /// Hours a completed order may sit unconfirmed before the sweep
    /// auto-refunds it.
    pub refund_staleness_hours: i64,
    /// Maximum orders processed per sweep invocation.
    pub sweep_batch_limit: i64,
    /// Days to retain webhook delivery dedup rows (providers retry for days,
    /// not months).
    pub webhook_delivery_retention_days: i64,

    /// Bot-challenge verification endpoint (e.g. Turnstile siteverify).
    pub challenge_verify_url: Option<String>,
    pub challenge_secret: Option<String>,

    /// IP reputation service endpoint; lookups are cached per IP.
    pub ip_reputation_url: Option<String>,
    pub ip_reputation_api_key: Option<String>,
    pub ip_reputation_ttl_secs: u64,

    pub stripe: Option<StripeConfig>,
    pub paypal: Option<PaypalConfig>,
    pub bitcoin: Option<BitcoinConfig>,

    /// Receipt artifact fields (dispute evidence).
    pub merchant_descriptor: String,
    pub policy_url: String,
    pub support_contact: String,
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_flag(key: &str) -> bool {
    env::var(key).map(|v| v == "1" || v == "true").unwrap_or(false)
}

impl Config {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let dev_mode = env::var("PAYTRAIL_ENV")
            .map(|v| v == "dev" || v == "development")
            .unwrap_or(false);

        let host = env_or("HOST", "127.0.0.1");
        let port: u16 = env_parse("PORT", 3000);
        let base_url =
            env::var("BASE_URL").unwrap_or_else(|_| format!("http://{}:{}", host, port));

        let stripe = match (env::var("STRIPE_SECRET_KEY"), env::var("STRIPE_WEBHOOK_SECRET")) {
            (Ok(secret_key), Ok(webhook_secret)) => Some(StripeConfig {
                secret_key,
                webhook_secret,
            }),
            _ => None,
        };

        let paypal = match (
            env::var("PAYPAL_CLIENT_ID"),
            env::var("PAYPAL_CLIENT_SECRET"),
            env::var("PAYPAL_WEBHOOK_ID"),
        ) {
            (Ok(client_id), Ok(client_secret), Ok(webhook_id)) => Some(PaypalConfig {
                client_id,
                client_secret,
                webhook_id,
                api_base: env_or("PAYPAL_API_BASE", "https://api-m.paypal.com"),
            }),
            _ => None,
        };

        let bitcoin = match (env::var("BTCPAY_API_BASE"), env::var("BTCPAY_API_TOKEN")) {
            (Ok(api_base), Ok(api_token)) => Some(BitcoinConfig {
                api_base,
                api_token,
                webhook_secret: env_or("BTCPAY_WEBHOOK_SECRET", ""),
            }),
            _ => None,
        };

        Self {
            host,
            port,
            database_path: env_or("DATABASE_PATH", "paytrail.db"),
            base_url,
            dev_mode,
            skip_webhook_verify: dev_mode && env_flag("PAYTRAIL_SKIP_WEBHOOK_VERIFY"),
            scheduler_secret: env::var("PAYTRAIL_SCHEDULER_SECRET").ok(),
            admin_secret: env::var("PAYTRAIL_ADMIN_SECRET").ok(),
            rate_limit: RateLimitSettings {
                strict_rpm: env_parse("RATE_LIMIT_STRICT_RPM", 10),
                standard_rpm: env_parse("RATE_LIMIT_STANDARD_RPM", 60),
                relaxed_rpm: env_parse("RATE_LIMIT_RELAXED_RPM", 120),
            },
            risk: RiskPolicy {
                min_bot_score: env_parse("PAYTRAIL_MIN_BOT_SCORE", 30),
                amount_threshold_cents: env_parse("PAYTRAIL_RISK_AMOUNT_THRESHOLD_CENTS", 5000),
            },
            refund_staleness_hours: env_parse("PAYTRAIL_REFUND_STALENESS_HOURS", 24),
            sweep_batch_limit: env_parse("PAYTRAIL_SWEEP_BATCH_LIMIT", 50),
            webhook_delivery_retention_days: env_parse("PAYTRAIL_WEBHOOK_RETENTION_DAYS", 30),
            challenge_verify_url: env::var("PAYTRAIL_CHALLENGE_VERIFY_URL").ok(),
            challenge_secret: env::var("PAYTRAIL_CHALLENGE_SECRET").ok(),
            ip_reputation_url: env::var("PAYTRAIL_IP_REPUTATION_URL").ok(),
            ip_reputation_api_key: env::var("PAYTRAIL_IP_REPUTATION_API_KEY").ok(),
            ip_reputation_ttl_secs: env_parse("PAYTRAIL_IP_REPUTATION_TTL_SECS", 900),
            stripe,
            paypal,
            bitcoin,
            merchant_descriptor: env_or("PAYTRAIL_MERCHANT_DESCRIPTOR", "PAYTRAIL DIGITAL"),
            policy_url: env_or("PAYTRAIL_POLICY_URL", "https://example.com/refund-policy"),
            support_contact: env_or("PAYTRAIL_SUPPORT_CONTACT", "support@example.com"),
        }
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Seconds a completed order may sit unconfirmed before auto-refund.
    pub fn refund_staleness_secs(&self) -> i64 {
        self.refund_staleness_hours * 3600
    }
}
