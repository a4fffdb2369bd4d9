use std::time::Duration;

use serde::Deserialize;

use crate::config::Config;

/// Server-side challenge verification (Turnstile-style siteverify).
///
/// The checkout page runs an interactive challenge and submits the resulting
/// token with the order; this client trades the token for a confidence score.
#[derive(Clone)]
pub struct BotChecker {
    client: reqwest::Client,
    verify_url: Option<String>,
    secret: Option<String>,
}

#[derive(Debug, Deserialize)]
struct VerifyResponse {
    success: bool,
    /// Confidence 0.0-1.0; some challenge providers omit it and only
    /// report pass/fail.
    score: Option<f64>,
}

impl BotChecker {
    pub fn from_config(config: &Config) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(5))
                .build()
                .expect("Failed to create HTTP client"),
            verify_url: config.challenge_verify_url.clone(),
            secret: config.challenge_secret.clone(),
        }
    }

    /// Score a checkout attempt 0-100.
    ///
    /// Returns None when verification is unconfigured or the service is
    /// unreachable - an absent signal, not a failing one. A missing token on
    /// a configured deployment scores 0: real checkout pages always carry
    /// one.
    pub async fn score(&self, challenge_token: Option<&str>, remote_ip: &str) -> Option<i64> {
        let (verify_url, secret) = match (&self.verify_url, &self.secret) {
            (Some(u), Some(s)) => (u, s),
            _ => return None,
        };

        let Some(token) = challenge_token else {
            return Some(0);
        };

        let result = self
            .client
            .post(verify_url)
            .form(&[
                ("secret", secret.as_str()),
                ("response", token),
                ("remoteip", remote_ip),
            ])
            .send()
            .await;

        let response = match result {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!("Challenge verification unreachable: {}", e);
                return None;
            }
        };

        let verdict: VerifyResponse = match response.json().await {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!("Challenge verification returned invalid body: {}", e);
                return None;
            }
        };

        if !verdict.success {
            return Some(0);
        }

        Some(
            verdict
                .score
                .map(|s| (s.clamp(0.0, 1.0) * 100.0).round() as i64)
                .unwrap_or(100),
        )
    }
}
