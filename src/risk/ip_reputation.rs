use std::time::Duration;

use moka::future::Cache;
use serde::Deserialize;

use crate::config::Config;

/// Maximum distinct IPs held in the reputation cache.
const CACHE_MAX_CAPACITY: u64 = 10_000;

/// One reputation verdict for an IP address.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct IpReputation {
    #[serde(default)]
    pub vpn: bool,
    #[serde(default)]
    pub proxy: bool,
    #[serde(default)]
    pub tor: bool,
    pub risk_score: Option<i64>,
    pub country: Option<String>,
    pub asn: Option<i64>,
}

/// IP reputation lookups with a bounded-TTL cache in front.
///
/// Repeated requests from the same address within the TTL window are served
/// from cache so the external service is not hit once per page load.
#[derive(Clone)]
pub struct IpReputationClient {
    client: reqwest::Client,
    base_url: Option<String>,
    api_key: Option<String>,
    cache: Cache<String, IpReputation>,
}

impl IpReputationClient {
    pub fn from_config(config: &Config) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(5))
                .build()
                .expect("Failed to create HTTP client"),
            base_url: config.ip_reputation_url.clone(),
            api_key: config.ip_reputation_api_key.clone(),
            cache: Cache::builder()
                .max_capacity(CACHE_MAX_CAPACITY)
                .time_to_live(Duration::from_secs(config.ip_reputation_ttl_secs))
                .build(),
        }
    }

    /// Look up reputation for an IP, serving from cache inside the TTL.
    ///
    /// Returns None when the service is unconfigured or unreachable; a
    /// missing verdict is a neutral signal, never a checkout blocker.
    /// Failures are not cached so the next request retries.
    pub async fn lookup(&self, ip: &str) -> Option<IpReputation> {
        let base_url = self.base_url.as_ref()?;

        if let Some(cached) = self.cache.get(ip).await {
            return Some(cached);
        }

        let mut request = self.client.get(format!("{}/{}", base_url, ip));
        if let Some(key) = &self.api_key {
            request = request.query(&[("key", key.as_str())]);
        }

        let response = match request.send().await {
            Ok(r) if r.status().is_success() => r,
            Ok(r) => {
                tracing::warn!("IP reputation lookup failed for {}: {}", ip, r.status());
                return None;
            }
            Err(e) => {
                tracing::warn!("IP reputation service unreachable: {}", e);
                return None;
            }
        };

        let reputation: IpReputation = match response.json().await {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!("IP reputation returned invalid body: {}", e);
                return None;
            }
        };

        self.cache.insert(ip.to_string(), reputation.clone()).await;
        // Flush moka's async housekeeping so entry_count() reflects the insert
        // synchronously for callers like cached_entries().
        self.cache.run_pending_tasks().await;
        Some(reputation)
    }

    /// Number of cached verdicts (for tests and diagnostics).
    pub fn cached_entries(&self) -> u64 {
        self.cache.entry_count()
    }
}
