use serde::Serialize;

/// Point-in-time risk assessment captured at checkout submission.
///
/// Immutable once recorded; read-only input to the risk scorer.
#[derive(Debug, Clone, Serialize)]
pub struct DeviceSignal {
    pub id: String,
    pub session_id: Option<String>,
    /// Challenge confidence 0-100; None when verification was unavailable.
    pub bot_score: Option<i64>,
    pub vpn_suspected: bool,
    pub proxy_suspected: bool,
    pub tor_suspected: bool,
    /// Numeric IP risk 0-100 from the reputation service.
    pub ip_risk_score: Option<i64>,
    pub country: Option<String>,
    pub asn: Option<i64>,
    pub captured_at: i64,
}

/// Data required to record a device signal.
#[derive(Debug, Clone, Default)]
pub struct NewDeviceSignal {
    pub session_id: Option<String>,
    pub bot_score: Option<i64>,
    pub vpn_suspected: bool,
    pub proxy_suspected: bool,
    pub tor_suspected: bool,
    pub ip_risk_score: Option<i64>,
    pub country: Option<String>,
    pub asn: Option<i64>,
}

impl NewDeviceSignal {
    /// Any anonymization flag set.
    pub fn anonymizer_suspected(&self) -> bool {
        self.vpn_suspected || self.proxy_suspected || self.tor_suspected
    }
}
