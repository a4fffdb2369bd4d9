//! Per-order risk assessment from device signals.
//!
//! High-risk orders are tagged for elevated scrutiny, never auto-rejected:
//! false positives on privacy-conscious customers (VPN users) are costly, so
//! policy flags and a human decides.

mod bot_check;
mod ip_reputation;

pub use bot_check::*;
pub use ip_reputation::*;

use crate::config::RiskPolicy;
use crate::models::NewDeviceSignal;

/// The outcome of scoring one checkout attempt.
#[derive(Debug, Clone, Default)]
pub struct RiskAssessment {
    pub high_risk: bool,
    pub reasons: Vec<String>,
}

/// Apply the configured policy to a device signal and order amount.
///
/// An order is flagged when the challenge confidence is below the configured
/// minimum, or when an anonymizer is suspected on an order above the amount
/// threshold. Missing signals (verification service down) contribute nothing
/// rather than flagging - degraded inputs must not block checkout.
pub fn assess(policy: &RiskPolicy, signal: &NewDeviceSignal, amount_cents: i64) -> RiskAssessment {
    let mut reasons = Vec::new();

    if let Some(score) = signal.bot_score {
        if score < policy.min_bot_score {
            reasons.push(format!(
                "bot score {} below minimum {}",
                score, policy.min_bot_score
            ));
        }
    }

    if signal.anonymizer_suspected() && amount_cents > policy.amount_threshold_cents {
        let mut flags = Vec::new();
        if signal.vpn_suspected {
            flags.push("vpn");
        }
        if signal.proxy_suspected {
            flags.push("proxy");
        }
        if signal.tor_suspected {
            flags.push("tor");
        }
        reasons.push(format!(
            "{} suspected with amount {} above threshold {}",
            flags.join("+"),
            amount_cents,
            policy.amount_threshold_cents
        ));
    }

    RiskAssessment {
        high_risk: !reasons.is_empty(),
        reasons,
    }
}
