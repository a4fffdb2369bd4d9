mod device_signal;
mod event;
mod fulfillment;
mod order;
mod receipt;
mod session;

pub use device_signal::*;
pub use event::*;
pub use fulfillment::*;
pub use order::*;
pub use receipt::*;
pub use session::*;

/// Supported payment providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Paypal,
    Stripe,
    Bitcoin,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Paypal => "paypal",
            Self::Stripe => "stripe",
            Self::Bitcoin => "bitcoin",
        }
    }
}

impl std::str::FromStr for ProviderKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "paypal" => Ok(Self::Paypal),
            "stripe" => Ok(Self::Stripe),
            "bitcoin" => Ok(Self::Bitcoin),
            _ => Err(()),
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
