//! Prefixed ID generation for paytrail entities.
//!
//! All IDs use a `pt_` brand prefix to guarantee collision avoidance with
//! payment provider IDs (Stripe's `pi_`, `evt_`, PayPal capture ids, etc.).
//!
//! Format: `pt_{entity}_{uuid_simple}` (32 hex chars, no hyphens)

use uuid::Uuid;

/// All known entity prefixes for validation.
const ALL_PREFIXES: &[&str] = &[
    "pt_evt_",
    "pt_ord_",
    "pt_ful_",
    "pt_ulk_",
    "pt_sig_",
    "pt_rcp_",
];

/// Validate that a string is a valid paytrail prefixed ID.
///
/// This is a cheap check to reject garbage before hitting the database.
/// Validates format: `pt_{entity}_{32_hex_chars}`
pub fn is_valid_prefixed_id(s: &str) -> bool {
    let Some(prefix) = ALL_PREFIXES.iter().find(|p| s.starts_with(*p)) else {
        return false;
    };

    let hex_part = &s[prefix.len()..];
    hex_part.len() == 32 && hex_part.chars().all(|c| c.is_ascii_hexdigit())
}

/// Entity types that have prefixed IDs in paytrail.
#[derive(Debug, Clone, Copy)]
pub enum EntityType {
    Event,
    Order,
    Fulfillment,
    UnlockToken,
    DeviceSignal,
    Receipt,
}

impl EntityType {
    /// Returns the prefix for this entity type.
    pub fn prefix(&self) -> &'static str {
        match self {
            Self::Event => "pt_evt",
            Self::Order => "pt_ord",
            Self::Fulfillment => "pt_ful",
            Self::UnlockToken => "pt_ulk",
            Self::DeviceSignal => "pt_sig",
            Self::Receipt => "pt_rcp",
        }
    }

    /// Generates a new prefixed ID for this entity type.
    pub fn gen_id(&self) -> String {
        format!("{}_{}", self.prefix(), Uuid::new_v4().as_simple())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_format() {
        let id = EntityType::Order.gen_id();
        assert!(id.starts_with("pt_ord_"));
        // pt_ord_ (7 chars) + 32 hex chars = 39 chars total
        assert_eq!(id.len(), 39);
    }

    #[test]
    fn test_ids_are_unique() {
        let id1 = EntityType::Event.gen_id();
        let id2 = EntityType::Event.gen_id();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_is_valid_prefixed_id() {
        assert!(is_valid_prefixed_id("pt_ord_a1b2c3d4e5f6789012345678901234ab"));
        assert!(is_valid_prefixed_id("pt_ulk_00000000000000000000000000000000"));
        assert!(is_valid_prefixed_id(&EntityType::Fulfillment.gen_id()));
        assert!(is_valid_prefixed_id(&EntityType::UnlockToken.gen_id()));

        assert!(!is_valid_prefixed_id(""));
        assert!(!is_valid_prefixed_id("a1b2c3d4-e5f6-7890-1234-567890123456"));
        assert!(!is_valid_prefixed_id("pt_unknown_a1b2c3d4e5f6789012345678901234ab"));
        assert!(!is_valid_prefixed_id("pt_ord_a1b2c3d4")); // too short
        assert!(!is_valid_prefixed_id("pt_ord_a1b2c3d4e5f6789012345678901234gg")); // non-hex
        assert!(!is_valid_prefixed_id("ord_a1b2c3d4e5f6789012345678901234ab")); // missing pt_
    }
}
