use serde::Serialize;

use super::AttributionSnapshot;

/// One visitor's browsing context across page loads.
///
/// `first_touch` is written exactly once, when the session row is created,
/// and anchors "where did this customer originally come from". `last_touch`
/// is overwritten by every subsequent event carrying attribution.
#[derive(Debug, Clone, Serialize)]
pub struct Session {
    /// Client-supplied identifier, persisted client-side across page loads.
    pub id: String,
    pub first_seen_at: i64,
    pub last_seen_at: i64,
    pub first_touch: AttributionSnapshot,
    pub last_touch: AttributionSnapshot,
}
