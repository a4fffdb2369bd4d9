use axum::extract::State;
use serde::{Deserialize, Serialize};

use crate::db::{queries, AppState};
use crate::error::Result;
use crate::extractors::{Json, Query};
use crate::models::{EventType, NewEvent, TokenStatus};

#[derive(Debug, Deserialize)]
pub struct UnlockQuery {
    pub token: String,
}

/// The contract consumed by the content delivery layer: token status plus
/// the minimal metadata needed to grant access.
#[derive(Debug, Serialize)]
pub struct UnlockResponse {
    pub status: TokenStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sku: Option<String>,
}

/// Content-access check for an unlock token.
///
/// Revoked tokens still exist (kept for audit) but are treated as invalid
/// for access purposes. Every check - valid, revoked, or unknown - is
/// recorded as a content_access event.
pub async fn check_unlock(
    State(state): State<AppState>,
    Query(query): Query<UnlockQuery>,
) -> Result<Json<UnlockResponse>> {
    let conn = state.db.get()?;

    let fulfillment = queries::get_fulfillment_by_token(&conn, &query.token)?;

    let (status, order) = match &fulfillment {
        None => (TokenStatus::Invalid, None),
        Some(f) if f.is_revoked() => {
            (TokenStatus::Revoked, queries::get_order_by_id(&conn, &f.order_id)?)
        }
        Some(f) => (TokenStatus::Valid, queries::get_order_by_id(&conn, &f.order_id)?),
    };

    let mut event = NewEvent::new(EventType::ContentAccess)
        .detail(serde_json::json!({ "token_status": status.as_str() }));
    if let Some(order) = &order {
        event = event.order(order.id.clone());
        if let Some(session_id) = &order.session_id {
            event = event.session(session_id.clone());
        }
    }
    queries::insert_event(&conn, &event)?;

    // Only a valid token exposes order metadata to the caller.
    let (order_id, sku) = match (status, order) {
        (TokenStatus::Valid, Some(order)) => (Some(order.id), Some(order.sku)),
        _ => (None, None),
    };

    Ok(Json(UnlockResponse {
        status,
        order_id,
        sku,
    }))
}
