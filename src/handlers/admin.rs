//! Admin surface: manual refunds, fulfillment revocation, receipt retrieval.
//!
//! Bearer shared-secret auth with the same discipline as the automated
//! paths: constant-time comparison, disabled entirely when unconfigured.

use axum::{extract::State, http::HeaderMap};
use serde::{Deserialize, Serialize};

use crate::db::{queries, AppState};
use crate::error::{AppError, OptionExt, Result};
use crate::extractors::{Json, Path};
use crate::models::{OrderStatus, Receipt};
use crate::payments::RefundIssuer;
use crate::sweep::{self, SweepConfig};

fn require_admin(state: &AppState, headers: &HeaderMap) -> Result<()> {
    let Some(secret) = &state.config.admin_secret else {
        tracing::warn!("Admin request rejected: no admin secret configured");
        return Err(AppError::Unauthorized);
    };

    let provided = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or(AppError::Unauthorized)?;

    if !super::secrets_match(provided, secret) {
        tracing::warn!("Admin request rejected: bad secret");
        return Err(AppError::Unauthorized);
    }

    Ok(())
}

#[derive(Debug, Serialize)]
pub struct RefundOutcome {
    pub order_id: String,
    pub status: OrderStatus,
}

/// Manually refund a completed order. Same rule as the sweep: the provider
/// must confirm the refund before any local state moves.
pub async fn manual_refund(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(order_id): Path<String>,
) -> Result<Json<RefundOutcome>> {
    require_admin(&state, &headers)?;

    let order = {
        let conn = state.db.get()?;
        queries::get_order_by_id(&conn, &order_id)?.or_not_found("Order not found")?
    };

    if order.status != OrderStatus::Completed {
        return Err(AppError::Conflict(format!(
            "Order is {}, only completed orders can be refunded",
            order.status
        )));
    }

    state.payments.issue_refund(&order).await?;

    let mut conn = state.db.get()?;
    sweep::apply_refund(&mut conn, &order, "manual_refund")?;

    Ok(Json(RefundOutcome {
        order_id: order.id,
        status: OrderStatus::Refunded,
    }))
}

#[derive(Debug, Deserialize)]
pub struct RevokeRequest {
    pub order_id: String,
}

#[derive(Debug, Serialize)]
pub struct RevokeOutcome {
    pub order_id: String,
    pub revoked: bool,
}

/// Revoke a fulfillment without touching the order (e.g. abuse of a token
/// that leaked). Idempotent: revoking an already-revoked token reports
/// revoked=false.
pub async fn revoke_fulfillment(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<RevokeRequest>,
) -> Result<Json<RevokeOutcome>> {
    require_admin(&state, &headers)?;

    let conn = state.db.get()?;
    queries::get_fulfillment_by_order(&conn, &request.order_id)?
        .or_not_found("No fulfillment for order")?;

    let revoked = queries::revoke_fulfillment(&conn, &request.order_id)?;

    Ok(Json(RevokeOutcome {
        order_id: request.order_id,
        revoked,
    }))
}

/// Retrieve the dispute-evidence receipt for an order, generating it on the
/// spot if the sweep has not gotten there yet.
pub async fn get_receipt(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(order_id): Path<String>,
) -> Result<Json<Receipt>> {
    require_admin(&state, &headers)?;

    let conn = state.db.get()?;
    let order = queries::get_order_by_id(&conn, &order_id)?.or_not_found("Order not found")?;

    if let Some(receipt) = queries::get_receipt_for_order(&conn, &order.id)? {
        return Ok(Json(receipt));
    }

    let config = SweepConfig::from_config(&state.config);
    queries::try_insert_receipt(&conn, &sweep::build_receipt(&config, &order))?;
    let receipt = queries::get_receipt_for_order(&conn, &order.id)?
        .ok_or_else(|| AppError::Internal("receipt missing after insert".into()))?;

    Ok(Json(receipt))
}
