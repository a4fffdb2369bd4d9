use axum::extract::State;
use serde::{Deserialize, Serialize};

use crate::db::{queries, AppState};
use crate::error::{AppError, Result};
use crate::extractors::{Json, Query};

#[derive(Debug, Deserialize)]
pub struct ConfirmQuery {
    pub token: String,
}

#[derive(Debug, Serialize)]
pub struct ConfirmResponse {
    pub status: &'static str,
}

/// Confirmation-link click from the post-purchase email.
///
/// Idempotent: a second click succeeds without changing anything. Failures
/// present a generic message - end customers never see internal detail, and
/// a valid-looking-but-unknown token must not be distinguishable from other
/// errors.
pub async fn confirm_order(
    State(state): State<AppState>,
    Query(query): Query<ConfirmQuery>,
) -> Result<Json<ConfirmResponse>> {
    let conn = state.db.get()?;

    if !queries::confirm_order(&conn, &query.token)? {
        tracing::warn!("Confirmation attempted with unknown token");
        return Err(AppError::BadRequest(
            "Something went wrong. Please contact support.".into(),
        ));
    }

    Ok(Json(ConfirmResponse {
        status: "confirmed",
    }))
}
