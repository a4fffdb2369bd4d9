use axum::{extract::State, http::HeaderMap};

use crate::db::AppState;
use crate::error::{AppError, Result};
use crate::extractors::Json;
use crate::sweep::{self, SweepConfig, SweepOutcome};

use super::secrets_match;

/// Trigger one bounded batch of dispute-prevention work.
///
/// Authorized by the shared-secret header; the endpoint is disabled
/// entirely when no secret is configured. Timing is owned by an external
/// scheduler (cron) - this only runs once per call.
pub async fn run_scheduler(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<SweepOutcome>> {
    let Some(secret) = &state.config.scheduler_secret else {
        tracing::warn!("Scheduler trigger rejected: no secret configured");
        return Err(AppError::Unauthorized);
    };

    let provided = headers
        .get("x-scheduler-secret")
        .and_then(|v| v.to_str().ok())
        .ok_or(AppError::Unauthorized)?;

    if !secrets_match(provided, secret) {
        tracing::warn!("Scheduler trigger rejected: bad secret");
        return Err(AppError::Unauthorized);
    }

    let config = SweepConfig::from_config(&state.config);
    let outcome = sweep::run_sweep(&state.db, &config, state.payments.as_ref()).await?;

    Ok(Json(outcome))
}
