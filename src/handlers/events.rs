use std::str::FromStr;

use axum::extract::State;
use serde::{Deserialize, Serialize};

use crate::db::{queries, AppState};
use crate::error::{AppError, Result};
use crate::extractors::Json;
use crate::models::{AttributionSnapshot, EventType, NewEvent};

/// A client-emitted behavioral event. Fire-and-forget: the client never
/// inspects the response body.
#[derive(Debug, Deserialize)]
pub struct EventSubmission {
    pub event_type: String,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub attribution: AttributionSnapshot,
}

#[derive(Debug, Serialize)]
pub struct EventAck {
    pub status: &'static str,
}

/// Ingest one client event: validate the type, resolve or create the
/// session, append the event row. Purely observational - nothing downstream
/// (fulfillment, orders) is ever triggered from here.
pub async fn collect_event(
    State(state): State<AppState>,
    Json(submission): Json<EventSubmission>,
) -> Result<Json<EventAck>> {
    let event_type = EventType::from_str(&submission.event_type).map_err(|_| {
        AppError::BadRequest(format!("Unknown event type: {}", submission.event_type))
    })?;

    // Server-authoritative types (payment outcomes, content access) are
    // emitted internally only; accepting them here would let any client
    // forge the financial event log.
    if !event_type.is_client_type() {
        return Err(AppError::BadRequest(format!(
            "Event type {} is server-reserved",
            event_type
        )));
    }

    let conn = state.db.get()?;

    let mut event = NewEvent::new(event_type).attribution(submission.attribution.clone());
    if let Some(session_id) = &submission.session_id {
        queries::upsert_session(&conn, session_id, &submission.attribution)?;
        event = event.session(session_id.clone());
    }

    queries::insert_event(&conn, &event)?;

    Ok(Json(EventAck { status: "ok" }))
}
