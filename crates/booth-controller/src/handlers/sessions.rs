//! Session handlers.
//!
//! - `POST /api/v1/sessions` - start a session (booth)
//! - `POST /api/v1/sessions/{id}/terminate` - terminate (booth or dashboard)
//! - `GET /api/v1/sessions` - listing for dashboard observers
//!
//! Clients never mutate session documents; every lifecycle change flows
//! through the orchestrator here.

use super::parse_body;
use crate::errors::BoothError;
use crate::models::{Session, StartSessionRequest, StartSessionResponse, TerminateSessionRequest};
use crate::observability::metrics;
use crate::routes::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use common::types::{SessionId, VoucherCode};
use std::sync::Arc;
use tracing::instrument;

/// Handler for `POST /api/v1/sessions`.
///
/// # Response
///
/// - 201 Created: session started, countdown running
/// - 404/409/410/422: the domain taxonomy (unknown, busy, expired/depleted,
///   unregistered receiver)
#[instrument(
    skip_all,
    name = "booth.session.start",
    fields(method = "POST", endpoint = "/api/v1/sessions")
)]
pub async fn start_session(
    State(state): State<Arc<AppState>>,
    body: axum::body::Bytes,
) -> Result<(StatusCode, Json<StartSessionResponse>), BoothError> {
    let request: StartSessionRequest = parse_body(&body)?;
    let code = VoucherCode::normalized(&request.voucher_code);

    let session = state
        .orchestrator
        .start(
            code,
            request.receiver_identifier,
            request.call_option,
            request.operator_id,
        )
        .await
        .inspect_err(|e| metrics::record_start_rejected(e.code()))?;

    Ok((
        StatusCode::CREATED,
        Json(StartSessionResponse {
            session_id: session.id,
            call_type: session.call_type,
            remaining_duration: session.remaining_duration,
            deadline: session.deadline,
        }),
    ))
}

/// Handler for `POST /api/v1/sessions/{id}/terminate`.
///
/// Idempotent: a second terminate (hang-up racing staff override or the
/// expiry clock) returns 200 with the already-terminal record.
#[instrument(
    skip_all,
    name = "booth.session.terminate",
    fields(method = "POST", endpoint = "/api/v1/sessions/{id}/terminate")
)]
pub async fn terminate_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    body: axum::body::Bytes,
) -> Result<Json<Session>, BoothError> {
    let session_id: SessionId = id
        .parse()
        .map_err(|_| BoothError::BadRequest("Invalid session id".to_string()))?;
    let request: TerminateSessionRequest = parse_body(&body)?;

    let outcome = state
        .orchestrator
        .terminate(session_id, request.actor, request.observed_remaining, None)
        .await?;

    Ok(Json(outcome.session().clone()))
}

/// Handler for `GET /api/v1/sessions`.
///
/// Dashboard observers derive live remaining time from each record's
/// `deadline`; the server keeps no ticking counters to report.
#[instrument(skip_all, name = "booth.session.list")]
pub async fn list_sessions(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<Session>>, BoothError> {
    let sessions = state.store.list_sessions().await?;
    Ok(Json(sessions))
}
