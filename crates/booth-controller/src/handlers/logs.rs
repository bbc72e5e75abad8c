//! Audit log handler.
//!
//! Fire-and-forget trail for dashboard actions; a missing operator id is
//! recorded as "unknown" rather than rejected.

use super::parse_body;
use crate::errors::BoothError;
use crate::models::{AppendLogRequest, AuditLogEntry};
use crate::routes::AppState;
use axum::{extract::State, Json};
use chrono::Utc;
use std::sync::Arc;
use tracing::instrument;

/// Handler for `POST /api/v1/logs`.
#[instrument(
    skip_all,
    name = "booth.logs.append",
    fields(method = "POST", endpoint = "/api/v1/logs")
)]
pub async fn append_log(
    State(state): State<Arc<AppState>>,
    body: axum::body::Bytes,
) -> Result<Json<serde_json::Value>, BoothError> {
    let request: AppendLogRequest = parse_body(&body)?;

    let entry = AuditLogEntry {
        user_id: request.user_id.unwrap_or_else(|| "unknown".to_string()),
        action: request.action,
        timestamp: Utc::now(),
    };
    state.store.append_log(&entry).await?;

    Ok(Json(serde_json::json!({ "message": "log recorded" })))
}
