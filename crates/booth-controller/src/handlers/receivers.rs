//! Receiver registry handlers.
//!
//! Registration is what permits messaging-app and peer-video call types for
//! an identifier. Append/overwrite semantics, no deletion.

use crate::errors::BoothError;
use crate::models::Receiver;
use crate::routes::AppState;
use axum::{
    extract::{Path, State},
    Json,
};
use chrono::Utc;
use std::sync::Arc;
use tracing::instrument;

/// Handler for `PUT /api/v1/receivers/{identifier}`.
///
/// Registering an already-registered identifier refreshes its timestamp.
#[instrument(
    skip_all,
    name = "booth.receiver.register",
    fields(method = "PUT", endpoint = "/api/v1/receivers/{identifier}")
)]
pub async fn register_receiver(
    State(state): State<Arc<AppState>>,
    Path(identifier): Path<String>,
) -> Result<Json<Receiver>, BoothError> {
    let identifier = identifier.trim().to_string();
    if identifier.is_empty() {
        return Err(BoothError::BadRequest(
            "Receiver identifier must not be empty".to_string(),
        ));
    }

    let receiver = Receiver {
        identifier,
        registered_at: Utc::now(),
    };
    state.store.put_receiver(&receiver).await?;

    Ok(Json(receiver))
}

/// Handler for `GET /api/v1/receivers`.
#[instrument(skip_all, name = "booth.receiver.list")]
pub async fn list_receivers(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<Receiver>>, BoothError> {
    let receivers = state.store.list_receivers().await?;
    Ok(Json(receivers))
}
