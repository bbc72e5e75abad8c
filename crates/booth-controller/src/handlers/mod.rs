//! HTTP handlers for the booth, dashboard and admin surfaces.
//!
//! Request bodies are deserialized manually from bytes so malformed JSON
//! returns 400 (not axum's default 422), keeping the error contract uniform
//! with the domain taxonomy.

pub mod logs;
pub mod receivers;
pub mod sessions;
pub mod vouchers;

use crate::errors::BoothError;
use serde::de::DeserializeOwned;

/// Deserialize a JSON body, mapping failures to `BadRequest`.
pub(crate) fn parse_body<T: DeserializeOwned>(body: &axum::body::Bytes) -> Result<T, BoothError> {
    serde_json::from_slice(body).map_err(|e| {
        tracing::debug!(target: "booth.handlers", error = %e, "Invalid request body");
        BoothError::BadRequest("Invalid request body".to_string())
    })
}

/// Like [`parse_body`] but an empty body yields `T::default()` (DELETE
/// bodies are optional on this surface).
pub(crate) fn parse_body_or_default<T: DeserializeOwned + Default>(
    body: &axum::body::Bytes,
) -> Result<T, BoothError> {
    if body.is_empty() {
        return Ok(T::default());
    }
    parse_body(body)
}
