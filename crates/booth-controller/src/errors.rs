//! Booth Controller error types.
//!
//! All errors map to appropriate HTTP status codes via the `IntoResponse`
//! impl. Error messages returned to clients are intentionally generic for
//! internal failures; the actual errors are logged server-side. The domain
//! taxonomy (voucher/session/relay failures) is surfaced verbatim since it
//! is the contract booth and dashboard clients act on.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Booth Controller error type.
///
/// Maps to HTTP status codes:
/// - `VoucherNotFound`, `SessionNotFound`: 404 Not Found
/// - `VoucherExpired`, `VoucherDepleted`: 410 Gone
/// - `AlreadyActive`, `RoomFull`: 409 Conflict
/// - `ReceiverNotRegistered`: 422 Unprocessable Entity
/// - `InvalidAdjustment`, `BadRequest`: 400 Bad Request
/// - `Store`, `Internal`: 500 Internal Server Error
#[derive(Debug, Error)]
pub enum BoothError {
    /// No voucher exists under the supplied code.
    #[error("Voucher not found: {0}")]
    VoucherNotFound(String),

    /// The voucher's redemption deadline has passed.
    #[error("Voucher expired: {0}")]
    VoucherExpired(String),

    /// The voucher has been used and has no remaining call time.
    #[error("Voucher depleted: {0}")]
    VoucherDepleted(String),

    /// Another session currently holds this voucher.
    #[error("Voucher already in an active session: {0}")]
    AlreadyActive(String),

    /// The requested call type requires a registered receiver.
    #[error("Receiver not registered: {0}")]
    ReceiverNotRegistered(String),

    /// No session exists under the supplied id.
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    /// A third connection attempted to join a two-party signaling room.
    #[error("Signaling room is full: {0}")]
    RoomFull(String),

    /// Staff edit with non-positive duration or negative price, or a
    /// settlement that would inflate a voucher's balance.
    #[error("Invalid adjustment: {0}")]
    InvalidAdjustment(String),

    /// Malformed request payload.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Store operation failed.
    #[error("Store error: {0}")]
    Store(String),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl BoothError {
    /// Returns the HTTP status code for this error (also used for metrics).
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            BoothError::VoucherNotFound(_) | BoothError::SessionNotFound(_) => {
                StatusCode::NOT_FOUND
            }
            BoothError::VoucherExpired(_) | BoothError::VoucherDepleted(_) => StatusCode::GONE,
            BoothError::AlreadyActive(_) | BoothError::RoomFull(_) => StatusCode::CONFLICT,
            BoothError::ReceiverNotRegistered(_) => StatusCode::UNPROCESSABLE_ENTITY,
            BoothError::InvalidAdjustment(_) | BoothError::BadRequest(_) => {
                StatusCode::BAD_REQUEST
            }
            BoothError::Store(_) | BoothError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine-readable code for the wire contract.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            BoothError::VoucherNotFound(_) => "VOUCHER_NOT_FOUND",
            BoothError::VoucherExpired(_) => "VOUCHER_EXPIRED",
            BoothError::VoucherDepleted(_) => "VOUCHER_DEPLETED",
            BoothError::AlreadyActive(_) => "ALREADY_ACTIVE",
            BoothError::ReceiverNotRegistered(_) => "RECEIVER_NOT_REGISTERED",
            BoothError::SessionNotFound(_) => "SESSION_NOT_FOUND",
            BoothError::RoomFull(_) => "ROOM_FULL",
            BoothError::InvalidAdjustment(_) => "INVALID_ADJUSTMENT",
            BoothError::BadRequest(_) => "BAD_REQUEST",
            BoothError::Store(_) => "STORE_ERROR",
            BoothError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Returns a client-safe error message (no internal details).
    #[must_use]
    pub fn client_message(&self) -> String {
        match self {
            BoothError::Store(_) | BoothError::Internal(_) => {
                "An internal error occurred".to_string()
            }
            BoothError::VoucherNotFound(_) => "Voucher not found".to_string(),
            BoothError::VoucherExpired(_) => "Voucher has expired".to_string(),
            BoothError::VoucherDepleted(_) => "Voucher has no remaining call time".to_string(),
            BoothError::AlreadyActive(_) => {
                "Voucher is already in use by another session".to_string()
            }
            BoothError::ReceiverNotRegistered(_) => {
                "Receiver is not registered for this call type".to_string()
            }
            BoothError::SessionNotFound(_) => "Session not found".to_string(),
            BoothError::RoomFull(_) => "Signaling room already has two participants".to_string(),
            BoothError::InvalidAdjustment(msg) | BoothError::BadRequest(msg) => msg.clone(),
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

impl IntoResponse for BoothError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // Log internal failures server-side; the client gets a generic message.
        match &self {
            BoothError::Store(err) => {
                tracing::error!(target: "booth.store", error = %err, "Store operation failed");
            }
            BoothError::Internal(err) => {
                tracing::error!(target: "booth.errors", error = %err, "Internal error");
            }
            _ => {}
        }

        let error_response = ErrorResponse {
            error: ErrorDetail {
                code: self.code().to_string(),
                message: self.client_message(),
            },
        };

        (status, Json(error_response)).into_response()
    }
}
