//! Voucher admin handlers (dashboard surface).
//!
//! - `POST /api/v1/vouchers` - create from a package
//! - `GET /api/v1/vouchers` - listing
//! - `DELETE /api/v1/vouchers/{code}` - delete
//! - `PATCH /api/v1/vouchers/{code}` - staff edit (duration/price)
//!
//! Every mutation leaves an audit trail entry attributed to the supplied
//! operator id. Authorization (who may call these) is an external concern;
//! the ledger only enforces balance rules.

use super::{parse_body, parse_body_or_default};
use crate::errors::BoothError;
use crate::models::{
    AdjustVoucherRequest, CreateVoucherRequest, CreateVoucherResponse, DeleteVoucherRequest,
    Voucher,
};
use crate::routes::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use common::types::VoucherCode;
use std::sync::Arc;
use tracing::instrument;

/// Handler for `POST /api/v1/vouchers`.
#[instrument(
    skip_all,
    name = "booth.voucher.create",
    fields(method = "POST", endpoint = "/api/v1/vouchers")
)]
pub async fn create_voucher(
    State(state): State<Arc<AppState>>,
    body: axum::body::Bytes,
) -> Result<(StatusCode, Json<CreateVoucherResponse>), BoothError> {
    let request: CreateVoucherRequest = parse_body(&body)?;

    let voucher = state
        .ledger
        .create(request.package_type, &request.user_id)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(CreateVoucherResponse { code: voucher.code }),
    ))
}

/// Handler for `GET /api/v1/vouchers`.
#[instrument(skip_all, name = "booth.voucher.list")]
pub async fn list_vouchers(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<Voucher>>, BoothError> {
    let vouchers = state.ledger.list().await?;
    Ok(Json(vouchers))
}

/// Handler for `DELETE /api/v1/vouchers/{code}`.
///
/// Idempotent ack, matching the admin client's expectations: deleting a
/// code that is already gone still returns 200.
#[instrument(
    skip_all,
    name = "booth.voucher.delete",
    fields(method = "DELETE", endpoint = "/api/v1/vouchers/{code}")
)]
pub async fn delete_voucher(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
    body: axum::body::Bytes,
) -> Result<Json<serde_json::Value>, BoothError> {
    let request: DeleteVoucherRequest = parse_body_or_default(&body)?;
    let code = VoucherCode::normalized(&code);
    let user_id = request.user_id.unwrap_or_else(|| "unknown".to_string());

    state.ledger.delete(&code, &user_id).await?;

    Ok(Json(serde_json::json!({ "message": "voucher deleted" })))
}

/// Handler for `PATCH /api/v1/vouchers/{code}` (staff edit).
///
/// # Response
///
/// - 200 OK: updated record (balance raised to at least the new total)
/// - 400 Bad Request: zero duration
/// - 404 Not Found: unknown code
#[instrument(
    skip_all,
    name = "booth.voucher.adjust",
    fields(method = "PATCH", endpoint = "/api/v1/vouchers/{code}")
)]
pub async fn adjust_voucher(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
    body: axum::body::Bytes,
) -> Result<Json<Voucher>, BoothError> {
    let request: AdjustVoucherRequest = parse_body(&body)?;
    let code = VoucherCode::normalized(&code);

    let voucher = state
        .ledger
        .adjust(&code, request.duration_secs, request.price, &request.user_id)
        .await?;

    Ok(Json(voucher))
}
