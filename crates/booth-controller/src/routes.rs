//! Router assembly and shared application state.

use crate::handlers::{logs, receivers, sessions, vouchers};
use crate::ledger::VoucherLedger;
use crate::orchestrator::SessionOrchestrator;
use crate::relay::rooms::SignalingRelay;
use crate::relay::ws;
use crate::store::BoothStore;
use axum::routing::{delete, get, post, put};
use axum::Router;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Shared state handed to every handler.
///
/// The store is read-only from this surface except through the ledger and
/// orchestrator, which are the only writers of voucher/session documents.
pub struct AppState {
    pub store: Arc<dyn BoothStore>,
    pub ledger: VoucherLedger,
    pub orchestrator: Arc<SessionOrchestrator>,
    pub relay: Arc<SignalingRelay>,
}

/// Build the API router: booth/dashboard endpoints plus the signaling
/// WebSocket.
pub fn api_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route(
            "/api/v1/sessions",
            post(sessions::start_session).get(sessions::list_sessions),
        )
        .route(
            "/api/v1/sessions/:id/terminate",
            post(sessions::terminate_session),
        )
        .route(
            "/api/v1/vouchers",
            post(vouchers::create_voucher).get(vouchers::list_vouchers),
        )
        .route(
            "/api/v1/vouchers/:code",
            delete(vouchers::delete_voucher).patch(vouchers::adjust_voucher),
        )
        .route(
            "/api/v1/receivers/:identifier",
            put(receivers::register_receiver),
        )
        .route("/api/v1/receivers", get(receivers::list_receivers))
        .route("/api/v1/logs", post(logs::append_log))
        .route("/signal", get(ws::signal_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
