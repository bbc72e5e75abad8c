//! Health endpoints for the Booth Controller.
//!
//! Provides Kubernetes-compatible probes:
//! - `GET /health` - Liveness (is the process running?)
//! - `GET /ready` - Readiness (store reachable, can we serve traffic?)
//!
//! The `/metrics` endpoint is served separately via
//! `metrics-exporter-prometheus`.
//!
//! Readiness flips on once the store connection is established and flips
//! off first thing during shutdown, so the load balancer stops routing
//! booths to an instance that is about to drop its timers.

use axum::{extract::State, http::StatusCode, routing::get, Router};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Health state for the Booth Controller.
#[derive(Debug)]
pub struct HealthState {
    /// Process is up. Always true after startup initialization.
    live: AtomicBool,
    /// Store is reachable and the service accepts sessions.
    ready: AtomicBool,
}

impl Default for HealthState {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthState {
    /// Create a new health state (live=true, ready=false).
    #[must_use]
    pub fn new() -> Self {
        Self {
            live: AtomicBool::new(true),
            ready: AtomicBool::new(false),
        }
    }

    /// Mark the service ready (store connected).
    pub fn set_ready(&self) {
        self.ready.store(true, Ordering::SeqCst);
    }

    /// Mark the service not ready (shutdown starting or store lost).
    pub fn set_not_ready(&self) {
        self.ready.store(false, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }
}

/// Create the health router with liveness and readiness endpoints.
pub fn health_router(health_state: Arc<HealthState>) -> Router {
    Router::new()
        .route("/health", get(liveness_handler))
        .route("/ready", get(readiness_handler))
        .with_state(health_state)
}

/// Liveness probe: 200 while the process runs.
async fn liveness_handler(State(state): State<Arc<HealthState>>) -> StatusCode {
    if state.is_live() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

/// Readiness probe: 200 when sessions can be served, 503 otherwise.
async fn readiness_handler(State(state): State<Arc<HealthState>>) -> StatusCode {
    if state.is_ready() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}
