//! Booth Controller
//!
//! Call session orchestration and signaling relay for supervised call
//! booths.
//!
//! # Servers
//!
//! - HTTP API + signaling WebSocket (default: 0.0.0.0:8080)
//! - HTTP server for health endpoints and metrics (default: 0.0.0.0:8081)
//!
//! # Startup Flow
//!
//! 1. Load configuration from environment
//! 2. Initialize Prometheus metrics recorder
//! 3. Connect the store (Redis, or in-memory when no `REDIS_URL` is set)
//! 4. Build ledger, relay and orchestrator; spawn the expiry driver
//! 5. Start health HTTP server (liveness, readiness, metrics)
//! 6. Start API server
//! 7. Wait for shutdown signal, then cancel the token tree

#![warn(clippy::pedantic)]
#![allow(clippy::too_many_lines)] // main.rs orchestrates startup, naturally longer

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use booth_controller::config::Config;
use booth_controller::ledger::VoucherLedger;
use booth_controller::observability::{health_router, init_metrics_recorder, HealthState};
use booth_controller::orchestrator::{OrchestratorSettings, SessionOrchestrator};
use booth_controller::relay::rooms::SignalingRelay;
use booth_controller::routes::{api_router, AppState};
use booth_controller::store::memory::InMemoryStore;
use booth_controller::store::redis::RedisStore;
use booth_controller::store::BoothStore;
use common::secret::ExposeSecret;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Cadence of the store connectivity check backing the readiness probe.
const STORE_WATCHDOG_INTERVAL: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "booth_controller=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Booth Controller");

    // Load configuration
    let config = Config::from_env().map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    info!(
        booth_id = %config.booth_id,
        http_bind_address = %config.http_bind_address,
        health_bind_address = %config.health_bind_address,
        voucher_ttl_days = config.voucher_ttl_days,
        reservation_grace_seconds = config.reservation_grace_seconds,
        "Configuration loaded successfully"
    );

    // Initialize Prometheus metrics recorder before anything records
    info!("Initializing Prometheus metrics recorder...");
    let prometheus_handle = init_metrics_recorder().map_err(|e| {
        error!(error = %e, "Failed to install Prometheus metrics recorder");
        e
    })?;
    info!("Prometheus metrics recorder initialized");

    // Initialize health state
    let health_state = Arc::new(HealthState::new());

    // Connect the store
    let store: Arc<dyn BoothStore> = match &config.redis_url {
        Some(url) => {
            info!("Connecting to Redis...");
            let store = RedisStore::connect(url.expose_secret()).await.map_err(|e| {
                error!(error = %e, "Failed to connect to Redis");
                e
            })?;
            info!("Redis connection established");
            Arc::new(store)
        }
        None => {
            warn!("No REDIS_URL configured; using in-memory store (dev mode, not durable)");
            Arc::new(InMemoryStore::new())
        }
    };

    // Build the core components
    let ledger = VoucherLedger::new(Arc::clone(&store), config.voucher_ttl_days);
    let relay = Arc::new(SignalingRelay::new());
    let settings = OrchestratorSettings {
        reservation_grace: Duration::from_secs(config.reservation_grace_seconds),
        retry_initial: Duration::from_millis(config.expiry_retry_initial_ms),
        retry_max: Duration::from_millis(config.expiry_retry_max_ms),
    };
    let (orchestrator, expiry_rx) = SessionOrchestrator::new(
        Arc::clone(&store),
        ledger.clone(),
        Arc::clone(&relay),
        settings,
    );

    // Root of the shutdown token tree
    let shutdown_token = CancellationToken::new();

    // Spawn the expiry driver (clock deadline -> system-expiry termination)
    let _expiry_driver =
        orchestrator.spawn_expiry_driver(expiry_rx, shutdown_token.child_token());
    info!("Expiry driver started");

    // Store watchdog: readiness tracks store connectivity, not just startup
    let watchdog_store = Arc::clone(&store);
    let watchdog_health = Arc::clone(&health_state);
    let watchdog_token = shutdown_token.child_token();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(STORE_WATCHDOG_INTERVAL);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                () = watchdog_token.cancelled() => break,
                _ = ticker.tick() => {
                    match watchdog_store.ping().await {
                        Ok(()) => watchdog_health.set_ready(),
                        Err(e) => {
                            warn!(error = %e, "Store ping failed; marking not ready");
                            watchdog_health.set_not_ready();
                        }
                    }
                }
            }
        }
    });

    // Start health HTTP server (MUST succeed - fail startup if it doesn't)
    let health_addr: SocketAddr = config.health_bind_address.parse().map_err(|e| {
        error!(error = %e, addr = %config.health_bind_address, "Invalid health bind address");
        format!("Invalid health bind address: {e}")
    })?;

    let health_app = health_router(Arc::clone(&health_state)).merge(Router::new().route(
        "/metrics",
        axum::routing::get(move || {
            let handle = prometheus_handle.clone();
            async move { handle.render() }
        }),
    ));

    // Bind the listener BEFORE spawning to fail fast on bind errors
    let health_listener = tokio::net::TcpListener::bind(health_addr)
        .await
        .map_err(|e| {
            error!(error = %e, addr = %health_addr, "Failed to bind health server");
            format!("Failed to bind health server to {health_addr}: {e}")
        })?;
    info!(addr = %health_addr, "Health server bound successfully");

    let health_shutdown_token = shutdown_token.child_token();
    tokio::spawn(async move {
        info!(addr = %health_addr, "Health server starting");
        let server =
            axum::serve(health_listener, health_app).with_graceful_shutdown(async move {
                health_shutdown_token.cancelled().await;
                info!("Health server shutting down");
            });
        if let Err(e) = server.await {
            error!(error = %e, "Health server failed");
        }
    });

    // Start the API server
    let api_addr: SocketAddr = config.http_bind_address.parse().map_err(|e| {
        error!(error = %e, addr = %config.http_bind_address, "Invalid HTTP bind address");
        format!("Invalid HTTP bind address: {e}")
    })?;

    let state = Arc::new(AppState {
        store: Arc::clone(&store),
        ledger,
        orchestrator: Arc::clone(&orchestrator),
        relay,
    });
    let app = api_router(state);

    let api_listener = tokio::net::TcpListener::bind(api_addr).await.map_err(|e| {
        error!(error = %e, addr = %api_addr, "Failed to bind API server");
        format!("Failed to bind API server to {api_addr}: {e}")
    })?;
    info!(addr = %api_addr, "API server bound successfully");

    let api_shutdown_token = shutdown_token.child_token();
    tokio::spawn(async move {
        info!(addr = %api_addr, "API server starting");
        let server = axum::serve(api_listener, app).with_graceful_shutdown(async move {
            api_shutdown_token.cancelled().await;
            info!("API server shutting down");
        });
        if let Err(e) = server.await {
            error!(error = %e, "API server failed");
        }
    });

    // Store is connected and servers are up: ready for traffic
    health_state.set_ready();

    // Wait for shutdown signal
    info!("Booth Controller running - press Ctrl+C to shutdown");
    shutdown_signal().await;

    info!("Shutdown signal received, initiating graceful shutdown...");

    // Mark as not ready immediately so the load balancer stops routing
    health_state.set_not_ready();

    // Cancel the token tree: expiry driver, both servers
    shutdown_token.cancel();

    // Give in-flight requests and timer tasks time to wind down
    tokio::time::sleep(Duration::from_secs(2)).await;

    info!("Booth Controller shutdown complete");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
///
/// # Panics
///
/// Panics if signal handlers cannot be installed. This is acceptable because
/// without signal handlers, we cannot gracefully shut down the service.
async fn shutdown_signal() {
    let ctrl_c = async {
        #[expect(
            clippy::expect_used,
            reason = "Signal handler installation is critical - panic is appropriate if it fails"
        )]
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        #[expect(
            clippy::expect_used,
            reason = "Signal handler installation is critical - panic is appropriate if it fails"
        )]
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
