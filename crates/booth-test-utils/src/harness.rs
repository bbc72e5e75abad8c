//! Full-core test harness.

use booth_controller::ledger::VoucherLedger;
use booth_controller::models::{Receiver, Session, Voucher};
use booth_controller::orchestrator::{OrchestratorSettings, SessionOrchestrator};
use booth_controller::relay::rooms::SignalingRelay;
use booth_controller::routes::{api_router, AppState};
use booth_controller::store::memory::InMemoryStore;
use booth_controller::store::BoothStore;
use common::types::{SessionId, VoucherCode};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// A complete service core on the in-memory store, with the expiry driver
/// running. Dropping the harness cancels the driver.
pub struct TestBooth {
    pub store: Arc<InMemoryStore>,
    pub ledger: VoucherLedger,
    pub orchestrator: Arc<SessionOrchestrator>,
    pub relay: Arc<SignalingRelay>,
    shutdown: CancellationToken,
    _expiry_driver: JoinHandle<()>,
}

impl TestBooth {
    /// Build the core with fast retry backoff (tests should not wait on
    /// production backoff ceilings).
    #[must_use]
    pub fn start() -> Self {
        let store = Arc::new(InMemoryStore::new());
        let store_dyn: Arc<dyn BoothStore> = store.clone();
        let ledger = VoucherLedger::new(Arc::clone(&store_dyn), 14);
        let relay = Arc::new(SignalingRelay::new());

        let settings = OrchestratorSettings {
            reservation_grace: Duration::from_secs(60),
            retry_initial: Duration::from_millis(10),
            retry_max: Duration::from_millis(100),
        };
        let (orchestrator, expiry_rx) = SessionOrchestrator::new(
            store_dyn,
            ledger.clone(),
            Arc::clone(&relay),
            settings,
        );

        let shutdown = CancellationToken::new();
        let expiry_driver = orchestrator.spawn_expiry_driver(expiry_rx, shutdown.child_token());

        Self {
            store,
            ledger,
            orchestrator,
            relay,
            shutdown,
            _expiry_driver: expiry_driver,
        }
    }

    /// Router over this core, for `tower::ServiceExt::oneshot` tests or a
    /// real listener.
    #[must_use]
    pub fn router(&self) -> axum::Router {
        api_router(Arc::new(AppState {
            store: self.store.clone(),
            ledger: self.ledger.clone(),
            orchestrator: Arc::clone(&self.orchestrator),
            relay: Arc::clone(&self.relay),
        }))
    }

    /// Seed a voucher and return its code.
    pub async fn seed_voucher(&self, voucher: &Voucher) -> VoucherCode {
        self.store.put_voucher(voucher).await.unwrap();
        voucher.code.clone()
    }

    /// Seed a receiver registration.
    pub async fn seed_receiver(&self, receiver: &Receiver) {
        self.store.put_receiver(receiver).await.unwrap();
    }

    /// Fetch a session record.
    pub async fn session(&self, id: SessionId) -> Session {
        self.store.get_session(id).await.unwrap().unwrap()
    }

    /// Fetch a voucher record.
    pub async fn voucher(&self, code: &VoucherCode) -> Voucher {
        self.store.get_voucher(code).await.unwrap().unwrap()
    }
}

impl Drop for TestBooth {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
