//! Session orchestrator: the create/terminate state machine.
//!
//! A session moves `Created -> Active -> Terminated{reason}`; `Created`
//! exists only inside [`SessionOrchestrator::start`]. The orchestrator is
//! the sole writer of session and voucher state - booth, receiver and
//! dashboard clients all converge here, which is what makes the
//! exclusivity and settlement invariants enforceable at all.
//!
//! # Races this module owns
//!
//! - Concurrent `start` calls for one voucher: resolved by the store's
//!   atomic reservation; exactly one caller wins, the rest fail with
//!   `AlreadyActive` and no side effects.
//! - Natural expiry vs. a human hang-up arriving together: resolved by
//!   idempotent `terminate` - the store performs a single
//!   `active -> inactive` transition, the second caller observes it and
//!   becomes a no-op success. The voucher is settled exactly once.

use crate::clock::SessionClock;
use crate::errors::BoothError;
use crate::ledger::VoucherLedger;
use crate::models::{CallOption, Session};
use crate::observability::metrics;
use crate::relay::protocol::SignalFrame;
use crate::relay::rooms::{ConnectionId, SignalingRelay};
use crate::store::{BoothStore, FinishOutcome, ReserveOutcome};
use chrono::Utc;
use common::types::{SessionId, TerminatedBy, VoucherCode};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

/// Tunables lifted from [`crate::config::Config`].
#[derive(Debug, Clone, Copy)]
pub struct OrchestratorSettings {
    /// Slack added to the reservation TTL beyond the seeded duration.
    pub reservation_grace: Duration,
    /// Initial backoff when an expiry or settlement write fails.
    pub retry_initial: Duration,
    /// Backoff ceiling.
    pub retry_max: Duration,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            reservation_grace: Duration::from_secs(
                crate::config::DEFAULT_RESERVATION_GRACE_SECONDS,
            ),
            retry_initial: Duration::from_millis(crate::config::DEFAULT_EXPIRY_RETRY_INITIAL_MS),
            retry_max: Duration::from_millis(crate::config::DEFAULT_EXPIRY_RETRY_MAX_MS),
        }
    }
}

/// Result of a terminate call. Both cases are success to the caller; the
/// distinction matters for tests and logging.
#[derive(Debug, Clone)]
pub enum TerminateOutcome {
    /// This call performed the transition.
    Terminated(Session),
    /// The session was already terminated (e.g. the expiry clock and a
    /// hang-up raced); nothing changed.
    AlreadyTerminated(Session),
}

impl TerminateOutcome {
    /// The terminal session record either way.
    #[must_use]
    pub fn session(&self) -> &Session {
        match self {
            TerminateOutcome::Terminated(s) | TerminateOutcome::AlreadyTerminated(s) => s,
        }
    }
}

/// The session orchestrator. One per service instance.
pub struct SessionOrchestrator {
    store: Arc<dyn BoothStore>,
    ledger: VoucherLedger,
    clock: Arc<SessionClock>,
    relay: Arc<SignalingRelay>,
    settings: OrchestratorSettings,
}

impl SessionOrchestrator {
    /// Build the orchestrator. Returns the expiry channel's receiving end;
    /// pass it to [`SessionOrchestrator::spawn_expiry_driver`] once the
    /// instance is wrapped in an `Arc`.
    #[must_use]
    pub fn new(
        store: Arc<dyn BoothStore>,
        ledger: VoucherLedger,
        relay: Arc<SignalingRelay>,
        settings: OrchestratorSettings,
    ) -> (Arc<Self>, mpsc::Receiver<SessionId>) {
        let (clock, expiry_rx) = SessionClock::new();
        (
            Arc::new(Self {
                store,
                ledger,
                clock,
                relay,
                settings,
            }),
            expiry_rx,
        )
    }

    /// The session clock (observers and tests).
    #[must_use]
    pub fn clock(&self) -> &Arc<SessionClock> {
        &self.clock
    }

    /// Start a session against a voucher.
    ///
    /// # Errors
    ///
    /// Fails fast, in order: `VoucherNotFound` / `VoucherExpired` /
    /// `VoucherDepleted` from validation, `AlreadyActive` from the
    /// reservation, `ReceiverNotRegistered` for app call types without a
    /// registration. Any failure after the reservation rolls it back; the
    /// voucher's `used` flag is only set once the session record exists.
    #[instrument(skip_all, fields(code = %voucher_code, call_option = ?call_option))]
    pub async fn start(
        &self,
        voucher_code: VoucherCode,
        receiver_identifier: String,
        call_option: CallOption,
        operator_id: String,
    ) -> Result<Session, BoothError> {
        let quote = self.ledger.validate(&voucher_code).await?;

        let session_id = SessionId::new();
        let reserve_ttl = Duration::from_secs(u64::from(quote.remaining_duration))
            + self.settings.reservation_grace;

        match self
            .store
            .try_reserve(&voucher_code, session_id, reserve_ttl)
            .await?
        {
            ReserveOutcome::Reserved => {}
            ReserveOutcome::AlreadyActive => {
                return Err(BoothError::AlreadyActive(voucher_code.to_string()));
            }
        }

        // From here on every failure must give the slot back.
        let call_type = call_option.call_type();
        if call_type.requires_registration() {
            match self.store.get_receiver(&receiver_identifier).await {
                Ok(Some(_)) => {}
                Ok(None) => {
                    self.rollback_reservation(&voucher_code, session_id).await;
                    return Err(BoothError::ReceiverNotRegistered(receiver_identifier));
                }
                Err(e) => {
                    self.rollback_reservation(&voucher_code, session_id).await;
                    return Err(e);
                }
            }
        }

        let now = Utc::now();
        let session = Session {
            id: session_id,
            voucher_code: voucher_code.clone(),
            receiver_identifier,
            call_type,
            start_time: now,
            deadline: now + chrono::Duration::seconds(i64::from(quote.remaining_duration)),
            end_time: None,
            active: true,
            remaining_duration: quote.remaining_duration,
            terminated_by: None,
            owner_id: operator_id.clone(),
        };

        if let Err(e) = self.store.insert_session(&session).await {
            self.rollback_reservation(&voucher_code, session_id).await;
            return Err(e);
        }
        self.ledger.debit_on_start(&voucher_code).await?;

        self.clock.schedule_expiry(
            session_id,
            Duration::from_secs(u64::from(quote.remaining_duration)),
        );

        metrics::record_session_started(call_type);
        info!(
            target: "booth.orchestrator",
            session_id = %session_id,
            code = %voucher_code,
            call_type = ?call_type,
            seeded_secs = quote.remaining_duration,
            "Session started"
        );
        self.ledger
            .audit(&operator_id, &format!("Started session {session_id}"))
            .await;

        Ok(session)
    }

    /// Terminate a session. Idempotent: terminating an already-terminated
    /// session is a no-op success, which is how the expiry-vs-hangup race
    /// resolves.
    ///
    /// `observed_remaining` is clamped to `[0, seeded]`; `None` means the
    /// authoritative deadline decides. `origin` is set when a relay
    /// `terminate` frame drove this call - the reader has already forwarded
    /// the frame to the peer, so the room broadcast is skipped.
    ///
    /// # Errors
    ///
    /// `SessionNotFound` for an unknown id; store errors propagate.
    #[instrument(skip_all, fields(session_id = %session_id, actor = ?actor))]
    pub async fn terminate(
        &self,
        session_id: SessionId,
        actor: TerminatedBy,
        observed_remaining: Option<u32>,
        origin: Option<ConnectionId>,
    ) -> Result<TerminateOutcome, BoothError> {
        let Some(current) = self.store.get_session(session_id).await? else {
            return Err(BoothError::SessionNotFound(session_id.to_string()));
        };
        if !current.active {
            return Ok(TerminateOutcome::AlreadyTerminated(current));
        }

        let now = Utc::now();
        let seeded = current.remaining_duration;
        // Client clocks skew; never settle more time than was seeded.
        let remaining = observed_remaining.map_or_else(|| current.remaining_at(now), |observed| {
            if observed > seeded {
                warn!(
                    target: "booth.orchestrator",
                    session_id = %session_id,
                    observed = observed,
                    seeded = seeded,
                    "Observed remaining exceeds seed; clamping"
                );
            }
            observed.min(seeded)
        });

        match self
            .store
            .finish_session(session_id, now, actor, remaining)
            .await?
        {
            FinishOutcome::NotFound => {
                Err(BoothError::SessionNotFound(session_id.to_string()))
            }
            FinishOutcome::AlreadyFinished(session) => {
                // Lost the race to another terminator; their settlement stands.
                Ok(TerminateOutcome::AlreadyTerminated(session))
            }
            FinishOutcome::Finished { session, .. } => {
                self.clock.cancel(session_id);
                self.settle_or_retry(&session.voucher_code, remaining).await;

                if origin.is_none() {
                    let frame = SignalFrame::Terminate {
                        session_id: session_id.to_string(),
                    };
                    self.relay.broadcast(&session_id.to_string(), &frame).await;
                }

                metrics::record_session_terminated(actor);
                info!(
                    target: "booth.orchestrator",
                    session_id = %session_id,
                    actor = ?actor,
                    settled_secs = remaining,
                    "Session terminated"
                );
                Ok(TerminateOutcome::Terminated(session))
            }
        }
    }

    /// Spawn the expiry driver: consumes deadline notices from the clock
    /// and terminates the session with `system-expiry`, retrying with
    /// backoff on store failure. An un-terminated expired session is a
    /// durability bug, not a user-visible error, so the driver never gives
    /// up on a store error while the service is running.
    pub fn spawn_expiry_driver(
        self: &Arc<Self>,
        mut expiry_rx: mpsc::Receiver<SessionId>,
        cancel_token: CancellationToken,
    ) -> JoinHandle<()> {
        let orchestrator = Arc::clone(self);
        tokio::spawn(async move {
            info!(target: "booth.orchestrator", "Expiry driver started");
            loop {
                tokio::select! {
                    () = cancel_token.cancelled() => break,
                    maybe_id = expiry_rx.recv() => {
                        match maybe_id {
                            Some(session_id) => {
                                orchestrator.expire_with_retry(session_id, &cancel_token).await;
                            }
                            None => break,
                        }
                    }
                }
            }
            info!(target: "booth.orchestrator", "Expiry driver stopped");
        })
    }

    async fn expire_with_retry(&self, session_id: SessionId, cancel_token: &CancellationToken) {
        let mut backoff = self.settings.retry_initial;
        loop {
            match self
                .terminate(session_id, TerminatedBy::SystemExpiry, Some(0), None)
                .await
            {
                Ok(_) => return,
                Err(BoothError::SessionNotFound(_)) => {
                    // Session gone from the store; nothing left to expire.
                    return;
                }
                Err(e) => {
                    warn!(
                        target: "booth.orchestrator",
                        session_id = %session_id,
                        error = %e,
                        backoff_ms = backoff.as_millis() as u64,
                        "Expiry write failed, will retry"
                    );
                    tokio::select! {
                        () = cancel_token.cancelled() => return,
                        () = tokio::time::sleep(backoff) => {}
                    }
                    backoff = (backoff * 2).min(self.settings.retry_max);
                }
            }
        }
    }

    /// Settle the voucher; on a store failure hand the write to a
    /// background retry task so a human hang-up never blocks on a flaky
    /// store. Non-store rejections (voucher deleted mid-session) are
    /// terminal and only logged.
    async fn settle_or_retry(&self, code: &VoucherCode, remaining: u32) {
        match self.ledger.settle(code, remaining).await {
            Ok(()) => {}
            Err(BoothError::Store(_)) => {
                let ledger = self.ledger.clone();
                let code = code.clone();
                let settings = self.settings;
                tokio::spawn(async move {
                    let mut backoff = settings.retry_initial;
                    loop {
                        tokio::time::sleep(backoff).await;
                        match ledger.settle(&code, remaining).await {
                            Ok(()) => return,
                            Err(BoothError::Store(e)) => {
                                warn!(
                                    target: "booth.orchestrator",
                                    code = %code,
                                    error = %e,
                                    "Settlement retry failed"
                                );
                                backoff = (backoff * 2).min(settings.retry_max);
                            }
                            Err(e) => {
                                warn!(
                                    target: "booth.orchestrator",
                                    code = %code,
                                    error = %e,
                                    "Settlement permanently rejected"
                                );
                                return;
                            }
                        }
                    }
                });
            }
            Err(e) => {
                warn!(
                    target: "booth.orchestrator",
                    code = %code,
                    error = %e,
                    "Settlement rejected"
                );
            }
        }
    }

    async fn rollback_reservation(&self, code: &VoucherCode, session_id: SessionId) {
        if let Err(e) = self.store.release_reservation(code, session_id).await {
            // The TTL bounds the damage if this release is lost.
            warn!(
                target: "booth.orchestrator",
                code = %code,
                session_id = %session_id,
                error = %e,
                "Reservation rollback failed"
            );
        }
    }
}
