//! Durable store abstraction for the booth controller.
//!
//! The core needs surprisingly little from its store: point reads and
//! writes, a handful of *atomic conditional* transitions, and a change feed
//! that pushes full-collection snapshots to observers. Everything else
//! (queries, subscriptions, replication) belongs to the store product
//! behind this trait.
//!
//! Two backends:
//! - [`memory::InMemoryStore`] - single-process, for tests and dev mode
//! - [`redis::RedisStore`] - production, conditional transitions as Lua
//!
//! Both implement identical semantics for the conditional operations; the
//! exclusivity and settlement invariants live *here*, not in callers, so no
//! caller can reintroduce a check-then-act race on top of the store.

pub mod lua_scripts;
pub mod memory;
pub mod redis;

use crate::errors::BoothError;
use crate::models::{AuditLogEntry, Receiver, Session, Voucher};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::types::{SessionId, TerminatedBy, VoucherCode};
use std::time::Duration;
use tokio::sync::broadcast;

/// Buffer size for the change-feed broadcast channel. Slow observers that
/// fall further behind than this see a `Lagged` error and resubscribe.
pub const CHANGE_FEED_BUFFER: usize = 64;

/// Full-collection snapshot pushed on every mutation of that collection.
///
/// Snapshot (rather than diff) semantics match what dashboard and booth
/// observers expect from the store's native subscriptions.
#[derive(Debug, Clone)]
pub enum ChangeEvent {
    Vouchers(Vec<Voucher>),
    Sessions(Vec<Session>),
    Receivers(Vec<Receiver>),
}

/// Outcome of the atomic exclusivity reservation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReserveOutcome {
    /// This caller now holds the voucher's single session slot.
    Reserved,
    /// Another live session already holds the slot.
    AlreadyActive,
}

/// Outcome of the atomic session termination transition.
#[derive(Debug, Clone)]
pub enum FinishOutcome {
    /// This call performed the one `active=true -> false` transition.
    /// Carries the terminated record (with the seeded remaining value as it
    /// was before settlement overwrote it).
    Finished { session: Session, seeded: u32 },
    /// The session was already terminated; no state was changed.
    AlreadyFinished(Session),
    /// No such session.
    NotFound,
}

/// Outcome of the atomic voucher settlement.
#[derive(Debug, Clone)]
pub enum SettleOutcome {
    /// Balance written.
    Settled(Voucher),
    /// Rejected: the supplied value would raise the balance above the
    /// voucher's current remaining time (stale or hostile client).
    WouldInflate { current: u32, requested: u32 },
    /// No such voucher.
    NotFound,
}

/// Transactional document store consumed by the orchestrator and ledger.
///
/// Implementations must guarantee that [`try_reserve`](BoothStore::try_reserve),
/// [`finish_session`](BoothStore::finish_session) and
/// [`settle_voucher`](BoothStore::settle_voucher) are single atomic
/// operations: under concurrent callers each decides on a consistent view
/// with no interleaved read-then-write window.
#[async_trait]
pub trait BoothStore: Send + Sync {
    // -- vouchers ------------------------------------------------------------

    async fn put_voucher(&self, voucher: &Voucher) -> Result<(), BoothError>;

    async fn get_voucher(&self, code: &VoucherCode) -> Result<Option<Voucher>, BoothError>;

    /// Returns whether a record existed.
    async fn delete_voucher(&self, code: &VoucherCode) -> Result<bool, BoothError>;

    async fn list_vouchers(&self) -> Result<Vec<Voucher>, BoothError>;

    /// Sticky `used = true`. Idempotent; returns whether the voucher exists.
    async fn mark_voucher_used(&self, code: &VoucherCode) -> Result<bool, BoothError>;

    /// Atomically write the post-session balance, rejecting inflation.
    async fn settle_voucher(
        &self,
        code: &VoucherCode,
        remaining: u32,
    ) -> Result<SettleOutcome, BoothError>;

    /// Staff edit: set total duration and price; the balance is raised to
    /// `max(current_remaining, new_total)` and never lowered.
    async fn adjust_voucher(
        &self,
        code: &VoucherCode,
        new_total: u32,
        new_price: u32,
    ) -> Result<Option<Voucher>, BoothError>;

    // -- exclusivity reservation --------------------------------------------

    /// Atomically claim the voucher's single active-session slot.
    ///
    /// Exactly one concurrent caller wins; losers observe
    /// [`ReserveOutcome::AlreadyActive`] with no side effects. `ttl` bounds
    /// how long a crashed holder can strand the slot.
    async fn try_reserve(
        &self,
        code: &VoucherCode,
        session_id: SessionId,
        ttl: Duration,
    ) -> Result<ReserveOutcome, BoothError>;

    /// Release a reservation without a session transition (start rollback).
    /// Only removes the slot if `session_id` still holds it.
    async fn release_reservation(
        &self,
        code: &VoucherCode,
        session_id: SessionId,
    ) -> Result<(), BoothError>;

    // -- sessions ------------------------------------------------------------

    async fn insert_session(&self, session: &Session) -> Result<(), BoothError>;

    async fn get_session(&self, id: SessionId) -> Result<Option<Session>, BoothError>;

    async fn list_sessions(&self) -> Result<Vec<Session>, BoothError>;

    /// Atomically perform the single `active=true -> false` transition,
    /// recording attribution and the settled remaining time, and releasing
    /// the voucher's reservation in the same step.
    async fn finish_session(
        &self,
        id: SessionId,
        end_time: DateTime<Utc>,
        terminated_by: TerminatedBy,
        remaining: u32,
    ) -> Result<FinishOutcome, BoothError>;

    // -- receivers -----------------------------------------------------------

    /// Append/overwrite a registration record.
    async fn put_receiver(&self, receiver: &Receiver) -> Result<(), BoothError>;

    async fn get_receiver(&self, identifier: &str) -> Result<Option<Receiver>, BoothError>;

    async fn list_receivers(&self) -> Result<Vec<Receiver>, BoothError>;

    // -- audit log -----------------------------------------------------------

    async fn append_log(&self, entry: &AuditLogEntry) -> Result<(), BoothError>;

    // -- infrastructure ------------------------------------------------------

    /// Subscribe to full-collection snapshots.
    fn watch(&self) -> broadcast::Receiver<ChangeEvent>;

    /// Cheap connectivity check for the readiness probe.
    async fn ping(&self) -> Result<(), BoothError>;
}
