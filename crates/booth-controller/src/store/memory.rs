//! In-memory store backend.
//!
//! Single-process stand-in for the Redis backend with identical semantics
//! for the conditional operations, used by tests and by dev mode when no
//! `REDIS_URL` is configured. One mutex guards all collections; every
//! conditional transition therefore decides and writes under the same
//! critical section, which is exactly the atomicity the trait demands.

use super::{
    BoothStore, ChangeEvent, FinishOutcome, ReserveOutcome, SettleOutcome, CHANGE_FEED_BUFFER,
};
use crate::errors::BoothError;
use crate::models::{AuditLogEntry, Receiver, Session, Voucher};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::types::{SessionId, TerminatedBy, VoucherCode};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tokio::sync::broadcast;

/// A held exclusivity reservation.
#[derive(Debug, Clone, Copy)]
struct Reservation {
    session_id: SessionId,
    expires_at: Instant,
}

#[derive(Debug, Default)]
struct State {
    vouchers: HashMap<String, Voucher>,
    sessions: HashMap<SessionId, Session>,
    receivers: HashMap<String, Receiver>,
    reservations: HashMap<String, Reservation>,
    logs: Vec<AuditLogEntry>,
}

/// In-memory [`BoothStore`] implementation.
pub struct InMemoryStore {
    state: Mutex<State>,
    events: broadcast::Sender<ChangeEvent>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    #[must_use]
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(CHANGE_FEED_BUFFER);
        Self {
            state: Mutex::new(State::default()),
            events,
        }
    }

    fn locked(&self) -> Result<MutexGuard<'_, State>, BoothError> {
        self.state
            .lock()
            .map_err(|_| BoothError::Internal("store mutex poisoned".to_string()))
    }

    fn emit_vouchers(&self, state: &State) {
        let _ = self
            .events
            .send(ChangeEvent::Vouchers(state.vouchers.values().cloned().collect()));
    }

    fn emit_sessions(&self, state: &State) {
        let _ = self
            .events
            .send(ChangeEvent::Sessions(state.sessions.values().cloned().collect()));
    }

    fn emit_receivers(&self, state: &State) {
        let _ = self
            .events
            .send(ChangeEvent::Receivers(state.receivers.values().cloned().collect()));
    }
}

#[async_trait]
impl BoothStore for InMemoryStore {
    async fn put_voucher(&self, voucher: &Voucher) -> Result<(), BoothError> {
        let mut state = self.locked()?;
        state
            .vouchers
            .insert(voucher.code.as_str().to_string(), voucher.clone());
        self.emit_vouchers(&state);
        Ok(())
    }

    async fn get_voucher(&self, code: &VoucherCode) -> Result<Option<Voucher>, BoothError> {
        let state = self.locked()?;
        Ok(state.vouchers.get(code.as_str()).cloned())
    }

    async fn delete_voucher(&self, code: &VoucherCode) -> Result<bool, BoothError> {
        let mut state = self.locked()?;
        let existed = state.vouchers.remove(code.as_str()).is_some();
        if existed {
            self.emit_vouchers(&state);
        }
        Ok(existed)
    }

    async fn list_vouchers(&self) -> Result<Vec<Voucher>, BoothError> {
        let state = self.locked()?;
        Ok(state.vouchers.values().cloned().collect())
    }

    async fn mark_voucher_used(&self, code: &VoucherCode) -> Result<bool, BoothError> {
        let mut state = self.locked()?;
        let Some(voucher) = state.vouchers.get_mut(code.as_str()) else {
            return Ok(false);
        };
        if !voucher.used {
            voucher.used = true;
            self.emit_vouchers(&state);
        }
        Ok(true)
    }

    async fn settle_voucher(
        &self,
        code: &VoucherCode,
        remaining: u32,
    ) -> Result<SettleOutcome, BoothError> {
        let mut state = self.locked()?;
        let Some(voucher) = state.vouchers.get_mut(code.as_str()) else {
            return Ok(SettleOutcome::NotFound);
        };
        if remaining > voucher.remaining_duration {
            return Ok(SettleOutcome::WouldInflate {
                current: voucher.remaining_duration,
                requested: remaining,
            });
        }
        voucher.remaining_duration = remaining;
        let settled = voucher.clone();
        self.emit_vouchers(&state);
        Ok(SettleOutcome::Settled(settled))
    }

    async fn adjust_voucher(
        &self,
        code: &VoucherCode,
        new_total: u32,
        new_price: u32,
    ) -> Result<Option<Voucher>, BoothError> {
        let mut state = self.locked()?;
        let Some(voucher) = state.vouchers.get_mut(code.as_str()) else {
            return Ok(None);
        };
        voucher.total_duration = new_total;
        voucher.price = new_price;
        // A staff edit can only raise the balance, never lower it.
        voucher.remaining_duration = voucher.remaining_duration.max(new_total);
        let adjusted = voucher.clone();
        self.emit_vouchers(&state);
        Ok(Some(adjusted))
    }

    async fn try_reserve(
        &self,
        code: &VoucherCode,
        session_id: SessionId,
        ttl: Duration,
    ) -> Result<ReserveOutcome, BoothError> {
        let mut state = self.locked()?;
        let now = Instant::now();
        let key = code.as_str().to_string();

        if let Some(existing) = state.reservations.get(&key) {
            if existing.expires_at > now {
                return Ok(ReserveOutcome::AlreadyActive);
            }
            // Stale reservation from a dead holder; fall through and take it.
        }

        state.reservations.insert(
            key,
            Reservation {
                session_id,
                expires_at: now + ttl,
            },
        );
        Ok(ReserveOutcome::Reserved)
    }

    async fn release_reservation(
        &self,
        code: &VoucherCode,
        session_id: SessionId,
    ) -> Result<(), BoothError> {
        let mut state = self.locked()?;
        if let Some(held) = state.reservations.get(code.as_str()) {
            if held.session_id == session_id {
                state.reservations.remove(code.as_str());
            }
        }
        Ok(())
    }

    async fn insert_session(&self, session: &Session) -> Result<(), BoothError> {
        let mut state = self.locked()?;
        state.sessions.insert(session.id, session.clone());
        self.emit_sessions(&state);
        Ok(())
    }

    async fn get_session(&self, id: SessionId) -> Result<Option<Session>, BoothError> {
        let state = self.locked()?;
        Ok(state.sessions.get(&id).cloned())
    }

    async fn list_sessions(&self) -> Result<Vec<Session>, BoothError> {
        let state = self.locked()?;
        Ok(state.sessions.values().cloned().collect())
    }

    async fn finish_session(
        &self,
        id: SessionId,
        end_time: DateTime<Utc>,
        terminated_by: TerminatedBy,
        remaining: u32,
    ) -> Result<FinishOutcome, BoothError> {
        let mut state = self.locked()?;
        let Some(session) = state.sessions.get_mut(&id) else {
            return Ok(FinishOutcome::NotFound);
        };
        if !session.active {
            return Ok(FinishOutcome::AlreadyFinished(session.clone()));
        }

        let seeded = session.remaining_duration;
        session.active = false;
        session.end_time = Some(end_time);
        session.terminated_by = Some(terminated_by);
        session.remaining_duration = remaining;
        let finished = session.clone();

        // Releasing the slot is part of the same transition: once the session
        // is durably inactive the voucher is free again.
        let voucher_key = finished.voucher_code.as_str().to_string();
        if let Some(held) = state.reservations.get(&voucher_key) {
            if held.session_id == id {
                state.reservations.remove(&voucher_key);
            }
        }

        self.emit_sessions(&state);
        Ok(FinishOutcome::Finished {
            session: finished,
            seeded,
        })
    }

    async fn put_receiver(&self, receiver: &Receiver) -> Result<(), BoothError> {
        let mut state = self.locked()?;
        state
            .receivers
            .insert(receiver.identifier.clone(), receiver.clone());
        self.emit_receivers(&state);
        Ok(())
    }

    async fn get_receiver(&self, identifier: &str) -> Result<Option<Receiver>, BoothError> {
        let state = self.locked()?;
        Ok(state.receivers.get(identifier).cloned())
    }

    async fn list_receivers(&self) -> Result<Vec<Receiver>, BoothError> {
        let state = self.locked()?;
        Ok(state.receivers.values().cloned().collect())
    }

    async fn append_log(&self, entry: &AuditLogEntry) -> Result<(), BoothError> {
        let mut state = self.locked()?;
        state.logs.push(entry.clone());
        Ok(())
    }

    fn watch(&self) -> broadcast::Receiver<ChangeEvent> {
        self.events.subscribe()
    }

    async fn ping(&self) -> Result<(), BoothError> {
        self.locked().map(|_| ())
    }
}
