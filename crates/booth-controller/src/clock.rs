//! Session clock: authoritative deadlines and the expiry trigger.
//!
//! At session start the clock computes `deadline = now + remaining` once and
//! arms a timer task for it. Nothing ever decrements a stored counter; any
//! observer computes remaining time as `max(0, deadline - now)` on its own,
//! so there is no tick cadence for observers to agree on and no drift.
//!
//! When a deadline elapses while the session is still live, the clock emits
//! the session id on the expiry channel; the orchestrator's expiry driver
//! performs the actual termination (with retry, see
//! [`crate::orchestrator`]). Explicit termination cancels the timer via its
//! `CancellationToken`.

use common::types::SessionId;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Buffer for pending expiry notices. Expiries are rare and the driver
/// drains immediately; a full channel only means a burst of simultaneous
/// deadlines, which the driver works through in order.
const EXPIRY_CHANNEL_BUFFER: usize = 64;

/// Armed timers per session.
type TimerMap = Mutex<HashMap<SessionId, CancellationToken>>;

/// Session clock. One per service instance.
pub struct SessionClock {
    timers: TimerMap,
    expiry_tx: mpsc::Sender<SessionId>,
}

impl SessionClock {
    /// Create the clock and the receiving end of its expiry channel.
    #[must_use]
    pub fn new() -> (Arc<Self>, mpsc::Receiver<SessionId>) {
        let (expiry_tx, expiry_rx) = mpsc::channel(EXPIRY_CHANNEL_BUFFER);
        (
            Arc::new(Self {
                timers: Mutex::new(HashMap::new()),
                expiry_tx,
            }),
            expiry_rx,
        )
    }

    /// Arm the expiry timer for a session.
    ///
    /// Re-arming an already-armed session replaces the previous timer (the
    /// old one is cancelled), so a lost cancel can never fire a stale
    /// deadline for a session that was re-scheduled.
    pub fn schedule_expiry(self: &Arc<Self>, session_id: SessionId, remaining: Duration) {
        let token = CancellationToken::new();

        let previous = {
            let Ok(mut timers) = self.timers.lock() else {
                warn!(target: "booth.clock", "Timer map poisoned; expiry not armed");
                return;
            };
            timers.insert(session_id, token.clone())
        };
        if let Some(previous) = previous {
            previous.cancel();
        }

        debug!(
            target: "booth.clock",
            session_id = %session_id,
            remaining_secs = remaining.as_secs(),
            "Expiry armed"
        );

        // Anchor the deadline at schedule time so it is independent of when the
        // spawned task is first polled (see module docs: "deadline = now +
        // remaining once").
        let deadline = tokio::time::Instant::now() + remaining;
        let clock = Arc::clone(self);
        tokio::spawn(async move {
            tokio::select! {
                () = token.cancelled() => {
                    debug!(
                        target: "booth.clock",
                        session_id = %session_id,
                        "Expiry cancelled"
                    );
                }
                () = tokio::time::sleep_until(deadline) => {
                    debug!(
                        target: "booth.clock",
                        session_id = %session_id,
                        "Deadline elapsed"
                    );
                    if clock.expiry_tx.send(session_id).await.is_err() {
                        // Driver gone: shutdown in progress, nothing to do.
                        warn!(
                            target: "booth.clock",
                            session_id = %session_id,
                            "Expiry driver unavailable"
                        );
                    }
                }
            }
            clock.disarm(session_id);
        });
    }

    /// Cancel a session's timer (explicit termination beat the deadline).
    /// Cancelling an unknown or already-fired timer is a no-op.
    pub fn cancel(&self, session_id: SessionId) {
        let token = {
            let Ok(mut timers) = self.timers.lock() else {
                return;
            };
            timers.remove(&session_id)
        };
        if let Some(token) = token {
            token.cancel();
        }
    }

    /// Number of currently armed timers (health/metrics).
    #[must_use]
    pub fn armed(&self) -> usize {
        self.timers.lock().map(|t| t.len()).unwrap_or(0)
    }

    /// Drop the map entry once a timer task ends. Sessions are single-shot,
    /// so no newer timer can exist under the same id by the time this runs.
    fn disarm(&self, session_id: SessionId) {
        if let Ok(mut timers) = self.timers.lock() {
            timers.remove(&session_id);
        }
    }
}
