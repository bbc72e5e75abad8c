//! Room registry: session-scoped fan-out between exactly two peers.
//!
//! A room is named by its session id and holds at most two members (caller
//! and callee). Frames forward to every *other* member - never echoed to
//! the sender, never across rooms. The registry owns no durable state;
//! membership lives only as long as the connected sockets, and rooms whose
//! last member left are swept lazily on the next registry access.
//!
//! Fan-out is non-blocking with respect to the registry lock: member
//! senders are collected under the lock, the awaits happen outside it. A
//! slow peer therefore backpressures only the sender's own reader task,
//! which is also what preserves per-sender frame order.

use super::protocol::SignalFrame;
use crate::errors::BoothError;
use crate::observability::metrics;
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

/// Capacity of a signaling room: caller + callee.
pub const ROOM_CAPACITY: usize = 2;

/// Buffer for frames queued toward one connection's writer task.
pub const MEMBER_CHANNEL_BUFFER: usize = 64;

/// Identifies one relay connection for the lifetime of its socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

struct Member {
    conn_id: ConnectionId,
    tx: mpsc::Sender<SignalFrame>,
}

#[derive(Default)]
struct Room {
    members: Vec<Member>,
}

/// The signaling relay's room registry. One per service instance.
pub struct SignalingRelay {
    rooms: Mutex<HashMap<String, Room>>,
}

impl Default for SignalingRelay {
    fn default() -> Self {
        Self::new()
    }
}

impl SignalingRelay {
    #[must_use]
    pub fn new() -> Self {
        Self {
            rooms: Mutex::new(HashMap::new()),
        }
    }

    /// Add a connection to the room named by `session_id`.
    ///
    /// Joining a room the connection is already in refreshes its sender
    /// (idempotent rejoin after a writer hiccup).
    ///
    /// # Errors
    ///
    /// `RoomFull` when two other members already occupy the room.
    pub fn join(
        &self,
        session_id: &str,
        conn_id: ConnectionId,
        tx: mpsc::Sender<SignalFrame>,
    ) -> Result<(), BoothError> {
        let mut rooms = self.lock()?;

        // Lazy sweep: rooms whose last member left are garbage.
        rooms.retain(|_, room| !room.members.is_empty());

        let room = rooms.entry(session_id.to_string()).or_default();

        if let Some(existing) = room.members.iter_mut().find(|m| m.conn_id == conn_id) {
            existing.tx = tx;
            return Ok(());
        }
        if room.members.len() >= ROOM_CAPACITY {
            warn!(
                target: "booth.relay.rooms",
                session_id = %session_id,
                conn_id = %conn_id,
                "Join rejected: room full"
            );
            return Err(BoothError::RoomFull(session_id.to_string()));
        }

        room.members.push(Member { conn_id, tx });
        debug!(
            target: "booth.relay.rooms",
            session_id = %session_id,
            conn_id = %conn_id,
            members = room.members.len(),
            "Connection joined room"
        );
        Ok(())
    }

    /// Remove a connection from a room. The room record survives until the
    /// lazy sweep; an unknown room or member is a no-op.
    pub fn leave(&self, session_id: &str, conn_id: ConnectionId) {
        let Ok(mut rooms) = self.lock() else { return };
        if let Some(room) = rooms.get_mut(session_id) {
            room.members.retain(|m| m.conn_id != conn_id);
            debug!(
                target: "booth.relay.rooms",
                session_id = %session_id,
                conn_id = %conn_id,
                members = room.members.len(),
                "Connection left room"
            );
        }
    }

    /// Forward a frame to every room member other than `from`.
    ///
    /// Best-effort: an unknown room delivers to nobody and that is not an
    /// error (the peer simply has not joined yet). Returns the number of
    /// members the frame was delivered to.
    pub async fn forward(
        &self,
        session_id: &str,
        from: ConnectionId,
        frame: &SignalFrame,
    ) -> usize {
        self.deliver(session_id, Some(from), frame).await
    }

    /// Deliver a frame to every room member (server-originated notices,
    /// e.g. the terminate broadcast on staff override or expiry).
    pub async fn broadcast(&self, session_id: &str, frame: &SignalFrame) -> usize {
        self.deliver(session_id, None, frame).await
    }

    /// Current member count (tests and health reporting).
    #[must_use]
    pub fn member_count(&self, session_id: &str) -> usize {
        self.lock()
            .ok()
            .and_then(|rooms| rooms.get(session_id).map(|r| r.members.len()))
            .unwrap_or(0)
    }

    async fn deliver(
        &self,
        session_id: &str,
        except: Option<ConnectionId>,
        frame: &SignalFrame,
    ) -> usize {
        // Collect senders under the lock, await outside it.
        let targets: Vec<(ConnectionId, mpsc::Sender<SignalFrame>)> = {
            let Ok(rooms) = self.lock() else { return 0 };
            match rooms.get(session_id) {
                Some(room) => room
                    .members
                    .iter()
                    .filter(|m| Some(m.conn_id) != except)
                    .map(|m| (m.conn_id, m.tx.clone()))
                    .collect(),
                None => Vec::new(),
            }
        };

        let mut delivered = 0;
        for (conn_id, tx) in targets {
            if tx.send(frame.clone()).await.is_ok() {
                delivered += 1;
            } else {
                // Member's writer task is gone; its disconnect cleanup will
                // remove it from the room shortly.
                debug!(
                    target: "booth.relay.rooms",
                    session_id = %session_id,
                    conn_id = %conn_id,
                    "Dropped frame to departed member"
                );
            }
        }

        if delivered > 0 {
            metrics::record_frames_forwarded(frame.event(), delivered);
        }
        delivered
    }

    fn lock(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, HashMap<String, Room>>, BoothError> {
        self.rooms
            .lock()
            .map_err(|_| BoothError::Internal("relay room registry poisoned".to_string()))
    }
}
