//! Signaling relay: session-scoped WebRTC negotiation forwarding.
//!
//! Three layers:
//! - [`protocol`] - the JSON frame vocabulary on the wire
//! - [`rooms`] - the in-process room registry (capacity 2, fan-out to the
//!   other member, no cross-room leakage)
//! - [`ws`] - the axum WebSocket endpoint bridging sockets onto rooms
//!
//! The relay owns no durable state. Membership exists only while sockets
//! are connected; the session id is both the room name and the capability
//! to enter it.

pub mod protocol;
pub mod rooms;
pub mod ws;

pub use protocol::SignalFrame;
pub use rooms::{ConnectionId, SignalingRelay, ROOM_CAPACITY};
