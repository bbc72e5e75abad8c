//! Signaling wire protocol.
//!
//! JSON frames over a persistent WebSocket, event-typed. SDP and ICE
//! payloads are opaque to the relay: they are carried as raw JSON values
//! and forwarded verbatim, never inspected or rewritten. The session id is
//! the only addressing information and doubles as the room capability -
//! there is no authentication at this layer.

use serde::{Deserialize, Serialize};

/// A signaling frame, as sent by and forwarded to connected peers.
///
/// `join` and `terminate` are control frames; `offer`/`answer`/
/// `ice-candidate` are negotiation payloads relayed between the two room
/// members.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum SignalFrame {
    /// Enter the room named by the session id.
    #[serde(rename_all = "camelCase")]
    Join { session_id: String },

    /// WebRTC offer from the caller.
    #[serde(rename_all = "camelCase")]
    Offer {
        session_id: String,
        sdp: serde_json::Value,
    },

    /// WebRTC answer from the callee.
    #[serde(rename_all = "camelCase")]
    Answer {
        session_id: String,
        sdp: serde_json::Value,
    },

    /// Trickle ICE candidate, either direction.
    #[serde(rename_all = "camelCase")]
    IceCandidate {
        session_id: String,
        candidate: serde_json::Value,
    },

    /// Hang-up notice. Forwarded like any other frame, and additionally
    /// drives the server-side termination path.
    #[serde(rename_all = "camelCase")]
    Terminate { session_id: String },
}

impl SignalFrame {
    /// The room this frame addresses.
    #[must_use]
    pub fn session_id(&self) -> &str {
        match self {
            SignalFrame::Join { session_id }
            | SignalFrame::Offer { session_id, .. }
            | SignalFrame::Answer { session_id, .. }
            | SignalFrame::IceCandidate { session_id, .. }
            | SignalFrame::Terminate { session_id } => session_id,
        }
    }

    /// Event name for logging and metrics.
    #[must_use]
    pub fn event(&self) -> &'static str {
        match self {
            SignalFrame::Join { .. } => "join",
            SignalFrame::Offer { .. } => "offer",
            SignalFrame::Answer { .. } => "answer",
            SignalFrame::IceCandidate { .. } => "ice-candidate",
            SignalFrame::Terminate { .. } => "terminate",
        }
    }
}
