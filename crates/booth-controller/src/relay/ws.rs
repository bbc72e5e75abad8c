//! WebSocket endpoint bridging booth/receiver sockets onto relay rooms.
//!
//! One task pair per socket: the reader parses frames and drives the
//! registry (and, for `terminate`, the orchestrator); a writer task drains
//! the member channel into the socket. Frames the reader cannot parse are
//! dropped with a debug log - signaling is best-effort and a malformed
//! frame from one client must not tear down the relay.
//!
//! A `join` on a full room is the one hard failure: the socket is closed,
//! matching the contract that a third participant never observes partial
//! membership.

use crate::relay::protocol::SignalFrame;
use crate::relay::rooms::{ConnectionId, MEMBER_CHANNEL_BUFFER};
use crate::routes::AppState;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use common::types::{SessionId, TerminatedBy};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};

/// `GET /signal` - upgrade to the signaling protocol.
pub async fn signal_handler(
    State(state): State<Arc<AppState>>,
    ws: WebSocketUpgrade,
) -> Response {
    ws.on_upgrade(move |socket| relay_connection(socket, state))
}

/// Run one relay connection to completion.
#[instrument(skip_all, name = "booth.relay.connection", fields(conn_id))]
async fn relay_connection(socket: WebSocket, state: Arc<AppState>) {
    let conn_id = ConnectionId::new();
    tracing::Span::current().record("conn_id", tracing::field::display(conn_id));

    let (mut sink, mut stream) = socket.split();
    let (frame_tx, mut frame_rx) = mpsc::channel::<SignalFrame>(MEMBER_CHANNEL_BUFFER);

    // Writer task: member channel -> socket.
    let writer = tokio::spawn(async move {
        while let Some(frame) = frame_rx.recv().await {
            let text = match serde_json::to_string(&frame) {
                Ok(text) => text,
                Err(e) => {
                    warn!(target: "booth.relay.ws", error = %e, "Frame serialization failed");
                    continue;
                }
            };
            if sink.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
        let _ = sink.close().await;
    });

    debug!(target: "booth.relay.ws", conn_id = %conn_id, "Relay connection opened");

    // Rooms this socket joined, for disconnect cleanup.
    let mut joined: Vec<String> = Vec::new();

    while let Some(message) = stream.next().await {
        let message = match message {
            Ok(message) => message,
            Err(e) => {
                debug!(target: "booth.relay.ws", conn_id = %conn_id, error = %e, "Socket error");
                break;
            }
        };

        let text = match message {
            Message::Text(text) => text,
            Message::Close(_) => break,
            // Axum answers pings itself; binary frames are not part of the
            // protocol.
            Message::Ping(_) | Message::Pong(_) | Message::Binary(_) => continue,
        };

        let frame: SignalFrame = match serde_json::from_str(&text) {
            Ok(frame) => frame,
            Err(e) => {
                debug!(
                    target: "booth.relay.ws",
                    conn_id = %conn_id,
                    error = %e,
                    "Dropping unparseable frame"
                );
                continue;
            }
        };

        match frame {
            SignalFrame::Join { ref session_id } => {
                match state.relay.join(session_id, conn_id, frame_tx.clone()) {
                    Ok(()) => {
                        if !joined.contains(session_id) {
                            joined.push(session_id.clone());
                        }
                    }
                    Err(e) => {
                        // RoomFull is the one hard failure at this layer.
                        info!(
                            target: "booth.relay.ws",
                            conn_id = %conn_id,
                            session_id = %session_id,
                            error = %e,
                            "Join rejected, closing socket"
                        );
                        break;
                    }
                }
            }

            SignalFrame::Terminate { ref session_id } => {
                // Forward to the peer like any frame, then drive the
                // lifecycle. The orchestrator skips its own room broadcast
                // when the terminate originated here (no duplicate notice).
                state.relay.forward(session_id, conn_id, &frame).await;

                match session_id.parse::<SessionId>() {
                    Ok(id) => {
                        let result = state
                            .orchestrator
                            .terminate(id, TerminatedBy::User, None, Some(conn_id))
                            .await;
                        if let Err(e) = result {
                            // Best-effort: an unknown session is a normal
                            // transient (peer raced us or id was bogus).
                            debug!(
                                target: "booth.relay.ws",
                                conn_id = %conn_id,
                                session_id = %session_id,
                                error = %e,
                                "Terminate frame had no lifecycle effect"
                            );
                        }
                    }
                    Err(_) => {
                        debug!(
                            target: "booth.relay.ws",
                            conn_id = %conn_id,
                            "Terminate frame with non-session room name"
                        );
                    }
                }
            }

            ref negotiation @ (SignalFrame::Offer { .. }
            | SignalFrame::Answer { .. }
            | SignalFrame::IceCandidate { .. }) => {
                state
                    .relay
                    .forward(negotiation.session_id(), conn_id, negotiation)
                    .await;
            }
        }
    }

    // Disconnect: drop membership; room records are swept lazily.
    for session_id in &joined {
        state.relay.leave(session_id, conn_id);
    }
    writer.abort();

    debug!(
        target: "booth.relay.ws",
        conn_id = %conn_id,
        rooms = joined.len(),
        "Relay connection closed"
    );
}
