//! End-to-end signaling tests over real WebSockets: two peers negotiating
//! through a room, the room-full hard failure, and a socket-originated
//! terminate driving the session lifecycle.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic, clippy::indexing_slicing)]

use booth_controller::models::CallOption;
use booth_test_utils::{receiver, voucher, TestBooth};
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn spawn_server(booth: &TestBooth) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = booth.router();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

async fn connect(addr: SocketAddr) -> WsClient {
    let (socket, _) = connect_async(format!("ws://{addr}/signal")).await.unwrap();
    socket
}

async fn send(socket: &mut WsClient, frame: Value) {
    socket
        .send(Message::Text(frame.to_string()))
        .await
        .unwrap();
}

async fn recv_json(socket: &mut WsClient) -> Value {
    let message = tokio::time::timeout(Duration::from_secs(5), socket.next())
        .await
        .expect("timed out waiting for frame")
        .expect("socket closed")
        .unwrap();
    match message {
        Message::Text(text) => serde_json::from_str(&text).unwrap(),
        other => panic!("expected text frame, got {other:?}"),
    }
}

async fn assert_silent(socket: &mut WsClient) {
    let result = tokio::time::timeout(Duration::from_millis(200), socket.next()).await;
    assert!(result.is_err(), "expected no frame, got {result:?}");
}

#[tokio::test]
async fn offer_reaches_the_other_peer_exactly_once() {
    let booth = TestBooth::start();
    let addr = spawn_server(&booth).await;

    let mut caller = connect(addr).await;
    let mut callee = connect(addr).await;

    send(&mut caller, json!({"event": "join", "sessionId": "room-a"})).await;
    send(&mut callee, json!({"event": "join", "sessionId": "room-a"})).await;
    // Joins are acknowledged by behavior, not by a reply frame; give the
    // server a beat to register both members.
    tokio::time::sleep(Duration::from_millis(50)).await;

    send(
        &mut caller,
        json!({
            "event": "offer",
            "sessionId": "room-a",
            "sdp": {"type": "offer", "sdp": "v=0\r\n"},
        }),
    )
    .await;

    let received = recv_json(&mut callee).await;
    assert_eq!(received["event"], json!("offer"));
    assert_eq!(received["sdp"]["type"], json!("offer"));

    // Never echoed back to the sender.
    assert_silent(&mut caller).await;

    // Answer flows the other way.
    send(
        &mut callee,
        json!({
            "event": "answer",
            "sessionId": "room-a",
            "sdp": {"type": "answer", "sdp": "v=0\r\n"},
        }),
    )
    .await;
    let received = recv_json(&mut caller).await;
    assert_eq!(received["event"], json!("answer"));
}

#[tokio::test]
async fn rooms_are_isolated() {
    let booth = TestBooth::start();
    let addr = spawn_server(&booth).await;

    let mut a = connect(addr).await;
    let mut b = connect(addr).await;

    send(&mut a, json!({"event": "join", "sessionId": "room-1"})).await;
    send(&mut b, json!({"event": "join", "sessionId": "room-2"})).await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    send(
        &mut a,
        json!({
            "event": "ice-candidate",
            "sessionId": "room-1",
            "candidate": {"candidate": "candidate:0"},
        }),
    )
    .await;

    assert_silent(&mut b).await;
}

#[tokio::test]
async fn third_join_gets_the_door() {
    let booth = TestBooth::start();
    let addr = spawn_server(&booth).await;

    let mut a = connect(addr).await;
    let mut b = connect(addr).await;
    send(&mut a, json!({"event": "join", "sessionId": "full-room"})).await;
    send(&mut b, json!({"event": "join", "sessionId": "full-room"})).await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    let mut c = connect(addr).await;
    send(&mut c, json!({"event": "join", "sessionId": "full-room"})).await;

    // The relay closes the third socket instead of overfilling the room.
    let outcome = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match c.next().await {
                None | Some(Ok(Message::Close(_))) | Some(Err(_)) => break,
                Some(Ok(_)) => {}
            }
        }
    })
    .await;
    assert!(outcome.is_ok(), "third joiner was not disconnected");
}

#[tokio::test]
async fn socket_terminate_drives_the_lifecycle() {
    let booth = TestBooth::start();
    let code = booth.seed_voucher(&voucher(900)).await;
    booth.seed_receiver(&receiver("+628123")).await;
    let addr = spawn_server(&booth).await;

    let session = booth
        .orchestrator
        .start(
            code.clone(),
            "+628123".to_string(),
            CallOption::PeerVideo,
            "op-1".to_string(),
        )
        .await
        .unwrap();
    let room = session.id.to_string();

    let mut caller = connect(addr).await;
    let mut callee = connect(addr).await;
    send(&mut caller, json!({"event": "join", "sessionId": room})).await;
    send(&mut callee, json!({"event": "join", "sessionId": room})).await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    // Caller hangs up through the signaling channel.
    send(&mut caller, json!({"event": "terminate", "sessionId": room})).await;

    // The peer hears the terminate once.
    let received = recv_json(&mut callee).await;
    assert_eq!(received["event"], json!("terminate"));
    assert_silent(&mut callee).await;

    // And the server side converged: session closed, attributed to the
    // user, voucher settled from the authoritative deadline.
    let mut terminated = false;
    for _ in 0..50 {
        let record = booth.session(session.id).await;
        if !record.active {
            assert_eq!(
                record.terminated_by,
                Some(common::types::TerminatedBy::User)
            );
            terminated = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(terminated, "session was not terminated by the relay frame");

    let settled = booth.voucher(&code).await;
    assert!(settled.remaining_duration <= 900);
}
