//! HTTP surface tests: request/response contracts, error codes and the
//! idempotent terminate endpoint, driven through the router with
//! `tower::ServiceExt::oneshot`.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic, clippy::indexing_slicing)]

use axum::body::Body;
use axum::http::{Request, StatusCode};
use booth_test_utils::{receiver, voucher, TestBooth};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

fn post(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn start_session_contract() {
    let booth = TestBooth::start();
    let code = booth.seed_voucher(&voucher(900)).await;
    let app = booth.router();

    // Unknown voucher first.
    let response = app
        .clone()
        .oneshot(post(
            "/api/v1/sessions",
            json!({
                "voucher_code": "NOPE123",
                "receiver_identifier": "+628123",
                "call_option": "gsm",
                "operator_id": "op-1",
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], json!("VOUCHER_NOT_FOUND"));

    // Valid start. Codes are entered by hand, so case must not matter.
    let response = app
        .clone()
        .oneshot(post(
            "/api/v1/sessions",
            json!({
                "voucher_code": code.as_str().to_lowercase(),
                "receiver_identifier": "+628123",
                "call_option": "gsm",
                "operator_id": "op-1",
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = body_json(response).await;
    assert_eq!(body["call_type"], json!("gsm"));
    assert_eq!(body["remaining_duration"], json!(900));
    assert!(body["session_id"].is_string());
    assert!(body["deadline"].is_string());

    // The voucher is now busy.
    let response = app
        .oneshot(post(
            "/api/v1/sessions",
            json!({
                "voucher_code": code.as_str(),
                "receiver_identifier": "+628999",
                "call_option": "gsm",
                "operator_id": "op-2",
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], json!("ALREADY_ACTIVE"));
}

#[tokio::test]
async fn app_call_types_require_registration() {
    let booth = TestBooth::start();
    let code = booth.seed_voucher(&voucher(900)).await;
    let app = booth.router();

    let response = app
        .clone()
        .oneshot(post(
            "/api/v1/sessions",
            json!({
                "voucher_code": code.as_str(),
                "receiver_identifier": "+620000",
                "call_option": "messaging-voice",
                "operator_id": "op-1",
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], json!("RECEIVER_NOT_REGISTERED"));

    // Register, retry: the app option now derives messaging-app.
    booth.seed_receiver(&receiver("+620000")).await;
    let response = app
        .oneshot(post(
            "/api/v1/sessions",
            json!({
                "voucher_code": code.as_str(),
                "receiver_identifier": "+620000",
                "call_option": "messaging-voice",
                "operator_id": "op-1",
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = body_json(response).await;
    assert_eq!(body["call_type"], json!("messaging-app"));
}

#[tokio::test]
async fn terminate_endpoint_is_idempotent() {
    let booth = TestBooth::start();
    let code = booth.seed_voucher(&voucher(900)).await;
    let app = booth.router();

    let response = app
        .clone()
        .oneshot(post(
            "/api/v1/sessions",
            json!({
                "voucher_code": code.as_str(),
                "receiver_identifier": "+628123",
                "call_option": "gsm",
                "operator_id": "op-1",
            }),
        ))
        .await
        .unwrap();
    let session_id = body_json(response).await["session_id"]
        .as_str()
        .unwrap()
        .to_string();

    let uri = format!("/api/v1/sessions/{session_id}/terminate");
    let first = app
        .clone()
        .oneshot(post(&uri, json!({ "actor": "staff", "observed_remaining": 420 })))
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::OK);
    let body = body_json(first).await;
    assert_eq!(body["active"], json!(false));
    assert_eq!(body["terminated_by"], json!("staff"));
    assert_eq!(body["remaining_duration"], json!(420));

    // Replaying (hang-up racing the override) is still 200, state unchanged.
    let second = app
        .clone()
        .oneshot(post(&uri, json!({ "actor": "user", "observed_remaining": 0 })))
        .await
        .unwrap();
    assert_eq!(second.status(), StatusCode::OK);
    let body = body_json(second).await;
    assert_eq!(body["terminated_by"], json!("staff"));
    assert_eq!(body["remaining_duration"], json!(420));

    // Garbage id is a 400, unknown id a 404.
    let response = app
        .clone()
        .oneshot(post(
            "/api/v1/sessions/not-a-uuid/terminate",
            json!({ "actor": "user" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .oneshot(post(
            &format!(
                "/api/v1/sessions/{}/terminate",
                common::types::SessionId::new()
            ),
            json!({ "actor": "user" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn voucher_admin_surface() {
    let booth = TestBooth::start();
    let app = booth.router();

    // Create from a package.
    let response = app
        .clone()
        .oneshot(post(
            "/api/v1/vouchers",
            json!({ "package_type": "15min", "user_id": "admin-1" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let code = body_json(response).await["code"].as_str().unwrap().to_string();
    assert_eq!(code.len(), 7);

    // Listing shows the package terms.
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/v1/vouchers")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let listed = body_json(response).await;
    assert_eq!(listed.as_array().unwrap().len(), 1);
    assert_eq!(listed[0]["total_duration"], json!(900));
    assert_eq!(listed[0]["price"], json!(5000));

    // Staff edit: zero duration is rejected, a raise sticks.
    let uri = format!("/api/v1/vouchers/{code}");
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("PATCH")
                .uri(&uri)
                .header("content-type", "application/json")
                .body(Body::from(
                    json!({ "duration_secs": 0, "price": 100, "user_id": "admin-1" }).to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        body_json(response).await["error"]["code"],
        json!("INVALID_ADJUSTMENT")
    );

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("PATCH")
                .uri(&uri)
                .header("content-type", "application/json")
                .body(Body::from(
                    json!({ "duration_secs": 1800, "price": 9000, "user_id": "admin-1" })
                        .to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let adjusted = body_json(response).await;
    assert_eq!(adjusted["remaining_duration"], json!(1800));

    // Delete, then the booth sees NOT_FOUND.
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri(&uri)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .oneshot(post(
            "/api/v1/sessions",
            json!({
                "voucher_code": code,
                "receiver_identifier": "+628123",
                "call_option": "gsm",
                "operator_id": "op-1",
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn receiver_and_log_endpoints() {
    let booth = TestBooth::start();
    let app = booth.router();

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("PUT")
                .uri("/api/v1/receivers/+628123")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        body_json(response).await["identifier"],
        json!("+628123")
    );

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/v1/receivers")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let listed = body_json(response).await;
    assert_eq!(listed.as_array().unwrap().len(), 1);

    // Audit log is a fire-and-forget ack; missing user id is tolerated.
    let response = app
        .oneshot(post(
            "/api/v1/logs",
            json!({ "action": "Opened dashboard" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}
