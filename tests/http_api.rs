//! HTTP API tests driving the router in-process with `tower::ServiceExt`.

use axum::{
    Router,
    body::Body,
    http::{Method, Request, StatusCode},
};
use multipart_upload_sim::{
    models::multipart::PartSizePolicy,
    routes::routes::app,
    services::{
        coordinator::CoordinatorConfig,
        simulator_service::{EngineDefaults, SimulatorService},
        transport::SimulationConfig,
    },
};
use serde_json::{Value, json};
use std::time::Duration;
use tower::ServiceExt;

fn router() -> Router {
    app(SimulatorService::new(EngineDefaults {
        policy: PartSizePolicy::fixed(4),
        coordinator: CoordinatorConfig {
            retry_backoff: Duration::ZERO,
            ..CoordinatorConfig::default()
        },
        simulation: SimulationConfig::perfect(7),
        ..EngineDefaults::default()
    }))
}

async fn send(router: &Router, method: Method, uri: &str, body: Body) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(body)
        .unwrap();
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

async fn create(router: &Router, query: &str, payload: &'static [u8]) -> Value {
    let (status, session) = send(
        router,
        Method::POST,
        &format!("/sessions{}", query),
        Body::from(payload),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{}", session);
    session
}

async fn wait_until_done(router: &Router, id: &str) -> Value {
    for _ in 0..200 {
        let (status, session) =
            send(router, Method::GET, &format!("/sessions/{}", id), Body::empty()).await;
        assert_eq!(status, StatusCode::OK);
        if matches!(session["status"].as_str(), Some("completed" | "aborted")) {
            return session;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("session {} did not finish", id);
}

#[tokio::test]
async fn health_endpoints_respond() {
    let router = router();
    let (status, body) = send(&router, Method::GET, "/healthz", Body::empty()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");

    let (status, body) = send(&router, Method::GET, "/readyz", Body::empty()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["checks"]["digest"]["ok"], true);
}

#[tokio::test]
async fn session_lifecycle_over_http() {
    let router = router();
    let created = create(&router, "", b"0123456789").await;
    assert_eq!(created["parts"].as_array().map(Vec::len), Some(3));
    assert_eq!(created["parts"][2]["length"], 2);

    let id = created["session_id"].as_str().unwrap().to_string();
    let done = wait_until_done(&router, &id).await;
    assert_eq!(done["status"], "completed");
    let etag = done["etag"]["value"].as_str().unwrap().to_string();
    assert!(etag.ends_with("-3"));

    let (status, result) = send(
        &router,
        Method::GET,
        &format!("/sessions/{}/verify?expected_etag={}", id, etag),
        Body::empty(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(result["ok"], true);
    assert_eq!(result["etag_matches"], true);

    let (status, result) = send(
        &router,
        Method::POST,
        &format!("/sessions/{}/parts/2/tamper?offset=0", id),
        Body::empty(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(result["ok"], false);
    assert_eq!(result["mismatched_parts"], json!([2]));

    let (_, list) = send(&router, Method::GET, "/sessions", Body::empty()).await;
    assert_eq!(list.as_array().map(Vec::len), Some(1));
}

#[tokio::test]
async fn invalid_policy_is_a_bad_request() {
    let router = router();
    let (status, body) = send(
        &router,
        Method::POST,
        "/sessions?part_size=2&max_parts=2",
        Body::from(&b"0123456789"[..]),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["status"], 400);

    let (_, list) = send(&router, Method::GET, "/sessions", Body::empty()).await;
    assert_eq!(list, json!([]));
}

#[tokio::test]
async fn unknown_session_is_not_found() {
    let router = router();
    let (status, _) = send(
        &router,
        Method::GET,
        "/sessions/00000000-0000-0000-0000-000000000000",
        Body::empty(),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn tokens_issue_and_validate() {
    let router = router();
    let created = create(&router, "", b"abcdefgh").await;
    let id = created["session_id"].as_str().unwrap();

    let (status, issued) = send(
        &router,
        Method::POST,
        &format!("/sessions/{}/parts/1/token?ttl=60", id),
        Body::empty(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(issued["token"]["part_number"], 1);
    let compact = issued["compact"].clone();

    let validate = |part: u32| {
        let body = json!({ "token": compact.clone(), "part_number": part }).to_string();
        let router = router.clone();
        let uri = format!("/sessions/{}/tokens/validate", id);
        async move { send(&router, Method::POST, &uri, Body::from(body)).await }
    };

    let (status, ok) = validate(1).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ok, json!({ "valid": true, "reason": null }));

    let (_, wrong_part) = validate(2).await;
    assert_eq!(wrong_part["reason"], "part_mismatch");

    let (status, _) = send(
        &router,
        Method::POST,
        &format!("/sessions/{}/tokens/validate", id),
        Body::from(json!({ "token": "garbage" }).to_string()),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn cancel_and_resume_over_http() {
    let router = router();
    let created = create(&router, "?latency_ms=5000", b"0123456789abcdef").await;
    let id = created["session_id"].as_str().unwrap().to_string();

    let (status, cancelled) =
        send(&router, Method::DELETE, &format!("/sessions/{}", id), Body::empty()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cancelled["status"], "aborted");

    let (status, resumed) = send(
        &router,
        Method::POST,
        &format!("/sessions/{}/resume", id),
        Body::empty(),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(resumed["resumed_from"], id.as_str());
    assert_ne!(resumed["session_id"], id.as_str());

    let (status, _) = send(
        &router,
        Method::POST,
        &format!("/sessions/{}/resume", resumed["session_id"].as_str().unwrap()),
        Body::empty(),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, purged) = send(
        &router,
        Method::DELETE,
        &format!("/sessions/{}?purge=true", id),
        Body::empty(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(purged["status"], "aborted");
    let (status, _) =
        send(&router, Method::GET, &format!("/sessions/{}", id), Body::empty()).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn inspect_and_hexdump() {
    let router = router();
    let (status, rows) = send(
        &router,
        Method::POST,
        "/inspect?offset=0&kind=uint16&endian=be",
        Body::from(vec![0x12u8, 0x34]),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(rows[0]["kind"], "uint16");
    assert_eq!(rows[0]["raw_hex"], "1234");
    assert_eq!(rows[0]["value"], 0x1234);

    let (status, _) = send(
        &router,
        Method::POST,
        "/inspect?offset=1&kind=uint32",
        Body::from(vec![0u8; 4]),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &router,
        Method::POST,
        "/inspect?kind=uint128",
        Body::from(vec![0u8]),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, rows) = send(
        &router,
        Method::POST,
        "/inspect?offset=1",
        Body::from(vec![0x41u8, 0xe2]),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let kinds: Vec<_> = rows
        .as_array()
        .unwrap()
        .iter()
        .map(|row| row["kind"].as_str().unwrap().to_string())
        .collect();
    assert!(kinds.contains(&"uint8".to_string()));
    assert!(!kinds.contains(&"utf8-char".to_string()));

    let (status, lines) = send(
        &router,
        Method::POST,
        "/hexdump?width=4",
        Body::from(&b"hi!\nthere"[..]),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(lines.as_array().map(Vec::len), Some(3));
    assert_eq!(lines[0]["hex"], "68 69 21 0a");
    assert_eq!(lines[0]["ascii"], "hi!.");
}
