//! Health & readiness handlers.
//!
//! - GET /healthz  -> simple liveness ("ok")
//! - GET /readyz   -> readiness: session registry reachable, digest self-test

use crate::services::{hasher, simulator_service::SimulatorService};
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use std::{collections::HashMap, time::Duration};

/// md5 of the empty input.
const EMPTY_DIGEST: &str = "d41d8cd98f00b204e9800998ecf8427e";

/// `GET /healthz`
///
/// Always 200 with a tiny JSON body. Performs no work.
pub async fn healthz() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "ok".into(),
        }),
    )
}

/// `GET /readyz`
///
/// 200 when every check passes, 503 otherwise.
pub async fn readyz(State(service): State<SimulatorService>) -> impl IntoResponse {
    let registry_check =
        match tokio::time::timeout(Duration::from_secs(1), service.list_sessions()).await {
            Ok(sessions) => CheckStatus {
                ok: true,
                error: None,
                sessions: Some(sessions.len()),
            },
            Err(_) => CheckStatus {
                ok: false,
                error: Some("session registry lock timed out".into()),
                sessions: None,
            },
        };

    let actual = hasher::digest(b"").to_hex();
    let digest_check = CheckStatus {
        ok: actual == EMPTY_DIGEST,
        error: (actual != EMPTY_DIGEST).then(|| format!("unexpected digest {}", actual)),
        sessions: None,
    };

    let overall_ok = registry_check.ok && digest_check.ok;
    let mut checks = HashMap::new();
    checks.insert("registry", registry_check);
    checks.insert("digest", digest_check);

    let body = ReadyResponse {
        status: if overall_ok { "ok" } else { "error" }.into(),
        checks,
    };
    let status = if overall_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(body))
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
}

#[derive(Serialize)]
struct ReadyResponse {
    status: String,
    checks: HashMap<&'static str, CheckStatus>,
}

#[derive(Serialize)]
struct CheckStatus {
    ok: bool,
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    sessions: Option<usize>,
}
