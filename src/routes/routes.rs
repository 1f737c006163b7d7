//! Defines routes for the multipart upload simulator.
//!
//! ## Structure
//! - **Health**
//!   - `GET    /healthz`, `GET /readyz`
//!
//! - **Sessions**
//!   - `POST   /sessions`: body is the payload, query carries overrides
//!   - `GET    /sessions`: list snapshots
//!   - `GET    /sessions/{id}`: snapshot
//!   - `DELETE /sessions/{id}`: cancel
//!   - `POST   /sessions/{id}/resume`: new session reusing uploaded parts
//!   - `GET    /sessions/{id}/verify`: integrity check
//!   - `POST   /sessions/{id}/parts/{part_number}/tamper`: flip a stored byte
//!   - `POST   /sessions/{id}/parts/{part_number}/token`: issue a presigned token
//!   - `POST   /sessions/{id}/tokens/validate`: validate a token
//!
//! - **Inspection**
//!   - `POST   /inspect`, `POST /hexdump`: body is the data to inspect

use crate::{
    handlers::{
        health_handlers::{healthz, readyz},
        inspect_handlers::{hex_dump, inspect},
        session_handlers::{
            cancel_session, create_session, get_session, issue_token, list_sessions,
            resume_session, tamper_part, validate_token, verify_session,
        },
    },
    services::simulator_service::SimulatorService,
};
use axum::{
    Router,
    routing::{get, post},
};

/// Build the router. State (`SimulatorService`) is supplied by the caller.
pub fn routes() -> Router<SimulatorService> {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/sessions", post(create_session).get(list_sessions))
        .route("/sessions/{id}", get(get_session).delete(cancel_session))
        .route("/sessions/{id}/resume", post(resume_session))
        .route("/sessions/{id}/verify", get(verify_session))
        .route(
            "/sessions/{id}/parts/{part_number}/tamper",
            post(tamper_part),
        )
        .route("/sessions/{id}/parts/{part_number}/token", post(issue_token))
        .route("/sessions/{id}/tokens/validate", post(validate_token))
        .route("/inspect", post(inspect))
        .route("/hexdump", post(hex_dump))
}

/// Router with its state attached, ready to serve.
pub fn app(service: SimulatorService) -> Router {
    routes().with_state(service)
}
