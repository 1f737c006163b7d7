//! HTTP handlers for upload sessions.
//! Payload bodies are streamed into memory and handed to `SimulatorService`;
//! everything else is JSON.

use crate::{
    errors::AppError,
    models::token::PresignedToken,
    services::{
        byte_source::ByteSource,
        simulator_service::{SessionOptions, SimulatorService, TokenInput},
    },
};
use axum::{
    Json,
    body::Body,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::io;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct VerifyQuery {
    pub expected_etag: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TamperQuery {
    #[serde(default)]
    pub offset: u64,
}

#[derive(Debug, Deserialize)]
pub struct CancelQuery {
    #[serde(default)]
    pub purge: bool,
}

#[derive(Debug, Deserialize)]
pub struct TokenQuery {
    pub ttl: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct ValidateTokenReq {
    pub token: TokenInput,
    pub part_number: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct IssuedToken {
    pub token: PresignedToken,
    pub compact: String,
}

/// `POST /sessions`: body is the payload; query string carries overrides.
pub async fn create_session(
    State(service): State<SimulatorService>,
    Query(options): Query<SessionOptions>,
    body: Body,
) -> Result<impl IntoResponse, AppError> {
    let stream = body
        .into_data_stream()
        .map(|chunk| chunk.map_err(io::Error::other));
    let payload = ByteSource::from_stream(stream)
        .await
        .map_err(|err| AppError::bad_request(format!("reading payload: {}", err)))?;

    let session = service.create_session(payload, options).await?;
    Ok((StatusCode::CREATED, Json(session)))
}

/// `GET /sessions`
pub async fn list_sessions(State(service): State<SimulatorService>) -> impl IntoResponse {
    Json(service.list_sessions().await)
}

/// `GET /sessions/{id}`
pub async fn get_session(
    State(service): State<SimulatorService>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(service.snapshot(id).await?))
}

/// `DELETE /sessions/{id}`: cancel; returns the aborted snapshot.
/// With `?purge=true` the session is also dropped from the registry.
pub async fn cancel_session(
    State(service): State<SimulatorService>,
    Path(id): Path<Uuid>,
    Query(q): Query<CancelQuery>,
) -> Result<impl IntoResponse, AppError> {
    let session = if q.purge {
        service.remove_session(id).await?
    } else {
        service.cancel_session(id).await?
    };
    Ok(Json(session))
}

/// `POST /sessions/{id}/resume`
pub async fn resume_session(
    State(service): State<SimulatorService>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let session = service.resume_session(id).await?;
    Ok((StatusCode::CREATED, Json(session)))
}

/// `GET /sessions/{id}/verify`
pub async fn verify_session(
    State(service): State<SimulatorService>,
    Path(id): Path<Uuid>,
    Query(q): Query<VerifyQuery>,
) -> Result<impl IntoResponse, AppError> {
    let result = service
        .verify_session(id, q.expected_etag.as_deref())
        .await?;
    Ok(Json(result))
}

/// `POST /sessions/{id}/parts/{part_number}/tamper`
pub async fn tamper_part(
    State(service): State<SimulatorService>,
    Path((id, part_number)): Path<(Uuid, u32)>,
    Query(q): Query<TamperQuery>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(service.tamper_part(id, part_number, q.offset).await?))
}

/// `POST /sessions/{id}/parts/{part_number}/token`
pub async fn issue_token(
    State(service): State<SimulatorService>,
    Path((id, part_number)): Path<(Uuid, u32)>,
    Query(q): Query<TokenQuery>,
) -> Result<impl IntoResponse, AppError> {
    let token = service.issue_token(id, part_number, q.ttl).await?;
    Ok(Json(IssuedToken {
        compact: token.to_compact(),
        token,
    }))
}

/// `POST /sessions/{id}/tokens/validate`
pub async fn validate_token(
    State(service): State<SimulatorService>,
    Path(id): Path<Uuid>,
    Json(req): Json<ValidateTokenReq>,
) -> Result<impl IntoResponse, AppError> {
    let result = service
        .validate_token(id, req.token, req.part_number)
        .await?;
    Ok(Json(result))
}
