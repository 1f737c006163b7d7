use crate::services::error::UploadError;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;

/// Nginx-style "client closed request"; used when a session was cancelled
/// underneath the request.
const CLIENT_CLOSED_REQUEST: u16 = 499;

/// A lightweight wrapper for general errors that keeps the message local.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
}

impl AppError {
    pub fn new(status: StatusCode, msg: impl Into<String>) -> Self {
        Self {
            status,
            message: msg.into(),
        }
    }

    /// Shortcut for a 500 Internal Server Error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, msg)
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, msg)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": self.message,
            "status": self.status.as_u16()
        }));

        (self.status, body).into_response()
    }
}

impl From<UploadError> for AppError {
    fn from(err: UploadError) -> Self {
        let status = match &err {
            UploadError::InvalidPolicy(_)
            | UploadError::OutOfRange { .. }
            | UploadError::MalformedToken(_) => StatusCode::BAD_REQUEST,
            UploadError::SessionNotFound(_) | UploadError::UnknownPart(_) => StatusCode::NOT_FOUND,
            UploadError::PartBusy(_)
            | UploadError::SessionClosed { .. }
            | UploadError::AlreadyRunning(_)
            | UploadError::IncompleteUpload { .. }
            | UploadError::ResumeMismatch(_) => StatusCode::CONFLICT,
            UploadError::TokenInvalid { .. } | UploadError::HashMismatch { .. } => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            UploadError::Cancelled(_) => StatusCode::from_u16(CLIENT_CLOSED_REQUEST)
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            UploadError::TransportFailure { .. }
            | UploadError::RetriesExhausted { .. }
            | UploadError::Worker(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        AppError::new(status, err.to_string())
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::internal(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn upload_errors_map_to_statuses() {
        let cases = [
            (UploadError::InvalidPolicy("zero".into()), 400),
            (UploadError::SessionNotFound(Uuid::nil()), 404),
            (UploadError::PartBusy(1), 409),
            (
                UploadError::IncompleteUpload {
                    missing: vec![1],
                },
                409,
            ),
            (UploadError::Cancelled(Uuid::nil()), 499),
            (UploadError::Worker("panic".into()), 500),
        ];
        for (err, status) in cases {
            assert_eq!(AppError::from(err).status.as_u16(), status);
        }
    }
}
