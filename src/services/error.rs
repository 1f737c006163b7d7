//! Error taxonomy shared by every engine component.

use crate::models::{multipart::SessionStatus, token::TokenRejection};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum UploadError {
    #[error("invalid part size policy: {0}")]
    InvalidPolicy(String),
    #[error("transport failure on part {part_number}: {reason}")]
    TransportFailure { part_number: u32, reason: String },
    #[error("hash mismatch on part {part_number}: expected {expected}, received {actual}")]
    HashMismatch {
        part_number: u32,
        expected: String,
        actual: String,
    },
    #[error("presigned token rejected for part {part_number}: {reason}")]
    TokenInvalid {
        part_number: u32,
        reason: TokenRejection,
    },
    #[error("upload incomplete: parts {missing:?} are not uploaded")]
    IncompleteUpload { missing: Vec<u32> },
    #[error("range out of bounds: offset {offset} + width {width} exceeds length {len}")]
    OutOfRange { offset: u64, width: u64, len: u64 },
    #[error("part {part_number} failed after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        part_number: u32,
        attempts: u32,
        last_error: String,
    },
    #[error("session `{session_id}` is {status:?} and accepts no further work")]
    SessionClosed {
        session_id: Uuid,
        status: SessionStatus,
    },
    #[error("session `{0}` was cancelled")]
    Cancelled(Uuid),
    #[error("part {0} is already being uploaded")]
    PartBusy(u32),
    #[error("part {0} does not exist in this session")]
    UnknownPart(u32),
    #[error("malformed presigned token: {0}")]
    MalformedToken(String),
    #[error("session `{0}` not found")]
    SessionNotFound(Uuid),
    #[error("cannot resume session: {0}")]
    ResumeMismatch(String),
    #[error("session `{0}` is already running")]
    AlreadyRunning(Uuid),
    #[error("upload worker failed: {0}")]
    Worker(String),
}

impl UploadError {
    /// Transient per-part failures that the coordinator retries on its own.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            UploadError::TransportFailure { .. } | UploadError::HashMismatch { .. }
        )
    }
}

pub type UploadResult<T> = Result<T, UploadError>;
