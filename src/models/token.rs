//! Presigned part-upload tokens and their validation outcomes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Time-bounded credential authorizing the upload of one part.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct PresignedToken {
    pub part_number: u32,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    /// Hex-encoded HMAC-SHA256 over the other three fields.
    pub signature: String,
}

/// Why a token was refused, in the order the checks are applied.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TokenRejection {
    Expired,
    SignatureMismatch,
    PartMismatch,
    AlreadyConsumed,
}

impl fmt::Display for TokenRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            TokenRejection::Expired => "token expired",
            TokenRejection::SignatureMismatch => "signature mismatch",
            TokenRejection::PartMismatch => "token issued for another part",
            TokenRejection::AlreadyConsumed => "token already consumed",
        };
        f.write_str(text)
    }
}

#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct ValidationResult {
    pub valid: bool,
    pub reason: Option<TokenRejection>,
}

impl ValidationResult {
    pub fn accepted() -> Self {
        Self {
            valid: true,
            reason: None,
        }
    }

    pub fn rejected(reason: TokenRejection) -> Self {
        Self {
            valid: false,
            reason: Some(reason),
        }
    }
}
