//! Simulated presigned URLs for part uploads.
//!
//! Signature: HMAC-SHA256(secret, part_number (u32 BE) || issued_at (i64 BE) || expires_at (i64 BE)),
//! timestamps in unix seconds. Compact form: base64url(payload || mac).
//!
//! Validation needs only the secret, never a table of issued tokens. The
//! optional single-use mode is the one place state is kept: a set of
//! consumed signatures.

use crate::{
    models::token::{PresignedToken, TokenRejection, ValidationResult},
    services::error::{UploadError, UploadResult},
};
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;
use std::{collections::HashSet, fmt, str::FromStr, sync::Mutex};
use tracing::debug;

const PAYLOAD_LEN: usize = 4 + 8 + 8; // part_number + issued_at + expires_at
const MAC_LEN: usize = 32; // SHA256
const TOKEN_LEN: usize = PAYLOAD_LEN + MAC_LEN;
const SECRET_LEN: usize = 32;

#[derive(Debug, Clone, Copy, Default)]
pub struct PresignConfig {
    /// Reject a token the second time it validates successfully.
    pub single_use: bool,
}

pub struct PresignedUrlSimulator {
    secret: Vec<u8>,
    config: PresignConfig,
    consumed: Mutex<HashSet<String>>,
}

impl fmt::Debug for PresignedUrlSimulator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PresignedUrlSimulator")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl PresignedUrlSimulator {
    pub fn new(secret: impl Into<Vec<u8>>, config: PresignConfig) -> Self {
        Self {
            secret: secret.into(),
            config,
            consumed: Mutex::new(HashSet::new()),
        }
    }

    /// Simulator with a fresh random session secret.
    pub fn with_random_secret(config: PresignConfig) -> Self {
        let mut secret = vec![0u8; SECRET_LEN];
        rand::thread_rng().fill_bytes(&mut secret);
        Self::new(secret, config)
    }

    pub fn config(&self) -> PresignConfig {
        self.config
    }

    pub fn issue(&self, part_number: u32, ttl_secs: u64, now: DateTime<Utc>) -> PresignedToken {
        let issued_at = truncate_to_seconds(now);
        let ttl = i64::try_from(ttl_secs)
            .ok()
            .and_then(Duration::try_seconds)
            .unwrap_or(Duration::MAX);
        let expires_at = issued_at
            .checked_add_signed(ttl)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        let payload = encode_payload(part_number, issued_at, expires_at);
        let signature = hex::encode(self.mac(&payload).finalize().into_bytes());

        debug!(part_number, %expires_at, "issued presigned token");
        PresignedToken {
            part_number,
            issued_at,
            expires_at,
            signature,
        }
    }

    /// Check expiry and signature.
    pub fn validate(&self, token: &PresignedToken, now: DateTime<Utc>) -> ValidationResult {
        self.check(token, None, now)
    }

    /// Check expiry, signature and that the token was issued for `part_number`.
    pub fn validate_for_part(
        &self,
        token: &PresignedToken,
        part_number: u32,
        now: DateTime<Utc>,
    ) -> ValidationResult {
        self.check(token, Some(part_number), now)
    }

    fn check(
        &self,
        token: &PresignedToken,
        expected_part: Option<u32>,
        now: DateTime<Utc>,
    ) -> ValidationResult {
        if now > token.expires_at {
            return ValidationResult::rejected(TokenRejection::Expired);
        }
        if !self.signature_matches(token) {
            return ValidationResult::rejected(TokenRejection::SignatureMismatch);
        }
        if expected_part.is_some_and(|part| part != token.part_number) {
            return ValidationResult::rejected(TokenRejection::PartMismatch);
        }
        if self.config.single_use {
            let mut consumed = self
                .consumed
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            if !consumed.insert(token.signature.to_ascii_lowercase()) {
                return ValidationResult::rejected(TokenRejection::AlreadyConsumed);
            }
        }
        ValidationResult::accepted()
    }

    fn signature_matches(&self, token: &PresignedToken) -> bool {
        let Ok(tag) = hex::decode(&token.signature) else {
            return false;
        };
        let payload = encode_payload(token.part_number, token.issued_at, token.expires_at);
        self.mac(&payload).verify_slice(&tag).is_ok()
    }

    fn mac(&self, payload: &[u8]) -> Hmac<Sha256> {
        let mut mac =
            Hmac::<Sha256>::new_from_slice(&self.secret).expect("HMAC accepts any key size");
        mac.update(payload);
        mac
    }
}

fn truncate_to_seconds(at: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp(at.timestamp(), 0).unwrap_or(at)
}

fn encode_payload(
    part_number: u32,
    issued_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
) -> [u8; PAYLOAD_LEN] {
    let mut payload = [0u8; PAYLOAD_LEN];
    payload[0..4].copy_from_slice(&part_number.to_be_bytes());
    payload[4..12].copy_from_slice(&issued_at.timestamp().to_be_bytes());
    payload[12..20].copy_from_slice(&expires_at.timestamp().to_be_bytes());
    payload
}

impl PresignedToken {
    /// Compact display form: base64url(payload || mac).
    pub fn to_compact(&self) -> String {
        let mut bytes = Vec::with_capacity(TOKEN_LEN);
        bytes.extend_from_slice(&encode_payload(
            self.part_number,
            self.issued_at,
            self.expires_at,
        ));
        bytes.extend_from_slice(&hex::decode(&self.signature).unwrap_or_default());
        base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
    }

    pub fn from_compact(compact: &str) -> UploadResult<Self> {
        let decoded = base64::engine::general_purpose::URL_SAFE_NO_PAD
            .decode(compact.trim())
            .map_err(|err| UploadError::MalformedToken(err.to_string()))?;
        if decoded.len() != TOKEN_LEN {
            return Err(UploadError::MalformedToken(format!(
                "expected {} bytes, got {}",
                TOKEN_LEN,
                decoded.len()
            )));
        }

        let (payload, tag) = decoded.split_at(PAYLOAD_LEN);
        let mut part_number = [0u8; 4];
        let mut issued = [0u8; 8];
        let mut expires = [0u8; 8];
        part_number.copy_from_slice(&payload[0..4]);
        issued.copy_from_slice(&payload[4..12]);
        expires.copy_from_slice(&payload[12..20]);

        let timestamp = |raw: [u8; 8]| {
            DateTime::from_timestamp(i64::from_be_bytes(raw), 0)
                .ok_or_else(|| UploadError::MalformedToken("timestamp out of range".into()))
        };

        Ok(PresignedToken {
            part_number: u32::from_be_bytes(part_number),
            issued_at: timestamp(issued)?,
            expires_at: timestamp(expires)?,
            signature: hex::encode(tag),
        })
    }
}

impl fmt::Display for PresignedToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_compact())
    }
}

impl FromStr for PresignedToken {
    type Err = UploadError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_compact(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn simulator() -> PresignedUrlSimulator {
        PresignedUrlSimulator::new(b"session-secret".to_vec(), PresignConfig::default())
    }

    fn t0() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    #[test]
    fn fresh_token_is_valid_for_its_part() {
        let presigner = simulator();
        let token = presigner.issue(3, 60, t0());

        assert_eq!(token.expires_at - token.issued_at, Duration::seconds(60));
        assert_eq!(presigner.validate(&token, t0()), ValidationResult::accepted());
        assert_eq!(
            presigner.validate_for_part(&token, 3, t0() + Duration::seconds(60)),
            ValidationResult::accepted()
        );
    }

    #[test]
    fn expired_token_is_rejected_despite_valid_signature() {
        let presigner = simulator();
        let token = presigner.issue(1, 60, t0());

        let result = presigner.validate(&token, t0() + Duration::seconds(61));
        assert_eq!(result, ValidationResult::rejected(TokenRejection::Expired));
    }

    #[test]
    fn tampered_fields_break_the_signature() {
        let presigner = simulator();
        let mut token = presigner.issue(1, 60, t0());
        token.expires_at += Duration::seconds(3600);

        assert_eq!(
            presigner.validate(&token, t0()).reason,
            Some(TokenRejection::SignatureMismatch)
        );
    }

    #[test]
    fn other_secret_cannot_validate() {
        let token = simulator().issue(1, 60, t0());
        let stranger = PresignedUrlSimulator::new(b"other".to_vec(), PresignConfig::default());
        assert_eq!(
            stranger.validate(&token, t0()).reason,
            Some(TokenRejection::SignatureMismatch)
        );
    }

    #[test]
    fn wrong_part_is_rejected() {
        let presigner = simulator();
        let token = presigner.issue(1, 60, t0());
        assert_eq!(
            presigner.validate_for_part(&token, 2, t0()).reason,
            Some(TokenRejection::PartMismatch)
        );
    }

    #[test]
    fn expiry_takes_priority_over_other_reasons() {
        let presigner = simulator();
        let mut token = presigner.issue(1, 10, t0());
        token.signature = "00".repeat(32);

        let result = presigner.validate_for_part(&token, 9, t0() + Duration::seconds(11));
        assert_eq!(result.reason, Some(TokenRejection::Expired));

        let result = presigner.validate_for_part(&token, 9, t0());
        assert_eq!(result.reason, Some(TokenRejection::SignatureMismatch));
    }

    #[test]
    fn single_use_is_opt_in() {
        let reusable = simulator();
        let token = reusable.issue(1, 60, t0());
        assert!(reusable.validate(&token, t0()).valid);
        assert!(reusable.validate(&token, t0()).valid);

        let single_use =
            PresignedUrlSimulator::new(b"session-secret".to_vec(), PresignConfig { single_use: true });
        let token = single_use.issue(1, 60, t0());
        assert!(single_use.validate(&token, t0()).valid);
        assert_eq!(
            single_use.validate(&token, t0()).reason,
            Some(TokenRejection::AlreadyConsumed)
        );
    }

    #[test]
    fn rejected_tokens_are_not_consumed() {
        let presigner =
            PresignedUrlSimulator::new(b"session-secret".to_vec(), PresignConfig { single_use: true });
        let token = presigner.issue(1, 60, t0());

        assert_eq!(
            presigner.validate_for_part(&token, 2, t0()).reason,
            Some(TokenRejection::PartMismatch)
        );
        assert!(presigner.validate_for_part(&token, 1, t0()).valid);
    }

    #[test]
    fn compact_form_round_trips_and_still_validates() {
        let presigner = simulator();
        let token = presigner.issue(42, 300, t0());
        let parsed: PresignedToken = token.to_string().parse().unwrap();

        assert_eq!(parsed, token);
        assert!(presigner.validate_for_part(&parsed, 42, t0()).valid);
    }

    #[test]
    fn malformed_compact_strings_are_rejected() {
        assert!(matches!(
            PresignedToken::from_compact("not base64!"),
            Err(UploadError::MalformedToken(_))
        ));
        assert!(matches!(
            PresignedToken::from_compact("AAAA"),
            Err(UploadError::MalformedToken(_))
        ));
    }
}
