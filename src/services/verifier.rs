//! Read-only integrity check over a session's stored part buffers.

use crate::{
    models::{multipart::UploadSession, verification::VerificationResult},
    services::{etag_aggregator::compute_etag, hasher::digest},
};
use tracing::debug;

/// Re-hash what the store actually holds and compare it with what was recorded.
///
/// Parts that never reached `Uploaded` are reported as missing, separately
/// from parts whose bytes changed. When `expected_etag` is given, the ETag
/// is recomputed from the re-hashed bytes and compared as well.
pub fn verify(session: &UploadSession, expected_etag: Option<&str>) -> VerificationResult {
    let mut result = VerificationResult::default();
    let mut recomputed = Vec::with_capacity(session.parts.len());

    for part in &session.parts {
        let part_number = part.part_number();
        let (Some(recorded), Some(received)) = (part.digest, part.received.as_ref()) else {
            result.missing_parts.insert(part_number);
            continue;
        };
        if !part.is_uploaded() {
            result.missing_parts.insert(part_number);
            continue;
        }

        let actual = digest(received);
        if actual != recorded {
            debug!(
                session_id = %session.session_id,
                part_number,
                recorded = %recorded,
                actual = %actual,
                "stored part no longer matches its digest"
            );
            result.mismatched_parts.insert(part_number);
        }
        recomputed.push(actual);
    }

    if result.missing_parts.is_empty() {
        result.computed_etag = Some(compute_etag(&recomputed).value);
    }

    if let Some(expected) = expected_etag {
        let expected = expected.trim().trim_matches('"');
        result.etag_matches = Some(result.computed_etag.as_deref() == Some(expected));
    }

    result.ok = result.mismatched_parts.is_empty()
        && result.missing_parts.is_empty()
        && result.etag_matches.unwrap_or(true);
    result
}
