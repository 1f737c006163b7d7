//! Composite multipart ETag: `hex(md5(raw_d1 || raw_d2 || ...))-<part count>`.

use crate::{
    models::{
        etag::{ETag, PartDigest},
        multipart::UploadSession,
    },
    services::error::{UploadError, UploadResult},
};
use md5::Context;

/// Combine per-part digests, already in ascending part-number order.
///
/// A single part still goes through the composite rule, so its ETag is
/// `hex(md5(d))-1` rather than `hex(d)`.
pub fn compute_etag(ordered_digests: &[PartDigest]) -> ETag {
    let mut context = Context::new();
    for digest in ordered_digests {
        context.consume(digest.as_bytes());
    }
    let part_count = ordered_digests.len() as u32;
    ETag {
        value: format!("{:x}-{}", context.compute(), part_count),
        part_count,
    }
}

/// ETag of a session whose parts are all `Uploaded`.
pub fn compute_session_etag(session: &UploadSession) -> UploadResult<ETag> {
    let incomplete = || UploadError::IncompleteUpload {
        missing: session.missing_parts(),
    };
    if !session.is_fully_uploaded() {
        return Err(incomplete());
    }
    let digests = session
        .parts
        .iter()
        .map(|part| part.digest)
        .collect::<Option<Vec<_>>>()
        .ok_or_else(incomplete)?;
    Ok(compute_etag(&digests))
}
