use serde::Serialize;
use std::collections::BTreeSet;

/// Integrity report for one session.
#[derive(Serialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct VerificationResult {
    /// True when nothing is mismatched or missing and any expected ETag matched.
    pub ok: bool,

    /// Parts whose stored bytes no longer hash to the recorded digest.
    pub mismatched_parts: BTreeSet<u32>,

    /// Parts that never reached `Uploaded`.
    pub missing_parts: BTreeSet<u32>,

    /// ETag recomputed from the stored bytes, when every part is present.
    pub computed_etag: Option<String>,

    /// Outcome of the expected-ETag comparison, when one was supplied.
    pub etag_matches: Option<bool>,
}
