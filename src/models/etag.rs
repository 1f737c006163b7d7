//! Digest and composite ETag values.

use serde::{Serialize, Serializer};
use std::fmt;

/// MD5 digest of a single part, kept in raw binary form.
///
/// The raw bytes (not the hex text) are what the composite ETag rule
/// concatenates, so the newtype only renders hex at the display boundary.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PartDigest(pub [u8; 16]);

impl PartDigest {
    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for PartDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for PartDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PartDigest({})", self.to_hex())
    }
}

impl Serialize for PartDigest {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

/// Identifier of a completed multipart object: `hex(md5(d1 || d2 || ...))-N`.
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct ETag {
    /// Hex digest followed by `-` and the decimal part count.
    pub value: String,

    /// Number of parts the digest was computed over.
    pub part_count: u32,
}

impl ETag {
    /// Compare against a caller-supplied ETag, with or without header quotes.
    pub fn matches(&self, candidate: &str) -> bool {
        candidate.trim().trim_matches('"') == self.value
    }
}

impl fmt::Display for ETag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{}\"", self.value)
    }
}
