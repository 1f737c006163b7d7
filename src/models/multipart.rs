//! Represents multipart upload sessions and parts.

use crate::models::etag::{ETag, PartDigest};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const MEBI_BYTE: u64 = 1024 * 1024;

/// Smallest part size accepted by real object stores (except for the last part).
pub const MIN_PART_SIZE: u64 = 5 * MEBI_BYTE;

/// Part-count ceiling of real object stores.
pub const MAX_PARTS: u32 = 10_000;

/// How a payload is split into parts.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct PartSizePolicy {
    /// Size of every part except possibly the last one.
    pub fixed_part_size: u64,

    /// Floor for `fixed_part_size`.
    pub min_part_size: u64,

    /// Maximum number of parts a payload may be split into.
    pub max_parts: u32,
}

impl Default for PartSizePolicy {
    fn default() -> Self {
        Self {
            fixed_part_size: MIN_PART_SIZE,
            min_part_size: MIN_PART_SIZE,
            max_parts: MAX_PARTS,
        }
    }
}

impl PartSizePolicy {
    /// Fixed part size with no minimum floor, for small demo payloads.
    pub fn fixed(part_size: u64) -> Self {
        Self {
            fixed_part_size: part_size,
            min_part_size: 1,
            max_parts: MAX_PARTS,
        }
    }

    pub fn with_max_parts(mut self, max_parts: u32) -> Self {
        self.max_parts = max_parts;
        self
    }

    pub fn with_min_part_size(mut self, min_part_size: u64) -> Self {
        self.min_part_size = min_part_size;
        self
    }

    /// Grow the part size until `payload_len` fits within `max_parts`.
    ///
    /// Grown sizes are rounded up to a whole MiB. A policy that already fits
    /// is returned unchanged.
    pub fn fit_to(self, payload_len: u64) -> Self {
        let max_parts = u64::from(self.max_parts.max(1));
        let mut part_size = self.fixed_part_size.max(self.min_part_size).max(1);
        if payload_len.div_ceil(part_size) <= max_parts {
            return Self {
                fixed_part_size: part_size,
                ..self
            };
        }

        part_size = payload_len.div_ceil(max_parts);
        part_size = part_size.div_ceil(MEBI_BYTE) * MEBI_BYTE;
        Self {
            fixed_part_size: part_size,
            ..self
        }
    }
}

/// Byte range of one part. Part numbers start at 1.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct PartSpec {
    pub part_number: u32,
    pub offset: u64,
    pub length: u64,
}

impl PartSpec {
    /// Exclusive end offset.
    pub fn end(&self) -> u64 {
        self.offset + self.length
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PartStatus {
    Pending,
    Uploading,
    Uploaded,
    Failed,
}

/// Upload progress of a single part.
#[derive(Serialize, Clone, Debug)]
pub struct PartState {
    #[serde(flatten)]
    pub spec: PartSpec,

    pub status: PartStatus,

    /// Zero-indexed attempt counter; incremented on every `Failed -> Pending` retry.
    pub attempt: u32,

    /// Digest recorded when the part reached `Uploaded`.
    pub digest: Option<PartDigest>,

    /// Bytes received by the simulated store on the latest attempt.
    pub received_bytes: u64,

    /// Buffer the simulated store holds for this part.
    #[serde(skip)]
    pub received: Option<Bytes>,

    pub last_error: Option<String>,
}

impl PartState {
    pub fn new(spec: PartSpec) -> Self {
        Self {
            spec,
            status: PartStatus::Pending,
            attempt: 0,
            digest: None,
            received_bytes: 0,
            received: None,
            last_error: None,
        }
    }

    pub fn part_number(&self) -> u32 {
        self.spec.part_number
    }

    pub fn is_uploaded(&self) -> bool {
        self.status == PartStatus::Uploaded
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Initiated,
    InProgress,
    Completed,
    Aborted,
}

impl SessionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionStatus::Completed | SessionStatus::Aborted)
    }
}

/// A multipart upload session: one payload, all of its parts.
///
/// Parts live in an arena indexed by `part_number - 1`.
#[derive(Serialize, Clone, Debug)]
pub struct UploadSession {
    pub session_id: Uuid,

    pub status: SessionStatus,

    pub created_at: DateTime<Utc>,

    pub policy: PartSizePolicy,

    pub payload_len: u64,

    pub parts: Vec<PartState>,

    /// Set once every part is uploaded and the session completed.
    pub etag: Option<ETag>,

    /// Session whose uploaded parts seeded this one.
    pub resumed_from: Option<Uuid>,
}

impl UploadSession {
    pub fn new(policy: PartSizePolicy, payload_len: u64, specs: Vec<PartSpec>) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            status: SessionStatus::Initiated,
            created_at: Utc::now(),
            policy,
            payload_len,
            parts: specs.into_iter().map(PartState::new).collect(),
            etag: None,
            resumed_from: None,
        }
    }

    pub fn part(&self, part_number: u32) -> Option<&PartState> {
        let index = usize::try_from(part_number).ok()?.checked_sub(1)?;
        self.parts.get(index)
    }

    pub fn part_mut(&mut self, part_number: u32) -> Option<&mut PartState> {
        let index = usize::try_from(part_number).ok()?.checked_sub(1)?;
        self.parts.get_mut(index)
    }

    pub fn part_count(&self) -> u32 {
        self.parts.len() as u32
    }

    pub fn uploaded_count(&self) -> usize {
        self.parts.iter().filter(|p| p.is_uploaded()).count()
    }

    /// Part numbers that have not reached `Uploaded`, ascending.
    pub fn missing_parts(&self) -> Vec<u32> {
        self.parts
            .iter()
            .filter(|p| !p.is_uploaded())
            .map(PartState::part_number)
            .collect()
    }

    pub fn is_fully_uploaded(&self) -> bool {
        self.parts.iter().all(PartState::is_uploaded)
    }

    /// Replace the buffer the simulated store holds for a part.
    ///
    /// The recorded digest is left untouched, so verification reports the
    /// part as mismatched unless `bytes` hashes to the same digest.
    pub fn overwrite_received(&mut self, part_number: u32, bytes: Bytes) -> bool {
        match self.part_mut(part_number) {
            Some(part) if part.received.is_some() => {
                part.received_bytes = bytes.len() as u64;
                part.received = Some(bytes);
                true
            }
            _ => false,
        }
    }
}
