//! Immutable payload with random-access ranges.

use crate::{
    models::multipart::PartSpec,
    services::error::{UploadError, UploadResult},
};
use bytes::{Bytes, BytesMut};
use futures::{Stream, StreamExt, pin_mut};
use std::io;

/// The payload being uploaded. Cloning is cheap and shares the buffer.
#[derive(Clone, Debug, Default)]
pub struct ByteSource {
    data: Bytes,
}

impl ByteSource {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self { data: data.into() }
    }

    /// Drain a streamed body into memory.
    pub async fn from_stream<S>(stream: S) -> io::Result<Self>
    where
        S: Stream<Item = io::Result<Bytes>>,
    {
        let mut buffer = BytesMut::new();
        pin_mut!(stream);
        while let Some(chunk) = stream.next().await {
            buffer.extend_from_slice(&chunk?);
        }
        Ok(Self {
            data: buffer.freeze(),
        })
    }

    pub fn len(&self) -> u64 {
        self.data.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_bytes(&self) -> &Bytes {
        &self.data
    }

    /// Zero-copy view of `len` bytes starting at `offset`.
    pub fn slice(&self, offset: u64, len: u64) -> UploadResult<Bytes> {
        let total = self.len();
        let end = offset
            .checked_add(len)
            .filter(|end| *end <= total)
            .ok_or(UploadError::OutOfRange {
                offset,
                width: len,
                len: total,
            })?;
        Ok(self.data.slice(offset as usize..end as usize))
    }

    pub fn part(&self, spec: &PartSpec) -> UploadResult<Bytes> {
        self.slice(spec.offset, spec.length)
    }
}

impl From<Vec<u8>> for ByteSource {
    fn from(value: Vec<u8>) -> Self {
        Self::new(value)
    }
}

impl From<&'static [u8]> for ByteSource {
    fn from(value: &'static [u8]) -> Self {
        Self::new(Bytes::from_static(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    #[test]
    fn slices_within_bounds() {
        let source = ByteSource::from(b"hello world".to_vec());
        assert_eq!(source.len(), 11);
        assert_eq!(source.slice(6, 5).unwrap(), Bytes::from_static(b"world"));
        assert_eq!(source.slice(11, 0).unwrap(), Bytes::new());
    }

    #[test]
    fn rejects_ranges_past_the_end() {
        let source = ByteSource::from(b"abc".to_vec());
        let err = source.slice(2, 2).unwrap_err();
        assert_eq!(
            err,
            UploadError::OutOfRange {
                offset: 2,
                width: 2,
                len: 3
            }
        );
        assert!(source.slice(u64::MAX, 1).is_err());
    }

    #[tokio::test]
    async fn collects_streamed_chunks_in_order() {
        let chunks = vec![
            Ok(Bytes::from_static(b"multi")),
            Ok(Bytes::from_static(b"part")),
        ];
        let source = ByteSource::from_stream(stream::iter(chunks)).await.unwrap();
        assert_eq!(source.as_bytes(), &Bytes::from_static(b"multipart"));
    }

    #[tokio::test]
    async fn stream_errors_are_propagated() {
        let chunks = vec![
            Ok(Bytes::from_static(b"ok")),
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "gone")),
        ];
        let err = ByteSource::from_stream(stream::iter(chunks))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    }
}
