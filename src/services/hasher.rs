//! Per-part content digests (MD5, as object stores use for part ETags).

use crate::models::etag::PartDigest;
use md5::Context;

pub fn digest(bytes: &[u8]) -> PartDigest {
    PartDigest(md5::compute(bytes).0)
}

/// Digest a sequence of chunks as if they were one contiguous buffer.
pub fn digest_chunks<'a, I>(chunks: I) -> PartDigest
where
    I: IntoIterator<Item = &'a [u8]>,
{
    let mut context = Context::new();
    for chunk in chunks {
        context.consume(chunk);
    }
    PartDigest(context.compute().0)
}
