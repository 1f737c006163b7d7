//! Splits a payload length into ordered, contiguous parts.

use crate::{
    models::multipart::{PartSizePolicy, PartSpec},
    services::error::{UploadError, UploadResult},
};

/// Partition `payload_len` bytes into fixed-size parts.
///
/// The last part carries the remainder and is never empty; a zero-length
/// payload yields no parts at all.
pub fn partition(payload_len: u64, policy: &PartSizePolicy) -> UploadResult<Vec<PartSpec>> {
    let part_size = policy.fixed_part_size;
    if part_size == 0 {
        return Err(UploadError::InvalidPolicy(
            "fixed part size must be greater than zero".into(),
        ));
    }
    if part_size < policy.min_part_size {
        return Err(UploadError::InvalidPolicy(format!(
            "fixed part size {} is below the minimum of {}",
            part_size, policy.min_part_size
        )));
    }

    let count = payload_len.div_ceil(part_size);
    if count > u64::from(policy.max_parts) {
        return Err(UploadError::InvalidPolicy(format!(
            "{} bytes at {} bytes per part needs {} parts, above the limit of {}; choose a larger part size",
            payload_len, part_size, count, policy.max_parts
        )));
    }

    let mut parts = Vec::with_capacity(count as usize);
    let mut offset = 0;
    let mut part_number = 1;
    while offset < payload_len {
        let length = part_size.min(payload_len - offset);
        parts.push(PartSpec {
            part_number,
            offset,
            length,
        });
        offset += length;
        part_number += 1;
    }
    Ok(parts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::multipart::MEBI_BYTE;

    fn assert_contiguous(parts: &[PartSpec], payload_len: u64) {
        let mut expected_offset = 0;
        for (index, part) in parts.iter().enumerate() {
            assert_eq!(part.part_number as usize, index + 1);
            assert_eq!(part.offset, expected_offset);
            assert!(part.length > 0);
            expected_offset = part.end();
        }
        assert_eq!(expected_offset, payload_len);
        assert_eq!(parts.iter().map(|p| p.length).sum::<u64>(), payload_len);
    }

    #[test]
    fn empty_payload_has_no_parts() {
        let parts = partition(0, &PartSizePolicy::fixed(8)).unwrap();
        assert!(parts.is_empty());
    }

    #[test]
    fn remainder_lands_in_last_part() {
        let parts = partition(10, &PartSizePolicy::fixed(4)).unwrap();
        assert_eq!(
            parts.iter().map(|p| p.length).collect::<Vec<_>>(),
            vec![4, 4, 2]
        );
        assert_contiguous(&parts, 10);
    }

    #[test]
    fn exact_multiple_has_no_empty_trailing_part() {
        let parts = partition(10 * MEBI_BYTE, &PartSizePolicy::default()).unwrap();
        assert_eq!(
            parts.iter().map(|p| p.length).collect::<Vec<_>>(),
            vec![5_242_880, 5_242_880]
        );
    }

    #[test]
    fn lengths_sum_for_many_sizes() {
        for payload_len in 0..200u64 {
            for part_size in 1..12u64 {
                let parts = partition(payload_len, &PartSizePolicy::fixed(part_size)).unwrap();
                assert_contiguous(&parts, payload_len);
            }
        }
    }

    #[test]
    fn zero_part_size_is_rejected() {
        let err = partition(10, &PartSizePolicy::fixed(0)).unwrap_err();
        assert!(matches!(err, UploadError::InvalidPolicy(_)));
    }

    #[test]
    fn part_size_below_minimum_is_rejected() {
        let policy = PartSizePolicy::fixed(MEBI_BYTE).with_min_part_size(5 * MEBI_BYTE);
        let err = partition(10, &policy).unwrap_err();
        assert!(matches!(err, UploadError::InvalidPolicy(_)));
    }

    #[test]
    fn too_many_parts_is_rejected() {
        let policy = PartSizePolicy::fixed(4).with_max_parts(2);
        let err = partition(9, &policy).unwrap_err();
        assert!(matches!(err, UploadError::InvalidPolicy(_)));
        assert!(partition(8, &policy).is_ok());
    }
}
