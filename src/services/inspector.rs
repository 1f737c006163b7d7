//! Typed and hex views over arbitrary byte ranges.
//!
//! Pure and read-only. Every read is bounds-checked: a value of width `w`
//! at `offset` needs `offset + w <= bytes.len()`, otherwise `OutOfRange`.

use crate::{
    models::inspection::{Endianness, HexLine, InspectionRow, InterpretedValue, ValueKind},
    services::error::{UploadError, UploadResult},
};

pub const DEFAULT_DUMP_WIDTH: usize = 16;
const MAX_DUMP_WIDTH: usize = 64;

/// Decode one value of `kind` at `offset`.
pub fn interpret(
    bytes: &[u8],
    offset: usize,
    kind: ValueKind,
    endianness: Endianness,
) -> UploadResult<InterpretedValue> {
    decode(bytes, offset, kind, endianness).map(|(_, value)| value)
}

/// One row per requested kind, with the raw bytes each one consumed.
pub fn inspect(
    bytes: &[u8],
    offset: usize,
    kinds: &[ValueKind],
    endianness: Endianness,
) -> UploadResult<Vec<InspectionRow>> {
    kinds
        .iter()
        .map(|&kind| row(bytes, offset, kind, endianness))
        .collect()
}

/// Every kind that fits at `offset`; wider kinds are left out.
///
/// A UTF-8 lead byte whose sequence runs past the end is left out too.
pub fn inspect_all(
    bytes: &[u8],
    offset: usize,
    endianness: Endianness,
) -> UploadResult<Vec<InspectionRow>> {
    ensure_range(bytes, offset, 1)?;
    ValueKind::ALL
        .into_iter()
        .filter(|kind| offset + kind.width() <= bytes.len())
        .filter_map(|kind| match row(bytes, offset, kind, endianness) {
            Err(UploadError::OutOfRange { .. }) => None,
            other => Some(other),
        })
        .collect()
}

fn row(
    bytes: &[u8],
    offset: usize,
    kind: ValueKind,
    endianness: Endianness,
) -> UploadResult<InspectionRow> {
    let (width, value) = decode(bytes, offset, kind, endianness)?;
    Ok(InspectionRow {
        offset,
        kind,
        raw_hex: hex::encode(&bytes[offset..offset + width]),
        value,
    })
}

/// Classic offset / hex / ASCII dump of `len` bytes starting at `offset`.
///
/// `width` is the number of bytes per line; 0 selects the default of 16.
pub fn hex_dump(
    bytes: &[u8],
    offset: usize,
    len: usize,
    width: usize,
) -> UploadResult<Vec<HexLine>> {
    ensure_range(bytes, offset, len)?;
    let width = match width {
        0 => DEFAULT_DUMP_WIDTH,
        w => w.min(MAX_DUMP_WIDTH),
    };

    Ok(bytes[offset..offset + len]
        .chunks(width)
        .enumerate()
        .map(|(line, chunk)| HexLine {
            offset: offset + line * width,
            hex: chunk
                .iter()
                .map(|b| format!("{:02x}", b))
                .collect::<Vec<_>>()
                .join(" "),
            ascii: chunk.iter().map(|&b| printable(b)).collect(),
        })
        .collect())
}

fn decode(
    bytes: &[u8],
    offset: usize,
    kind: ValueKind,
    endianness: Endianness,
) -> UploadResult<(usize, InterpretedValue)> {
    macro_rules! number {
        ($ty:ty, $variant:ident, $wide:ty) => {{
            let raw = take::<{ size_of::<$ty>() }>(bytes, offset)?;
            let value = match endianness {
                Endianness::Little => <$ty>::from_le_bytes(raw),
                Endianness::Big => <$ty>::from_be_bytes(raw),
            };
            (size_of::<$ty>(), InterpretedValue::$variant(<$wide>::from(value)))
        }};
    }

    let decoded = match kind {
        ValueKind::Uint8 => number!(u8, Unsigned, u64),
        ValueKind::Int8 => number!(i8, Signed, i64),
        ValueKind::Uint16 => number!(u16, Unsigned, u64),
        ValueKind::Int16 => number!(i16, Signed, i64),
        ValueKind::Uint32 => number!(u32, Unsigned, u64),
        ValueKind::Int32 => number!(i32, Signed, i64),
        ValueKind::Uint64 => number!(u64, Unsigned, u64),
        ValueKind::Int64 => number!(i64, Signed, i64),
        ValueKind::Float32 => number!(f32, Float, f64),
        ValueKind::Float64 => number!(f64, Float, f64),
        ValueKind::Utf8Char => utf8_char(bytes, offset)?,
        ValueKind::Ascii => {
            let [b] = take::<1>(bytes, offset)?;
            (1, InterpretedValue::Text(printable(b).to_string()))
        }
    };
    Ok(decoded)
}

/// Width comes from the lead byte. Invalid or non-lead bytes decode to
/// U+FFFD and consume one byte.
fn utf8_char(bytes: &[u8], offset: usize) -> UploadResult<(usize, InterpretedValue)> {
    let [lead] = take::<1>(bytes, offset)?;
    let width = match lead {
        0x00..=0x7f => 1,
        0xc2..=0xdf => 2,
        0xe0..=0xef => 3,
        0xf0..=0xf4 => 4,
        _ => return Ok((1, InterpretedValue::Text(char::REPLACEMENT_CHARACTER.to_string()))),
    };
    ensure_range(bytes, offset, width)?;

    Ok(match std::str::from_utf8(&bytes[offset..offset + width]) {
        Ok(text) => (width, InterpretedValue::Text(text.to_string())),
        Err(_) => (1, InterpretedValue::Text(char::REPLACEMENT_CHARACTER.to_string())),
    })
}

fn take<const N: usize>(bytes: &[u8], offset: usize) -> UploadResult<[u8; N]> {
    ensure_range(bytes, offset, N)?;
    bytes[offset..offset + N]
        .try_into()
        .map_err(|_| out_of_range(bytes, offset, N))
}

fn ensure_range(bytes: &[u8], offset: usize, width: usize) -> UploadResult<()> {
    match offset.checked_add(width) {
        Some(end) if end <= bytes.len() => Ok(()),
        _ => Err(out_of_range(bytes, offset, width)),
    }
}

fn out_of_range(bytes: &[u8], offset: usize, width: usize) -> UploadError {
    UploadError::OutOfRange {
        offset: offset as u64,
        width: width as u64,
        len: bytes.len() as u64,
    }
}

fn printable(b: u8) -> char {
    if b.is_ascii_graphic() || b == b' ' {
        b as char
    } else {
        '.'
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LE: Endianness = Endianness::Little;
    const BE: Endianness = Endianness::Big;

    #[test]
    fn integers_respect_endianness() {
        let bytes = [0x01, 0x02, 0x03, 0x04];

        assert_eq!(
            interpret(&bytes, 0, ValueKind::Uint16, LE).unwrap(),
            InterpretedValue::Unsigned(0x0201)
        );
        assert_eq!(
            interpret(&bytes, 0, ValueKind::Uint16, BE).unwrap(),
            InterpretedValue::Unsigned(0x0102)
        );
        assert_eq!(
            interpret(&bytes, 0, ValueKind::Uint32, BE).unwrap(),
            InterpretedValue::Unsigned(0x0102_0304)
        );
    }

    #[test]
    fn signed_values_are_sign_extended() {
        let bytes = [0xff, 0xfe];
        assert_eq!(
            interpret(&bytes, 0, ValueKind::Int8, LE).unwrap(),
            InterpretedValue::Signed(-1)
        );
        assert_eq!(
            interpret(&bytes, 0, ValueKind::Int16, LE).unwrap(),
            InterpretedValue::Signed(-257)
        );
    }

    #[test]
    fn floats_decode() {
        let bytes = 1.5f32.to_be_bytes();
        assert_eq!(
            interpret(&bytes, 0, ValueKind::Float32, BE).unwrap(),
            InterpretedValue::Float(1.5)
        );

        let bytes = (-0.25f64).to_le_bytes();
        assert_eq!(
            interpret(&bytes, 0, ValueKind::Float64, LE).unwrap(),
            InterpretedValue::Float(-0.25)
        );
    }

    #[test]
    fn reading_past_the_end_is_out_of_range() {
        let bytes = [0u8; 6];
        assert_eq!(
            interpret(&bytes, 3, ValueKind::Uint32, LE),
            Err(UploadError::OutOfRange {
                offset: 3,
                width: 4,
                len: 6
            })
        );
        assert!(interpret(&bytes, 2, ValueKind::Uint32, LE).is_ok());
        assert!(interpret(&bytes, usize::MAX, ValueKind::Uint8, LE).is_err());
    }

    #[test]
    fn utf8_width_follows_the_lead_byte() {
        let bytes = "aé€😀".as_bytes();
        let text = |offset| interpret(bytes, offset, ValueKind::Utf8Char, LE).unwrap();

        assert_eq!(text(0), InterpretedValue::Text("a".into()));
        assert_eq!(text(1), InterpretedValue::Text("é".into()));
        assert_eq!(text(3), InterpretedValue::Text("€".into()));
        assert_eq!(text(6), InterpretedValue::Text("😀".into()));

        let rows = inspect(bytes, 6, &[ValueKind::Utf8Char], LE).unwrap();
        assert_eq!(rows[0].raw_hex, "f09f9880");
    }

    #[test]
    fn invalid_utf8_decodes_to_replacement() {
        let bytes = [0x80, 0xe2, 0x28, 0xa1];
        assert_eq!(
            interpret(&bytes, 0, ValueKind::Utf8Char, LE).unwrap(),
            InterpretedValue::Text("\u{fffd}".into())
        );
        assert_eq!(
            interpret(&bytes, 1, ValueKind::Utf8Char, LE).unwrap(),
            InterpretedValue::Text("\u{fffd}".into())
        );
        assert!(interpret(&[0xf0, 0x9f], 0, ValueKind::Utf8Char, LE).is_err());
    }

    #[test]
    fn ascii_masks_non_printables() {
        assert_eq!(
            interpret(b"A\n", 0, ValueKind::Ascii, LE).unwrap(),
            InterpretedValue::Text("A".into())
        );
        assert_eq!(
            interpret(b"A\n", 1, ValueKind::Ascii, LE).unwrap(),
            InterpretedValue::Text(".".into())
        );
    }

    #[test]
    fn inspect_all_skips_kinds_that_do_not_fit() {
        let bytes = [0x10, 0x20, 0x30];
        let rows = inspect_all(&bytes, 1, LE).unwrap();
        let kinds: Vec<_> = rows.iter().map(|r| r.kind).collect();

        assert!(kinds.contains(&ValueKind::Uint16));
        assert!(!kinds.contains(&ValueKind::Uint32));
        let row = rows.iter().find(|r| r.kind == ValueKind::Uint16).unwrap();
        assert_eq!(row.raw_hex, "2030");
        assert_eq!(row.value, InterpretedValue::Unsigned(0x3020));

        assert!(inspect_all(&bytes, 3, LE).is_err());
    }

    #[test]
    fn inspect_all_drops_truncated_utf8_sequence() {
        let bytes = [0x41, 0xe2];
        let rows = inspect_all(&bytes, 1, LE).unwrap();
        let kinds: Vec<_> = rows.iter().map(|r| r.kind).collect();

        assert!(!kinds.contains(&ValueKind::Utf8Char));
        assert!(kinds.contains(&ValueKind::Uint8));
        assert!(kinds.contains(&ValueKind::Int8));
        assert!(kinds.contains(&ValueKind::Ascii));
        let byte = rows.iter().find(|r| r.kind == ValueKind::Uint8).unwrap();
        assert_eq!(byte.raw_hex, "e2");

        assert!(inspect(&bytes, 1, &[ValueKind::Utf8Char], LE).is_err());
    }

    #[test]
    fn hex_dump_lines() {
        let bytes = b"Hello, multipart\x00\x01world";
        let lines = hex_dump(bytes, 0, bytes.len(), 8).unwrap();

        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0].offset, 0);
        assert_eq!(lines[0].hex, "48 65 6c 6c 6f 2c 20 6d");
        assert_eq!(lines[0].ascii, "Hello, m");
        assert_eq!(lines[2].offset, 16);
        assert_eq!(lines[2].ascii, "..world");
    }

    #[test]
    fn hex_dump_checks_its_window() {
        let bytes = [0u8; 10];
        assert!(hex_dump(&bytes, 4, 7, 16).is_err());

        let lines = hex_dump(&bytes, 4, 6, 0).unwrap();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].offset, 4);
    }
}
