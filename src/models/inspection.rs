//! Typed views over raw bytes for the inspector display.

use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum ValueKind {
    Uint8,
    Int8,
    Uint16,
    Int16,
    Uint32,
    Int32,
    Uint64,
    Int64,
    Float32,
    Float64,
    Utf8Char,
    Ascii,
}

impl ValueKind {
    pub const ALL: [ValueKind; 12] = [
        ValueKind::Uint8,
        ValueKind::Int8,
        ValueKind::Uint16,
        ValueKind::Int16,
        ValueKind::Uint32,
        ValueKind::Int32,
        ValueKind::Uint64,
        ValueKind::Int64,
        ValueKind::Float32,
        ValueKind::Float64,
        ValueKind::Utf8Char,
        ValueKind::Ascii,
    ];

    /// Fixed width in bytes. `Utf8Char` reports its minimum; the real width
    /// depends on the lead byte.
    pub fn width(self) -> usize {
        match self {
            ValueKind::Uint8 | ValueKind::Int8 | ValueKind::Utf8Char | ValueKind::Ascii => 1,
            ValueKind::Uint16 | ValueKind::Int16 => 2,
            ValueKind::Uint32 | ValueKind::Int32 | ValueKind::Float32 => 4,
            ValueKind::Uint64 | ValueKind::Int64 | ValueKind::Float64 => 8,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ValueKind::Uint8 => "uint8",
            ValueKind::Int8 => "int8",
            ValueKind::Uint16 => "uint16",
            ValueKind::Int16 => "int16",
            ValueKind::Uint32 => "uint32",
            ValueKind::Int32 => "int32",
            ValueKind::Uint64 => "uint64",
            ValueKind::Int64 => "int64",
            ValueKind::Float32 => "float32",
            ValueKind::Float64 => "float64",
            ValueKind::Utf8Char => "utf8-char",
            ValueKind::Ascii => "ascii",
        }
    }
}

impl FromStr for ValueKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        ValueKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == normalized)
            .ok_or_else(|| format!("unknown value kind `{}`", s))
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Endianness {
    #[default]
    Little,
    Big,
}

impl FromStr for Endianness {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "little" | "le" => Ok(Endianness::Little),
            "big" | "be" => Ok(Endianness::Big),
            other => Err(format!("unknown endianness `{}`", other)),
        }
    }
}

#[derive(Serialize, Clone, Debug, PartialEq)]
#[serde(untagged)]
pub enum InterpretedValue {
    Unsigned(u64),
    Signed(i64),
    Float(f64),
    Text(String),
}

impl fmt::Display for InterpretedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InterpretedValue::Unsigned(v) => write!(f, "{}", v),
            InterpretedValue::Signed(v) => write!(f, "{}", v),
            InterpretedValue::Float(v) => write!(f, "{}", v),
            InterpretedValue::Text(v) => f.write_str(v),
        }
    }
}

/// One rendered interpretation.
#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct InspectionRow {
    pub offset: usize,
    pub kind: ValueKind,
    pub raw_hex: String,
    pub value: InterpretedValue,
}

/// One line of a classic offset / hex / ASCII dump.
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct HexLine {
    pub offset: usize,
    pub hex: String,
    pub ascii: String,
}
