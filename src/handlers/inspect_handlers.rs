//! Byte inspection endpoints. The request body is the data to inspect.

use crate::{
    errors::AppError,
    models::inspection::{Endianness, ValueKind},
    services::inspector::{self, DEFAULT_DUMP_WIDTH},
};
use axum::{Json, body::Bytes, extract::Query, response::IntoResponse};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct InspectQuery {
    #[serde(default)]
    pub offset: usize,
    /// One kind such as `uint32` or `utf8-char`; all kinds when absent.
    pub kind: Option<String>,
    pub endian: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct HexDumpQuery {
    #[serde(default)]
    pub offset: usize,
    /// Defaults to the rest of the body.
    pub len: Option<usize>,
    pub width: Option<usize>,
}

/// `POST /inspect`
pub async fn inspect(
    Query(q): Query<InspectQuery>,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    let endianness = match q.endian.as_deref() {
        Some(raw) => raw.parse::<Endianness>().map_err(AppError::bad_request)?,
        None => Endianness::default(),
    };

    let rows = match q.kind.as_deref() {
        Some(raw) => {
            let kind = raw.parse::<ValueKind>().map_err(AppError::bad_request)?;
            inspector::inspect(&body, q.offset, &[kind], endianness)?
        }
        None => inspector::inspect_all(&body, q.offset, endianness)?,
    };
    Ok(Json(rows))
}

/// `POST /hexdump`
pub async fn hex_dump(
    Query(q): Query<HexDumpQuery>,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    let len = q
        .len
        .unwrap_or_else(|| body.len().saturating_sub(q.offset));
    let width = q.width.unwrap_or(DEFAULT_DUMP_WIDTH);
    Ok(Json(inspector::hex_dump(&body, q.offset, len, width)?))
}
