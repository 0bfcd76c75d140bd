//! Batch codec: compact JSON array of [`Metric`], gzip-compressed.

use std::io::{Read, Write};

use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;

use crate::error::{ProtoError, Result};
use crate::metric::Metric;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Encodes a batch as compact JSON and gzips it.
///
/// # Errors
///
/// Returns [`ProtoError::NonFinite`] for a NaN or infinite gauge, or an
/// error if serialization or compression fails.
pub fn encode_batch(metrics: &[Metric]) -> Result<Vec<u8>> {
    if let Some(Metric::Gauge { id, .. }) = metrics
        .iter()
        .find(|m| matches!(m, Metric::Gauge { value, .. } if !value.is_finite()))
    {
        return Err(ProtoError::NonFinite(id.clone()));
    }
    let json = serde_json::to_vec(metrics)?;
    gzip(&json)
}

/// Decodes a batch body, transparently gunzipping it when it carries the gzip magic.
///
/// # Errors
///
/// Returns an error if the body is not valid gzip or not a JSON array of metrics.
pub fn decode_batch(body: &[u8]) -> Result<Vec<Metric>> {
    if is_gzip(body) {
        let json = gunzip(body)?;
        Ok(serde_json::from_slice(&json)?)
    } else {
        Ok(serde_json::from_slice(body)?)
    }
}

/// Gzip-compresses a buffer.
///
/// # Errors
///
/// Returns an error if the encoder fails.
pub fn gzip(data: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::with_capacity(data.len() / 2), Compression::default());
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

/// Decompresses a gzip buffer.
///
/// # Errors
///
/// Returns an error if the input is not valid gzip.
pub fn gunzip(data: &[u8]) -> Result<Vec<u8>> {
    let mut decoder = GzDecoder::new(data);
    let mut out = Vec::new();
    decoder.read_to_end(&mut out)?;
    Ok(out)
}

/// Returns true if the buffer starts with the gzip magic bytes.
#[must_use]
pub fn is_gzip(data: &[u8]) -> bool {
    data.starts_with(&GZIP_MAGIC)
}
