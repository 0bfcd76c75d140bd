//! Accepting delivered batches on the collector side.
//!
//! A collector handler verifies the body with [`decode_payload`], applies it
//! with [`apply_batch`] and signs its reply with [`sign_response`].

use pulse_proto::{Metric, decode_batch, sign, verify};
use tracing::{debug, warn};

use crate::error::IngestError;
use crate::snapshot::Snapshot;
use crate::traits::MetricsStore;

/// Verifies and decodes a delivered body.
///
/// The digest is checked over the raw body, before decompression, and only
/// when both a key and a digest are present. The body may be gzip-compressed
/// or plain JSON.
///
/// # Errors
///
/// Returns [`IngestError::Integrity`] on a digest mismatch and
/// [`IngestError::Decode`] if the body is not a valid metric batch.
pub fn decode_payload(
    body: &[u8],
    digest: Option<&str>,
    key: Option<&str>,
) -> Result<Vec<Metric>, IngestError> {
    let key = key.filter(|k| !k.is_empty());
    let digest = digest.filter(|d| !d.is_empty());
    if let (Some(key), Some(digest)) = (key, digest) {
        if !verify(key, body, digest) {
            warn!(bytes = body.len(), "rejected batch with bad digest");
            return Err(IngestError::Integrity);
        }
    }

    Ok(decode_batch(body)?)
}

/// Applies a batch to `store`.
///
/// Duplicate counters within the batch are summed and the last duplicate
/// gauge wins. Gauges are written before counters; a store failure between
/// the two leaves the gauges applied.
///
/// # Errors
///
/// Returns [`IngestError::Store`] if a write fails.
pub async fn apply_batch(store: &dyn MetricsStore, metrics: Vec<Metric>) -> Result<usize, IngestError> {
    let count = metrics.len();
    let batch = Snapshot::from_metrics(metrics);

    if !batch.gauges.is_empty() {
        store.set_gauges(&batch.gauges).await?;
    }
    if !batch.counters.is_empty() {
        store.set_counters(&batch.counters).await?;
    }

    debug!(
        metrics = count,
        gauges = batch.gauges.len(),
        counters = batch.counters.len(),
        "batch applied"
    );
    Ok(count)
}

/// Computes the digest header value for a response body, if a key is set.
///
/// # Errors
///
/// Returns [`IngestError::Decode`] if the key cannot initialize the MAC.
pub fn sign_response(key: Option<&str>, body: &[u8]) -> Result<Option<String>, IngestError> {
    match key {
        Some(key) => Ok(sign(key, body)?),
        None => Ok(None),
    }
}
