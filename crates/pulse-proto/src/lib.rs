//! Wire protocol shared by the pulse agent and collector.
//!
//! This crate provides:
//!
//! - [`Metric`]: the wire form of a single gauge or counter
//! - [`MetricKind`]: the `type` discriminator of a metric
//! - [`encode_batch`] / [`decode_batch`]: JSON + gzip batch codec
//! - [`sign`] / [`verify`]: HMAC-SHA256 payload digests
//!
//! ## Example
//!
//! ```rust
//! use pulse_proto::{Metric, decode_batch, encode_batch};
//!
//! let batch = vec![Metric::gauge("Alloc", 1024.0), Metric::counter("PollCount", 3)];
//! let body = encode_batch(&batch).unwrap();
//! assert_eq!(decode_batch(&body).unwrap(), batch);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod codec;
pub mod digest;
pub mod error;
pub mod metric;

pub use codec::{decode_batch, encode_batch, gunzip, gzip, is_gzip};
pub use digest::{HASH_HEADER, sign, verify};
pub use error::{ProtoError, Result};
pub use metric::{Metric, MetricKind};
