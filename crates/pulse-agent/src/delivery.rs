//! Shipping batches to the collector.
//!
//! [`DeliveryClient`] posts a gzip-compressed JSON batch to
//! `{base}/updates/`, signed with HMAC-SHA256 when a key is configured.
//! Attempts follow the shared [`RetryPolicy`]; only a `503` is retried,
//! transport failures surface on the first attempt.

use std::time::Duration;

use async_trait::async_trait;
use pulse_proto::{HASH_HEADER, Metric, encode_batch, sign};
use pulse_store::RetryPolicy;
use reqwest::StatusCode;
use reqwest::header::{CONTENT_ENCODING, CONTENT_TYPE};
use tracing::{debug, instrument};

use crate::error::DeliveryError;

/// Per-request timeout.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Destination for metric batches.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Delivers one batch.
    async fn send(&self, batch: &[Metric]) -> Result<(), DeliveryError>;

    /// Checks that the collector is reachable.
    async fn ping(&self) -> Result<(), DeliveryError>;
}

/// Prepends `http://` to an address without a scheme and strips trailing slashes.
#[must_use]
pub fn normalize_base_url(address: &str) -> String {
    let address = address.trim().trim_end_matches('/');
    if address.starts_with("http://") || address.starts_with("https://") {
        address.to_string()
    } else {
        format!("http://{address}")
    }
}

/// HTTP [`Transport`] to a pulse collector.
#[derive(Debug, Clone)]
pub struct DeliveryClient {
    http: reqwest::Client,
    base_url: String,
    key: Option<String>,
    retry: RetryPolicy,
}

impl DeliveryClient {
    /// Creates a client for the collector at `address`.
    ///
    /// An empty key disables signing.
    ///
    /// # Errors
    ///
    /// Returns [`DeliveryError::Connection`] if the HTTP client cannot be built.
    pub fn new(address: &str, key: Option<String>) -> Result<Self, DeliveryError> {
        let http = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            http,
            base_url: normalize_base_url(address),
            key: key.filter(|k| !k.is_empty()),
            retry: RetryPolicy::default(),
        })
    }

    /// Replaces the retry schedule.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Returns the collector base URL.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn post_once(&self, body: &[u8], digest: Option<&str>) -> Result<(), DeliveryError> {
        let mut request = self
            .http
            .post(self.url("/updates/"))
            .header(CONTENT_TYPE, "application/json")
            .header(CONTENT_ENCODING, "gzip")
            .body(body.to_vec());
        if let Some(digest) = digest {
            request = request.header(HASH_HEADER, digest);
        }
        check_status(request.send().await?.status())
    }

    async fn ping_once(&self) -> Result<(), DeliveryError> {
        let status = self.http.get(self.url("/ping")).send().await?.status();
        match status {
            StatusCode::OK => Ok(()),
            StatusCode::SERVICE_UNAVAILABLE => Err(DeliveryError::Unavailable),
            other => Err(DeliveryError::Status(other.as_u16())),
        }
    }
}

fn check_status(status: StatusCode) -> Result<(), DeliveryError> {
    if status == StatusCode::SERVICE_UNAVAILABLE {
        Err(DeliveryError::Unavailable)
    } else if status.is_success() {
        Ok(())
    } else {
        Err(DeliveryError::Status(status.as_u16()))
    }
}

/// Reports an exhausted 503 schedule as a plain status failure.
fn final_error(err: DeliveryError) -> DeliveryError {
    match err {
        DeliveryError::Unavailable => DeliveryError::Status(StatusCode::SERVICE_UNAVAILABLE.as_u16()),
        other => other,
    }
}

#[async_trait]
impl Transport for DeliveryClient {
    #[instrument(skip_all, fields(metrics = batch.len()))]
    async fn send(&self, batch: &[Metric]) -> Result<(), DeliveryError> {
        let body = encode_batch(batch)?;
        let digest = match &self.key {
            Some(key) => sign(key, &body)?,
            None => None,
        };

        self.retry
            .run(
                "deliver batch",
                || self.post_once(&body, digest.as_deref()),
                DeliveryError::is_retryable,
            )
            .await
            .map_err(final_error)?;

        debug!(bytes = body.len(), signed = digest.is_some(), "batch delivered");
        Ok(())
    }

    async fn ping(&self) -> Result<(), DeliveryError> {
        self.retry
            .run("ping collector", || self.ping_once(), DeliveryError::is_retryable)
            .await
            .map_err(final_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("localhost:8080", "http://localhost:8080" ; "bare host")]
    #[test_case("http://collector:80/", "http://collector:80" ; "trailing slash")]
    #[test_case("https://collector", "https://collector" ; "https kept")]
    #[test_case(" 10.0.0.1:9000 ", "http://10.0.0.1:9000" ; "whitespace")]
    fn base_url_normalization(input: &str, expected: &str) {
        assert_eq!(normalize_base_url(input), expected);
    }

    #[test]
    fn status_classification() {
        assert!(check_status(StatusCode::OK).is_ok());
        assert!(check_status(StatusCode::ACCEPTED).is_ok());
        assert!(matches!(
            check_status(StatusCode::SERVICE_UNAVAILABLE),
            Err(DeliveryError::Unavailable)
        ));
        assert!(matches!(
            check_status(StatusCode::INTERNAL_SERVER_ERROR),
            Err(DeliveryError::Status(500))
        ));
    }

    #[test]
    fn exhausted_unavailable_becomes_status() {
        assert!(matches!(
            final_error(DeliveryError::Unavailable),
            DeliveryError::Status(503)
        ));
        assert!(matches!(
            final_error(DeliveryError::Status(400)),
            DeliveryError::Status(400)
        ));
    }

    #[test]
    fn client_drops_empty_key() {
        let client = DeliveryClient::new("localhost:8080", Some(String::new())).unwrap();
        assert!(client.key.is_none());
        assert_eq!(client.base_url(), "http://localhost:8080");
        assert_eq!(client.url("/updates/"), "http://localhost:8080/updates/");
    }
}
