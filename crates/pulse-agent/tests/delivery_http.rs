//! HTTP delivery against a mock collector.

use std::time::Duration;

use pulse_agent::{DeliveryClient, DeliveryError, Transport};
use pulse_proto::{HASH_HEADER, Metric, decode_batch, encode_batch, sign, verify};
use pulse_store::RetryPolicy;
use wiremock::matchers::{header, header_exists, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn batch() -> Vec<Metric> {
    vec![Metric::gauge("Alloc", 2048.0), Metric::counter("PollCount", 5)]
}

fn fast_retry() -> RetryPolicy {
    RetryPolicy::new(vec![Duration::ZERO, Duration::from_millis(1), Duration::from_millis(1)])
}

#[tokio::test]
async fn posts_compressed_json_with_headers() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/updates/"))
        .and(header("Content-Type", "application/json"))
        .and(header("Content-Encoding", "gzip"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let client = DeliveryClient::new(&server.uri(), None).unwrap();
    client.send(&batch()).await.unwrap();

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    assert!(requests[0].headers.get(HASH_HEADER).is_none());
    assert_eq!(decode_batch(&requests[0].body).unwrap(), batch());
}

#[tokio::test]
async fn signs_the_compressed_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/updates/"))
        .and(header_exists(HASH_HEADER))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let client = DeliveryClient::new(&server.uri(), Some("secret".to_string())).unwrap();
    client.send(&batch()).await.unwrap();

    let requests = server.received_requests().await.unwrap();
    let request = &requests[0];
    let digest = request.headers.get(HASH_HEADER).unwrap().to_str().unwrap();
    assert!(verify("secret", &request.body, digest));

    // The digest covers exactly what a fresh encoding of the batch produces.
    let expected = sign("secret", &encode_batch(&batch()).unwrap()).unwrap().unwrap();
    assert_eq!(digest, expected);
}

#[tokio::test]
async fn retries_while_unavailable() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/updates/"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/updates/"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let client = DeliveryClient::new(&server.uri(), None)
        .unwrap()
        .with_retry(fast_retry());
    client.send(&batch()).await.unwrap();

    assert_eq!(server.received_requests().await.unwrap().len(), 3);
}

#[tokio::test]
async fn gives_up_after_schedule() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let client = DeliveryClient::new(&server.uri(), None)
        .unwrap()
        .with_retry(fast_retry());
    let result = client.send(&batch()).await;

    assert!(matches!(result, Err(DeliveryError::Status(503))));
    assert_eq!(server.received_requests().await.unwrap().len(), 3);
}

#[tokio::test]
async fn other_failures_are_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let client = DeliveryClient::new(&server.uri(), None)
        .unwrap()
        .with_retry(fast_retry());
    let result = client.send(&batch()).await;

    assert!(matches!(result, Err(DeliveryError::Status(500))));
    assert_eq!(server.received_requests().await.unwrap().len(), 1);
}

#[tokio::test]
async fn connection_failure_surfaces_immediately() {
    // Reserve a port and release it so nothing is listening there.
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let address = listener.local_addr().unwrap().to_string();
    drop(listener);

    let client = DeliveryClient::new(&address, None)
        .unwrap()
        .with_retry(RetryPolicy::from_secs(&[0, 60]));
    let started = std::time::Instant::now();
    let result = client.send(&batch()).await;

    assert!(matches!(result, Err(DeliveryError::Connection(_))));
    assert!(started.elapsed() < Duration::from_secs(30));
}

#[tokio::test]
async fn ping_checks_health_endpoint() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/ping"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let client = DeliveryClient::new(&server.uri(), None).unwrap();
    client.ping().await.unwrap();
}

#[tokio::test]
async fn ping_reports_unhealthy_collector() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/ping"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let client = DeliveryClient::new(&server.uri(), None).unwrap();
    assert!(matches!(client.ping().await, Err(DeliveryError::Status(500))));
}

#[tokio::test]
async fn address_without_scheme_is_accepted() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/updates/"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let address = server.address().to_string();
    let client = DeliveryClient::new(&address, None).unwrap();
    client.send(&batch()).await.unwrap();
}

#[tokio::test]
async fn non_finite_gauge_is_never_sent() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let client = DeliveryClient::new(&server.uri(), None).unwrap();
    let result = client.send(&[Metric::gauge("CPU", f64::NAN)]).await;

    assert!(matches!(result, Err(DeliveryError::Encode(_))));
}
