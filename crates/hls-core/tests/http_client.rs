//! C3 integration tests against a mock HTTP server (spec.md §8 properties
//! 5 and 6, scenarios S3 and S4). `wiremock` stands in for the ecosystem
//! mock-HTTP dependency the teacher pack has no bundled equivalent for
//! (see `DESIGN.md`).

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use hls_core::config::Configuration;
use hls_core::http::{HttpClient, HttpRequest};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn test_config(retry_attempts: u32, retry_backoff_base: f64) -> Configuration {
    Configuration::builder()
        .max_concurrent_downloads(5)
        .request_timeout(5.0)
        .resource_timeout(5.0)
        .retry_attempts(retry_attempts)
        .retry_backoff_base(retry_backoff_base)
        .build()
}

#[tokio::test]
async fn client_error_is_not_retried() {
    let server = MockServer::start().await;
    let attempts = Arc::new(AtomicU32::new(0));
    let counted = attempts.clone();

    Mock::given(method("GET"))
        .and(path("/playlist.m3u8"))
        .respond_with(move |_req: &wiremock::Request| {
            counted.fetch_add(1, Ordering::SeqCst);
            ResponseTemplate::new(404)
        })
        .mount(&server)
        .await;

    let client = HttpClient::new(&test_config(3, 0.01)).unwrap();
    let request = HttpRequest::new(format!("{}/playlist.m3u8", server.uri()));
    let token = CancellationToken::new();

    let err = client.fetch(&request, &token).await.unwrap_err();
    assert!(matches!(
        err,
        hls_core::error::NetworkError::ClientError { status_code: 404, .. }
    ));
    assert_eq!(attempts.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn server_error_is_retried_until_exhaustion() {
    let server = MockServer::start().await;
    let attempts = Arc::new(AtomicU32::new(0));
    let counted = attempts.clone();

    Mock::given(method("GET"))
        .and(path("/playlist.m3u8"))
        .respond_with(move |_req: &wiremock::Request| {
            counted.fetch_add(1, Ordering::SeqCst);
            ResponseTemplate::new(503)
        })
        .mount(&server)
        .await;

    let client = HttpClient::new(&test_config(3, 0.01)).unwrap();
    let request = HttpRequest::new(format!("{}/playlist.m3u8", server.uri()));
    let token = CancellationToken::new();

    let err = client.fetch(&request, &token).await.unwrap_err();
    assert!(matches!(
        err,
        hls_core::error::NetworkError::ServerError { status_code: 503, .. }
    ));
    assert_eq!(attempts.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn scenario_s3_retry_succeeds_on_third_attempt() {
    let server = MockServer::start().await;
    let attempts = Arc::new(AtomicU32::new(0));
    let counted = attempts.clone();

    Mock::given(method("GET"))
        .and(path("/playlist.m3u8"))
        .respond_with(move |_req: &wiremock::Request| {
            let n = counted.fetch_add(1, Ordering::SeqCst);
            if n < 2 {
                ResponseTemplate::new(503)
            } else {
                ResponseTemplate::new(200).set_body_bytes(b"#EXTM3U\n".to_vec())
            }
        })
        .mount(&server)
        .await;

    let client = HttpClient::new(&test_config(3, 0.01)).unwrap();
    let request = HttpRequest::new(format!("{}/playlist.m3u8", server.uri()));
    let token = CancellationToken::new();

    let (body, metadata) = client.fetch(&request, &token).await.unwrap();
    assert_eq!(metadata.status, 200);
    assert_eq!(&body[..], b"#EXTM3U\n");
    assert_eq!(attempts.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn fetch_to_path_leaves_no_file_on_permanent_failure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/segment0.ts"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let client = HttpClient::new(&test_config(0, 0.01)).unwrap();
    let request = HttpRequest::new(format!("{}/segment0.ts", server.uri()));
    let token = CancellationToken::new();
    let dir = tempfile::TempDir::new().unwrap();
    let destination = dir.path().join("segment0.ts");

    let err = client.fetch_to_path(&request, &destination, &token).await.unwrap_err();
    assert!(matches!(err, hls_core::error::NetworkError::ClientError { .. }));
    assert!(!destination.exists());
    assert!(!dir.path().join("segment0.part").exists());
}

/// Drops the connection mid-body, after the `.part` file has already been
/// created and partially written, so the error-path cleanup in
/// `fetch_to_path` (not just the "never started" case above) gets exercised.
#[tokio::test]
async fn fetch_to_path_removes_partial_file_on_mid_stream_failure() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        if let Ok((mut socket, _)) = listener.accept().await {
            let mut buf = [0u8; 1024];
            let _ = socket.read(&mut buf).await;
            // Claims a 1000-byte body but sends 10, then closes the socket.
            let response = b"HTTP/1.1 200 OK\r\nContent-Length: 1000\r\nConnection: close\r\n\r\nshortbody!";
            let _ = socket.write_all(response).await;
        }
    });

    let client = HttpClient::new(&test_config(0, 0.01)).unwrap();
    let request = HttpRequest::new(format!("http://{addr}/segment0.ts"));
    let token = CancellationToken::new();
    let dir = tempfile::TempDir::new().unwrap();
    let destination = dir.path().join("segment0.ts");

    let result = client.fetch_to_path(&request, &destination, &token).await;
    assert!(result.is_err(), "truncated body should surface as an error");
    assert!(!destination.exists());
    assert!(!dir.path().join("segment0.part").exists());
}
