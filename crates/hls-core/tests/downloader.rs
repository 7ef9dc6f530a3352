//! C5 integration tests (spec.md §8 properties 7 and 9).

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use hls_core::config::{Configuration, HeaderSet};
use hls_core::downloader::SegmentDownloader;
use hls_core::http::HttpClient;
use tokio_util::sync::CancellationToken;
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

struct TrackingResponder {
    in_flight: Arc<AtomicUsize>,
    max_seen: Arc<AtomicUsize>,
}

impl Respond for TrackingResponder {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_seen.fetch_max(current, Ordering::SeqCst);
        std::thread::sleep(Duration::from_millis(30));
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        ResponseTemplate::new(200).set_body_bytes(b"segment-bytes".to_vec())
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn segment_level_concurrency_never_exceeds_cap() {
    let server = MockServer::start().await;
    let in_flight = Arc::new(AtomicUsize::new(0));
    let max_seen = Arc::new(AtomicUsize::new(0));

    Mock::given(wiremock::matchers::method("GET"))
        .respond_with(TrackingResponder {
            in_flight: in_flight.clone(),
            max_seen: max_seen.clone(),
        })
        .mount(&server)
        .await;

    let config = Configuration::builder()
        .max_concurrent_downloads(5)
        .retry_attempts(0)
        .build();
    let http = Arc::new(HttpClient::new(&config).unwrap());
    let downloader = SegmentDownloader::new(http);

    let urls: Vec<String> = (0..20).map(|i| format!("{}/seg{i}.ts", server.uri())).collect();
    let dir = tempfile::TempDir::new().unwrap();
    let token = CancellationToken::new();

    downloader
        .download_all(&urls, dir.path(), &HeaderSet::new(), 5, &token, Arc::new(|_, _| {}))
        .await
        .unwrap();

    assert!(max_seen.load(Ordering::SeqCst) <= 5, "observed {} in flight", max_seen.load(Ordering::SeqCst));
}

#[tokio::test]
async fn permanent_failure_leaves_no_partial_file_for_failing_segment() {
    let server = MockServer::start().await;

    Mock::given(wiremock::matchers::method("GET"))
        .and(wiremock::matchers::path("/good.ts"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"ok".to_vec()))
        .mount(&server)
        .await;
    Mock::given(wiremock::matchers::method("GET"))
        .and(wiremock::matchers::path("/bad.ts"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let config = Configuration::builder()
        .max_concurrent_downloads(1)
        .retry_attempts(0)
        .build();
    let http = Arc::new(HttpClient::new(&config).unwrap());
    let downloader = SegmentDownloader::new(http);

    let urls = vec![format!("{}/good.ts", server.uri()), format!("{}/bad.ts", server.uri())];
    let dir = tempfile::TempDir::new().unwrap();
    let token = CancellationToken::new();

    let result = downloader
        .download_all(&urls, dir.path(), &HeaderSet::new(), 1, &token, Arc::new(|_, _| {}))
        .await;

    assert!(result.is_err());
    let mut entries: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().to_string())
        .collect();
    entries.sort();
    assert!(entries.iter().all(|name| !name.contains("bad")), "unexpected files: {entries:?}");
}
