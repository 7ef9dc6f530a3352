//! C7 integration tests (spec.md §8 properties 8 and 10).

use std::sync::Arc;
use std::time::Duration;

use hls_core::config::Configuration;
use hls_core::error::ProcessingError;
use hls_core::http::HttpClient;
use hls_core::task::{TaskOrchestrator, TaskRequest, TaskSource};
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

fn request_for(server_uri: &str, name: &str, saved_directory: std::path::PathBuf) -> TaskRequest {
    TaskRequest {
        url: format!("{server_uri}/{name}.m3u8"),
        base_url: None,
        saved_directory,
        file_name: None,
        source: TaskSource::Web,
        verbose: false,
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn task_level_admission_control_rejects_third_concurrent_task() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(move |_req: &wiremock::Request| {
            std::thread::sleep(Duration::from_millis(300));
            ResponseTemplate::new(200).set_body_bytes(b"#EXTM3U\n".to_vec())
        })
        .mount(&server)
        .await;

    let dir = tempfile::TempDir::new().unwrap();
    let config = Configuration::builder()
        .tool_concat_path("/bin/false")
        .max_concurrent_downloads(10)
        .retry_attempts(0)
        .build();
    let http = Arc::new(HttpClient::new(&config).unwrap());
    let orchestrator = Arc::new(
        TaskOrchestrator::new(config, http)
            .unwrap()
            .with_max_concurrent_tasks(2),
    );

    let o1 = orchestrator.clone();
    let server_uri = server.uri();
    let dir_path = dir.path().to_path_buf();
    let uri1 = server_uri.clone();
    let path1 = dir_path.clone();
    let h1 = tokio::spawn(async move { o1.create_task(request_for(&uri1, "a", path1)).await });
    let o2 = orchestrator.clone();
    let uri2 = server_uri.clone();
    let path2 = dir_path.clone();
    let h2 = tokio::spawn(async move { o2.create_task(request_for(&uri2, "b", path2)).await });

    tokio::time::sleep(Duration::from_millis(50)).await;

    let err = orchestrator
        .create_task(request_for(&server_uri, "c", dir_path))
        .await
        .unwrap_err();
    assert!(matches!(
        &err,
        ProcessingError::OperationCancelled(reason) if reason.as_str() == "maximum concurrent tasks reached"
    ));

    let _ = tokio::join!(h1, h2);
}

#[tokio::test]
async fn scoped_temp_directory_is_removed_after_failure() {
    let before: Vec<_> = list_hls_dl_temp_dirs();

    let dir = tempfile::TempDir::new().unwrap();
    let config = Configuration::builder()
        .tool_concat_path("/bin/false")
        .retry_attempts(0)
        .request_timeout(1.0)
        .resource_timeout(1.0)
        .build();
    let http = Arc::new(HttpClient::new(&config).unwrap());
    let orchestrator = TaskOrchestrator::new(config, http).unwrap();

    let request = request_for("http://127.0.0.1:1", "unreachable", dir.path().to_path_buf());
    let result = orchestrator.create_task(request).await;
    assert!(result.is_err());

    let after: Vec<_> = list_hls_dl_temp_dirs();
    assert_eq!(before.len(), after.len(), "temp directory leaked: {after:?}");
}

fn list_hls_dl_temp_dirs() -> Vec<std::path::PathBuf> {
    std::fs::read_dir(std::env::temp_dir())
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .map(|e| e.path())
                .filter(|p| {
                    p.file_name()
                        .and_then(|n| n.to_str())
                        .map(|n| n.starts_with("hls-dl-"))
                        .unwrap_or(false)
                })
                .collect()
        })
        .unwrap_or_default()
}
