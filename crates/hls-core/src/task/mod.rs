//! C7 — per-request task orchestrator.
//!
//! Admission control and the scoped temp-directory guard are grounded on the
//! teacher's scheduler/coordinator idioms in `crates/mesio/src/hls/
//! scheduler.rs` (`tokio::sync::Semaphore` for an in-flight bound) and
//! `crates/mesio/src/hls/fetcher.rs` (`tempfile::TempDir` used the same way
//! for a job's private working directory).

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use sha2::{Digest, Sha256};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::concat::VideoConcatenator;
use crate::config::{Configuration, HeaderSet};
use crate::downloader::SegmentDownloader;
use crate::error::{FileSystemError, ProcessingError};
use crate::http::{read_local_text, HttpClient, HttpRequest};
use crate::playlist::{self, ParserResult, PlaylistKindHint};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskSource {
    Web,
    Local,
}

#[derive(Debug, Clone)]
pub struct TaskRequest {
    pub url: String,
    pub base_url: Option<String>,
    pub saved_directory: PathBuf,
    pub file_name: Option<String>,
    pub source: TaskSource,
    pub verbose: bool,
}

#[derive(Debug, Clone, Default)]
pub struct TaskMetrics {
    pub download_duration: Duration,
    pub processing_duration: Duration,
    pub segment_count: usize,
    pub total_bytes: u64,
}

#[derive(Debug, Clone)]
pub enum TaskStatus {
    Pending,
    Downloading { progress: f64 },
    Processing,
    Completed,
    Failed { error: String },
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct TaskRecord {
    pub id: String,
    pub url: String,
    pub base_url: Option<String>,
    pub saved_directory: PathBuf,
    pub file_name: Option<String>,
    pub source: TaskSource,
    pub status: TaskStatus,
    pub start_time: Instant,
    pub metrics: TaskMetrics,
}

#[derive(Debug, Clone, Default)]
pub struct OrchestratorTotals {
    pub total_download_time: Duration,
    pub total_processing_time: Duration,
    pub completed_tasks: u64,
}

/// Stable hash of the URL, used as the task id (spec.md §3).
pub fn task_id_for(url: &str) -> String {
    let digest = Sha256::digest(url.as_bytes());
    hex::encode(digest)
}

struct TempDirGuard {
    path: PathBuf,
}

impl Drop for TempDirGuard {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.path);
    }
}

pub struct TaskOrchestrator {
    config: Configuration,
    http: Arc<HttpClient>,
    downloader: SegmentDownloader,
    concatenator: VideoConcatenator,
    max_concurrent_tasks: usize,
    admission: Semaphore,
    records: Mutex<HashMap<String, TaskRecord>>,
    tokens: Mutex<HashMap<String, CancellationToken>>,
    totals: Mutex<OrchestratorTotals>,
}

impl TaskOrchestrator {
    pub fn new(config: Configuration, http: Arc<HttpClient>) -> Result<Self, ProcessingError> {
        let tool_path = config.tool_concat_path.clone().ok_or_else(|| {
            ProcessingError::Wrapped {
                code: 4999,
                message: "no concatenation tool configured".to_string(),
                operation: "orchestrator setup",
                underlying: Box::new(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "tool_concat_path is unset",
                )),
            }
        })?;
        let max_concurrent_tasks = config.default_max_concurrent_tasks();
        Ok(Self {
            downloader: SegmentDownloader::new(http.clone()),
            concatenator: VideoConcatenator::new(tool_path),
            max_concurrent_tasks,
            admission: Semaphore::new(max_concurrent_tasks),
            records: Mutex::new(HashMap::new()),
            tokens: Mutex::new(HashMap::new()),
            totals: Mutex::new(OrchestratorTotals::default()),
            config,
            http,
        })
    }

    pub fn with_max_concurrent_tasks(mut self, n: usize) -> Self {
        self.max_concurrent_tasks = n.max(1);
        self.admission = Semaphore::new(self.max_concurrent_tasks);
        self
    }

    pub fn task_status(&self, id: &str) -> Option<TaskStatus> {
        self.records.lock().expect("records lock poisoned").get(id).map(|r| r.status.clone())
    }

    pub fn cancel_task(&self, id: &str) {
        if let Some(token) = self.tokens.lock().expect("tokens lock poisoned").get(id) {
            token.cancel();
        }
        if let Some(record) = self.records.lock().expect("records lock poisoned").get_mut(id) {
            record.status = TaskStatus::Cancelled;
        }
    }

    pub fn performance_metrics(&self) -> OrchestratorTotals {
        self.totals.lock().expect("totals lock poisoned").clone()
    }

    #[instrument(skip(self, request), fields(url = %request.url))]
    pub async fn create_task(&self, request: TaskRequest) -> Result<(), ProcessingError> {
        let permit = self.admission.try_acquire().map_err(|_| {
            ProcessingError::OperationCancelled("maximum concurrent tasks reached".to_string())
        })?;

        let id = task_id_for(&request.url);
        let token = CancellationToken::new();
        self.tokens.lock().expect("tokens lock poisoned").insert(id.clone(), token.clone());
        self.upsert_record(&id, &request, TaskStatus::Pending);

        let result = self.run_pipeline(&id, &request, &token).await;

        self.tokens.lock().expect("tokens lock poisoned").remove(&id);
        drop(permit);

        match &result {
            Ok(()) => {
                self.mark_status(&id, TaskStatus::Completed);
                info!(task_id = %id, "task completed");
            }
            Err(ProcessingError::OperationCancelled(reason)) if reason != "maximum concurrent tasks reached" => {
                self.mark_status(&id, TaskStatus::Cancelled);
            }
            Err(err) => {
                self.mark_status(&id, TaskStatus::Failed { error: err.to_string() });
                warn!(task_id = %id, error = %err, "task failed");
            }
        }

        result
    }

    async fn run_pipeline(
        &self,
        id: &str,
        request: &TaskRequest,
        token: &CancellationToken,
    ) -> Result<(), ProcessingError> {
        let start = Instant::now();
        let temp_dir = tempfile::Builder::new()
            .prefix("hls-dl-")
            .tempdir()
            .map_err(|source| {
                ProcessingError::wrap(FileSystemError::FailedToCreateDirectory {
                    path: std::env::temp_dir(),
                    source,
                })
            })?;
        let _guard = TempDirGuard {
            path: temp_dir.path().to_path_buf(),
        };

        if token.is_cancelled() {
            return Err(ProcessingError::OperationCancelled("cancelled before start".to_string()));
        }

        // Step 2/3: fetch + parse.
        self.set_progress(id, 0.2);
        let playlist_text = match request.source {
            TaskSource::Web => {
                let http_request = HttpRequest::new(request.url.clone());
                let (bytes, _metadata) = tokio::select! {
                    result = self.http.fetch(&http_request, token) => result.map_err(ProcessingError::wrap)?,
                    _ = token.cancelled() => return Err(ProcessingError::OperationCancelled("playlist fetch".to_string())),
                };
                String::from_utf8(bytes.to_vec()).map_err(|e| {
                    ProcessingError::wrap(crate::error::ParsingError::Decoding {
                        message: e.to_string(),
                    })
                })?
            }
            TaskSource::Local => read_local_text(Path::new(&request.url)).await.map_err(ProcessingError::wrap)?,
        };

        let base_url = request
            .base_url
            .clone()
            .unwrap_or_else(|| directory_component_of(&request.url));

        let parsed = playlist::parse(&playlist_text, &base_url, PlaylistKindHint::Unknown)
            .map_err(ProcessingError::wrap)?;

        let media = match parsed {
            ParserResult::Master(_) => return Err(ProcessingError::MasterPlaylistsNotSupported),
            ParserResult::Cancelled => return Err(ProcessingError::OperationCancelled("parsing".to_string())),
            ParserResult::Media(media) => media,
        };

        // Step 5: resolve segment URLs.
        let urls = resolve_segment_urls(&media)?;
        self.update_metrics(id, |m| m.segment_count = urls.len());

        // Step 6: download.
        self.set_progress(id, 0.3);
        let download_started = Instant::now();
        let progress_id = id.to_string();
        let segment_total = urls.len().max(1);
        let observer: crate::downloader::ProgressObserver = Arc::new(move |index, _bytes| {
            let fraction = 0.3 + 0.6 * ((index + 1) as f64 / segment_total as f64);
            tracing::trace!(task_id = %progress_id, progress = fraction, "segment complete");
        });

        self.downloader
            .download_all(
                &urls,
                temp_dir.path(),
                &HeaderSet::new(),
                self.config.max_concurrent_downloads,
                token,
                observer,
            )
            .await?;

        let total_bytes = sum_directory_bytes(temp_dir.path());
        let download_duration = download_started.elapsed();
        self.update_metrics(id, |m| {
            m.total_bytes = total_bytes;
            m.download_duration = download_duration;
        });

        // Step 7: concatenate.
        self.mark_status(id, TaskStatus::Processing);
        let processing_started = Instant::now();
        let output_name = derive_output_name(&request.url, None);
        let output_path = temp_dir.path().join(&output_name);
        self.concatenator.combine(temp_dir.path(), &output_path).await?;
        let processing_duration = processing_started.elapsed();
        self.update_metrics(id, |m| m.processing_duration = processing_duration);

        // Step 8: publish.
        let final_name = derive_output_name(&request.url, request.file_name.as_deref());
        let final_path = publish_path(&request.saved_directory, &final_name);
        tokio::fs::create_dir_all(&request.saved_directory)
            .await
            .map_err(|source| ProcessingError::wrap(FileSystemError::FailedToCreateDirectory {
                path: request.saved_directory.clone(),
                source,
            }))?;
        tokio::fs::copy(&output_path, &final_path)
            .await
            .map_err(|source| ProcessingError::wrap(FileSystemError::FailedToWrite {
                path: final_path.clone(),
                source,
            }))?;

        // Step 9.
        let mut totals = self.totals.lock().expect("totals lock poisoned");
        totals.total_download_time += download_duration;
        totals.total_processing_time += processing_duration;
        totals.completed_tasks += 1;
        drop(totals);

        let _ = start.elapsed();
        Ok(())
    }

    fn upsert_record(&self, id: &str, request: &TaskRequest, status: TaskStatus) {
        self.records.lock().expect("records lock poisoned").insert(
            id.to_string(),
            TaskRecord {
                id: id.to_string(),
                url: request.url.clone(),
                base_url: request.base_url.clone(),
                saved_directory: request.saved_directory.clone(),
                file_name: request.file_name.clone(),
                source: request.source,
                status,
                start_time: Instant::now(),
                metrics: TaskMetrics::default(),
            },
        );
    }

    fn mark_status(&self, id: &str, status: TaskStatus) {
        if let Some(record) = self.records.lock().expect("records lock poisoned").get_mut(id) {
            record.status = status;
        }
    }

    fn set_progress(&self, id: &str, progress: f64) {
        self.mark_status(id, TaskStatus::Downloading { progress });
    }

    fn update_metrics(&self, id: &str, f: impl FnOnce(&mut TaskMetrics)) {
        if let Some(record) = self.records.lock().expect("records lock poisoned").get_mut(id) {
            f(&mut record.metrics);
        }
    }
}

/// Directory component of a playlist URL, used as the default base for
/// resolving relative segment URIs (spec.md §4.4.2). `url.join(".")`
/// follows RFC 3986 merge rules to strip the last path segment while
/// keeping scheme/host/port intact — the same derivation the teacher's
/// `PlaylistEngine` uses in `crates/mesio/src/hls/playlist.rs`.
fn directory_component_of(url: &str) -> String {
    match url::Url::parse(url).and_then(|parsed| parsed.join(".")) {
        Ok(dir) => dir.to_string(),
        Err(_) => url.to_string(),
    }
}

fn resolve_segment_urls(media: &playlist::MediaPlaylist) -> Result<Vec<String>, ProcessingError> {
    let base = url::Url::parse(&media.base_url).map_err(|e| {
        ProcessingError::wrap(crate::error::NetworkError::InvalidUrl {
            url: media.base_url.clone(),
            reason: e.to_string(),
        })
    })?;

    let urls: Vec<String> = media
        .segments
        .iter()
        .filter_map(|segment| base.join(&segment.uri).ok().map(|u| u.to_string()))
        .collect();

    if urls.is_empty() {
        return Err(ProcessingError::NoValidSegments);
    }
    Ok(urls)
}

fn sum_directory_bytes(dir: &Path) -> u64 {
    std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .filter_map(|e| e.metadata().ok())
                .filter(|m| m.is_file())
                .map(|m| m.len())
                .sum()
        })
        .unwrap_or(0)
}

/// `custom` if set (ensuring `.mp4`), else the playlist's last path
/// component with `.m3u8` replaced by `.mp4` (spec.md §4.7 step 7/8).
pub fn derive_output_name(playlist_url: &str, custom: Option<&str>) -> String {
    if let Some(name) = custom {
        return ensure_mp4_suffix(name);
    }
    let basename = url::Url::parse(playlist_url)
        .ok()
        .and_then(|u| u.path_segments().and_then(|mut s| s.next_back().map(str::to_string)))
        .unwrap_or_else(|| playlist_url.to_string());
    let stem = basename.strip_suffix(".m3u8").unwrap_or(&basename);
    ensure_mp4_suffix(stem)
}

fn ensure_mp4_suffix(name: &str) -> String {
    if name.ends_with(".mp4") {
        name.to_string()
    } else {
        format!("{name}.mp4")
    }
}

/// Appends `_1` on a single collision round (spec.md §9 open question 2:
/// further collisions are a known, documented limitation, not resolved here).
pub fn publish_path(saved_directory: &Path, name: &str) -> PathBuf {
    let candidate = saved_directory.join(name);
    if !candidate.exists() {
        return candidate;
    }
    let stem = name.strip_suffix(".mp4").unwrap_or(name);
    saved_directory.join(format!("{stem}_1.mp4"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derive_output_name_replaces_m3u8_extension() {
        assert_eq!(derive_output_name("https://cdn.example.com/videos/clip.m3u8", None), "clip.mp4");
    }

    #[test]
    fn derive_output_name_prefers_custom_name() {
        assert_eq!(derive_output_name("https://cdn.example.com/videos/clip.m3u8", Some("my-video")), "my-video.mp4");
    }

    #[test]
    fn publish_path_appends_one_collision_suffix() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(dir.path().join("video.mp4"), b"existing").unwrap();
        let path = publish_path(dir.path(), "video.mp4");
        assert_eq!(path.file_name().unwrap().to_str().unwrap(), "video_1.mp4");
    }

    #[test]
    fn publish_path_uses_plain_name_when_no_collision() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = publish_path(dir.path(), "video.mp4");
        assert_eq!(path.file_name().unwrap().to_str().unwrap(), "video.mp4");
    }

    #[test]
    fn task_id_is_stable_for_same_url() {
        assert_eq!(task_id_for("https://a/b.m3u8"), task_id_for("https://a/b.m3u8"));
        assert_ne!(task_id_for("https://a/b.m3u8"), task_id_for("https://a/c.m3u8"));
    }
}
