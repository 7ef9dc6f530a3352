//! C6 — external-process video concatenator.
//!
//! Grounded on the teacher's `rust-srec/src/pipeline/processors/execute.rs`:
//! stdin closed immediately, stdout/stderr captured on separate pipes, a
//! non-zero exit status mapped to a typed error carrying a stderr excerpt.
//! `process-utils`'s `NoWindowExt` (copied unchanged from the teacher) keeps
//! the child from flashing a console window on Windows.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use crate::error::{FileSystemError, ProcessingError};

const STDERR_EXCERPT_LIMIT: usize = 4096;

pub struct VideoConcatenator {
    tool_path: PathBuf,
}

impl VideoConcatenator {
    pub fn new(tool_path: PathBuf) -> Self {
        Self { tool_path }
    }

    /// `combine(directory, output_file)` (spec.md §4.6). Segment files in
    /// `directory` are expected to carry the `NNNNNNNN_basename` prefix
    /// `downloader::indexed_filename` writes, so a lexicographic directory
    /// listing already yields playback order without re-parsing the
    /// playlist.
    pub async fn combine(&self, directory: &Path, output_file: &Path) -> Result<(), ProcessingError> {
        let mut entries = read_segment_files(directory).await?;
        if entries.is_empty() {
            return Err(ProcessingError::NoSegmentsFound {
                directory: directory.to_path_buf(),
            });
        }
        entries.sort();

        let mut command = process_utils::tokio_command(&self.tool_path);
        command
            .arg("-f")
            .arg("concat")
            .arg("-i")
            .arg(write_concat_manifest(directory, &entries).await?)
            .arg("-c")
            .arg("copy")
            .arg(output_file)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let child = command.spawn().map_err(ProcessingError::wrap)?;

        let output = child.wait_with_output().await.map_err(ProcessingError::wrap)?;

        if !output.status.success() {
            let stderr_excerpt: String = String::from_utf8_lossy(&output.stderr)
                .chars()
                .take(STDERR_EXCERPT_LIMIT)
                .collect();
            return Err(ProcessingError::ExternalToolFailed {
                exit_code: output.status.code(),
                stderr_excerpt,
            });
        }

        Ok(())
    }
}

async fn read_segment_files(directory: &Path) -> Result<Vec<PathBuf>, FileSystemError> {
    let mut read_dir = tokio::fs::read_dir(directory)
        .await
        .map_err(|source| FileSystemError::FailedToRead {
            path: directory.to_path_buf(),
            source,
        })?;

    let mut files = Vec::new();
    while let Some(entry) = read_dir.next_entry().await.map_err(|source| FileSystemError::FailedToRead {
        path: directory.to_path_buf(),
        source,
    })? {
        let path = entry.path();
        if path.is_file() && path.extension().map(|ext| ext != "part").unwrap_or(true) {
            files.push(path);
        }
    }
    Ok(files)
}

async fn write_concat_manifest(directory: &Path, entries: &[PathBuf]) -> Result<PathBuf, ProcessingError> {
    let manifest_path = directory.join("concat_manifest.txt");
    let mut contents = String::new();
    for entry in entries {
        contents.push_str("file '");
        contents.push_str(&entry.to_string_lossy().replace('\'', "'\\''"));
        contents.push_str("'\n");
    }
    tokio::fs::write(&manifest_path, contents).await.map_err(|source| {
        ProcessingError::wrap(FileSystemError::FailedToWrite {
            path: manifest_path.clone(),
            source,
        })
    })?;
    Ok(manifest_path)
}
