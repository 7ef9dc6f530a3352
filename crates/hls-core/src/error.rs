//! Typed error taxonomy shared by every component (C1–C7).
//!
//! Each kind carries structured context (URL, path, line) rather than a bare
//! message, and exposes a `recovery_suggestion` the way the teacher's
//! `DownloadError` exposes `is_retryable` / `is_non_recoverable_source_error`.

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum ConfigurationError {
    #[error("no service registered for type `{type_name}`")]
    MissingService { type_name: &'static str },

    #[error("factory for `{type_name}` returned a value of the wrong type")]
    TypeMismatch { type_name: &'static str },

    #[error("invalid configuration value for `{field}`: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

#[derive(Debug, thiserror::Error)]
pub enum NetworkError {
    #[error("invalid URL `{url}`: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("connection failed to `{url}`: {source}")]
    ConnectionFailed {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("request to `{url}` timed out")]
    Timeout { url: String },

    #[error("server error {status_code} from `{url}`")]
    ServerError { url: String, status_code: u16 },

    #[error("client error {status_code} from `{url}`")]
    ClientError { url: String, status_code: u16 },

    #[error("invalid response from `{url}`: {reason}")]
    InvalidResponse { url: String, reason: String },

    #[error("unknown transport error for `{url}`: {reason}")]
    Unknown { url: String, reason: String },
}

impl NetworkError {
    /// Numeric taxonomy code from spec.md §7.
    pub fn code(&self) -> u32 {
        match self {
            Self::ConnectionFailed { .. } => 1001,
            Self::InvalidUrl { .. } => 1002,
            Self::Timeout { .. } => 1003,
            Self::ServerError { .. } => 1004,
            Self::ClientError { .. } => 1005,
            Self::InvalidResponse { .. } => 1006,
            Self::Unknown { .. } => 1007,
        }
    }

    pub fn recovery_suggestion(&self) -> &'static str {
        match self {
            Self::ConnectionFailed { .. } => "check connectivity and retry",
            Self::InvalidUrl { .. } => "validate the URL",
            Self::Timeout { .. } => "retry, or raise the request/resource timeout",
            Self::ServerError { .. } => "retry; the server is likely transiently unavailable",
            Self::ClientError { .. } => "do not retry; the request itself is invalid",
            Self::InvalidResponse { .. } => "contact the server operator",
            Self::Unknown { .. } => "retry",
        }
    }

    pub fn url(&self) -> &str {
        match self {
            Self::InvalidUrl { url, .. }
            | Self::ConnectionFailed { url, .. }
            | Self::Timeout { url, .. }
            | Self::ServerError { url, .. }
            | Self::ClientError { url, .. }
            | Self::InvalidResponse { url, .. }
            | Self::Unknown { url, .. } => url,
        }
    }

    /// Transport-layer classification used by the retry policy (spec.md §4.3).
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ConnectionFailed { .. } | Self::Timeout { .. } | Self::ServerError { .. } | Self::Unknown { .. }
        )
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ParsingError {
    #[error("malformed playlist: {message}")]
    MalformedPlaylist {
        message: String,
        context: Option<String>,
    },

    #[error("decoding error: {message}")]
    Decoding { message: String },

    #[error("invalid tag {tag}: expected {expected}, received {received}")]
    InvalidTag {
        tag: String,
        expected: String,
        received: String,
        context: Option<String>,
    },
}

impl ParsingError {
    pub fn code(&self) -> u32 {
        match self {
            Self::MalformedPlaylist { .. } => 2001,
            Self::Decoding { .. } => 2002,
            Self::InvalidTag { .. } => 2003,
        }
    }

    pub fn missing_required_tag(tag: &str) -> Self {
        Self::MalformedPlaylist {
            message: format!("missing required tag: {tag}"),
            context: None,
        }
    }

    pub fn malformed_playlist(message: impl Into<String>) -> Self {
        Self::MalformedPlaylist {
            message: message.into(),
            context: None,
        }
    }

    pub fn malformed_playlist_at(message: impl Into<String>, line: usize) -> Self {
        Self::MalformedPlaylist {
            message: message.into(),
            context: Some(format!("line {line}")),
        }
    }

    pub fn invalid_tag(
        tag: impl Into<String>,
        expected: impl Into<String>,
        received: impl Into<String>,
    ) -> Self {
        Self::InvalidTag {
            tag: tag.into(),
            expected: expected.into(),
            received: received.into(),
            context: None,
        }
    }

    pub fn invalid_tag_at(
        tag: impl Into<String>,
        expected: impl Into<String>,
        received: impl Into<String>,
        line: usize,
    ) -> Self {
        Self::InvalidTag {
            tag: tag.into(),
            expected: expected.into(),
            received: received.into(),
            context: Some(format!("line {line}")),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FileSystemError {
    #[error("failed to create directory `{}`: {source}", path.display())]
    FailedToCreateDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read `{}`: {source}", path.display())]
    FailedToRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write `{}`: {source}", path.display())]
    FailedToWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("file not found: `{}`", path.display())]
    FileNotFound { path: PathBuf },
}

impl FileSystemError {
    pub fn path(&self) -> &PathBuf {
        match self {
            Self::FailedToCreateDirectory { path, .. }
            | Self::FailedToRead { path, .. }
            | Self::FailedToWrite { path, .. }
            | Self::FileNotFound { path } => path,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ProcessingError {
    #[error("master playlists are not supported by the downloader")]
    MasterPlaylistsNotSupported,

    #[error("playlist resolved to no valid segment URLs")]
    NoValidSegments,

    #[error("no segment files found in `{}`", directory.display())]
    NoSegmentsFound { directory: PathBuf },

    #[error("external concatenation tool exited with {exit_code:?}: {stderr_excerpt}")]
    ExternalToolFailed {
        exit_code: Option<i32>,
        stderr_excerpt: String,
    },

    #[error("operation cancelled: {0}")]
    OperationCancelled(String),

    #[error("{message}")]
    Wrapped {
        code: u32,
        message: String,
        operation: &'static str,
        #[source]
        underlying: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl ProcessingError {
    pub fn code(&self) -> u32 {
        match self {
            Self::MasterPlaylistsNotSupported => 4006,
            Self::NoValidSegments => 4008,
            Self::NoSegmentsFound { .. } => 4007,
            Self::ExternalToolFailed { .. } => 4005,
            Self::OperationCancelled(_) => 4001,
            Self::Wrapped { code, .. } => *code,
        }
    }

    /// Wraps an arbitrary error per spec.md §4.7/§7 ("task execution failed", 4999).
    pub fn wrap(underlying: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Wrapped {
            code: 4999,
            message: "task execution failed".to_string(),
            operation: "task execution",
            underlying: Box::new(underlying),
        }
    }
}

/// Top-level error, used only at the CLI boundary (spec.md §6/§7).
#[derive(Debug, thiserror::Error)]
pub enum HlsDlError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    #[error(transparent)]
    Network(#[from] NetworkError),
    #[error(transparent)]
    Parsing(#[from] ParsingError),
    #[error(transparent)]
    FileSystem(#[from] FileSystemError),
    #[error(transparent)]
    Processing(#[from] ProcessingError),
}

impl HlsDlError {
    /// Human-readable recovery suggestion surfaced to the user (spec.md §7).
    pub fn recovery_suggestion(&self) -> String {
        match self {
            Self::Configuration(_) => "check the configuration values passed to the tool".into(),
            Self::Network(e) => e.recovery_suggestion().into(),
            Self::Parsing(_) => "the playlist does not conform to the expected HLS grammar".into(),
            Self::FileSystem(_) => "check file permissions and available disk space".into(),
            Self::Processing(ProcessingError::ExternalToolFailed { .. }) => {
                "check that the concatenation tool is installed and the path is correct".into()
            }
            Self::Processing(_) => "see the error message for details".into(),
        }
    }
}
