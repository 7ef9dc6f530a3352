//! HLS playlist parsing, concurrent segment download, and VOD concatenation.
//!
//! `Services` is the explicit, owned alternative to a process-wide registry
//! (spec.md §9 redesign note #1): it is built once at startup and handed by
//! reference into the orchestrator, while `registry::ServiceRegistry`
//! remains available for substituting test doubles.

pub mod concat;
pub mod config;
pub mod downloader;
pub mod error;
pub mod http;
pub mod playlist;
pub mod registry;
pub mod retry;
pub mod task;

use std::sync::Arc;

pub use config::Configuration;
pub use error::{ConfigurationError, FileSystemError, HlsDlError, NetworkError, ParsingError, ProcessingError};
pub use http::HttpClient;
pub use task::{TaskOrchestrator, TaskRequest, TaskSource, TaskStatus};

/// Long-lived collaborators constructed once per process and shared by
/// reference, replacing the teacher's global DI container.
pub struct Services {
    pub config: Configuration,
    pub http: Arc<HttpClient>,
}

impl Services {
    pub fn new(config: Configuration) -> Result<Self, NetworkError> {
        let http = Arc::new(HttpClient::new(&config)?);
        Ok(Self { config, http })
    }

    pub fn orchestrator(&self) -> Result<TaskOrchestrator, ProcessingError> {
        TaskOrchestrator::new(self.config.clone(), self.http.clone())
    }
}
