//! C1 — immutable configuration record.
//!
//! Grounded on the teacher's `crates/mesio/src/config.rs::DownloaderConfig`:
//! same default-header-merge rule (caller wins), same normalization-on-build
//! approach, same `builder()` ergonomics.

use std::collections::HashMap;
use std::path::PathBuf;

use crate::error::ConfigurationError;

const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum LogLevel {
    None,
    #[default]
    Error,
    Info,
    Debug,
    Verbose,
    Trace,
}

/// Case-insensitive header map, keyed by lowercase header name.
#[derive(Debug, Clone, Default)]
pub struct HeaderSet(HashMap<String, String>);

impl HeaderSet {
    pub fn new() -> Self {
        Self(HashMap::new())
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.insert(name.into().to_ascii_lowercase(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Merges `overrides` on top of `self`; overrides win on key collision.
    pub fn merged_with(&self, overrides: &HeaderSet) -> HeaderSet {
        let mut merged = self.clone();
        for (k, v) in overrides.iter() {
            merged.0.insert(k.to_string(), v.to_string());
        }
        merged
    }

    fn default_set() -> HeaderSet {
        let mut set = HeaderSet::new();
        set.insert("User-Agent", DEFAULT_USER_AGENT);
        set.insert("Accept", "*/*");
        set.insert("Accept-Language", "en-US,en;q=0.9");
        set.insert("Cache-Control", "no-cache");
        set.insert("Connection", "keep-alive");
        set
    }
}

#[derive(Debug, Clone)]
pub struct Configuration {
    pub tool_concat_path: Option<PathBuf>,
    pub default_headers: HeaderSet,
    pub max_concurrent_downloads: usize,
    pub request_timeout: f64,
    pub resource_timeout: f64,
    pub retry_attempts: u32,
    pub retry_backoff_base: f64,
    pub log_level: LogLevel,
}

impl Configuration {
    pub fn builder() -> ConfigurationBuilder {
        ConfigurationBuilder::default()
    }

    /// `crates/mesio/src/config.rs`'s `performance_defaults` equivalent.
    pub fn performance_defaults() -> Self {
        Configuration::builder()
            .max_concurrent_downloads(20)
            .request_timeout(60.0)
            .resource_timeout(120.0)
            .retry_attempts(2)
            .retry_backoff_base(0.4)
            .log_level(LogLevel::Error)
            .build()
    }

    /// `max_concurrent_tasks` default used by C7 when not explicitly set.
    pub fn default_max_concurrent_tasks(&self) -> usize {
        (self.max_concurrent_downloads / 4).max(1)
    }
}

pub struct ConfigurationBuilder {
    tool_concat_path: Option<PathBuf>,
    headers: HeaderSet,
    max_concurrent_downloads: usize,
    request_timeout: f64,
    resource_timeout: Option<f64>,
    retry_attempts: u32,
    retry_backoff_base: f64,
    log_level: LogLevel,
}

impl Default for ConfigurationBuilder {
    fn default() -> Self {
        Self {
            tool_concat_path: None,
            headers: HeaderSet::new(),
            max_concurrent_downloads: 20,
            request_timeout: 60.0,
            resource_timeout: None,
            retry_attempts: 2,
            retry_backoff_base: 0.4,
            log_level: LogLevel::Error,
        }
    }
}

impl ConfigurationBuilder {
    pub fn tool_concat_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.tool_concat_path = Some(path.into());
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn max_concurrent_downloads(mut self, n: usize) -> Self {
        self.max_concurrent_downloads = n.max(1);
        self
    }

    pub fn request_timeout(mut self, seconds: f64) -> Self {
        self.request_timeout = seconds.max(0.0);
        self
    }

    pub fn resource_timeout(mut self, seconds: f64) -> Self {
        self.resource_timeout = Some(seconds.max(0.0));
        self
    }

    pub fn retry_attempts(mut self, n: u32) -> Self {
        self.retry_attempts = n;
        self
    }

    pub fn retry_backoff_base(mut self, seconds: f64) -> Self {
        self.retry_backoff_base = seconds;
        self
    }

    pub fn log_level(mut self, level: LogLevel) -> Self {
        self.log_level = level;
        self
    }

    pub fn build(self) -> Configuration {
        let default_headers = HeaderSet::default_set().merged_with(&self.headers);
        Configuration {
            tool_concat_path: self.tool_concat_path,
            default_headers,
            max_concurrent_downloads: self.max_concurrent_downloads,
            request_timeout: self.request_timeout,
            resource_timeout: self.resource_timeout.unwrap_or(self.request_timeout),
            retry_attempts: self.retry_attempts,
            retry_backoff_base: self.retry_backoff_base.max(0.0),
            log_level: self.log_level,
        }
    }

    /// Fallible variant surfacing `ConfigurationError::InvalidValue` for
    /// callers (e.g. the CLI) that parse these values from untrusted input.
    pub fn try_build(self) -> Result<Configuration, ConfigurationError> {
        if !self.request_timeout.is_finite() {
            return Err(ConfigurationError::InvalidValue {
                field: "request_timeout",
                reason: "must be a finite number".to_string(),
            });
        }
        if self.max_concurrent_downloads == 0 {
            return Err(ConfigurationError::InvalidValue {
                field: "max_concurrent_downloads",
                reason: "must be positive".to_string(),
            });
        }
        Ok(self.build())
    }
}
