//! Pipeline configuration.
//!
//! Queue sizing, worker count, the optional transcription deadline, and the
//! locations of the recording store and transcription service.

use std::time::Duration;
use thiserror::Error;

use crate::scheduler::WorkerPoolConfig;

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An environment variable has an invalid value.
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    /// Configuration validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

/// Configuration for the transcription pipeline.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    // Scheduling
    /// Maximum number of jobs buffered in the queue.
    pub queue_capacity: usize,
    /// Number of concurrent workers.
    pub num_workers: usize,
    /// Deadline for one transcription call. `None` waits indefinitely.
    pub transcription_timeout: Option<Duration>,
    /// Mark leftover `Transcribing` recordings as `Failed` when the pipeline
    /// is opened, before any admission.
    pub fail_orphaned_on_start: bool,

    // Collaborators
    /// SQLite connection URL for the recording store.
    pub database_url: String,
    /// Endpoint of the transcription service.
    pub transcriber_url: String,
    /// Bearer token for the transcription service.
    pub transcriber_api_key: Option<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 100,
            num_workers: 4,
            transcription_timeout: None,
            fail_orphaned_on_start: false,

            database_url: "sqlite://recordings.db".to_string(),
            transcriber_url: "http://localhost:9000/transcribe".to_string(),
            transcriber_api_key: None,
        }
    }
}

impl PipelineConfig {
    /// Creates a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `TRANSCRIBE_QUEUE_CAPACITY`: Queue capacity (default: 100)
    /// - `TRANSCRIBE_WORKERS`: Worker count (default: 4)
    /// - `TRANSCRIBE_TIMEOUT_SECS`: Transcription deadline, 0 disables (default: 0)
    /// - `TRANSCRIBE_FAIL_ORPHANED_ON_START`: Fail leftover jobs at startup (default: false)
    /// - `DATABASE_URL`: SQLite URL (default: sqlite://recordings.db)
    /// - `TRANSCRIBER_URL`: Transcription endpoint (default: http://localhost:9000/transcribe)
    /// - `TRANSCRIBER_API_KEY`: Bearer token (optional)
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable cannot be parsed or the result
    /// fails validation.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Builds configuration from an arbitrary variable source.
    fn from_vars(var: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(val) = var("TRANSCRIBE_QUEUE_CAPACITY") {
            config.queue_capacity = parse_env_value(&val, "TRANSCRIBE_QUEUE_CAPACITY")?;
        }

        if let Some(val) = var("TRANSCRIBE_WORKERS") {
            config.num_workers = parse_env_value(&val, "TRANSCRIBE_WORKERS")?;
        }

        if let Some(val) = var("TRANSCRIBE_TIMEOUT_SECS") {
            let secs: u64 = parse_env_value(&val, "TRANSCRIBE_TIMEOUT_SECS")?;
            config.transcription_timeout = (secs > 0).then(|| Duration::from_secs(secs));
        }

        if let Some(val) = var("TRANSCRIBE_FAIL_ORPHANED_ON_START") {
            config.fail_orphaned_on_start =
                parse_env_bool(&val, "TRANSCRIBE_FAIL_ORPHANED_ON_START")?;
        }

        if let Some(val) = var("DATABASE_URL") {
            config.database_url = val;
        }

        if let Some(val) = var("TRANSCRIBER_URL") {
            config.transcriber_url = val;
        }

        config.transcriber_api_key = var("TRANSCRIBER_API_KEY").filter(|key| !key.is_empty());

        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationFailed` if any values are invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.queue_capacity == 0 {
            return Err(ConfigError::ValidationFailed(
                "queue_capacity must be greater than 0".to_string(),
            ));
        }

        if self.num_workers == 0 {
            return Err(ConfigError::ValidationFailed(
                "num_workers must be greater than 0".to_string(),
            ));
        }

        if self.transcription_timeout == Some(Duration::ZERO) {
            return Err(ConfigError::ValidationFailed(
                "transcription_timeout must be greater than 0 when set".to_string(),
            ));
        }

        if self.database_url.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "database_url cannot be empty".to_string(),
            ));
        }

        if self.transcriber_url.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "transcriber_url cannot be empty".to_string(),
            ));
        }

        Ok(())
    }

    /// Worker pool settings derived from this configuration.
    pub fn worker_pool_config(&self) -> WorkerPoolConfig {
        let config = WorkerPoolConfig::new(self.num_workers);
        match self.transcription_timeout {
            Some(timeout) => config.with_transcription_timeout(timeout),
            None => config,
        }
    }

    /// Builder method to set queue capacity.
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// Builder method to set the worker count.
    pub fn with_num_workers(mut self, workers: usize) -> Self {
        self.num_workers = workers;
        self
    }

    /// Builder method to set the transcription deadline.
    pub fn with_transcription_timeout(mut self, timeout: Duration) -> Self {
        self.transcription_timeout = Some(timeout);
        self
    }

    pub fn with_fail_orphaned_on_start(mut self, enabled: bool) -> Self {
        self.fail_orphaned_on_start = enabled;
        self
    }

    /// Builder method to set database URL.
    pub fn with_database_url(mut self, url: impl Into<String>) -> Self {
        self.database_url = url.into();
        self
    }

    /// Builder method to set the transcription endpoint.
    pub fn with_transcriber_url(mut self, url: impl Into<String>) -> Self {
        self.transcriber_url = url.into();
        self
    }

    pub fn with_transcriber_api_key(mut self, key: impl Into<String>) -> Self {
        self.transcriber_api_key = Some(key.into());
        self
    }
}

/// Parse an environment variable value into a type.
fn parse_env_value<T: std::str::FromStr>(value: &str, key: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("could not parse '{}'", value),
    })
}

/// Parse an environment variable as a boolean.
fn parse_env_bool(value: &str, key: &str) -> Result<bool, ConfigError> {
    match value.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("expected boolean value, got '{}'", value),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn from_map(pairs: &[(&str, &str)]) -> Result<PipelineConfig, ConfigError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        PipelineConfig::from_vars(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_default_config() {
        let config = PipelineConfig::default();
        assert_eq!(config.queue_capacity, 100);
        assert_eq!(config.num_workers, 4);
        assert!(config.transcription_timeout.is_none());
        assert!(!config.fail_orphaned_on_start);
        assert_eq!(config.database_url, "sqlite://recordings.db");
        assert_eq!(config.transcriber_url, "http://localhost:9000/transcribe");
        assert!(config.transcriber_api_key.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_builder() {
        let config = PipelineConfig::new()
            .with_queue_capacity(10)
            .with_num_workers(2)
            .with_transcription_timeout(Duration::from_secs(300))
            .with_fail_orphaned_on_start(true)
            .with_database_url("sqlite::memory:")
            .with_transcriber_url("http://asr:8080/v1/transcribe")
            .with_transcriber_api_key("secret");

        assert_eq!(config.queue_capacity, 10);
        assert_eq!(config.num_workers, 2);
        assert_eq!(config.transcription_timeout, Some(Duration::from_secs(300)));
        assert!(config.fail_orphaned_on_start);
        assert_eq!(config.database_url, "sqlite::memory:");
        assert_eq!(config.transcriber_url, "http://asr:8080/v1/transcribe");
        assert_eq!(config.transcriber_api_key.as_deref(), Some("secret"));

        let pool = config.worker_pool_config();
        assert_eq!(pool.num_workers, 2);
        assert_eq!(pool.transcription_timeout, Some(Duration::from_secs(300)));
    }

    #[test]
    fn test_from_vars_overrides() {
        let config = from_map(&[
            ("TRANSCRIBE_QUEUE_CAPACITY", "25"),
            ("TRANSCRIBE_WORKERS", " 8 "),
            ("TRANSCRIBE_TIMEOUT_SECS", "120"),
            ("TRANSCRIBE_FAIL_ORPHANED_ON_START", "yes"),
            ("DATABASE_URL", "sqlite:///var/lib/rec.db"),
            ("TRANSCRIBER_API_KEY", "k-123"),
        ])
        .unwrap();

        assert_eq!(config.queue_capacity, 25);
        assert_eq!(config.num_workers, 8);
        assert_eq!(config.transcription_timeout, Some(Duration::from_secs(120)));
        assert!(config.fail_orphaned_on_start);
        assert_eq!(config.database_url, "sqlite:///var/lib/rec.db");
        assert_eq!(config.transcriber_api_key.as_deref(), Some("k-123"));
    }

    #[test]
    fn test_zero_timeout_disables_deadline() {
        let config = from_map(&[("TRANSCRIBE_TIMEOUT_SECS", "0")]).unwrap();
        assert!(config.transcription_timeout.is_none());
        assert!(config.worker_pool_config().transcription_timeout.is_none());
    }

    #[test]
    fn test_empty_api_key_is_ignored() {
        let config = from_map(&[("TRANSCRIBER_API_KEY", "")]).unwrap();
        assert!(config.transcriber_api_key.is_none());
    }

    #[test]
    fn test_unparseable_value() {
        let err = from_map(&[("TRANSCRIBE_WORKERS", "many")]).unwrap_err();
        assert!(err.to_string().contains("TRANSCRIBE_WORKERS"));
        assert!(err.to_string().contains("many"));
    }

    #[test]
    fn test_validation_zero_capacity() {
        let result = PipelineConfig::default().with_queue_capacity(0).validate();
        assert!(result.unwrap_err().to_string().contains("queue_capacity"));

        let err = from_map(&[("TRANSCRIBE_QUEUE_CAPACITY", "0")]).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationFailed(_)));
    }

    #[test]
    fn test_validation_zero_workers() {
        let result = PipelineConfig::default().with_num_workers(0).validate();
        assert!(result.unwrap_err().to_string().contains("num_workers"));
    }

    #[test]
    fn test_validation_zero_timeout() {
        let result = PipelineConfig::default()
            .with_transcription_timeout(Duration::ZERO)
            .validate();
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("transcription_timeout"));
    }

    #[test]
    fn test_validation_empty_urls() {
        let result = PipelineConfig::default().with_database_url("").validate();
        assert!(result.unwrap_err().to_string().contains("database_url"));

        let result = PipelineConfig::default().with_transcriber_url("").validate();
        assert!(result.unwrap_err().to_string().contains("transcriber_url"));
    }

    #[test]
    fn test_parse_env_bool() {
        assert!(parse_env_bool("true", "test").unwrap());
        assert!(parse_env_bool("1", "test").unwrap());
        assert!(parse_env_bool("ON", "test").unwrap());

        assert!(!parse_env_bool("false", "test").unwrap());
        assert!(!parse_env_bool("0", "test").unwrap());
        assert!(!parse_env_bool("no", "test").unwrap());

        assert!(parse_env_bool("maybe", "test").is_err());
    }
}
