//! Pipeline configuration
//!
//! A `Config` is built once (in code or from a YAML file) and never mutated.
//! Reconfiguring a pipeline means handing it a new `Config`.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use url::Url;

use crate::model::{Severity, SignalKind};

/// Errors that make a configuration unusable
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(String),

    #[error("Failed to parse config YAML: {0}")]
    ParseError(String),

    #[error("Missing endpoint")]
    MissingEndpoint,

    #[error("Invalid endpoint '{0}': {1}")]
    InvalidEndpoint(String, String),

    #[error("API key is set but empty")]
    EmptyApiKey,

    #[error("Validation error: {0}")]
    ValidationError(String),
}

/// How signal kinds map onto collector URLs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EndpointLayout {
    /// `{endpoint}/v1/logs`, `{endpoint}/v1/traces`, `{endpoint}/v1/metrics`
    #[default]
    PerSignal,
    /// Every kind is posted to `endpoint` unchanged
    Combined,
}

/// Delivery pipeline configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Master switch; a disabled pipeline accepts and discards items
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Collector base URL
    #[serde(default)]
    pub endpoint: String,
    #[serde(default)]
    pub endpoint_layout: EndpointLayout,
    /// Sent as `x-api-key` when present
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Items per request, and the lane length that triggers a flush
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_batch_interval_ms")]
    pub batch_interval_ms: u64,
    /// Extra attempts after the first one for transient failures
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
    /// Ceiling for a single backoff wait
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
    /// Per-request timeout
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Per-kind queue bound
    #[serde(default = "default_max_queue_size")]
    pub max_queue_size: usize,
    /// Route error logs and error spans through the priority lane
    #[serde(default = "default_true")]
    pub prioritize_errors: bool,
    /// Logs below this severity are not synced
    #[serde(default)]
    pub sync_minimum_severity: Severity,
    /// Upper bound for the final flush at shutdown
    #[serde(default = "default_shutdown_timeout_ms")]
    pub shutdown_timeout_ms: u64,
    /// Delay between a priority enqueue and the flush it triggers
    #[serde(default = "default_priority_flush_delay_ms")]
    pub priority_flush_delay_ms: u64,
    /// Instrumentation scope name in the envelope
    #[serde(default = "default_scope_name")]
    pub scope_name: String,
}

fn default_true() -> bool {
    true
}

fn default_batch_size() -> usize {
    50
}

fn default_batch_interval_ms() -> u64 {
    5_000
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_base_delay_ms() -> u64 {
    1_000
}

fn default_max_backoff_ms() -> u64 {
    30_000
}

fn default_timeout_ms() -> u64 {
    10_000
}

fn default_max_queue_size() -> usize {
    1_000
}

fn default_shutdown_timeout_ms() -> u64 {
    5_000
}

fn default_priority_flush_delay_ms() -> u64 {
    50
}

fn default_scope_name() -> String {
    env!("CARGO_PKG_NAME").to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: String::new(),
            endpoint_layout: EndpointLayout::default(),
            api_key: None,
            batch_size: default_batch_size(),
            batch_interval_ms: default_batch_interval_ms(),
            max_retries: default_max_retries(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            timeout_ms: default_timeout_ms(),
            max_queue_size: default_max_queue_size(),
            prioritize_errors: true,
            sync_minimum_severity: Severity::default(),
            shutdown_timeout_ms: default_shutdown_timeout_ms(),
            priority_flush_delay_ms: default_priority_flush_delay_ms(),
            scope_name: default_scope_name(),
        }
    }
}

impl Config {
    /// Configuration for the given collector with defaults everywhere else
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..Default::default()
        }
    }

    /// Load a configuration from a YAML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::IoError(e.to_string()))?;
        Self::from_yaml(&content)
    }

    /// Parse a configuration from YAML. Validation is separate so that an
    /// invalid file can still produce a disabled pipeline.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(yaml).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.parsed_endpoint()?;

        if let Some(ref key) = self.api_key {
            if key.trim().is_empty() {
                return Err(ConfigError::EmptyApiKey);
            }
        }

        if self.batch_size == 0 {
            return Err(ConfigError::ValidationError(
                "batch_size must be greater than zero".to_string(),
            ));
        }

        if self.max_queue_size == 0 {
            return Err(ConfigError::ValidationError(
                "max_queue_size must be greater than zero".to_string(),
            ));
        }

        if self.timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "timeout_ms must be greater than zero".to_string(),
            ));
        }

        if self.batch_interval_ms == 0 {
            return Err(ConfigError::ValidationError(
                "batch_interval_ms must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }

    fn parsed_endpoint(&self) -> Result<Url, ConfigError> {
        let raw = self.endpoint.trim();
        if raw.is_empty() {
            return Err(ConfigError::MissingEndpoint);
        }

        let url = Url::parse(raw)
            .map_err(|e| ConfigError::InvalidEndpoint(raw.to_string(), e.to_string()))?;

        match url.scheme() {
            "http" | "https" => Ok(url),
            other => Err(ConfigError::InvalidEndpoint(
                raw.to_string(),
                format!("unsupported scheme '{}'", other),
            )),
        }
    }

    /// URL that batches of `kind` are posted to
    pub fn endpoint_for(&self, kind: SignalKind) -> String {
        let base = self.endpoint.trim();
        match self.endpoint_layout {
            EndpointLayout::Combined => base.to_string(),
            EndpointLayout::PerSignal => {
                format!("{}{}", base.trim_end_matches('/'), kind.path())
            }
        }
    }

    pub fn batch_interval(&self) -> Duration {
        Duration::from_millis(self.batch_interval_ms)
    }

    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }

    pub fn priority_flush_delay(&self) -> Duration {
        Duration::from_millis(self.priority_flush_delay_ms)
    }
}
