//! Configuration types for the telemetry layer.
//!
//! These are the sink-specific sub-configs referenced from the pipeline
//! configuration in `kinetrain-ml`.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Which transport delivers progress records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SinkKind {
    /// Kinesis Data Streams `PutRecord`.
    #[default]
    Kinesis,
    /// Kinesis Data Firehose `PutRecord`.
    Firehose,
    /// Append one JSON document per line to a local file.
    Jsonl,
    /// Acknowledge every record without delivering it anywhere.
    Disabled,
}

impl SinkKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Kinesis => "kinesis",
            Self::Firehose => "firehose",
            Self::Jsonl => "jsonl",
            Self::Disabled => "disabled",
        }
    }
}

/// What the orchestrator does once a delivery has failed for good.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Log the failure and move on to the next epoch.
    #[default]
    Continue,
    /// Stop the run and surface the failure.
    Abort,
}

impl FailurePolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Continue => "continue",
            Self::Abort => "abort",
        }
    }
}

/// Exponential backoff settings for sink delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Retries after the first attempt (0 disables retrying).
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
    /// Add up to 25% random jitter to each delay.
    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: true,
        }
    }
}

fn default_max_retries() -> u32 {
    3
}

fn default_initial_backoff_ms() -> u64 {
    200
}

fn default_max_backoff_ms() -> u64 {
    5_000
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_true() -> bool {
    true
}

/// Telemetry sink configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    #[serde(default)]
    pub sink: SinkKind,
    /// Stream (or delivery stream) name.
    #[serde(default = "default_stream_name")]
    pub stream_name: String,
    #[serde(default = "default_region")]
    pub region: String,
    /// Endpoint override, e.g. a local emulator. Defaults to the regional AWS endpoint.
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Every record is written under this key so all records share one shard.
    #[serde(default = "default_partition_key")]
    pub partition_key: String,
    /// Per-attempt delivery timeout.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub on_failure: FailurePolicy,
    /// Output file for the `jsonl` sink.
    #[serde(default = "default_jsonl_path")]
    pub jsonl_path: PathBuf,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            sink: SinkKind::default(),
            stream_name: default_stream_name(),
            region: default_region(),
            endpoint: None,
            partition_key: default_partition_key(),
            timeout_ms: default_timeout_ms(),
            retry: RetryConfig::default(),
            on_failure: FailurePolicy::default(),
            jsonl_path: default_jsonl_path(),
        }
    }
}

fn default_stream_name() -> String {
    "training-progress".to_string()
}

fn default_region() -> String {
    "eu-west-3".to_string()
}

fn default_partition_key() -> String {
    "partition".to_string()
}

fn default_timeout_ms() -> u64 {
    10_000
}

fn default_jsonl_path() -> PathBuf {
    PathBuf::from("progress.jsonl")
}

impl TelemetryConfig {
    /// Reject settings that would only fail later, at delivery time.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.sink {
            SinkKind::Kinesis | SinkKind::Firehose => {
                if self.stream_name.trim().is_empty() {
                    return Err(ConfigError::missing("telemetry.stream_name"));
                }
                if self.region.trim().is_empty() {
                    return Err(ConfigError::missing("telemetry.region"));
                }
                if self.sink == SinkKind::Kinesis && self.partition_key.is_empty() {
                    return Err(ConfigError::missing("telemetry.partition_key"));
                }
            }
            SinkKind::Jsonl => {
                if self.jsonl_path.as_os_str().is_empty() {
                    return Err(ConfigError::missing("telemetry.jsonl_path"));
                }
            }
            SinkKind::Disabled => {}
        }
        if self.timeout_ms == 0 {
            return Err(ConfigError::invalid("telemetry.timeout_ms must be positive"));
        }
        if self.retry.backoff_multiplier < 1.0 {
            return Err(ConfigError::invalid(
                "telemetry.retry.backoff_multiplier must be >= 1.0",
            ));
        }
        if self.retry.initial_backoff_ms > self.retry.max_backoff_ms {
            return Err(ConfigError::invalid(
                "telemetry.retry.initial_backoff_ms exceeds max_backoff_ms",
            ));
        }
        Ok(())
    }
}
