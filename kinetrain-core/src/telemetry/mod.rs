//! Telemetry sink client: progress records delivered to an append-only stream.
//!
//! The orchestrator only sees [`ProgressSink`]. [`TelemetryClient`] implements it
//! on top of a [`RecordTransport`], adding record construction, a per-attempt
//! timeout and the retry policy, so a caller observes one final outcome per epoch.

pub mod jsonl;
pub mod kinesis;
pub mod sigv4;

use crate::config::{RetryConfig, SinkKind, TelemetryConfig};
use crate::error::SinkError;
use crate::retry::with_retry;
use async_trait::async_trait;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

pub use jsonl::{DisabledTransport, JsonlTransport};
pub use kinesis::{KinesisApi, KinesisTransport};
pub use sigv4::AwsCredentials;

/// Timestamp layout used in progress records.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// One progress record per evaluated epoch. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressRecord {
    timestamp: String,
    epoch: usize,
    accuracy: f64,
    message: String,
}

impl ProgressRecord {
    /// Record stamped with the current local wall-clock time.
    pub fn new(epoch: usize, accuracy: f64) -> Self {
        Self::at(chrono::Local::now().naive_local(), epoch, accuracy)
    }

    /// Record stamped with an explicit time.
    pub fn at(time: NaiveDateTime, epoch: usize, accuracy: f64) -> Self {
        Self {
            timestamp: time.format(TIMESTAMP_FORMAT).to_string(),
            epoch,
            accuracy,
            message: format!("Training at epoch {epoch} - Accuracy: {accuracy:?}"),
        }
    }

    pub fn timestamp(&self) -> &str {
        &self.timestamp
    }

    pub fn epoch(&self) -> usize {
        self.epoch
    }

    pub fn accuracy(&self) -> f64 {
        self.accuracy
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// JSON payload delivered to the sink.
    pub fn to_payload(&self) -> Result<Vec<u8>, SinkError> {
        Ok(serde_json::to_vec(self)?)
    }
}

/// Confirmation returned by the sink once a record has been accepted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryAck {
    pub sink: String,
    pub stream: String,
    pub shard_id: Option<String>,
    pub sequence_number: Option<String>,
    pub record_id: Option<String>,
    /// Attempts it took, retries included.
    pub attempts: u32,
}

impl fmt::Display for DeliveryAck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} '{}'", self.sink, self.stream)?;
        if let Some(shard) = &self.shard_id {
            write!(f, " shard={shard}")?;
        }
        if let Some(seq) = &self.sequence_number {
            write!(f, " seq={seq}")?;
        }
        if let Some(id) = &self.record_id {
            write!(f, " record={id}")?;
        }
        write!(f, " attempts={}", self.attempts)
    }
}

/// A transport moves an opaque payload to the external stream.
#[async_trait]
pub trait RecordTransport: Send + Sync {
    fn name(&self) -> &str;

    async fn put_record(&self, payload: &[u8], partition_key: &str) -> Result<DeliveryAck, SinkError>;
}

/// What the orchestrator depends on: emit one epoch's progress, get one outcome.
#[async_trait]
pub trait ProgressSink: Send + Sync {
    async fn emit(&self, epoch: usize, accuracy: f64) -> Result<DeliveryAck, SinkError>;
}

/// Telemetry sink client.
pub struct TelemetryClient {
    transport: Box<dyn RecordTransport>,
    partition_key: String,
    timeout: Duration,
    retry: RetryConfig,
}

impl TelemetryClient {
    pub fn new(transport: Box<dyn RecordTransport>, config: &TelemetryConfig) -> Self {
        Self {
            transport,
            partition_key: config.partition_key.clone(),
            timeout: Duration::from_millis(config.timeout_ms),
            retry: config.retry.clone(),
        }
    }

    /// Build the client with the transport selected by `config.sink`.
    pub fn from_config(config: &TelemetryConfig) -> Result<Self, SinkError> {
        Ok(Self::new(build_transport(config)?, config))
    }

    pub fn transport_name(&self) -> &str {
        self.transport.name()
    }

    /// Deliver an already built record.
    pub async fn deliver(&self, record: ProgressRecord) -> Result<DeliveryAck, SinkError> {
        let payload = record.to_payload()?;
        let payload = payload.as_slice();
        let transport = self.transport.as_ref();
        let partition_key = self.partition_key.as_str();
        let timeout = self.timeout;

        let (mut ack, attempts) = with_retry(&self.retry, || async move {
            match tokio::time::timeout(timeout, transport.put_record(payload, partition_key)).await {
                Ok(result) => result,
                Err(_) => Err(SinkError::Timeout {
                    sink: transport.name().to_string(),
                    timeout_ms: timeout.as_millis() as u64,
                }),
            }
        })
        .await?;

        ack.attempts = attempts;
        tracing::debug!(
            sink = self.transport.name(),
            epoch = record.epoch(),
            attempts,
            "Progress record delivered"
        );
        Ok(ack)
    }
}

#[async_trait]
impl ProgressSink for TelemetryClient {
    async fn emit(&self, epoch: usize, accuracy: f64) -> Result<DeliveryAck, SinkError> {
        self.deliver(ProgressRecord::new(epoch, accuracy)).await
    }
}

/// Select and construct the transport for a configuration.
pub fn build_transport(config: &TelemetryConfig) -> Result<Box<dyn RecordTransport>, SinkError> {
    let transport: Box<dyn RecordTransport> = match config.sink {
        SinkKind::Kinesis | SinkKind::Firehose => {
            let api = if config.sink == SinkKind::Kinesis {
                KinesisApi::Streams
            } else {
                KinesisApi::Firehose
            };
            Box::new(KinesisTransport::new(
                api,
                config.stream_name.clone(),
                config.region.clone(),
                config.endpoint.clone(),
                AwsCredentials::from_env()?,
            ))
        }
        SinkKind::Jsonl => Box::new(JsonlTransport::new(config.jsonl_path.clone())),
        SinkKind::Disabled => Box::new(DisabledTransport),
    };
    tracing::info!(
        sink = config.sink.as_str(),
        stream = %config.stream_name,
        region = %config.region,
        "Telemetry transport ready"
    );
    Ok(transport)
}
