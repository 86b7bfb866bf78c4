//! # kinetrain core
//!
//! Plumbing shared by the training pipeline: the telemetry sink client and its
//! transports, the retry policy that wraps network delivery, atomic file
//! persistence and the error types that cross crate boundaries.

pub mod config;
pub mod error;
pub mod persistence;
pub mod retry;
pub mod telemetry;

// Re-export commonly used types at the crate root.
pub use config::{FailurePolicy, RetryConfig, SinkKind, TelemetryConfig};
pub use error::{ConfigError, SinkError};
pub use retry::with_retry;
pub use telemetry::{
    DeliveryAck, ProgressRecord, ProgressSink, RecordTransport, TelemetryClient, build_transport,
};
