//! Error types for the kinetrain-ml crate.

use kinetrain_core::{ConfigError, SinkError};
use std::fmt;
use thiserror::Error;

/// Top-level error type for ML operations.
#[derive(Debug, Error)]
pub enum MlError {
    #[error("Dataset error: {0}")]
    Dataset(String),

    #[error("Training error: {0}")]
    Training(String),

    #[error("Evaluation error: {0}")]
    Evaluation(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Model error: {0}")]
    Model(String),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Sink delivery error: {0}")]
    Sink(#[from] SinkError),

    #[error("Cancelled: {0}")]
    Cancelled(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl MlError {
    pub fn dataset(msg: impl Into<String>) -> Self {
        Self::Dataset(msg.into())
    }

    pub fn training(msg: impl Into<String>) -> Self {
        Self::Training(msg.into())
    }

    pub fn evaluation(msg: impl Into<String>) -> Self {
        Self::Evaluation(msg.into())
    }

    pub fn persistence(msg: impl Into<String>) -> Self {
        Self::Persistence(msg.into())
    }

    pub fn model(msg: impl Into<String>) -> Self {
        Self::Model(msg.into())
    }
}

/// Pipeline stage an error is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Loading,
    Training,
    Evaluating,
    Emitting,
    Persisting,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Loading => "loading",
            Stage::Training => "training",
            Stage::Evaluating => "evaluating",
            Stage::Emitting => "emitting",
            Stage::Persisting => "persisting",
        };
        f.write_str(name)
    }
}

/// A fatal error with the stage and epoch it happened in.
#[derive(Debug)]
pub struct StageError {
    pub stage: Stage,
    pub epoch: Option<usize>,
    pub source: MlError,
}

impl StageError {
    pub fn new(stage: Stage, epoch: Option<usize>, source: MlError) -> Self {
        Self {
            stage,
            epoch,
            source,
        }
    }

    pub fn at_epoch(stage: Stage, epoch: usize, source: MlError) -> Self {
        Self::new(stage, Some(epoch), source)
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self.source, MlError::Cancelled(_))
    }
}

impl fmt::Display for StageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.epoch {
            Some(epoch) => write!(f, "{} failed at epoch {epoch}: {}", self.stage, self.source),
            None => write!(f, "{} failed: {}", self.stage, self.source),
        }
    }
}

impl std::error::Error for StageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}
