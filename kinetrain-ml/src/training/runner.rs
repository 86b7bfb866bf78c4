//! Training runner: the epoch loop.
//!
//! Each epoch retrains from scratch, scores the model on the held-out
//! partition and emits one progress record. After the last epoch the latest
//! model is persisted. Training, evaluation and persistence failures end the
//! run; sink failures only end it under [`FailurePolicy::Abort`].

use crate::config::PipelineConfig;
use crate::data::SplitDataset;
use crate::error::{MlError, Stage, StageError};
use crate::training::artifact::ModelArtifact;
use crate::training::callbacks::{NoopCallback, RunCallback};
use crate::training::metrics::{TrainingMetrics, evaluate};
use crate::training::trainer::{GridSearchTrainer, TrainedModel, Trainer};
use kinetrain_core::{DeliveryAck, FailurePolicy, ProgressSink, TelemetryClient};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Where the runner is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RunState {
    Idle,
    Training { epoch: usize },
    Evaluating { epoch: usize },
    Emitting { epoch: usize },
    Done,
    Persisting,
    Terminated,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => f.write_str("idle"),
            Self::Training { epoch } => write!(f, "training({epoch})"),
            Self::Evaluating { epoch } => write!(f, "evaluating({epoch})"),
            Self::Emitting { epoch } => write!(f, "emitting({epoch})"),
            Self::Done => f.write_str("done"),
            Self::Persisting => f.write_str("persisting"),
            Self::Terminated => f.write_str("terminated"),
        }
    }
}

/// The parts of the configuration the loop itself needs.
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub run_id: String,
    pub epochs: usize,
    pub model_path: PathBuf,
    pub on_failure: FailurePolicy,
}

impl RunSettings {
    pub fn new(epochs: usize, model_path: impl Into<PathBuf>) -> Self {
        Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            epochs,
            model_path: model_path.into(),
            on_failure: FailurePolicy::default(),
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            on_failure: config.telemetry.on_failure,
            ..Self::new(config.training.epochs, config.output.model_path.clone())
        }
    }

    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.on_failure = policy;
        self
    }
}

/// A progress record the sink did not accept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SinkFailure {
    pub epoch: usize,
    pub error: String,
}

/// Summary of a finished run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: String,
    pub epochs_completed: usize,
    pub metrics: TrainingMetrics,
    pub acks: Vec<DeliveryAck>,
    pub sink_failures: Vec<SinkFailure>,
    pub artifact_path: Option<PathBuf>,
    pub artifact_bytes: u64,
    /// The run stopped early on request and persisted what it had.
    pub cancelled: bool,
}

impl RunReport {
    fn new(run_id: &str) -> Self {
        Self {
            run_id: run_id.to_string(),
            epochs_completed: 0,
            metrics: TrainingMetrics::default(),
            acks: Vec::new(),
            sink_failures: Vec::new(),
            artifact_path: None,
            artifact_bytes: 0,
            cancelled: false,
        }
    }

    pub fn accuracies(&self) -> &[f64] {
        &self.metrics.accuracy_history
    }
}

/// Drives epochs of train, evaluate and emit, then persists the latest model.
pub struct TrainingRunner {
    trainer: Arc<dyn Trainer>,
    sink: Arc<dyn ProgressSink>,
    settings: RunSettings,
    callback: Arc<dyn RunCallback>,
    state: RunState,
}

impl TrainingRunner {
    pub fn new(trainer: Arc<dyn Trainer>, sink: Arc<dyn ProgressSink>, settings: RunSettings) -> Self {
        Self {
            trainer,
            sink,
            settings,
            callback: Arc::new(NoopCallback),
            state: RunState::Idle,
        }
    }

    /// Grid search trainer and telemetry client as configured.
    pub fn from_config(config: &PipelineConfig) -> Result<Self, MlError> {
        let trainer = GridSearchTrainer::from_config(&config.training)?;
        let sink = TelemetryClient::from_config(&config.telemetry)?;
        Ok(Self::new(
            Arc::new(trainer),
            Arc::new(sink),
            RunSettings::from_config(config),
        ))
    }

    pub fn with_callback(mut self, callback: Arc<dyn RunCallback>) -> Self {
        self.callback = callback;
        self
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn settings(&self) -> &RunSettings {
        &self.settings
    }

    fn transition(&mut self, state: RunState) {
        tracing::debug!(from = %self.state, to = %state, "Run state changed");
        self.state = state;
        self.callback.on_state(state);
    }

    /// Run every epoch and persist the final model.
    ///
    /// `cancel` is checked at the top of each epoch. A cancelled run persists
    /// the latest model if one exists and reports `cancelled = true`; if no
    /// epoch finished it fails with [`MlError::Cancelled`].
    pub async fn run(
        &mut self,
        data: Arc<SplitDataset>,
        cancel: CancellationToken,
    ) -> Result<RunReport, StageError> {
        if self.settings.epochs == 0 {
            return Err(StageError::new(
                Stage::Training,
                None,
                MlError::training("epochs must be at least 1"),
            ));
        }

        let n_classes = data.class_names.len();
        let mut report = RunReport::new(&self.settings.run_id);
        let mut latest: Option<TrainedModel> = None;

        tracing::info!(
            run_id = %self.settings.run_id,
            epochs = self.settings.epochs,
            train_rows = data.train.len(),
            test_rows = data.test.len(),
            "Run started"
        );

        for epoch in 1..=self.settings.epochs {
            if cancel.is_cancelled() {
                tracing::warn!(epoch, "Cancellation requested, stopping before epoch");
                report.cancelled = true;
                break;
            }

            self.transition(RunState::Training { epoch });
            let trainer = Arc::clone(&self.trainer);
            let task_data = Arc::clone(&data);
            let trained = tokio::task::spawn_blocking(move || {
                trainer.train(&task_data.train, n_classes)
            })
            .await
            .map_err(|e| MlError::training(format!("Training task failed: {e}")))
            .and_then(|result| result)
            .map_err(|e| StageError::at_epoch(Stage::Training, epoch, e))?;

            self.transition(RunState::Evaluating { epoch });
            let accuracy = evaluate(trained.model.as_ref(), &data.test)
                .map_err(|e| StageError::at_epoch(Stage::Evaluating, epoch, e))?;
            tracing::info!(
                epoch,
                accuracy,
                cv_score = trained.cv_score,
                elapsed_ms = trained.elapsed.as_millis() as u64,
                "Epoch evaluated"
            );

            self.transition(RunState::Emitting { epoch });
            match self.sink.emit(epoch, accuracy).await {
                Ok(ack) => {
                    tracing::info!(epoch, ack = %ack, "Progress record delivered");
                    self.callback.on_epoch_end(epoch, accuracy, Some(&ack));
                    report.acks.push(ack);
                }
                Err(err) => {
                    tracing::warn!(epoch, error = %err, "Progress record not delivered");
                    self.callback.on_sink_failure(epoch, &err);
                    self.callback.on_epoch_end(epoch, accuracy, None);
                    report.sink_failures.push(SinkFailure {
                        epoch,
                        error: err.to_string(),
                    });
                    if self.settings.on_failure == FailurePolicy::Abort {
                        return Err(StageError::at_epoch(
                            Stage::Emitting,
                            epoch,
                            MlError::Sink(err),
                        ));
                    }
                }
            }

            report
                .metrics
                .record_epoch(accuracy, trained.cv_score, trained.elapsed.as_secs_f64());
            report.epochs_completed = epoch;
            latest = Some(trained);
        }

        let Some(model) = latest else {
            return Err(StageError::new(
                Stage::Training,
                None,
                MlError::Cancelled("no epoch completed, nothing to persist".to_string()),
            ));
        };
        self.transition(RunState::Done);

        self.transition(RunState::Persisting);
        let artifact = ModelArtifact::new(
            model.model.as_ref(),
            self.settings.run_id.clone(),
            data.class_names.clone(),
            data.feature_names.clone(),
            model.params.clone(),
            data.scaler.clone(),
        )
        .map_err(|e| StageError::new(Stage::Persisting, None, e))?;
        let path = self.settings.model_path.clone();
        let target = path.clone();
        let bytes = tokio::task::spawn_blocking(move || artifact.save(&target))
            .await
            .map_err(|e| MlError::persistence(format!("Persistence task failed: {e}")))
            .and_then(|result| result)
            .map_err(|e| StageError::new(Stage::Persisting, None, e))?;

        tracing::info!(path = %path.display(), bytes, "Model persisted");
        self.callback.on_persisted(&path, bytes);
        report.artifact_path = Some(path);
        report.artifact_bytes = bytes;

        self.transition(RunState::Terminated);
        Ok(report)
    }
}
