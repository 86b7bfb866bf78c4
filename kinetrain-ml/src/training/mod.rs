//! Training infrastructure: grid search, the trainer seam, evaluation,
//! artifacts, run callbacks and the epoch runner.

pub mod artifact;
pub mod callbacks;
pub mod metrics;
pub mod runner;
pub mod sweep;
pub mod trainer;

pub use artifact::ModelArtifact;
pub use callbacks::{NoopCallback, RecordingCallback, RunCallback, RunEvent};
pub use metrics::{ClassificationMetrics, TrainingMetrics, evaluate};
pub use runner::{RunReport, RunSettings, RunState, SinkFailure, TrainingRunner};
pub use sweep::{GridSearch, HyperparameterGrid, SweepOutcome, SweepTrial};
pub use trainer::{GridSearchTrainer, TrainedModel, Trainer};
