//! # kinetrain-ml: dataset, classifier, grid search and the epoch runner
//!
//! This crate turns a [`PipelineConfig`] into a trained, evaluated and
//! persisted model, reporting each epoch's accuracy to a telemetry sink from
//! `kinetrain-core`.
//!
//! ## Layers
//!
//! 1. **Data** ([`data`]): bundled Iris or CSV, seeded split, scaling
//! 2. **Algorithms** ([`algorithms`]): CART trees, random forest, stratified k-fold
//! 3. **Training** ([`training`]): grid search trainer, evaluation, artifacts and
//!    the [`TrainingRunner`] that drives epochs

// Foundation
pub mod config;
pub mod error;

pub mod data;

pub mod algorithms;

pub mod training;

// Re-exports
pub use algorithms::{Model, RandomForest};
pub use config::{PipelineConfig, load_config};
pub use data::{SplitDataset, load_split};
pub use error::{MlError, Stage, StageError};
pub use training::{
    GridSearchTrainer, ModelArtifact, RunCallback, RunReport, RunSettings, RunState, Trainer,
    TrainingRunner,
};
