//! The trainer seam used by the orchestrator.

use crate::algorithms::{Model, RandomForest};
use crate::config::TrainingConfig;
use crate::data::Partition;
use crate::error::MlError;
use crate::training::sweep::{GridSearch, HyperparameterGrid, SweepOutcome};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A fitted model plus what the search learned on the way.
#[derive(Debug, Clone)]
pub struct TrainedModel {
    pub model: Arc<dyn Model>,
    /// Winning hyperparameters, as stored in the artifact.
    pub params: serde_json::Value,
    /// Mean cross-validation accuracy of the winner.
    pub cv_score: f64,
    pub candidates: usize,
    pub elapsed: Duration,
}

/// Produces a fitted classifier from a training partition.
///
/// Must not mutate its inputs. Blocking and CPU-bound; the orchestrator calls
/// it from a blocking thread.
pub trait Trainer: Send + Sync {
    fn train(&self, data: &Partition, n_classes: usize) -> Result<TrainedModel, MlError>;
}

/// Random forest grid search, refitting the winner on the full partition.
pub struct GridSearchTrainer {
    search: GridSearch,
    pool: rayon::ThreadPool,
}

impl std::fmt::Debug for GridSearchTrainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GridSearchTrainer")
            .field("search", &self.search)
            .field("threads", &self.pool.current_num_threads())
            .finish()
    }
}

impl GridSearchTrainer {
    /// `workers = 0` sizes the pool to the number of cores.
    pub fn new(search: GridSearch, workers: usize) -> Result<Self, MlError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("kinetrain-grid-{i}"))
            .build()
            .map_err(|e| MlError::training(format!("Failed to start worker pool: {e}")))?;
        Ok(Self { search, pool })
    }

    pub fn from_config(config: &TrainingConfig) -> Result<Self, MlError> {
        let grid = HyperparameterGrid::from_config(&config.grid, config.seed);
        Self::new(GridSearch::new(grid, config.cv_folds), config.workers)
    }

    pub fn search(&self) -> &GridSearch {
        &self.search
    }

    /// Run the search only, without the final refit.
    pub fn sweep(&self, data: &Partition, n_classes: usize) -> Result<SweepOutcome, MlError> {
        if data.is_empty() {
            return Err(MlError::training("Training partition is empty"));
        }
        if data.len() < self.search.n_folds() {
            return Err(MlError::training(format!(
                "Training partition has {} rows, fewer than the {} cross-validation folds",
                data.len(),
                self.search.n_folds()
            )));
        }
        self.pool
            .install(|| self.search.run(data.features.view(), &data.labels, n_classes))
    }
}

impl Trainer for GridSearchTrainer {
    fn train(&self, data: &Partition, n_classes: usize) -> Result<TrainedModel, MlError> {
        let started = Instant::now();
        let outcome = self.sweep(data, n_classes)?;
        let best = outcome.best();
        let model = self.pool.install(|| {
            RandomForest::fit(best.params, data.features.view(), &data.labels, n_classes)
        })?;

        tracing::info!(
            candidates = outcome.trials.len(),
            n_estimators = best.params.n_estimators,
            max_depth = ?best.params.max_depth,
            min_samples_split = best.params.min_samples_split,
            min_samples_leaf = best.params.min_samples_leaf,
            cv_score = best.cv.mean_score,
            "Best hyperparameters selected"
        );

        Ok(TrainedModel {
            params: serde_json::to_value(best.params)?,
            cv_score: best.cv.mean_score,
            candidates: outcome.trials.len(),
            model: Arc::new(model),
            elapsed: started.elapsed(),
        })
    }
}
