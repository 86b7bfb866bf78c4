//! Exhaustive hyperparameter grid search with cross-validation.

use crate::algorithms::{
    CrossValidationResult, ForestParams, Model, RandomForest, StratifiedKFold, accuracy_score,
};
use crate::config::GridConfig;
use crate::error::MlError;
use ndarray::{ArrayView2, Axis};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Every combination of the configured candidate values.
///
/// Enumeration order is fixed: parameter names sorted alphabetically
/// (`max_depth`, `min_samples_leaf`, `min_samples_split`, `n_estimators`) with
/// the last name varying fastest. Grid search ties resolve to the earliest
/// candidate in this order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HyperparameterGrid {
    candidates: Vec<ForestParams>,
}

impl HyperparameterGrid {
    pub fn from_config(grid: &GridConfig, seed: u64) -> Self {
        let mut candidates = Vec::with_capacity(
            grid.max_depth.len()
                * grid.min_samples_leaf.len()
                * grid.min_samples_split.len()
                * grid.n_estimators.len(),
        );
        for depth in &grid.max_depth {
            for &min_samples_leaf in &grid.min_samples_leaf {
                for &min_samples_split in &grid.min_samples_split {
                    for &n_estimators in &grid.n_estimators {
                        candidates.push(ForestParams {
                            n_estimators,
                            max_depth: depth.as_option(),
                            min_samples_split,
                            min_samples_leaf,
                            seed,
                        });
                    }
                }
            }
        }
        Self { candidates }
    }

    pub fn candidates(&self) -> &[ForestParams] {
        &self.candidates
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }
}

/// A single sweep trial.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepTrial {
    pub trial_number: usize,
    pub params: ForestParams,
    pub cv: CrossValidationResult,
}

/// All trials of one search and the index of the winner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepOutcome {
    pub trials: Vec<SweepTrial>,
    pub best_trial: usize,
}

impl SweepOutcome {
    pub fn best(&self) -> &SweepTrial {
        &self.trials[self.best_trial]
    }
}

/// Grid search over random forest hyperparameters.
#[derive(Debug, Clone)]
pub struct GridSearch {
    grid: HyperparameterGrid,
    folds: StratifiedKFold,
}

impl GridSearch {
    pub fn new(grid: HyperparameterGrid, cv_folds: usize) -> Self {
        Self {
            grid,
            folds: StratifiedKFold::new(cv_folds),
        }
    }

    pub fn grid(&self) -> &HyperparameterGrid {
        &self.grid
    }

    pub fn n_folds(&self) -> usize {
        self.folds.n_folds
    }

    /// Score every candidate and pick the best mean CV accuracy.
    ///
    /// Candidates are scored in parallel on the current rayon pool; results
    /// keep grid order, so the winner does not depend on scheduling.
    pub fn run(
        &self,
        features: ArrayView2<'_, f64>,
        labels: &[usize],
        n_classes: usize,
    ) -> Result<SweepOutcome, MlError> {
        if self.grid.is_empty() {
            return Err(MlError::training("Hyperparameter grid is empty"));
        }
        let folds = self.folds.split(labels)?;

        let trials = self
            .grid
            .candidates()
            .par_iter()
            .enumerate()
            .map(|(trial_number, params)| -> Result<SweepTrial, MlError> {
                let mut scores = Vec::with_capacity(folds.len());
                for fold in &folds {
                    let train_x = features.select(Axis(0), &fold.train);
                    let train_y: Vec<usize> = fold.train.iter().map(|&i| labels[i]).collect();
                    let val_x = features.select(Axis(0), &fold.validation);
                    let val_y: Vec<usize> =
                        fold.validation.iter().map(|&i| labels[i]).collect();

                    let model = RandomForest::fit(*params, train_x.view(), &train_y, n_classes)?;
                    let predicted = model.predict(val_x.view())?;
                    scores.push(accuracy_score(&predicted, &val_y)?);
                }
                Ok(SweepTrial {
                    trial_number,
                    params: *params,
                    cv: CrossValidationResult::from_scores(scores, "accuracy"),
                })
            })
            .collect::<Result<Vec<_>, MlError>>()?;

        let mut best_trial = 0;
        for (i, trial) in trials.iter().enumerate() {
            if trial.cv.mean_score > trials[best_trial].cv.mean_score {
                best_trial = i;
            }
        }

        tracing::debug!(
            candidates = trials.len(),
            folds = folds.len(),
            best_trial,
            best_score = trials[best_trial].cv.mean_score,
            "Grid search finished"
        );

        Ok(SweepOutcome { trials, best_trial })
    }
}
