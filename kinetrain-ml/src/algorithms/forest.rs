//! Random forest classifier: bagged CART trees with per-split feature sampling.

use super::tree::{DecisionTree, TreeParams};
use super::{Model, check_columns};
use crate::error::MlError;
use ndarray::{Array2, ArrayView2};
use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};
use serde::{Deserialize, Serialize};

/// Hyperparameters of a forest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ForestParams {
    pub n_estimators: usize,
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    pub seed: u64,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForest {
    params: ForestParams,
    n_features: usize,
    n_classes: usize,
    trees: Vec<DecisionTree>,
}

impl RandomForest {
    pub const KIND: &'static str = "random_forest";

    /// Fit on every row of `features`.
    ///
    /// Each tree draws a bootstrap sample and considers `sqrt(n_features)`
    /// candidate features per split. Tree seeds derive from `params.seed`, so
    /// a fit is fully reproducible.
    pub fn fit(
        params: ForestParams,
        features: ArrayView2<'_, f64>,
        labels: &[usize],
        n_classes: usize,
    ) -> Result<Self, MlError> {
        let n_rows = features.nrows();
        if n_rows == 0 {
            return Err(MlError::training("Cannot fit a forest on zero rows"));
        }
        if n_rows != labels.len() {
            return Err(MlError::training(format!(
                "{n_rows} rows but {} labels",
                labels.len()
            )));
        }
        if params.n_estimators == 0 {
            return Err(MlError::training("n_estimators must be positive"));
        }
        if labels.iter().any(|&l| l >= n_classes) {
            return Err(MlError::training(format!(
                "Label out of range for {n_classes} classes"
            )));
        }

        let n_features = features.ncols();
        let tree_params = TreeParams {
            max_depth: params.max_depth,
            min_samples_split: params.min_samples_split,
            min_samples_leaf: params.min_samples_leaf,
            max_features: ((n_features as f64).sqrt() as usize).max(1),
        };

        let mut seeder = StdRng::seed_from_u64(params.seed);
        let mut trees = Vec::with_capacity(params.n_estimators);
        for _ in 0..params.n_estimators {
            let mut rng = StdRng::seed_from_u64(seeder.next_u64());
            let bootstrap: Vec<usize> = (0..n_rows).map(|_| rng.gen_range(0..n_rows)).collect();
            trees.push(DecisionTree::fit(
                features,
                labels,
                &bootstrap,
                n_classes,
                tree_params,
                &mut rng,
            )?);
        }

        Ok(Self {
            params,
            n_features,
            n_classes,
            trees,
        })
    }

    pub fn params(&self) -> &ForestParams {
        &self.params
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    /// Mean of per-tree leaf class frequencies, one row per sample.
    pub fn predict_proba(&self, features: ArrayView2<'_, f64>) -> Result<Array2<f64>, MlError> {
        check_columns(self.n_features, features)?;
        let mut proba = Array2::<f64>::zeros((features.nrows(), self.n_classes));
        for (row, mut out) in features.rows().into_iter().zip(proba.rows_mut()) {
            for tree in &self.trees {
                let counts = tree.leaf_counts(row);
                let total: usize = counts.iter().sum();
                for (p, &c) in out.iter_mut().zip(counts) {
                    *p += c as f64 / total as f64;
                }
            }
            out.mapv_inplace(|p| p / self.trees.len() as f64);
        }
        Ok(proba)
    }

    pub(crate) fn check(&self) -> Result<(), MlError> {
        if self.trees.is_empty() || self.n_classes == 0 {
            return Err(MlError::model("Forest has no trees"));
        }
        for tree in &self.trees {
            tree.check(self.n_features, self.n_classes)?;
        }
        Ok(())
    }
}

impl Model for RandomForest {
    fn kind(&self) -> &'static str {
        Self::KIND
    }

    fn n_classes(&self) -> usize {
        self.n_classes
    }

    fn n_features(&self) -> usize {
        self.n_features
    }

    fn predict(&self, features: ArrayView2<'_, f64>) -> Result<Vec<usize>, MlError> {
        let proba = self.predict_proba(features)?;
        Ok(proba
            .rows()
            .into_iter()
            .map(|row| {
                // Strict comparison keeps the lowest index on ties.
                let mut best = 0;
                for (class, &p) in row.iter().enumerate() {
                    if p > row[best] {
                        best = class;
                    }
                }
                best
            })
            .collect())
    }

    fn to_value(&self) -> Result<serde_json::Value, MlError> {
        Ok(serde_json::to_value(self)?)
    }
}
