//! Classifiers and cross-validation.

pub mod evaluation;
pub mod forest;
pub mod tree;

use crate::error::MlError;
use ndarray::ArrayView2;
use std::fmt;

pub use evaluation::{CrossValidationResult, Fold, StratifiedKFold, accuracy_score};
pub use forest::{ForestParams, RandomForest};
pub use tree::{DecisionTree, TreeNode, TreeParams};

/// A fitted classifier.
///
/// Implementations must be deterministic: the same input always yields the
/// same predictions, and a model rebuilt from [`Model::to_value`] predicts
/// exactly like the fitted one.
pub trait Model: Send + Sync + fmt::Debug {
    /// Stable identifier stored in artifacts, e.g. `"random_forest"`.
    fn kind(&self) -> &'static str;

    fn n_classes(&self) -> usize;

    fn n_features(&self) -> usize;

    /// Predict one class index per row.
    fn predict(&self, features: ArrayView2<'_, f64>) -> Result<Vec<usize>, MlError>;

    /// Serialize the fitted state.
    fn to_value(&self) -> Result<serde_json::Value, MlError>;
}

/// Rebuild a model from its kind and serialized state.
pub fn model_from_value(kind: &str, value: serde_json::Value) -> Result<Box<dyn Model>, MlError> {
    match kind {
        RandomForest::KIND => {
            let forest: RandomForest = serde_json::from_value(value)?;
            forest.check()?;
            Ok(Box::new(forest))
        }
        other => Err(MlError::model(format!("Unknown model kind '{other}'"))),
    }
}

/// Shared shape check for `predict` implementations.
pub(crate) fn check_columns(expected: usize, features: ArrayView2<'_, f64>) -> Result<(), MlError> {
    if features.ncols() != expected {
        return Err(MlError::model(format!(
            "Model expects {expected} features, got {}",
            features.ncols()
        )));
    }
    Ok(())
}
