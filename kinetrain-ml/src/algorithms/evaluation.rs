//! Cross-validation splitting and scoring.

use crate::error::MlError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Fraction of predictions equal to the expected labels.
pub fn accuracy_score(predicted: &[usize], expected: &[usize]) -> Result<f64, MlError> {
    if predicted.len() != expected.len() {
        return Err(MlError::evaluation(format!(
            "{} predictions for {} labels",
            predicted.len(),
            expected.len()
        )));
    }
    if expected.is_empty() {
        return Err(MlError::evaluation("Cannot score an empty partition"));
    }
    let correct = predicted
        .iter()
        .zip(expected)
        .filter(|(p, e)| p == e)
        .count();
    Ok(correct as f64 / expected.len() as f64)
}

/// Stratified k-fold splitter without shuffling.
///
/// Rows of each class are dealt to folds in their original order, continuing
/// the rotation from one class to the next, so every fold gets a near-equal
/// share of every class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StratifiedKFold {
    pub n_folds: usize,
}

/// One train/validation split of a partition, as row positions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fold {
    pub train: Vec<usize>,
    pub validation: Vec<usize>,
}

impl StratifiedKFold {
    pub fn new(n_folds: usize) -> Self {
        Self { n_folds }
    }

    pub fn split(&self, labels: &[usize]) -> Result<Vec<Fold>, MlError> {
        let k = self.n_folds;
        if k < 2 {
            return Err(MlError::training(format!(
                "Cross-validation needs at least 2 folds, got {k}"
            )));
        }
        if labels.len() < k {
            return Err(MlError::training(format!(
                "Training partition has {} rows, fewer than the {k} cross-validation folds",
                labels.len()
            )));
        }

        let mut by_class: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        for (pos, &label) in labels.iter().enumerate() {
            by_class.entry(label).or_default().push(pos);
        }

        let mut assignment = vec![0usize; labels.len()];
        let mut dealt = 0usize;
        for positions in by_class.values() {
            for &pos in positions {
                assignment[pos] = dealt % k;
                dealt += 1;
            }
        }

        Ok((0..k)
            .map(|fold| {
                let (validation, train): (Vec<usize>, Vec<usize>) =
                    (0..labels.len()).partition(|&pos| assignment[pos] == fold);
                Fold { train, validation }
            })
            .collect())
    }
}

/// Cross-validation result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrossValidationResult {
    pub fold_scores: Vec<f64>,
    pub mean_score: f64,
    pub std_score: f64,
    pub metric_name: String,
}

impl CrossValidationResult {
    pub fn from_scores(scores: Vec<f64>, metric_name: &str) -> Self {
        let n = scores.len().max(1) as f64;
        let mean = scores.iter().sum::<f64>() / n;
        let variance = scores.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / n;
        Self {
            fold_scores: scores,
            mean_score: mean,
            std_score: variance.sqrt(),
            metric_name: metric_name.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_accuracy_score() {
        assert_eq!(accuracy_score(&[0, 1, 1, 2], &[0, 1, 2, 2]).unwrap(), 0.75);
        assert!(accuracy_score(&[], &[]).is_err());
        assert!(accuracy_score(&[0], &[0, 1]).is_err());
    }

    #[test]
    fn test_folds_are_stratified_and_cover_every_row() {
        let labels = [0, 0, 0, 1, 1, 1, 2, 2, 2];
        let folds = StratifiedKFold::new(3).split(&labels).unwrap();
        assert_eq!(folds.len(), 3);

        let mut seen = vec![0; labels.len()];
        for fold in &folds {
            assert_eq!(fold.validation.len(), 3);
            assert_eq!(fold.train.len(), 6);
            let mut classes: Vec<usize> = fold.validation.iter().map(|&p| labels[p]).collect();
            classes.sort_unstable();
            assert_eq!(classes, vec![0, 1, 2]);
            for &p in &fold.validation {
                seen[p] += 1;
            }
        }
        assert!(seen.iter().all(|&c| c == 1));
    }

    #[test]
    fn test_rotation_continues_across_classes() {
        let folds = StratifiedKFold::new(2).split(&[0, 1, 0]).unwrap();
        // Class 0 rows (0, 2) go to folds 0 and 1, class 1 row continues at fold 0.
        assert_eq!(folds[0].validation, vec![0, 1]);
        assert_eq!(folds[1].validation, vec![2]);
    }

    #[test]
    fn test_too_few_rows() {
        let err = StratifiedKFold::new(3).split(&[0, 1]).unwrap_err();
        assert!(matches!(err, MlError::Training(_)));
    }

    #[test]
    fn test_cv_result_statistics() {
        let result = CrossValidationResult::from_scores(vec![0.5, 1.0], "accuracy");
        assert_eq!(result.mean_score, 0.75);
        assert_eq!(result.std_score, 0.25);
        assert_eq!(result.metric_name, "accuracy");
    }
}
