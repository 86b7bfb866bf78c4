//! Evaluation and run metrics tracking.

use crate::algorithms::{Model, accuracy_score};
use crate::data::Partition;
use crate::error::MlError;
use serde::{Deserialize, Serialize};

/// Score a fitted model on a held-out partition.
///
/// Returns the fraction of rows predicted exactly. Pure: the same model and
/// partition always give the same value.
pub fn evaluate(model: &dyn Model, data: &Partition) -> Result<f64, MlError> {
    if data.is_empty() {
        return Err(MlError::evaluation("Test partition is empty"));
    }
    let predicted = model
        .predict(data.features.view())
        .map_err(|e| MlError::evaluation(e.to_string()))?;
    accuracy_score(&predicted, &data.labels)
}

/// Metrics accumulated over the epochs of one run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainingMetrics {
    pub epochs_completed: usize,
    pub accuracy_history: Vec<f64>,
    pub cv_score_history: Vec<f64>,
    /// First epoch (1-based) that reached the best accuracy.
    pub best_epoch: Option<usize>,
    pub best_accuracy: Option<f64>,
    pub total_training_time_secs: f64,
}

impl TrainingMetrics {
    pub fn record_epoch(&mut self, accuracy: f64, cv_score: f64, training_secs: f64) {
        self.accuracy_history.push(accuracy);
        self.cv_score_history.push(cv_score);
        self.epochs_completed += 1;
        self.total_training_time_secs += training_secs;

        if self.best_accuracy.is_none_or(|best| accuracy > best) {
            self.best_accuracy = Some(accuracy);
            self.best_epoch = Some(self.epochs_completed);
        }
    }

    pub fn last_accuracy(&self) -> Option<f64> {
        self.accuracy_history.last().copied()
    }
}

/// Classification metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationMetrics {
    pub accuracy: f64,
    /// Unweighted mean over classes.
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
    /// `confusion_matrix[actual][predicted]`.
    pub confusion_matrix: Vec<Vec<usize>>,
}

impl ClassificationMetrics {
    pub fn compute(
        predicted: &[usize],
        expected: &[usize],
        n_classes: usize,
    ) -> Result<Self, MlError> {
        let accuracy = accuracy_score(predicted, expected)?;
        let mut confusion = vec![vec![0usize; n_classes]; n_classes];
        for (&p, &e) in predicted.iter().zip(expected) {
            if p >= n_classes || e >= n_classes {
                return Err(MlError::evaluation(format!(
                    "Class index out of range for {n_classes} classes"
                )));
            }
            confusion[e][p] += 1;
        }

        let ratio = |num: usize, den: usize| if den == 0 { 0.0 } else { num as f64 / den as f64 };
        let mut precision = 0.0;
        let mut recall = 0.0;
        let mut f1 = 0.0;
        for class in 0..n_classes {
            let tp = confusion[class][class];
            let predicted_as: usize = confusion.iter().map(|row| row[class]).sum();
            let actual: usize = confusion[class].iter().sum();
            let p = ratio(tp, predicted_as);
            let r = ratio(tp, actual);
            precision += p;
            recall += r;
            f1 += if p + r > 0.0 { 2.0 * p * r / (p + r) } else { 0.0 };
        }
        let n = n_classes.max(1) as f64;

        Ok(Self {
            accuracy,
            precision: precision / n,
            recall: recall / n,
            f1_score: f1 / n,
            confusion_matrix: confusion,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithms::{ForestParams, RandomForest};
    use ndarray::array;

    #[test]
    fn test_training_metrics_best_epoch_keeps_first() {
        let mut metrics = TrainingMetrics::default();
        metrics.record_epoch(0.9, 0.8, 1.0);
        metrics.record_epoch(0.95, 0.85, 1.5);
        metrics.record_epoch(0.95, 0.9, 0.5);
        assert_eq!(metrics.epochs_completed, 3);
        assert_eq!(metrics.best_epoch, Some(2));
        assert_eq!(metrics.best_accuracy, Some(0.95));
        assert_eq!(metrics.total_training_time_secs, 3.0);
        assert_eq!(metrics.last_accuracy(), Some(0.95));
    }

    #[test]
    fn test_classification_metrics() {
        let m = ClassificationMetrics::compute(&[0, 1, 1, 0], &[0, 1, 0, 0], 2).unwrap();
        assert_eq!(m.accuracy, 0.75);
        assert_eq!(m.confusion_matrix, vec![vec![2, 1], vec![0, 1]]);
        // class 0: p=1, r=2/3; class 1: p=1/2, r=1
        assert!((m.precision - 0.75).abs() < 1e-12);
        assert!((m.recall - (2.0 / 3.0 + 1.0) / 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_evaluate_is_repeatable_and_bounded() {
        let x = array![[0.0], [0.2], [0.4], [5.0], [5.2], [5.4]];
        let y = vec![0, 0, 0, 1, 1, 1];
        let forest = RandomForest::fit(
            ForestParams {
                n_estimators: 5,
                ..ForestParams::default()
            },
            x.view(),
            &y,
            2,
        )
        .unwrap();
        let test = Partition {
            features: array![[0.1], [5.1], [2.0]],
            labels: vec![0, 1, 1],
            indices: vec![0, 1, 2],
        };
        let first = evaluate(&forest, &test).unwrap();
        let second = evaluate(&forest, &test).unwrap();
        assert_eq!(first.to_bits(), second.to_bits());
        assert!((0.0..=1.0).contains(&first));
    }

    #[test]
    fn test_evaluate_empty_partition() {
        let x = array![[0.0], [1.0]];
        let forest = RandomForest::fit(ForestParams::default(), x.view(), &[0, 1], 2).unwrap();
        let empty = Partition {
            features: ndarray::Array2::zeros((0, 1)),
            labels: vec![],
            indices: vec![],
        };
        assert!(matches!(evaluate(&forest, &empty), Err(MlError::Evaluation(_))));
    }

    #[test]
    fn test_evaluate_shape_mismatch() {
        let x = array![[0.0], [1.0]];
        let forest = RandomForest::fit(ForestParams::default(), x.view(), &[0, 1], 2).unwrap();
        let wrong = Partition {
            features: array![[0.0, 1.0]],
            labels: vec![0],
            indices: vec![0],
        };
        assert!(matches!(evaluate(&forest, &wrong), Err(MlError::Evaluation(_))));
    }
}
