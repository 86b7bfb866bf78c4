//! Property-based tests for splitting, folding and scoring.

use proptest::prelude::*;
use std::collections::HashSet;

use kinetrain_ml::algorithms::{StratifiedKFold, accuracy_score};
use kinetrain_ml::data::{Dataset, SplitDataset, train_test_split};
use ndarray::Array2;

// --- Train/test split properties ---

proptest! {
    #[test]
    fn split_partitions_are_disjoint_and_complete(
        n_rows in 2usize..400,
        test_size in 0.01f64..0.99,
        seed in any::<u64>(),
    ) {
        match train_test_split(n_rows, test_size, seed) {
            Ok((train, test)) => {
                prop_assert_eq!(train.len() + test.len(), n_rows);
                prop_assert_eq!(test.len(), (test_size * n_rows as f64).ceil() as usize);
                let train_set: HashSet<usize> = train.iter().copied().collect();
                prop_assert!(test.iter().all(|i| !train_set.contains(i)));
                let all: HashSet<usize> = train.iter().chain(&test).copied().collect();
                prop_assert_eq!(all.len(), n_rows);
            }
            Err(_) => {
                // Only rejected when one side would be empty.
                let n_test = (test_size * n_rows as f64).ceil() as usize;
                prop_assert!(n_test == 0 || n_test >= n_rows);
            }
        }
    }

    #[test]
    fn split_dataset_keeps_rows_aligned(
        n_rows in 4usize..60,
        seed in any::<u64>(),
    ) {
        let features = Array2::from_shape_fn((n_rows, 2), |(i, j)| (i * 10 + j) as f64);
        let labels: Vec<usize> = (0..n_rows).map(|i| i % 2).collect();
        let dataset = Dataset::new(
            features,
            labels,
            vec!["a".into(), "b".into()],
            vec!["even".into(), "odd".into()],
        ).unwrap();

        let split = SplitDataset::from_dataset(&dataset, 0.25, seed, false).unwrap();
        prop_assert_eq!(split.total_rows(), n_rows);
        prop_assert!(split.is_disjoint());
        for part in [&split.train, &split.test] {
            for (pos, &row) in part.indices.iter().enumerate() {
                prop_assert_eq!(part.features[[pos, 0]], (row * 10) as f64);
                prop_assert_eq!(part.labels[pos], row % 2);
            }
        }
    }
}

// --- Cross-validation and scoring properties ---

proptest! {
    #[test]
    fn stratified_folds_cover_every_row_once(
        labels in prop::collection::vec(0usize..4, 3..120),
        k in 2usize..6,
    ) {
        prop_assume!(labels.len() >= k);
        let folds = StratifiedKFold::new(k).split(&labels).unwrap();
        prop_assert_eq!(folds.len(), k);

        let mut seen = vec![0usize; labels.len()];
        for fold in &folds {
            prop_assert!(!fold.validation.is_empty());
            prop_assert_eq!(fold.train.len() + fold.validation.len(), labels.len());
            for &pos in &fold.validation {
                seen[pos] += 1;
            }
        }
        prop_assert!(seen.iter().all(|&c| c == 1));
    }

    #[test]
    fn accuracy_is_a_fraction(
        pairs in prop::collection::vec((0usize..5, 0usize..5), 1..200),
    ) {
        let (predicted, expected): (Vec<usize>, Vec<usize>) = pairs.into_iter().unzip();
        let accuracy = accuracy_score(&predicted, &expected).unwrap();
        prop_assert!((0.0..=1.0).contains(&accuracy));
        prop_assert_eq!(accuracy_score(&expected, &expected).unwrap(), 1.0);
    }
}
