//! Data provider: loading, standardization and the train/test split.
//!
//! [`load_split`] is a pure function of the data configuration: the same
//! configuration always yields the same partitions.

pub mod source;
pub mod transform;

use crate::config::{DataConfig, DataSourceKind};
use crate::error::MlError;
use ndarray::{Array2, ArrayView2, Axis};
use std::collections::HashSet;

pub use source::{CsvSource, DataSource, IrisSource};
pub use transform::{StandardScaler, train_test_split};

/// An immutable feature matrix with one class index per row.
#[derive(Debug, Clone)]
pub struct Dataset {
    features: Array2<f64>,
    labels: Vec<usize>,
    feature_names: Vec<String>,
    class_names: Vec<String>,
}

impl Dataset {
    pub fn new(
        features: Array2<f64>,
        labels: Vec<usize>,
        feature_names: Vec<String>,
        class_names: Vec<String>,
    ) -> Result<Self, MlError> {
        if features.nrows() != labels.len() {
            return Err(MlError::dataset(format!(
                "{} feature rows but {} labels",
                features.nrows(),
                labels.len()
            )));
        }
        if features.ncols() != feature_names.len() {
            return Err(MlError::dataset(format!(
                "{} feature columns but {} feature names",
                features.ncols(),
                feature_names.len()
            )));
        }
        if let Some(bad) = labels.iter().find(|&&l| l >= class_names.len()) {
            return Err(MlError::dataset(format!(
                "label {bad} has no class name ({} classes)",
                class_names.len()
            )));
        }
        Ok(Self {
            features,
            labels,
            feature_names,
            class_names,
        })
    }

    pub fn features(&self) -> ArrayView2<'_, f64> {
        self.features.view()
    }

    pub fn labels(&self) -> &[usize] {
        &self.labels
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    pub fn class_names(&self) -> &[String] {
        &self.class_names
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Copy the given rows into a partition.
    pub fn select(&self, indices: &[usize]) -> Partition {
        Partition {
            features: self.features.select(Axis(0), indices),
            labels: indices.iter().map(|&i| self.labels[i]).collect(),
            indices: indices.to_vec(),
        }
    }
}

/// A subset of dataset rows, remembering which original rows it holds.
#[derive(Debug, Clone)]
pub struct Partition {
    pub features: Array2<f64>,
    pub labels: Vec<usize>,
    /// Row numbers in the source dataset.
    pub indices: Vec<usize>,
}

impl Partition {
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

/// Train and test partitions ready for the trainer and evaluator.
#[derive(Debug, Clone)]
pub struct SplitDataset {
    pub train: Partition,
    pub test: Partition,
    pub feature_names: Vec<String>,
    pub class_names: Vec<String>,
    /// Fitted on the training partition when standardization is enabled.
    pub scaler: Option<StandardScaler>,
}

impl SplitDataset {
    /// Split a dataset, then standardize both partitions with statistics from
    /// the training rows.
    pub fn from_dataset(
        dataset: &Dataset,
        test_size: f64,
        seed: u64,
        standardize: bool,
    ) -> Result<Self, MlError> {
        let (train_idx, test_idx) = train_test_split(dataset.len(), test_size, seed)?;
        let mut train = dataset.select(&train_idx);
        let mut test = dataset.select(&test_idx);

        let scaler = if standardize {
            let scaler = StandardScaler::fit(train.features.view())?;
            train.features = scaler.transform(train.features.view())?;
            test.features = scaler.transform(test.features.view())?;
            Some(scaler)
        } else {
            None
        };

        Ok(Self {
            train,
            test,
            feature_names: dataset.feature_names().to_vec(),
            class_names: dataset.class_names().to_vec(),
            scaler,
        })
    }

    pub fn total_rows(&self) -> usize {
        self.train.len() + self.test.len()
    }

    /// No row may appear in both partitions.
    pub fn is_disjoint(&self) -> bool {
        let train: HashSet<usize> = self.train.indices.iter().copied().collect();
        self.test.indices.iter().all(|i| !train.contains(i))
    }
}

/// Build the data source a configuration names.
pub fn source_for(config: &DataConfig) -> Result<Box<dyn DataSource>, MlError> {
    match config.source {
        DataSourceKind::Iris => Ok(Box::new(IrisSource)),
        DataSourceKind::Csv => {
            let path = config
                .path
                .clone()
                .ok_or_else(|| MlError::dataset("data.path is required for csv sources"))?;
            Ok(Box::new(CsvSource::new(path, config.label_column.clone())))
        }
    }
}

/// Load the configured dataset and split it into partitions.
pub fn load_split(config: &DataConfig) -> Result<SplitDataset, MlError> {
    let source = source_for(config)?;
    let dataset = source.load()?;
    let split = SplitDataset::from_dataset(
        &dataset,
        config.test_size,
        config.split_seed,
        config.standardize,
    )?;
    tracing::info!(
        source = %source.describe(),
        rows = dataset.len(),
        features = dataset.feature_names().len(),
        classes = dataset.class_names().len(),
        train_rows = split.train.len(),
        test_rows = split.test.len(),
        "Dataset loaded"
    );
    Ok(split)
}
