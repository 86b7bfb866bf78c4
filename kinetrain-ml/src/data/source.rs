//! Data source abstraction for loading labelled tabular datasets.

use super::Dataset;
use crate::error::MlError;
use ndarray::Array2;
use std::collections::BTreeSet;
use std::path::PathBuf;

const IRIS_CSV: &str = include_str!("iris.csv");

/// Trait for loading a dataset from a source.
pub trait DataSource: Send + Sync {
    /// Load the full dataset.
    fn load(&self) -> Result<Dataset, MlError>;

    /// Human-readable location, for logs.
    fn describe(&self) -> String;
}

// ---------------------------------------------------------------------------
// IrisSource
// ---------------------------------------------------------------------------

/// Fisher's Iris dataset: 150 rows, 4 features, 3 classes.
#[derive(Debug, Default, Clone, Copy)]
pub struct IrisSource;

impl DataSource for IrisSource {
    fn load(&self) -> Result<Dataset, MlError> {
        parse_csv(IRIS_CSV, ',', "target")
    }

    fn describe(&self) -> String {
        "iris (bundled)".to_string()
    }
}

// ---------------------------------------------------------------------------
// CsvSource
// ---------------------------------------------------------------------------

/// CSV file data source with a header row.
#[derive(Debug, Clone)]
pub struct CsvSource {
    pub path: PathBuf,
    pub label_column: String,
    pub delimiter: char,
}

impl CsvSource {
    pub fn new(path: impl Into<PathBuf>, label_column: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            label_column: label_column.into(),
            delimiter: ',',
        }
    }
}

impl DataSource for CsvSource {
    fn load(&self) -> Result<Dataset, MlError> {
        let content = std::fs::read_to_string(&self.path).map_err(|e| {
            MlError::dataset(format!("Failed to read {}: {e}", self.path.display()))
        })?;
        parse_csv(&content, self.delimiter, &self.label_column)
    }

    fn describe(&self) -> String {
        format!("csv {}", self.path.display())
    }
}

fn csv_error(e: csv::Error) -> MlError {
    match e.position() {
        Some(pos) => MlError::dataset(format!("Malformed CSV at line {}: {e}", pos.line())),
        None => MlError::dataset(format!("Malformed CSV: {e}")),
    }
}

/// Parse headed CSV text. Every column except `label_column` must be numeric.
/// Labels are mapped to class indices in sorted label order.
///
/// Fields may be quoted, so a quoted field can contain the delimiter.
pub fn parse_csv(content: &str, delimiter: char, label_column: &str) -> Result<Dataset, MlError> {
    let delimiter = u8::try_from(delimiter)
        .ok()
        .filter(u8::is_ascii)
        .ok_or_else(|| MlError::dataset(format!("Delimiter '{delimiter}' is not ASCII")))?;
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(content.as_bytes());

    let header: Vec<String> = reader
        .headers()
        .map_err(csv_error)?
        .iter()
        .map(str::to_string)
        .collect();
    if header.iter().all(String::is_empty) {
        return Err(MlError::dataset("Empty CSV file"));
    }
    let label_idx = header
        .iter()
        .position(|c| c == label_column)
        .ok_or_else(|| MlError::dataset(format!("Label column '{label_column}' not found")))?;
    let feature_names: Vec<String> = header
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != label_idx)
        .map(|(_, name)| name.clone())
        .collect();
    if feature_names.is_empty() {
        return Err(MlError::dataset("CSV has no feature columns"));
    }

    let mut values = Vec::new();
    let mut raw_labels = Vec::new();
    for record in reader.records() {
        let row = record.map_err(csv_error)?;
        let line_no = row.position().map_or(0, |p| p.line());
        if row.len() != header.len() {
            return Err(MlError::dataset(format!(
                "Row {line_no} has {} fields, expected {}",
                row.len(),
                header.len()
            )));
        }
        for (i, cell) in row.iter().enumerate() {
            if i == label_idx {
                continue;
            }
            let value: f64 = cell.parse().map_err(|_| {
                MlError::dataset(format!(
                    "Row {line_no}: '{cell}' in column '{}' is not numeric",
                    header[i]
                ))
            })?;
            if !value.is_finite() {
                return Err(MlError::dataset(format!(
                    "Row {line_no}: non-finite value in column '{}'",
                    header[i]
                )));
            }
            values.push(value);
        }
        raw_labels.push(row[label_idx].to_string());
    }

    if raw_labels.is_empty() {
        return Err(MlError::dataset("CSV has a header but no rows"));
    }

    let class_names: Vec<String> = raw_labels
        .iter()
        .cloned()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let labels = raw_labels
        .iter()
        .map(|l| class_names.binary_search(l).unwrap_or_default())
        .collect();

    let features = Array2::from_shape_vec((raw_labels.len(), feature_names.len()), values)
        .map_err(|e| MlError::dataset(format!("Malformed feature matrix: {e}")))?;

    Dataset::new(features, labels, feature_names, class_names)
}
