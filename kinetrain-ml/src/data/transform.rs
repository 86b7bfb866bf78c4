//! Feature standardization and the seeded train/test split.

use crate::error::MlError;
use ndarray::{Array1, Array2, ArrayView2, Axis};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

/// Z-score scaler: `(x - mean) / std` per column.
///
/// Uses the population standard deviation. Constant columns keep a scale of
/// 1.0 so they map to zero instead of NaN.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    mean: Array1<f64>,
    scale: Array1<f64>,
}

impl StandardScaler {
    pub fn fit(features: ArrayView2<'_, f64>) -> Result<Self, MlError> {
        if features.nrows() == 0 {
            return Err(MlError::dataset("Cannot fit a scaler on zero rows"));
        }
        let mean = features
            .mean_axis(Axis(0))
            .ok_or_else(|| MlError::dataset("Cannot fit a scaler on zero rows"))?;
        let scale = features
            .std_axis(Axis(0), 0.0)
            .mapv(|s| if s > 0.0 && s.is_finite() { s } else { 1.0 });
        Ok(Self { mean, scale })
    }

    pub fn transform(&self, features: ArrayView2<'_, f64>) -> Result<Array2<f64>, MlError> {
        if features.ncols() != self.mean.len() {
            return Err(MlError::dataset(format!(
                "Scaler fitted on {} columns, got {}",
                self.mean.len(),
                features.ncols()
            )));
        }
        Ok((&features - &self.mean) / &self.scale)
    }

    pub fn mean(&self) -> &Array1<f64> {
        &self.mean
    }

    pub fn scale(&self) -> &Array1<f64> {
        &self.scale
    }
}

/// Shuffle row indices with a seeded RNG and cut off the test rows.
///
/// The test partition holds `ceil(test_size * n)` rows. Returns
/// `(train_indices, test_indices)`; both must be non-empty.
pub fn train_test_split(
    n_rows: usize,
    test_size: f64,
    seed: u64,
) -> Result<(Vec<usize>, Vec<usize>), MlError> {
    if !(test_size > 0.0 && test_size < 1.0) {
        return Err(MlError::dataset(format!(
            "test_size must be in (0, 1), got {test_size}"
        )));
    }
    let n_test = (test_size * n_rows as f64).ceil() as usize;
    if n_test == 0 || n_test >= n_rows {
        return Err(MlError::dataset(format!(
            "Splitting {n_rows} rows with test_size {test_size} leaves an empty partition"
        )));
    }

    let mut indices: Vec<usize> = (0..n_rows).collect();
    let mut rng = StdRng::seed_from_u64(seed);
    indices.shuffle(&mut rng);

    let train = indices.split_off(n_test);
    Ok((train, indices))
}
