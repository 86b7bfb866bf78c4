//! Model artifact: the single self-contained file a run leaves behind.

use crate::algorithms::{Model, model_from_value};
use crate::data::StandardScaler;
use crate::error::MlError;
use chrono::{DateTime, Utc};
use ndarray::{Array2, ArrayView2};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::Path;

pub const FORMAT_VERSION: u32 = 1;

/// Serialized model plus the metadata needed to use it.
///
/// `checksum` is the SHA-256 of the compact JSON encoding of `model` and is
/// verified on load.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub format_version: u32,
    pub kind: String,
    pub run_id: String,
    pub created_at: DateTime<Utc>,
    pub classes: Vec<String>,
    pub feature_names: Vec<String>,
    pub params: serde_json::Value,
    /// Scaling the model expects its inputs to have gone through.
    pub scaler: Option<StandardScaler>,
    pub checksum: String,
    pub model: serde_json::Value,
}

fn checksum(model: &serde_json::Value) -> Result<String, MlError> {
    let bytes = serde_json::to_vec(model)?;
    Ok(format!("{:x}", Sha256::digest(&bytes)))
}

impl ModelArtifact {
    pub fn new(
        model: &dyn Model,
        run_id: impl Into<String>,
        classes: Vec<String>,
        feature_names: Vec<String>,
        params: serde_json::Value,
        scaler: Option<StandardScaler>,
    ) -> Result<Self, MlError> {
        if classes.len() != model.n_classes() {
            return Err(MlError::persistence(format!(
                "Model predicts {} classes but {} class names were given",
                model.n_classes(),
                classes.len()
            )));
        }
        let value = model.to_value()?;
        Ok(Self {
            format_version: FORMAT_VERSION,
            kind: model.kind().to_string(),
            run_id: run_id.into(),
            created_at: Utc::now(),
            classes,
            feature_names,
            params,
            scaler,
            checksum: checksum(&value)?,
            model: value,
        })
    }

    /// Write atomically: a temp file next to `path` is synced then renamed, so
    /// a failed save never leaves a partial artifact behind.
    pub fn save(&self, path: &Path) -> Result<u64, MlError> {
        let bytes = serde_json::to_vec_pretty(self)?;
        kinetrain_core::persistence::atomic_write(path, &bytes).map_err(|e| {
            MlError::persistence(format!("Failed to write {}: {e}", path.display()))
        })?;
        Ok(bytes.len() as u64)
    }

    /// Read and verify an artifact without rebuilding the model.
    pub fn read(path: &Path) -> Result<Self, MlError> {
        let content = std::fs::read(path).map_err(|e| {
            MlError::persistence(format!("Failed to read {}: {e}", path.display()))
        })?;
        let artifact: Self = serde_json::from_slice(&content).map_err(|e| {
            MlError::persistence(format!("{} is not a model artifact: {e}", path.display()))
        })?;
        if artifact.format_version != FORMAT_VERSION {
            return Err(MlError::persistence(format!(
                "Unsupported artifact format version {} (expected {FORMAT_VERSION})",
                artifact.format_version
            )));
        }
        let actual = checksum(&artifact.model)?;
        if actual != artifact.checksum {
            return Err(MlError::persistence(format!(
                "Checksum mismatch for {}: expected {}, got {actual}",
                path.display(),
                artifact.checksum
            )));
        }
        Ok(artifact)
    }

    /// Rebuild the fitted model.
    pub fn restore(&self) -> Result<Box<dyn Model>, MlError> {
        let model = model_from_value(&self.kind, self.model.clone())?;
        if model.n_classes() != self.classes.len() {
            return Err(MlError::model(format!(
                "Artifact lists {} classes but the model predicts {}",
                self.classes.len(),
                model.n_classes()
            )));
        }
        Ok(model)
    }

    /// Bring raw feature rows into the space the model was trained in.
    ///
    /// Applies the stored scaler when the run standardized its inputs and
    /// otherwise returns the rows unchanged.
    pub fn prepare_features(&self, raw: ArrayView2<'_, f64>) -> Result<Array2<f64>, MlError> {
        if raw.ncols() != self.feature_names.len() {
            return Err(MlError::model(format!(
                "Artifact expects {} features, got {}",
                self.feature_names.len(),
                raw.ncols()
            )));
        }
        match &self.scaler {
            Some(scaler) => scaler.transform(raw),
            None => Ok(raw.to_owned()),
        }
    }

    /// Read, verify and rebuild in one step.
    pub fn load(path: &Path) -> Result<(Self, Box<dyn Model>), MlError> {
        let artifact = Self::read(path)?;
        let model = artifact.restore()?;
        Ok((artifact, model))
    }
}
