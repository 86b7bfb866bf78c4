//! Pipeline configuration.
//!
//! Uses `figment` for layered configuration: defaults -> user config file ->
//! workspace config file -> environment (`KINETRAIN_*`) -> CLI overrides.
//! Everything is resolved once at process start and validated eagerly.

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use kinetrain_core::{ConfigError, TelemetryConfig};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::path::{Path, PathBuf};

/// Name of the workspace-level config file.
pub const CONFIG_FILE_NAME: &str = "kinetrain.toml";

/// Top-level configuration handed to the orchestrator.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub data: DataConfig,
    #[serde(default)]
    pub training: TrainingConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

/// Where the dataset comes from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataSourceKind {
    /// The bundled Iris dataset.
    #[default]
    Iris,
    /// A headed CSV file with numeric feature columns and one label column.
    Csv,
}

/// Dataset and preprocessing configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConfig {
    #[serde(default)]
    pub source: DataSourceKind,
    /// CSV path, required when `source = "csv"`.
    #[serde(default)]
    pub path: Option<PathBuf>,
    #[serde(default = "default_label_column")]
    pub label_column: String,
    /// Fraction of rows held out for evaluation.
    #[serde(default = "default_test_size")]
    pub test_size: f64,
    #[serde(default = "default_seed")]
    pub split_seed: u64,
    /// Standardize features (zero mean, unit variance) using training statistics.
    #[serde(default = "default_true")]
    pub standardize: bool,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            source: DataSourceKind::default(),
            path: None,
            label_column: default_label_column(),
            test_size: default_test_size(),
            split_seed: default_seed(),
            standardize: true,
        }
    }
}

fn default_label_column() -> String {
    "target".to_string()
}

fn default_test_size() -> f64 {
    0.2
}

fn default_seed() -> u64 {
    42
}

fn default_true() -> bool {
    true
}

/// Maximum tree depth: a fixed limit or unbounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DepthLimit {
    Unbounded,
    Limited(usize),
}

impl DepthLimit {
    pub fn as_option(&self) -> Option<usize> {
        match self {
            Self::Unbounded => None,
            Self::Limited(depth) => Some(*depth),
        }
    }
}

impl fmt::Display for DepthLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unbounded => f.write_str("none"),
            Self::Limited(depth) => write!(f, "{depth}"),
        }
    }
}

// TOML has no null, so unbounded is spelled "none".
impl Serialize for DepthLimit {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Unbounded => serializer.serialize_str("none"),
            Self::Limited(depth) => serializer.serialize_u64(*depth as u64),
        }
    }
}

impl<'de> Deserialize<'de> for DepthLimit {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Depth(u64),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Depth(depth) => Ok(Self::Limited(depth as usize)),
            Raw::Text(text) => match text.trim().to_ascii_lowercase().as_str() {
                "none" | "unbounded" | "" => Ok(Self::Unbounded),
                other => other
                    .parse::<usize>()
                    .map(Self::Limited)
                    .map_err(|_| serde::de::Error::custom(format!("invalid max_depth '{text}'"))),
            },
        }
    }
}

/// Candidate values searched by the trainer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridConfig {
    #[serde(default = "default_n_estimators")]
    pub n_estimators: Vec<usize>,
    #[serde(default = "default_max_depth")]
    pub max_depth: Vec<DepthLimit>,
    #[serde(default = "default_min_samples_split")]
    pub min_samples_split: Vec<usize>,
    #[serde(default = "default_min_samples_leaf")]
    pub min_samples_leaf: Vec<usize>,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            n_estimators: default_n_estimators(),
            max_depth: default_max_depth(),
            min_samples_split: default_min_samples_split(),
            min_samples_leaf: default_min_samples_leaf(),
        }
    }
}

fn default_n_estimators() -> Vec<usize> {
    vec![50, 100, 200]
}

fn default_max_depth() -> Vec<DepthLimit> {
    vec![
        DepthLimit::Unbounded,
        DepthLimit::Limited(10),
        DepthLimit::Limited(20),
        DepthLimit::Limited(30),
    ]
}

fn default_min_samples_split() -> Vec<usize> {
    vec![2, 5, 10]
}

fn default_min_samples_leaf() -> Vec<usize> {
    vec![1, 2, 4]
}

/// Training loop configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingConfig {
    /// Independent training trials to run.
    #[serde(default = "default_epochs")]
    pub epochs: usize,
    #[serde(default = "default_cv_folds")]
    pub cv_folds: usize,
    /// Seed for the base estimator.
    #[serde(default = "default_seed")]
    pub seed: u64,
    /// Grid search worker threads (0 = one per core).
    #[serde(default)]
    pub workers: usize,
    #[serde(default)]
    pub grid: GridConfig,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            epochs: default_epochs(),
            cv_folds: default_cv_folds(),
            seed: default_seed(),
            workers: 0,
            grid: GridConfig::default(),
        }
    }
}

fn default_epochs() -> usize {
    3
}

fn default_cv_folds() -> usize {
    3
}

/// Artifact output configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_model_path")]
    pub model_path: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            model_path: default_model_path(),
        }
    }
}

fn default_model_path() -> PathBuf {
    PathBuf::from("model.json")
}

impl PipelineConfig {
    /// Validate every section, failing on the first invalid field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.data.validate()?;
        self.training.validate()?;
        self.telemetry.validate()?;
        if self.output.model_path.as_os_str().is_empty() {
            return Err(ConfigError::missing("output.model_path"));
        }
        if self.output.model_path.is_dir() {
            return Err(ConfigError::invalid(format!(
                "output.model_path '{}' is a directory",
                self.output.model_path.display()
            )));
        }
        Ok(())
    }
}

impl DataConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.source == DataSourceKind::Csv {
            match &self.path {
                None => return Err(ConfigError::missing("data.path")),
                Some(path) if !path.exists() => {
                    return Err(ConfigError::FileNotFound { path: path.clone() });
                }
                Some(_) => {}
            }
            if self.label_column.trim().is_empty() {
                return Err(ConfigError::missing("data.label_column"));
            }
        }
        if !(self.test_size > 0.0 && self.test_size < 1.0) {
            return Err(ConfigError::invalid(format!(
                "data.test_size must be in (0, 1), got {}",
                self.test_size
            )));
        }
        Ok(())
    }
}

impl TrainingConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.epochs == 0 {
            return Err(ConfigError::invalid(
                "training.epochs must be at least 1; with no epochs there is no model to persist",
            ));
        }
        if self.cv_folds < 2 {
            return Err(ConfigError::invalid("training.cv_folds must be at least 2"));
        }
        self.grid.validate()
    }
}

impl GridConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.n_estimators.is_empty()
            || self.max_depth.is_empty()
            || self.min_samples_split.is_empty()
            || self.min_samples_leaf.is_empty()
        {
            return Err(ConfigError::invalid(
                "every training.grid axis needs at least one candidate",
            ));
        }
        if self.n_estimators.contains(&0) {
            return Err(ConfigError::invalid("training.grid.n_estimators must be positive"));
        }
        if self.max_depth.contains(&DepthLimit::Limited(0)) {
            return Err(ConfigError::invalid(
                "training.grid.max_depth must be positive or \"none\"",
            ));
        }
        if self.min_samples_split.iter().any(|&s| s < 2) {
            return Err(ConfigError::invalid(
                "training.grid.min_samples_split must be at least 2",
            ));
        }
        if self.min_samples_leaf.contains(&0) {
            return Err(ConfigError::invalid(
                "training.grid.min_samples_leaf must be at least 1",
            ));
        }
        Ok(())
    }
}

/// User-level config file, e.g. `~/.config/kinetrain/config.toml`.
pub fn user_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("dev", "kinetrain", "kinetrain")
        .map(|dirs| dirs.config_dir().join("config.toml"))
}

/// Build the layered figment without extracting it.
///
/// Priority (highest to lowest):
/// 1. Explicit overrides (passed as argument)
/// 2. Environment variables (prefixed with `KINETRAIN_`, nested with `__`)
/// 3. Explicit config file, or `kinetrain.toml` in the workspace
/// 4. User config
/// 5. Built-in defaults
pub fn figment(
    workspace: Option<&Path>,
    config_file: Option<&Path>,
    overrides: Option<&figment::value::Dict>,
) -> Figment {
    let mut figment = Figment::from(Serialized::defaults(PipelineConfig::default()));

    if let Some(user_config) = user_config_path() {
        if user_config.exists() {
            figment = figment.merge(Toml::file(&user_config));
        }
    }

    if let Some(file) = config_file {
        figment = figment.merge(Toml::file(file));
    } else if let Some(ws) = workspace {
        let ws_config = ws.join(CONFIG_FILE_NAME);
        if ws_config.exists() {
            figment = figment.merge(Toml::file(&ws_config));
        }
    }

    // KINETRAIN_TRAINING__EPOCHS, KINETRAIN_TELEMETRY__STREAM_NAME, ...
    figment = figment.merge(Env::prefixed("KINETRAIN_").split("__"));

    if let Some(overrides) = overrides {
        figment = figment.merge(Serialized::defaults(overrides));
    }

    figment
}

/// Load and validate configuration from layered sources.
pub fn load_config(
    workspace: Option<&Path>,
    config_file: Option<&Path>,
    overrides: Option<&figment::value::Dict>,
) -> Result<PipelineConfig, ConfigError> {
    if let Some(file) = config_file {
        if !file.exists() {
            return Err(ConfigError::FileNotFound {
                path: file.to_path_buf(),
            });
        }
    }
    let config: PipelineConfig = figment(workspace, config_file, overrides)
        .extract()
        .map_err(|e| ConfigError::Load {
            message: e.to_string(),
        })?;
    config.validate()?;
    Ok(config)
}
