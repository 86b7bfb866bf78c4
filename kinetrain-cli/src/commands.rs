//! CLI subcommand handlers.

use crate::Commands;
use crate::TrainArgs;
use crate::console::ConsoleCallback;
use kinetrain_core::ConfigError;
use kinetrain_ml::config::{CONFIG_FILE_NAME, DataConfig, PipelineConfig, load_config};
use kinetrain_ml::training::ClassificationMetrics;
use kinetrain_ml::{
    MlError, ModelArtifact, Stage, StageError, TrainingRunner, load_split,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Handle a CLI subcommand.
pub async fn handle_command(
    command: Commands,
    workspace: &Path,
    config_file: Option<&Path>,
    quiet: bool,
) -> anyhow::Result<()> {
    match command {
        Commands::Train(args) => handle_train(args, workspace, config_file, quiet).await,
        Commands::Evaluate { model, json } => handle_evaluate(model, json, workspace, config_file),
        Commands::Init { force } => handle_init(workspace, force),
        Commands::Config => handle_show_config(workspace, config_file),
    }
}

async fn handle_train(
    args: TrainArgs,
    workspace: &Path,
    config_file: Option<&Path>,
    quiet: bool,
) -> anyhow::Result<()> {
    let overrides = args.overrides();
    let config = load_config(Some(workspace), config_file, Some(&overrides))?;
    tracing::info!(
        epochs = config.training.epochs,
        sink = config.telemetry.sink.as_str(),
        stream = %config.telemetry.stream_name,
        region = %config.telemetry.region,
        model_path = %config.output.model_path.display(),
        "Configuration resolved"
    );

    let data = load_split(&config.data).map_err(|e| StageError::new(Stage::Loading, None, e))?;

    // Missing credentials or a bad sink setup are configuration problems.
    let runner = TrainingRunner::from_config(&config).map_err(|e| match e {
        MlError::Sink(sink) => anyhow::Error::from(ConfigError::invalid(format!("telemetry: {sink}"))),
        other => anyhow::Error::from(other),
    })?;
    let mut runner = runner.with_callback(Arc::new(ConsoleCallback::new(quiet)));

    let cancel = CancellationToken::new();
    let interrupt = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Interrupt received, stopping after the current epoch");
                cancel.cancel();
            }
        })
    };
    let result = runner.run(Arc::new(data), cancel).await;
    interrupt.abort();
    let report = result?;

    if let Some(path) = &args.report {
        match kinetrain_core::persistence::atomic_write_json(path, &report) {
            Ok(()) => tracing::info!(path = %path.display(), "Run report written"),
            Err(e) => tracing::warn!(path = %path.display(), error = %e, "Failed to write run report"),
        }
    }

    if !quiet {
        let best = report
            .metrics
            .best_epoch
            .zip(report.metrics.best_accuracy)
            .map(|(epoch, acc)| format!("best accuracy {acc:.4} at epoch {epoch}"))
            .unwrap_or_else(|| "no accuracy recorded".to_string());
        println!(
            "Completed {} epoch(s); {best}; {} record(s) delivered, {} failed",
            report.epochs_completed,
            report.acks.len(),
            report.sink_failures.len()
        );
    }

    if report.cancelled {
        let saved = report
            .artifact_path
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_default();
        return Err(StageError::new(
            Stage::Training,
            Some(report.epochs_completed + 1),
            MlError::Cancelled(format!("interrupted, latest model saved to {saved}")),
        )
        .into());
    }
    Ok(())
}

fn handle_evaluate(
    model: Option<PathBuf>,
    json: bool,
    workspace: &Path,
    config_file: Option<&Path>,
) -> anyhow::Result<()> {
    let config = load_config(Some(workspace), config_file, None)?;
    let path = model.unwrap_or_else(|| config.output.model_path.clone());

    let EvaluationOutcome {
        artifact,
        metrics,
        test_rows,
    } = evaluate_artifact(&path, &config.data)?;

    if json {
        let output = serde_json::json!({
            "model": path.display().to_string(),
            "run_id": artifact.run_id,
            "classes": artifact.classes,
            "test_rows": test_rows,
            "metrics": metrics,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!("Model:     {} ({})", path.display(), artifact.kind);
    println!("Run:       {} at {}", artifact.run_id, artifact.created_at.to_rfc3339());
    println!("Params:    {}", artifact.params);
    println!("Test rows: {test_rows}");
    println!("Accuracy:  {:.4}", metrics.accuracy);
    println!(
        "Macro P/R/F1: {:.4} / {:.4} / {:.4}",
        metrics.precision, metrics.recall, metrics.f1_score
    );
    println!("\nConfusion matrix (rows = actual, columns = predicted):");
    let width = artifact.classes.iter().map(|c| c.len()).max().unwrap_or(0).max(5);
    print!("{:width$}", "");
    for class in &artifact.classes {
        print!("  {class:>width$}");
    }
    println!();
    for (class, row) in artifact.classes.iter().zip(&metrics.confusion_matrix) {
        print!("{class:width$}");
        for count in row {
            print!("  {count:>width$}");
        }
        println!();
    }
    Ok(())
}

struct EvaluationOutcome {
    artifact: ModelArtifact,
    metrics: ClassificationMetrics,
    test_rows: usize,
}

/// Score a saved model on the held-out partition.
///
/// The split is always loaded unscaled; the artifact's own scaler decides how
/// features are prepared, whatever the current data configuration says.
fn evaluate_artifact(
    path: &Path,
    data_config: &DataConfig,
) -> Result<EvaluationOutcome, StageError> {
    let (artifact, model) =
        ModelArtifact::load(path).map_err(|e| StageError::new(Stage::Loading, None, e))?;
    let raw_config = DataConfig {
        standardize: false,
        ..data_config.clone()
    };
    let data = load_split(&raw_config).map_err(|e| StageError::new(Stage::Loading, None, e))?;

    if artifact.feature_names != data.feature_names {
        tracing::warn!(
            artifact = ?artifact.feature_names,
            data = ?data.feature_names,
            "Artifact was trained on different feature columns"
        );
    }
    if artifact.scaler.is_some() != data_config.standardize {
        tracing::info!(
            artifact_standardized = artifact.scaler.is_some(),
            "Using the artifact's scaling instead of data.standardize"
        );
    }

    let features = artifact
        .prepare_features(data.test.features.view())
        .map_err(|e| StageError::new(Stage::Evaluating, None, e))?;
    let predicted = model
        .predict(features.view())
        .map_err(|e| StageError::new(Stage::Evaluating, None, MlError::evaluation(e.to_string())))?;
    let metrics = ClassificationMetrics::compute(&predicted, &data.test.labels, model.n_classes())
        .map_err(|e| StageError::new(Stage::Evaluating, None, e))?;

    Ok(EvaluationOutcome {
        artifact,
        metrics,
        test_rows: data.test.len(),
    })
}

fn handle_init(workspace: &Path, force: bool) -> anyhow::Result<()> {
    let config_path = workspace.join(CONFIG_FILE_NAME);
    if config_path.exists() && !force {
        println!(
            "Configuration file already exists at: {}",
            config_path.display()
        );
        return Ok(());
    }

    let toml_str = toml::to_string_pretty(&PipelineConfig::default())?;
    std::fs::write(&config_path, &toml_str)?;
    println!(
        "Created default configuration at: {}",
        config_path.display()
    );
    Ok(())
}

fn handle_show_config(workspace: &Path, config_file: Option<&Path>) -> anyhow::Result<()> {
    let config = load_config(Some(workspace), config_file, None)?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use kinetrain_ml::Model;
    use kinetrain_ml::algorithms::{ForestParams, RandomForest};
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    /// Fit a small forest on the standardized default split and save it.
    fn save_standardized_model(path: &Path) -> f64 {
        let split = load_split(&DataConfig::default()).unwrap();
        let forest = RandomForest::fit(
            ForestParams {
                n_estimators: 10,
                ..ForestParams::default()
            },
            split.train.features.view(),
            &split.train.labels,
            split.class_names.len(),
        )
        .unwrap();
        let predicted = forest.predict(split.test.features.view()).unwrap();
        let expected =
            ClassificationMetrics::compute(&predicted, &split.test.labels, 3).unwrap();
        ModelArtifact::new(
            &forest,
            "run-eval",
            split.class_names.clone(),
            split.feature_names.clone(),
            serde_json::to_value(forest.params()).unwrap(),
            split.scaler.clone(),
        )
        .unwrap()
        .save(path)
        .unwrap();
        expected.accuracy
    }

    #[test]
    fn test_evaluate_uses_artifact_scaler_regardless_of_config() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("model.json");
        let expected = save_standardized_model(&path);

        let standardized = evaluate_artifact(&path, &DataConfig::default()).unwrap();
        let unscaled_config = DataConfig {
            standardize: false,
            ..DataConfig::default()
        };
        let unscaled = evaluate_artifact(&path, &unscaled_config).unwrap();

        assert_eq!(standardized.test_rows, 30);
        assert_eq!(standardized.metrics.accuracy.to_bits(), expected.to_bits());
        assert_eq!(unscaled.metrics.accuracy.to_bits(), expected.to_bits());
        assert_eq!(unscaled.metrics.confusion_matrix, standardized.metrics.confusion_matrix);
    }

    #[test]
    fn test_evaluate_missing_model_is_a_loading_error() {
        let dir = TempDir::new().unwrap();
        let err = evaluate_artifact(&dir.path().join("absent.json"), &DataConfig::default())
            .err()
            .unwrap();
        assert_eq!(err.stage, Stage::Loading);
    }

    #[test]
    fn test_init_writes_loadable_defaults() {
        let dir = TempDir::new().unwrap();
        handle_init(dir.path(), false).unwrap();

        let content = std::fs::read_to_string(dir.path().join(CONFIG_FILE_NAME)).unwrap();
        let parsed: PipelineConfig = toml::from_str(&content).unwrap();
        assert_eq!(parsed.training.epochs, 3);
        assert_eq!(parsed.training.grid, PipelineConfig::default().training.grid);
        assert_eq!(parsed.telemetry.region, "eu-west-3");
        parsed.validate().unwrap();
    }

    #[test]
    fn test_init_keeps_existing_file_without_force() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, "# mine\n").unwrap();

        handle_init(dir.path(), false).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "# mine\n");

        handle_init(dir.path(), true).unwrap();
        assert!(std::fs::read_to_string(&path).unwrap().contains("[training]"));
    }
}
