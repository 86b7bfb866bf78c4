//! End-to-end tests for the epoch runner.
//!
//! These run the real grid search trainer on the bundled Iris data with a
//! reduced grid, and deliver progress records either to a JSON-lines file
//! through the real telemetry client or to in-memory sinks.

use async_trait::async_trait;
use kinetrain_core::persistence::tmp_path;
use kinetrain_core::{
    DeliveryAck, FailurePolicy, ProgressSink, SinkError, SinkKind, TelemetryClient,
    TelemetryConfig,
};
use kinetrain_ml::config::{DataConfig, DepthLimit, GridConfig, TrainingConfig};
use kinetrain_ml::data::Partition;
use kinetrain_ml::training::{RecordingCallback, RunEvent, evaluate};
use kinetrain_ml::{
    GridSearchTrainer, ModelArtifact, RunSettings, SplitDataset, Stage, TrainingRunner, load_split,
};
use pretty_assertions::assert_eq;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

fn small_training() -> TrainingConfig {
    TrainingConfig {
        workers: 2,
        grid: GridConfig {
            n_estimators: vec![8],
            max_depth: vec![DepthLimit::Unbounded, DepthLimit::Limited(3)],
            min_samples_split: vec![2],
            min_samples_leaf: vec![1],
        },
        ..TrainingConfig::default()
    }
}

fn trainer() -> Arc<GridSearchTrainer> {
    Arc::new(GridSearchTrainer::from_config(&small_training()).unwrap())
}

fn iris() -> Arc<SplitDataset> {
    Arc::new(load_split(&DataConfig::default()).unwrap())
}

fn jsonl_client(path: &Path) -> TelemetryClient {
    let config = TelemetryConfig {
        sink: SinkKind::Jsonl,
        jsonl_path: path.to_path_buf(),
        ..TelemetryConfig::default()
    };
    TelemetryClient::from_config(&config).unwrap()
}

/// Records every epoch it sees and fails on the configured ones.
#[derive(Default)]
struct ScriptedSink {
    fail_on: Vec<usize>,
    calls: Mutex<Vec<(usize, f64)>>,
}

#[async_trait]
impl ProgressSink for ScriptedSink {
    async fn emit(&self, epoch: usize, accuracy: f64) -> Result<DeliveryAck, SinkError> {
        self.calls.lock().unwrap().push((epoch, accuracy));
        if self.fail_on.contains(&epoch) {
            return Err(SinkError::Throttled {
                sink: "scripted".into(),
                message: "rate exceeded".into(),
            });
        }
        Ok(DeliveryAck {
            sink: "scripted".into(),
            stream: "test".into(),
            shard_id: Some("shardId-000000000000".into()),
            sequence_number: Some(format!("{epoch}")),
            record_id: None,
            attempts: 1,
        })
    }
}

#[tokio::test]
async fn three_epochs_emit_three_ordered_records_and_one_artifact() {
    let dir = TempDir::new().unwrap();
    let progress = dir.path().join("progress.jsonl");
    let model_path = dir.path().join("model.json");

    let mut runner = TrainingRunner::new(
        trainer(),
        Arc::new(jsonl_client(&progress)),
        RunSettings::new(3, &model_path),
    );
    let report = runner.run(iris(), CancellationToken::new()).await.unwrap();

    assert_eq!(report.epochs_completed, 3);
    assert_eq!(report.acks.len(), 3);
    assert!(report.sink_failures.is_empty());
    assert!(!report.cancelled);

    let lines: Vec<serde_json::Value> = std::fs::read_to_string(&progress)
        .unwrap()
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    let epochs: Vec<u64> = lines.iter().map(|r| r["epoch"].as_u64().unwrap()).collect();
    assert_eq!(epochs, vec![1, 2, 3]);
    for (record, accuracy) in lines.iter().zip(report.accuracies()) {
        assert_eq!(record["accuracy"].as_f64().unwrap(), *accuracy);
        assert_eq!(record["timestamp"].as_str().unwrap().len(), 19);
        assert!(
            record["message"]
                .as_str()
                .unwrap()
                .starts_with(&format!("Training at epoch {} - Accuracy: ", record["epoch"]))
        );
    }

    let entries: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name())
        .collect();
    assert_eq!(entries.len(), 2, "unexpected files: {entries:?}");
    assert!(!tmp_path(&model_path).exists());
    assert_eq!(report.artifact_path.as_deref(), Some(model_path.as_path()));
}

#[tokio::test]
async fn sink_failure_on_epoch_two_does_not_stop_training() {
    let dir = TempDir::new().unwrap();
    let model_path = dir.path().join("model.json");
    let sink = Arc::new(ScriptedSink {
        fail_on: vec![2],
        ..ScriptedSink::default()
    });
    let callback = Arc::new(RecordingCallback::new());

    let mut runner = TrainingRunner::new(trainer(), sink.clone(), RunSettings::new(3, &model_path))
        .with_callback(callback.clone());
    let report = runner.run(iris(), CancellationToken::new()).await.unwrap();

    assert_eq!(report.epochs_completed, 3);
    assert_eq!(report.acks.len(), 2);
    assert_eq!(report.sink_failures.len(), 1);
    assert_eq!(report.sink_failures[0].epoch, 2);
    assert_eq!(sink.calls.lock().unwrap().len(), 3);
    assert!(model_path.exists());

    let failures: Vec<usize> = callback
        .events()
        .into_iter()
        .filter_map(|e| match e {
            RunEvent::SinkFailure { epoch, .. } => Some(epoch),
            _ => None,
        })
        .collect();
    assert_eq!(failures, vec![2]);
}

#[tokio::test]
async fn abort_policy_fails_with_emitting_stage() {
    let dir = TempDir::new().unwrap();
    let model_path = dir.path().join("model.json");
    let sink = Arc::new(ScriptedSink {
        fail_on: vec![2],
        ..ScriptedSink::default()
    });

    let mut runner = TrainingRunner::new(
        trainer(),
        sink.clone(),
        RunSettings::new(3, &model_path).with_failure_policy(FailurePolicy::Abort),
    );
    let err = runner.run(iris(), CancellationToken::new()).await.unwrap_err();

    assert_eq!(err.stage, Stage::Emitting);
    assert_eq!(err.epoch, Some(2));
    assert_eq!(sink.calls.lock().unwrap().len(), 2);
    assert!(!model_path.exists());
}

#[tokio::test]
async fn training_partition_smaller_than_folds_fails_before_telemetry() {
    let dir = TempDir::new().unwrap();
    let model_path = dir.path().join("model.json");
    let full = iris();
    let tiny = Arc::new(SplitDataset {
        train: Partition {
            features: full.train.features.slice(ndarray::s![0..2, ..]).to_owned(),
            labels: full.train.labels[..2].to_vec(),
            indices: full.train.indices[..2].to_vec(),
        },
        ..(*full).clone()
    });
    let sink = Arc::new(ScriptedSink::default());

    let mut runner = TrainingRunner::new(trainer(), sink.clone(), RunSettings::new(3, &model_path));
    let err = runner.run(tiny, CancellationToken::new()).await.unwrap_err();

    assert_eq!(err.stage, Stage::Training);
    assert_eq!(err.epoch, Some(1));
    assert!(err.to_string().contains("cross-validation folds"));
    assert!(sink.calls.lock().unwrap().is_empty());
    assert!(!model_path.exists());
}

#[tokio::test]
async fn reloaded_artifact_predicts_like_the_trained_model() {
    let dir = TempDir::new().unwrap();
    let model_path = dir.path().join("model.json");
    let data = iris();

    let mut runner = TrainingRunner::new(
        trainer(),
        Arc::new(ScriptedSink::default()),
        RunSettings::new(1, &model_path),
    );
    let report = runner.run(Arc::clone(&data), CancellationToken::new()).await.unwrap();

    let (artifact, restored) = ModelArtifact::load(&model_path).unwrap();
    assert_eq!(artifact.run_id, report.run_id);
    assert_eq!(artifact.classes, data.class_names);
    assert_eq!(artifact.feature_names.len(), 4);
    assert!(artifact.scaler.is_some());

    // Training is deterministic, so a fresh fit reproduces the persisted model.
    let trained = kinetrain_ml::Trainer::train(trainer().as_ref(), &data.train, 3).unwrap();
    let expected = trained.model.predict(data.test.features.view()).unwrap();
    let actual = restored.predict(data.test.features.view()).unwrap();
    assert_eq!(actual, expected);
    assert_eq!(restored.to_value().unwrap(), trained.model.to_value().unwrap());

    let accuracy = evaluate(restored.as_ref(), &data.test).unwrap();
    assert_eq!(accuracy.to_bits(), report.accuracies()[0].to_bits());
}

#[tokio::test]
async fn evaluation_is_idempotent_and_bounded() {
    let data = iris();
    let trained = kinetrain_ml::Trainer::train(trainer().as_ref(), &data.train, 3).unwrap();
    let first = evaluate(trained.model.as_ref(), &data.test).unwrap();
    let second = evaluate(trained.model.as_ref(), &data.test).unwrap();
    assert_eq!(first.to_bits(), second.to_bits());
    assert!((0.0..=1.0).contains(&first));
    // Iris is easy; anything below this means the forest is broken.
    assert!(first > 0.8, "accuracy {first}");
}

#[tokio::test]
async fn cancellation_after_first_epoch_persists_latest_model() {
    let dir = TempDir::new().unwrap();
    let model_path = dir.path().join("model.json");
    let cancel = CancellationToken::new();

    /// Cancels the run as soon as the first record is emitted.
    struct CancellingSink(CancellationToken);

    #[async_trait]
    impl ProgressSink for CancellingSink {
        async fn emit(&self, epoch: usize, _accuracy: f64) -> Result<DeliveryAck, SinkError> {
            self.0.cancel();
            Ok(DeliveryAck {
                sink: "cancelling".into(),
                stream: "test".into(),
                shard_id: None,
                sequence_number: Some(epoch.to_string()),
                record_id: None,
                attempts: 1,
            })
        }
    }

    let mut runner = TrainingRunner::new(
        trainer(),
        Arc::new(CancellingSink(cancel.clone())),
        RunSettings::new(3, &model_path),
    );
    let report = runner.run(iris(), cancel).await.unwrap();

    assert!(report.cancelled);
    assert_eq!(report.epochs_completed, 1);
    assert!(model_path.exists());
}
