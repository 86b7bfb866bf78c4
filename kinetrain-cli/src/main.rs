//! kinetrain CLI: train a classifier epoch by epoch and stream progress.
//!
//! `kinetrain` with no subcommand runs `train`.

mod commands;
mod console;

use clap::Parser;
use kinetrain_core::{ConfigError, FailurePolicy, SinkKind};
use kinetrain_ml::{Stage, StageError};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// kinetrain: grid-searched random forests with streaming progress telemetry
#[derive(Parser, Debug)]
#[command(name = "kinetrain", version, about, long_about = None)]
struct Cli {
    /// Workspace directory (where kinetrain.toml is looked up)
    #[arg(short, long, default_value = ".")]
    workspace: PathBuf,

    /// Configuration file path (replaces the workspace kinetrain.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long)]
    quiet: bool,

    /// Subcommand
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Train, evaluate and emit progress for every epoch, then persist the model
    Train(TrainArgs),
    /// Score a persisted model on the configured test partition
    Evaluate {
        /// Artifact to load (defaults to output.model_path)
        #[arg(short, long)]
        model: Option<PathBuf>,

        /// Print the metrics as JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Write the default configuration to <workspace>/kinetrain.toml
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Print the resolved configuration
    Config,
}

/// Overrides for the most commonly changed settings.
#[derive(clap::Args, Debug, Default, Clone)]
struct TrainArgs {
    /// Number of training epochs
    #[arg(short, long)]
    epochs: Option<usize>,

    /// Where to write the model artifact
    #[arg(long)]
    model_path: Option<PathBuf>,

    /// Telemetry sink: kinesis, firehose, jsonl, disabled
    #[arg(long, value_parser = parse_sink)]
    sink: Option<SinkKind>,

    /// Stream (or delivery stream) name
    #[arg(long)]
    stream: Option<String>,

    /// AWS region of the stream
    #[arg(long)]
    region: Option<String>,

    /// Stop the run when a progress record cannot be delivered
    #[arg(long)]
    abort_on_sink_failure: bool,

    /// Write the run report (per-epoch metrics, acks, failures) as JSON
    #[arg(long)]
    report: Option<PathBuf>,
}

fn parse_sink(value: &str) -> Result<SinkKind, String> {
    match value.to_ascii_lowercase().as_str() {
        "kinesis" => Ok(SinkKind::Kinesis),
        "firehose" => Ok(SinkKind::Firehose),
        "jsonl" => Ok(SinkKind::Jsonl),
        "disabled" | "none" => Ok(SinkKind::Disabled),
        other => Err(format!(
            "unknown sink '{other}' (expected kinesis, firehose, jsonl or disabled)"
        )),
    }
}

impl TrainArgs {
    /// Highest-priority configuration layer built from the flags.
    fn overrides(&self) -> figment::value::Dict {
        use figment::value::{Dict, Value};

        let mut training = Dict::new();
        if let Some(epochs) = self.epochs {
            training.insert("epochs".into(), Value::from(epochs as u64));
        }

        let mut telemetry = Dict::new();
        if let Some(sink) = self.sink {
            telemetry.insert("sink".into(), Value::from(sink.as_str()));
        }
        if let Some(stream) = &self.stream {
            telemetry.insert("stream_name".into(), Value::from(stream.as_str()));
        }
        if let Some(region) = &self.region {
            telemetry.insert("region".into(), Value::from(region.as_str()));
        }
        if self.abort_on_sink_failure {
            telemetry.insert("on_failure".into(), Value::from(FailurePolicy::Abort.as_str()));
        }

        let mut output = Dict::new();
        if let Some(path) = &self.model_path {
            output.insert(
                "model_path".into(),
                Value::from(path.to_string_lossy().into_owned()),
            );
        }

        let mut overrides = Dict::new();
        for (section, values) in [("training", training), ("telemetry", telemetry), ("output", output)] {
            if !values.is_empty() {
                overrides.insert(section.into(), Value::from(values));
            }
        }
        overrides
    }
}

/// Exit status for a failed command: configuration 2, then one code per
/// pipeline stage, 130 when cancelled.
fn exit_code_for(err: &anyhow::Error) -> u8 {
    if let Some(stage_err) = err.downcast_ref::<StageError>() {
        if stage_err.is_cancelled() {
            return 130;
        }
        return match stage_err.stage {
            Stage::Loading => 3,
            Stage::Training => 4,
            Stage::Evaluating => 5,
            Stage::Emitting => 6,
            Stage::Persisting => 7,
        };
    }
    if err.downcast_ref::<ConfigError>().is_some() {
        return 2;
    }
    1
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    // Set up tracing: human-readable stderr + JSON file logging
    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::new(filter));

    let log_dir = directories::ProjectDirs::from("dev", "kinetrain", "kinetrain")
        .map(|d| d.data_dir().join("logs"))
        .unwrap_or_else(|| PathBuf::from("."));
    let _ = std::fs::create_dir_all(&log_dir);
    let file_appender = tracing_appender::rolling::daily(&log_dir, "kinetrain.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    let json_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(non_blocking)
        .with_filter(EnvFilter::new("debug"));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    // Resolve workspace
    let workspace = cli
        .workspace
        .canonicalize()
        .unwrap_or_else(|_| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));

    let command = cli
        .command
        .unwrap_or_else(|| Commands::Train(TrainArgs::default()));
    let result = commands::handle_command(command, &workspace, cli.config.as_deref(), cli.quiet).await;

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %err, "Command failed");
            eprintln!("Error: {err:#}");
            ExitCode::from(exit_code_for(&err))
        }
    }
}
