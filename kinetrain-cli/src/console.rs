//! Terminal output for a running pipeline.

use kinetrain_core::{DeliveryAck, SinkError};
use kinetrain_ml::RunCallback;
use kinetrain_ml::training::RunState;
use std::path::Path;

/// Prints every epoch outcome and delivery acknowledgment to stdout.
pub struct ConsoleCallback {
    quiet: bool,
}

impl ConsoleCallback {
    pub fn new(quiet: bool) -> Self {
        Self { quiet }
    }
}

impl RunCallback for ConsoleCallback {
    fn on_state(&self, state: RunState) {
        if !self.quiet && matches!(state, RunState::Training { .. }) {
            println!("▸ {state}");
        }
    }

    fn on_epoch_end(&self, epoch: usize, accuracy: f64, ack: Option<&DeliveryAck>) {
        if self.quiet {
            return;
        }
        println!("Epoch {epoch}: accuracy {accuracy:.4}");
        if let Some(ack) = ack {
            println!("Sink response: {ack}");
        }
    }

    fn on_sink_failure(&self, epoch: usize, error: &SinkError) {
        eprintln!("Epoch {epoch}: progress record not delivered: {error}");
    }

    fn on_persisted(&self, path: &Path, bytes: u64) {
        if !self.quiet {
            println!("Model saved to {} ({bytes} bytes)", path.display());
        }
    }
}
