//! Run observers: state transitions, per-epoch outcomes and sink failures.

use crate::training::runner::RunState;
use kinetrain_core::{DeliveryAck, SinkError};
use std::path::Path;
use std::sync::Mutex;

/// Trait for run callbacks. Every hook defaults to a no-op.
pub trait RunCallback: Send + Sync {
    fn on_state(&self, _state: RunState) {}

    /// Called once per evaluated epoch; `ack` is `None` when delivery failed.
    fn on_epoch_end(&self, _epoch: usize, _accuracy: f64, _ack: Option<&DeliveryAck>) {}

    fn on_sink_failure(&self, _epoch: usize, _error: &SinkError) {}

    fn on_persisted(&self, _path: &Path, _bytes: u64) {}
}

/// Ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopCallback;

impl RunCallback for NoopCallback {}

/// One observed event.
#[derive(Debug, Clone, PartialEq)]
pub enum RunEvent {
    State(RunState),
    EpochEnd {
        epoch: usize,
        accuracy: f64,
        acked: bool,
    },
    SinkFailure {
        epoch: usize,
        error: String,
    },
    Persisted {
        bytes: u64,
    },
}

/// Keeps every event in order.
#[derive(Debug, Default)]
pub struct RecordingCallback {
    events: Mutex<Vec<RunEvent>>,
}

impl RecordingCallback {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, event: RunEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }

    pub fn events(&self) -> Vec<RunEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn states(&self) -> Vec<RunState> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                RunEvent::State(state) => Some(state),
                _ => None,
            })
            .collect()
    }
}

impl RunCallback for RecordingCallback {
    fn on_state(&self, state: RunState) {
        self.push(RunEvent::State(state));
    }

    fn on_epoch_end(&self, epoch: usize, accuracy: f64, ack: Option<&DeliveryAck>) {
        self.push(RunEvent::EpochEnd {
            epoch,
            accuracy,
            acked: ack.is_some(),
        });
    }

    fn on_sink_failure(&self, epoch: usize, error: &SinkError) {
        self.push(RunEvent::SinkFailure {
            epoch,
            error: error.to_string(),
        });
    }

    fn on_persisted(&self, _path: &Path, bytes: u64) {
        self.push(RunEvent::Persisted { bytes });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_keeps_order() {
        let cb = RecordingCallback::new();
        cb.on_state(RunState::Training { epoch: 1 });
        cb.on_epoch_end(1, 0.5, None);
        cb.on_state(RunState::Done);
        assert_eq!(cb.events().len(), 3);
        assert_eq!(
            cb.states(),
            vec![RunState::Training { epoch: 1 }, RunState::Done]
        );
        assert_eq!(
            cb.events()[1],
            RunEvent::EpochEnd {
                epoch: 1,
                accuracy: 0.5,
                acked: false
            }
        );
    }
}
