//! Local transports: an append-only JSON-lines file and a no-op sink.

use super::{DeliveryAck, RecordTransport};
use crate::error::SinkError;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

/// Appends each payload as one line to a file. The line number serves as the
/// sequence number of the acknowledgment, counted across runs: lines already
/// in the file when the first record arrives are included.
pub struct JsonlTransport {
    path: PathBuf,
    // Serializes appends so concurrent emitters never interleave lines.
    // `None` until the existing file has been counted.
    lines: Mutex<Option<u64>>,
}

impl JsonlTransport {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lines: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn existing_lines(&self) -> Result<u64, SinkError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => Ok(bytes.iter().filter(|&&b| b == b'\n').count() as u64),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(0),
            Err(e) => Err(self.io_error(e)),
        }
    }

    fn io_error(&self, e: std::io::Error) -> SinkError {
        SinkError::Transport {
            sink: "jsonl".to_string(),
            message: format!("{}: {e}", self.path.display()),
        }
    }
}

#[async_trait]
impl RecordTransport for JsonlTransport {
    fn name(&self) -> &str {
        "jsonl"
    }

    async fn put_record(&self, payload: &[u8], _partition_key: &str) -> Result<DeliveryAck, SinkError> {
        let mut guard = self.lines.lock().await;
        let written = match *guard {
            Some(n) => n,
            None => self.existing_lines().await?,
        };

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| self.io_error(e))?;
            }
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| self.io_error(e))?;

        let mut line = Vec::with_capacity(payload.len() + 1);
        line.extend_from_slice(payload);
        line.push(b'\n');
        file.write_all(&line).await.map_err(|e| self.io_error(e))?;
        file.flush().await.map_err(|e| self.io_error(e))?;

        let line_number = written + 1;
        *guard = Some(line_number);
        Ok(DeliveryAck {
            sink: "jsonl".to_string(),
            stream: self.path.display().to_string(),
            shard_id: None,
            sequence_number: Some(line_number.to_string()),
            record_id: None,
            attempts: 1,
        })
    }
}

/// Accepts every record and delivers nothing.
#[derive(Debug, Default)]
pub struct DisabledTransport;

#[async_trait]
impl RecordTransport for DisabledTransport {
    fn name(&self) -> &str {
        "disabled"
    }

    async fn put_record(&self, _payload: &[u8], _partition_key: &str) -> Result<DeliveryAck, SinkError> {
        Ok(DeliveryAck {
            sink: "disabled".to_string(),
            stream: String::new(),
            shard_id: None,
            sequence_number: None,
            record_id: None,
            attempts: 1,
        })
    }
}
