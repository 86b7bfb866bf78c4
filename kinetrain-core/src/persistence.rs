//! Atomic file writes for model artifacts and run reports.
//!
//! Every artifact is written to a `.tmp` sibling first and then renamed into
//! place, so a reader never observes a half-written file.

use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Atomically write JSON data to a file.
///
/// Serializes `data` to pretty-printed JSON and hands it to [`atomic_write`].
pub fn atomic_write_json<T: serde::Serialize>(path: &Path, data: &T) -> io::Result<()> {
    let json = serde_json::to_string_pretty(data).map_err(io::Error::other)?;
    atomic_write(path, json.as_bytes())
}

/// Atomically write raw bytes to a file.
///
/// Writes to a `.tmp` sibling file, flushes it to disk, then renames it onto
/// the target path. Creates parent directories if they don't exist. On any
/// failure the temporary file is removed and the target is left untouched.
pub fn atomic_write(path: &Path, data: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let tmp = tmp_path(path);
    let result = write_and_sync(&tmp, data).and_then(|()| std::fs::rename(&tmp, path));
    if result.is_err() {
        let _ = std::fs::remove_file(&tmp);
    }
    result
}

fn write_and_sync(tmp: &Path, data: &[u8]) -> io::Result<()> {
    let mut file = std::fs::File::create(tmp)?;
    file.write_all(data)?;
    file.sync_all()
}

/// Sibling path used while a write is in flight.
pub fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};
    use tempfile::TempDir;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Snapshot {
        epoch: usize,
        accuracy: f64,
    }

    #[test]
    fn test_atomic_write_json_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("model.json");

        let data = Snapshot {
            epoch: 3,
            accuracy: 0.9666666666666667,
        };

        atomic_write_json(&path, &data).unwrap();
        let loaded: Snapshot =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(loaded, data);
    }

    #[test]
    fn test_atomic_write_creates_parent_dirs() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("dir").join("model.json");

        atomic_write(&path, b"{}").unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_atomic_write_no_tmp_leftover() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("clean.json");

        atomic_write_json(&path, &"test").unwrap();
        assert!(!tmp_path(&path).exists());
    }

    #[test]
    fn test_tmp_path_keeps_extension() {
        let tmp = tmp_path(Path::new("/models/forest.json"));
        assert_eq!(tmp, PathBuf::from("/models/forest.json.tmp"));
    }

    #[test]
    fn test_failed_write_leaves_nothing_behind() {
        let dir = TempDir::new().unwrap();
        // A directory sitting on the target path makes the rename fail.
        let path = dir.path().join("occupied");
        std::fs::create_dir(&path).unwrap();
        std::fs::write(path.join("keep"), b"x").unwrap();

        assert!(atomic_write(&path, b"data").is_err());
        assert!(!tmp_path(&path).exists());
        assert!(path.is_dir());
    }
}
