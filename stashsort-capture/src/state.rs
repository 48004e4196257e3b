//! Persisted capture state.
//!
//! A small JSON document recording whether capture was running when the
//! process last changed it, so the next launch can resume.

use crate::error::CaptureError;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, Write};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureState {
    pub running: bool,
    /// RFC 3339 time of the last write.
    pub timestamp: String,
    pub interface: String,
    pub port_range: (u16, u16),
}

impl CaptureState {
    pub fn new(running: bool, interface: &str, port_range: (u16, u16)) -> Self {
        Self {
            running,
            timestamp: Utc::now().to_rfc3339(),
            interface: interface.to_string(),
            port_range,
        }
    }
}

/// Location of the state document.
#[derive(Debug, Clone)]
pub struct StateFile {
    path: PathBuf,
}

impl StateFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the saved state. A missing file means "not running"; so does an
    /// unreadable one, after logging.
    pub fn load(&self) -> Option<CaptureState> {
        if !self.path.exists() {
            return None;
        }
        let result = File::open(&self.path)
            .map_err(CaptureError::from)
            .and_then(|f| Ok(serde_json::from_reader(BufReader::new(f))?));
        match result {
            Ok(state) => Some(state),
            Err(e) => {
                tracing::error!("Failed to restore capture state from {}: {}", self.path.display(), e);
                None
            }
        }
    }

    pub fn save(&self, state: &CaptureState) -> Result<(), CaptureError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let data = serde_json::to_vec_pretty(state)?;
        let tmp = self.path.with_extension("json.tmp");
        let mut file = File::create(&tmp)?;
        file.write_all(&data)?;
        file.sync_all()?;
        fs::rename(&tmp, &self.path)?;
        tracing::info!("Saved capture state: running={}", state.running);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_state() {
        let dir = TempDir::new().unwrap();
        let file = StateFile::new(dir.path().join("capture_state.json"));
        assert!(file.load().is_none());
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let file = StateFile::new(dir.path().join("nested").join("capture_state.json"));
        file.save(&CaptureState::new(true, "Ethernet", (20200, 20300)))
            .unwrap();

        let state = file.load().unwrap();
        assert!(state.running);
        assert_eq!(state.interface, "Ethernet");
        assert_eq!(state.port_range, (20200, 20300));

        let raw: serde_json::Value =
            serde_json::from_slice(&fs::read(file.path()).unwrap()).unwrap();
        assert_eq!(raw["port_range"], serde_json::json!([20200, 20300]));
        assert!(raw["timestamp"].is_string());
    }

    #[test]
    fn test_corrupt_state_is_not_running() {
        let dir = TempDir::new().unwrap();
        let file = StateFile::new(dir.path().join("capture_state.json"));
        fs::write(file.path(), b"{\"running\": tr").unwrap();
        assert!(file.load().is_none());
    }
}
