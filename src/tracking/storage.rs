//! JSON file persistence for queue state.

use super::{QueueState, StateStore};
use crate::error::{Error, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// State store backed by a single JSON document
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    /// Store at `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Location of the state file
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl StateStore for JsonFileStore {
    /// Returns an empty `QueueState` if the file doesn't exist.
    fn load(&self) -> Result<QueueState> {
        if !self.path.exists() {
            return Ok(QueueState::new());
        }

        let content = fs::read_to_string(&self.path)
            .map_err(|e| Error::Tracking(format!("failed to read {}: {e}", self.path.display())))?;

        serde_json::from_str(&content)
            .map_err(|e| Error::Tracking(format!("failed to parse {}: {e}", self.path.display())))
    }

    /// Writes to a sibling temp file, then renames over the target.
    fn save(&self, state: &QueueState) -> Result<()> {
        if let Some(dir) = self.path.parent()
            && !dir.as_os_str().is_empty()
            && !dir.exists()
        {
            fs::create_dir_all(dir)
                .map_err(|e| Error::Tracking(format!("failed to create {}: {e}", dir.display())))?;
        }

        let mut content = serde_json::to_string_pretty(state)
            .map_err(|e| Error::Tracking(format!("failed to serialize queue state: {e}")))?;
        content.push('\n');

        let temp = self.temp_path();
        fs::write(&temp, content)
            .map_err(|e| Error::Tracking(format!("failed to write {}: {e}", temp.display())))?;
        fs::rename(&temp, &self.path).map_err(|e| {
            Error::Tracking(format!("failed to replace {}: {e}", self.path.display()))
        })?;

        Ok(())
    }
}
