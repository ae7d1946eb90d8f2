use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use super::conversation::encode_jsonl;
use super::turn::Turn;
use crate::utils::{AzccError, Result};

/// Persists the session history as JSON Lines between runs
#[derive(Debug, Clone)]
pub struct HistoryStore {
    path: PathBuf,
}

impl HistoryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load recorded turns. A missing file is an empty history and
    /// malformed lines, including ones that are not valid UTF-8, are skipped.
    pub fn load(&self) -> Result<Vec<Turn>> {
        let raw = match fs::read(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("No history file at {}", self.path.display());
                return Ok(Vec::new());
            }
            Err(e) => return Err(AzccError::io(&self.path, e)),
        };

        let mut turns = Vec::new();
        for (index, line) in raw.split(|&b| b == b'\n').enumerate() {
            let parsed = std::str::from_utf8(line)
                .map_err(|e| e.to_string())
                .map(str::trim)
                .and_then(|line| {
                    if line.is_empty() {
                        Ok(None)
                    } else {
                        serde_json::from_str::<Turn>(line)
                            .map(Some)
                            .map_err(|e| e.to_string())
                    }
                });
            match parsed {
                Ok(Some(turn)) => turns.push(turn),
                Ok(None) => {}
                Err(e) => warn!(
                    line = index + 1,
                    "Skipping malformed history record in {}: {}",
                    self.path.display(),
                    e
                ),
            }
        }

        debug!("Loaded {} turns from {}", turns.len(), self.path.display());
        Ok(turns)
    }

    /// Replace the history file with `turns`, writing through a sibling
    /// temp file so a crash never leaves a half-written history.
    pub fn save(&self, turns: &[Turn]) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| AzccError::io(parent, e))?;
        }

        let tmp = self.tmp_path();
        fs::write(&tmp, encode_jsonl(turns)?).map_err(|e| AzccError::io(&tmp, e))?;
        fs::rename(&tmp, &self.path).map_err(|e| AzccError::io(&self.path, e))?;

        debug!("Saved {} turns to {}", turns.len(), self.path.display());
        Ok(())
    }

    /// Delete the history file if it exists
    pub fn clear(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(AzccError::io(&self.path, e)),
        }
    }

    fn tmp_path(&self) -> PathBuf {
        let name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "history".to_string());
        self.path.with_file_name(format!(".{}.tmp", name))
    }
}
