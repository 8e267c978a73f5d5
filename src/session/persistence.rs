//! History file storage.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use super::Message;
use crate::error::{BenchError, Result};
use crate::workspace::write_atomic;

/// Reads and writes one conversation history file.
///
/// The file is a pretty-printed JSON array of `{role, content}` objects.
#[derive(Debug, Clone)]
pub struct HistoryStore {
    path: PathBuf,
}

impl HistoryStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Load the message log, or `None` when the file does not exist.
    ///
    /// A file that exists but does not parse is reported as
    /// [`BenchError::CorruptHistory`] and left in place.
    pub fn load(&self) -> Result<Option<Vec<Message>>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&self.path)?;
        let messages: Vec<Message> =
            serde_json::from_str(&content).map_err(|e| BenchError::CorruptHistory {
                path: self.path.clone(),
                reason: e.to_string(),
            })?;
        debug!(
            "Loaded {} messages from {}",
            messages.len(),
            self.path.display()
        );
        Ok(Some(messages))
    }

    /// Persist the full message log atomically.
    pub fn save(&self, messages: &[Message]) -> Result<()> {
        let json = serde_json::to_string_pretty(messages)?;
        write_atomic(&self.path, json.as_bytes())?;
        debug!("Saved {} messages to {}", messages.len(), self.path.display());
        Ok(())
    }

    /// Delete the history file if present.
    pub fn remove(&self) -> Result<bool> {
        if !self.path.exists() {
            return Ok(false);
        }
        fs::remove_file(&self.path)?;
        Ok(true)
    }
}
