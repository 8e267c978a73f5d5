//! Applying block patches to files on disk.

use std::fs;
use std::path::{Component, Path, PathBuf};

use tracing::info;

use super::engine::BlockPatchEngine;
use crate::error::{BenchError, Result};
use crate::protocol::Patch;
use crate::workspace::write_atomic;

/// Applies [`Patch`] commands to files below a root directory.
#[derive(Debug, Clone)]
pub struct BlockPatcher {
    root: PathBuf,
    engine: BlockPatchEngine,
}

impl BlockPatcher {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>, engine: BlockPatchEngine) -> Self {
        Self {
            root: root.into(),
            engine,
        }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn engine(&self) -> &BlockPatchEngine {
        &self.engine
    }

    /// Resolve a patch target below the root.
    ///
    /// Absolute paths and `..` components are rejected so a reply can never
    /// write outside the bench directory.
    pub fn resolve(&self, file: &str) -> Result<PathBuf> {
        let relative = Path::new(file.trim());
        let escapes = relative.components().any(|c| {
            matches!(
                c,
                Component::ParentDir | Component::RootDir | Component::Prefix(_)
            )
        });
        if relative.as_os_str().is_empty() || relative.is_absolute() || escapes {
            return Err(BenchError::InvalidPatchTarget {
                path: relative.to_path_buf(),
            });
        }
        Ok(self.root.join(relative))
    }

    /// Apply one patch, rewriting the target file atomically.
    pub fn apply(&self, patch: &Patch) -> Result<PathBuf> {
        let path = self.resolve(&patch.file)?;
        if !path.is_file() {
            return Err(BenchError::missing_file(&path));
        }

        let buffer = fs::read_to_string(&path)?;
        let patched = self.engine.patch(&buffer, &patch.block_id, &patch.text)?;
        write_atomic(&path, patched.as_bytes())?;

        info!("Patched {} in {}", patch.block_id, patch.file);
        Ok(path)
    }

    /// Current content of a block in a file below the root.
    pub fn read_block(&self, file: &str, block_id: &str) -> Result<String> {
        let path = self.resolve(file)?;
        if !path.is_file() {
            return Err(BenchError::missing_file(&path));
        }
        let buffer = fs::read_to_string(&path)?;
        self.engine.extract(&buffer, block_id)
    }
}
