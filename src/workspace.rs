//! Workspace-level file helpers: the command lock and atomic writes.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use fs2::FileExt;
use tracing::debug;

use crate::error::{BenchError, Result};

/// Temporary file suffix for atomic writes.
const TMP_SUFFIX: &str = ".tmp";

/// Exclusive lock on a workspace, held for the duration of one command.
///
/// The lock is released when the guard is dropped. The lock file itself is
/// left in place.
#[derive(Debug)]
pub struct WorkspaceLock {
    file: File,
    path: PathBuf,
}

impl WorkspaceLock {
    /// Acquire the lock without blocking.
    ///
    /// Fails with [`BenchError::WorkspaceBusy`] when another process holds it.
    pub fn acquire(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = File::create(&path)?;
        if FileExt::try_lock_exclusive(&file).is_err() {
            return Err(BenchError::WorkspaceBusy { path });
        }
        debug!("Acquired workspace lock {}", path.display());
        Ok(Self { file, path })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for WorkspaceLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

/// Write `bytes` to `path` through a synced temporary file and a rename.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(TMP_SUFFIX);
    let tmp_path = PathBuf::from(tmp_name);

    let mut tmp_file = File::create(&tmp_path)?;
    tmp_file.write_all(bytes)?;
    tmp_file.sync_all()?;
    drop(tmp_file);

    fs::rename(&tmp_path, path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_write_atomic_creates_parent_and_leaves_no_tmp() {
        let temp = TempDir::new().unwrap();
        let target = temp.path().join("nested/dir/file.json");

        write_atomic(&target, b"[]").unwrap();

        assert_eq!(fs::read_to_string(&target).unwrap(), "[]");
        assert!(!temp.path().join("nested/dir/file.json.tmp").exists());
    }

    #[test]
    fn test_write_atomic_replaces_content() {
        let temp = TempDir::new().unwrap();
        let target = temp.path().join("file.txt");
        write_atomic(&target, b"first").unwrap();
        write_atomic(&target, b"second").unwrap();
        assert_eq!(fs::read_to_string(&target).unwrap(), "second");
    }

    #[test]
    fn test_lock_is_exclusive() {
        let temp = TempDir::new().unwrap();
        let lock_path = temp.path().join("run/.bench.lock");

        let guard = WorkspaceLock::acquire(&lock_path).unwrap();
        assert_eq!(guard.path(), lock_path);

        let second = WorkspaceLock::acquire(&lock_path);
        assert!(matches!(second, Err(BenchError::WorkspaceBusy { .. })));

        drop(guard);
        assert!(WorkspaceLock::acquire(&lock_path).is_ok());
    }
}
