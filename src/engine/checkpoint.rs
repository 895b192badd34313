//! Checkpoint storage.
//!
//! One checkpoint file at a well-known location holds the context of the
//! last failed run. A sibling `.lock` file keeps two runs from using it at
//! the same time.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use thiserror::Error;

use super::context::{Context, ContextError};

/// Errors reading, writing or locking the checkpoint.
#[derive(Debug, Error)]
pub enum CheckpointError {
    /// Resume was requested but there is nothing to resume.
    #[error("No checkpoint found at {0}")]
    Missing(PathBuf),

    /// Checkpoint exists but cannot be turned back into a context.
    #[error("Checkpoint {path} is unreadable: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: ContextError,
    },

    /// Filesystem failure.
    #[error("Checkpoint I/O on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Another run holds the lock.
    #[error("Another run is using the checkpoint (lock file {0}); remove it if no run is active")]
    Locked(PathBuf),
}

/// The checkpoint file and its lock.
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    path: PathBuf,
}

/// Exclusive hold on the checkpoint; released on drop.
#[derive(Debug)]
pub struct CheckpointLock {
    path: PathBuf,
}

impl Drop for CheckpointLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            tracing::warn!(path = %self.path.display(), error = %e, "Failed to release checkpoint lock");
        }
    }
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> CheckpointError + '_ {
    move |source| CheckpointError::Io { path: path.to_path_buf(), source }
}

impl CheckpointStore {
    /// Create a store for the given checkpoint file.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the checkpoint file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether a resumable checkpoint exists.
    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    fn sibling(&self, suffix: &str) -> PathBuf {
        let mut name = self.path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
        name.push(suffix);
        self.path.with_file_name(name)
    }

    fn ensure_parent(&self) -> Result<(), CheckpointError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(io_error(parent))?;
            }
        }
        Ok(())
    }

    /// Take the single-run lock.
    pub fn lock(&self) -> Result<CheckpointLock, CheckpointError> {
        self.ensure_parent()?;
        let lock_path = self.sibling(".lock");
        let mut file = match OpenOptions::new().write(true).create_new(true).open(&lock_path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(CheckpointError::Locked(lock_path));
            }
            Err(e) => return Err(io_error(&lock_path)(e)),
        };
        let lock = CheckpointLock { path: lock_path };
        writeln!(file, "{}", std::process::id()).map_err(io_error(&lock.path))?;
        Ok(lock)
    }

    /// Write the context, replacing any previous checkpoint atomically.
    pub fn save(&self, context: &Context) -> Result<(), CheckpointError> {
        self.ensure_parent()?;
        let bytes = context
            .serialize()
            .map_err(|source| CheckpointError::Corrupt { path: self.path.clone(), source })?;

        let tmp = self.sibling(".tmp");
        fs::write(&tmp, bytes).map_err(io_error(&tmp))?;
        fs::rename(&tmp, &self.path).map_err(io_error(&self.path))?;

        tracing::info!(path = %self.path.display(), "Saved checkpoint");
        Ok(())
    }

    /// Read the checkpoint back into a context.
    pub fn load(&self) -> Result<Context, CheckpointError> {
        if !self.exists() {
            return Err(CheckpointError::Missing(self.path.clone()));
        }
        let bytes = fs::read(&self.path).map_err(io_error(&self.path))?;
        Context::restore(&bytes)
            .map_err(|source| CheckpointError::Corrupt { path: self.path.clone(), source })
    }

    /// Delete the checkpoint, if any.
    pub fn clear(&self) -> Result<(), CheckpointError> {
        match fs::remove_file(&self.path) {
            Ok(()) => {
                tracing::debug!(path = %self.path.display(), "Deleted checkpoint");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_error(&self.path)(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::core::{Outputs, Value};

    #[test]
    fn test_save_load_clear() {
        let dir = TempDir::new().unwrap();
        let store = CheckpointStore::new(dir.path().join("state").join("checkpoint.json"));
        let mut ctx = Context::create("job", dir.path()).unwrap();
        let mut outputs = Outputs::new();
        outputs.insert("x".to_string(), Value::from("1"));
        ctx.save_step_outputs("s1", outputs).unwrap();

        assert!(!store.exists());
        assert!(matches!(store.load(), Err(CheckpointError::Missing(_))));

        store.save(&ctx).unwrap();
        assert!(store.exists());
        assert_eq!(store.load().unwrap(), ctx);

        store.clear().unwrap();
        assert!(!store.exists());
        store.clear().unwrap();
    }

    #[test]
    fn test_corrupt_checkpoint_is_reported() {
        let dir = TempDir::new().unwrap();
        let store = CheckpointStore::new(dir.path().join("checkpoint.json"));
        fs::write(store.path(), r#"{"meta": {}}"#).unwrap();

        assert!(matches!(store.load(), Err(CheckpointError::Corrupt { .. })));
    }

    #[test]
    fn test_lock_is_exclusive_and_released_on_drop() {
        let dir = TempDir::new().unwrap();
        let store = CheckpointStore::new(dir.path().join("checkpoint.json"));

        let lock = store.lock().unwrap();
        assert!(matches!(store.lock(), Err(CheckpointError::Locked(_))));

        drop(lock);
        assert!(store.lock().is_ok());
    }

    #[test]
    fn test_unwritable_location_fails() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("file");
        fs::write(&blocker, "x").unwrap();
        let store = CheckpointStore::new(blocker.join("checkpoint.json"));
        let ctx = Context::create("job", dir.path()).unwrap();

        assert!(store.save(&ctx).is_err());
    }
}
