//! Single-instance run lock.
//!
//! An advisory lock file guards each run: acquisition atomically creates the
//! file and fails if it already exists, so two concurrent runs cannot both
//! proceed. Contention is a normal outcome, not an error; the caller logs it
//! and exits cleanly before touching the network.

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::error::Result;

/// Default lock file name, resolved against the working directory.
pub const DEFAULT_LOCK_FILE: &str = "tubesweep.lock";

/// Outcome of a lock acquisition attempt.
#[derive(Debug)]
pub enum LockState {
    /// The lock was acquired; the run may proceed.
    Acquired(RunLock),
    /// Another run holds the lock; this run must stand down.
    Contended,
}

/// An acquired run lock. Dropping it removes the lock file.
#[derive(Debug)]
pub struct RunLock {
    path: PathBuf,
}

impl RunLock {
    /// Try to acquire the lock at `path`.
    ///
    /// Creation is atomic: either this call creates the file exclusively, or
    /// the file already exists and the attempt reports [`LockState::Contended`].
    ///
    /// # Errors
    ///
    /// Returns an error for IO failures other than the file already existing,
    /// such as a missing parent directory or a permission problem.
    pub fn acquire(path: &Path) -> Result<LockState> {
        match OpenOptions::new().write(true).create_new(true).open(path) {
            Ok(mut file) => {
                // Record the owning process for operators inspecting a stale lock.
                let _ = writeln!(file, "{}", std::process::id());
                debug!("Acquired run lock at {}", path.display());
                Ok(LockState::Acquired(Self {
                    path: path.to_path_buf(),
                }))
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                info!("Run lock {} is held by another run", path.display());
                Ok(LockState::Contended)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Release the lock explicitly, reporting removal failures.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock file cannot be removed.
    pub fn release(self) -> Result<()> {
        let path = self.path.clone();
        // Drop must not remove the file a second time.
        std::mem::forget(self);
        fs::remove_file(&path)?;
        debug!("Released run lock at {}", path.display());
        Ok(())
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            warn!("Failed to remove run lock {}: {e}", self.path.display());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_acquire_creates_lock_file() {
        let temp_dir = TempDir::new().expect("Should create temp dir");
        let path = temp_dir.path().join("run.lock");

        let state = RunLock::acquire(&path).expect("Should acquire");
        assert!(matches!(state, LockState::Acquired(_)));
        assert!(path.exists());
    }

    #[test]
    fn test_second_acquire_is_contended() {
        let temp_dir = TempDir::new().expect("Should create temp dir");
        let path = temp_dir.path().join("run.lock");

        let _held = RunLock::acquire(&path).expect("Should acquire");
        let second = RunLock::acquire(&path).expect("Should not error");
        assert!(matches!(second, LockState::Contended));
    }

    #[test]
    fn test_drop_removes_lock_file() {
        let temp_dir = TempDir::new().expect("Should create temp dir");
        let path = temp_dir.path().join("run.lock");

        {
            let state = RunLock::acquire(&path).expect("Should acquire");
            assert!(matches!(state, LockState::Acquired(_)));
        }

        assert!(!path.exists());
        // A fresh run can acquire again.
        let state = RunLock::acquire(&path).expect("Should acquire");
        assert!(matches!(state, LockState::Acquired(_)));
    }

    #[test]
    fn test_explicit_release_removes_lock_file() {
        let temp_dir = TempDir::new().expect("Should create temp dir");
        let path = temp_dir.path().join("run.lock");

        let LockState::Acquired(lock) = RunLock::acquire(&path).expect("Should acquire") else {
            panic!("Lock should be acquired");
        };

        lock.release().expect("Should release");
        assert!(!path.exists());
    }

    #[test]
    fn test_missing_parent_directory_is_an_error() {
        let result = RunLock::acquire(Path::new("/nonexistent/dir/run.lock"));
        assert!(result.is_err());
    }

    #[test]
    fn test_lock_file_records_pid() {
        let temp_dir = TempDir::new().expect("Should create temp dir");
        let path = temp_dir.path().join("run.lock");

        let LockState::Acquired(lock) = RunLock::acquire(&path).expect("Should acquire") else {
            panic!("Lock should be acquired");
        };

        let content = fs::read_to_string(&path).expect("Should read");
        assert_eq!(content.trim(), std::process::id().to_string());
        drop(lock);
    }
}
