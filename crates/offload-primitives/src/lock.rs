//! A lock that is held across real OS process boundaries.
//!
//! Python's `multiprocessing.Manager` lock is itself a proxy object that
//! round-trips to a manager process; Rust has no equivalent out of the box.
//! The one primitive in this engine that genuinely needs mutual exclusion
//! across independent processes — serializing every worker's init-callback
//! execution — is realized here with a real advisory file lock,
//! since init callbacks may touch shared external resources that only
//! OS-level locking can serialize.

use std::fs::OpenOptions;
use std::io;
use std::path::Path;
use std::path::PathBuf;

use fd_lock::RwLock as FdRwLock;

/// A cross-process mutual-exclusion lock backed by an advisory file lock.
#[derive(Debug, Clone)]
pub struct CrossProcessLock {
    path: PathBuf,
}

impl CrossProcessLock {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Run `f` while holding the exclusive lock, blocking the calling
    /// thread until it is free. Call from `tokio::task::spawn_blocking` when
    /// invoked from an async context, the same way other blocking
    /// filesystem work is isolated elsewhere in this codebase.
    pub fn with_lock<T>(&self, f: impl FnOnce() -> T) -> io::Result<T> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.path)?;
        let mut rw_lock = FdRwLock::new(file);
        let _guard = rw_lock.write()?;
        Ok(f())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::AtomicUsize;
    use std::sync::atomic::Ordering;

    #[test]
    fn with_lock_runs_the_closure_and_returns_its_value() {
        let dir = std::env::temp_dir().join(format!("offload-lock-test-{}", std::process::id()));
        let lock = CrossProcessLock::new(&dir);
        let result = lock.with_lock(|| 42).unwrap();
        assert_eq!(result, 42);
        let _ = std::fs::remove_file(&dir);
    }

    #[test]
    fn sequential_acquisitions_both_run() {
        let dir =
            std::env::temp_dir().join(format!("offload-lock-test-seq-{}", std::process::id()));
        let lock = CrossProcessLock::new(&dir);
        let counter = Arc::new(AtomicUsize::new(0));
        lock.with_lock(|| counter.fetch_add(1, Ordering::SeqCst)).unwrap();
        lock.with_lock(|| counter.fetch_add(1, Ordering::SeqCst)).unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 2);
        let _ = std::fs::remove_file(&dir);
    }
}
