//! Named cross-process lock backed by `flock` on a lock file.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use fs2::FileExt;
use tracing::{debug, trace};

use crate::error::LockError;

const POLL_INTERVAL: Duration = Duration::from_millis(50);
const POLL_JITTER_MS: u64 = 25;

#[derive(Debug, Clone)]
pub struct FileLock {
    path: PathBuf,
}

/// Holds the lock until dropped.
#[derive(Debug)]
pub struct FileLockGuard {
    file: File,
    path: PathBuf,
}

impl FileLock {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Try once; `Ok(None)` if someone else holds the lock.
    pub fn try_acquire(&self) -> Result<Option<FileLockGuard>, LockError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| self.io_error(source))?;
        }

        // Never truncate: the file may be locked by its current holder.
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&self.path)
            .map_err(|source| self.io_error(source))?;

        match file.try_lock_exclusive() {
            Ok(()) => Ok(Some(FileLockGuard {
                file,
                path: self.path.clone(),
            })),
            Err(e) if is_contended(&e) => Ok(None),
            Err(source) => Err(self.io_error(source)),
        }
    }

    /// Poll until the lock is ours or `timeout` has elapsed.
    pub async fn acquire(&self, timeout: Duration) -> Result<FileLockGuard, LockError> {
        let start = Instant::now();
        debug!(path = %self.path.display(), ?timeout, "acquiring lock");
        loop {
            if let Some(guard) = self.try_acquire()? {
                debug!(path = %self.path.display(), waited = ?start.elapsed(), "acquired lock");
                return Ok(guard);
            }
            let elapsed = start.elapsed();
            if elapsed >= timeout {
                return Err(LockError::Timeout {
                    path: self.path.clone(),
                    waited: elapsed,
                });
            }
            let jitter = Duration::from_millis(rand::random::<u64>() % (POLL_JITTER_MS + 1));
            let pause = (POLL_INTERVAL + jitter).min(timeout - elapsed);
            trace!(path = %self.path.display(), ?pause, "lock busy, waiting");
            tokio::time::sleep(pause).await;
        }
    }

    fn io_error(&self, source: std::io::Error) -> LockError {
        LockError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

impl Drop for FileLockGuard {
    fn drop(&mut self) {
        // Closing the descriptor releases the lock too; unlock eagerly anyway.
        if let Err(e) = FileExt::unlock(&self.file) {
            debug!(path = %self.path.display(), error = %e, "failed to unlock");
        }
        debug!(path = %self.path.display(), "released lock");
    }
}

fn is_contended(e: &std::io::Error) -> bool {
    e.kind() == std::io::ErrorKind::WouldBlock
        || e.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}
