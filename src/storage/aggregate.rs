//! Shared aggregation file: job name -> latest status record.
//!
//! Every job wrapper on the host read-merge-writes the same file, so each
//! update runs under the sibling `<file>.lock`. Entries of other jobs are
//! carried as raw JSON and written back byte-for-byte equivalent.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde_json::{Map, Value};
use tracing::debug;

use super::atomic::AtomicFileWriter;
use super::lock::FileLock;
use crate::config::lock_path_for;
use crate::error::AggregationError;
use crate::status::StatusRecord;

pub type AggregateMap = Map<String, Value>;

#[derive(Debug, Clone)]
pub struct AggregationStore {
    path: PathBuf,
    lock: FileLock,
    lock_timeout: Duration,
    writer: AtomicFileWriter,
}

impl AggregationStore {
    pub fn new(path: impl Into<PathBuf>, lock_timeout: Duration, writer: AtomicFileWriter) -> Self {
        let path = path.into();
        let lock = FileLock::new(lock_path_for(&path));
        Self {
            path,
            lock,
            lock_timeout,
            writer,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn lock_path(&self) -> &Path {
        self.lock.path()
    }

    /// Insert or replace the entry for `job_name`, leaving all others intact.
    pub async fn update(&self, job_name: &str, record: &StatusRecord) -> Result<(), AggregationError> {
        let entry = serde_json::to_value(record).map_err(|source| AggregationError::Encode {
            job: job_name.to_string(),
            source,
        })?;

        debug!(path = %self.lock.path().display(), "acquiring lock on aggregated output");
        let _guard = self.lock.acquire(self.lock_timeout).await?;
        debug!(path = %self.lock.path().display(), "acquired lock on aggregated output");

        let mut map = self.read_unlocked()?.unwrap_or_default();
        map.insert(job_name.to_string(), entry);

        debug!(path = %self.path.display(), job = job_name, jobs = map.len(), "writing aggregated status");
        self.writer.write_json(&self.path, &map)?;
        Ok(())
    }

    /// Latest record for `job_name`, if the file and entry exist.
    pub async fn read(&self, job_name: &str) -> Result<Option<StatusRecord>, AggregationError> {
        let Some(mut map) = self.read_all().await? else {
            return Ok(None);
        };
        let Some(entry) = map.remove(job_name) else {
            return Ok(None);
        };
        serde_json::from_value(entry)
            .map(Some)
            .map_err(|source| AggregationError::Parse {
                path: self.path.clone(),
                source,
            })
    }

    /// The whole mapping; `None` if the file does not exist yet.
    pub async fn read_all(&self) -> Result<Option<AggregateMap>, AggregationError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let _guard = self.lock.acquire(self.lock_timeout).await?;
        self.read_unlocked()
    }

    /// Caller must hold the lock.
    fn read_unlocked(&self) -> Result<Option<AggregateMap>, AggregationError> {
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(AggregationError::Read {
                    path: self.path.clone(),
                    source,
                })
            }
        };
        serde_json::from_slice::<AggregateMap>(&bytes)
            .map(Some)
            .map_err(|source| AggregationError::Parse {
                path: self.path.clone(),
                source,
            })
    }
}
