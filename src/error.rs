//! Error types and process exit codes for the wrapper.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Process exit codes reported by the wrapper itself.
///
/// Any other non-zero code is the child command's own exit code.
pub mod exit {
    pub const SUCCESS: i32 = 0;
    pub const TIMED_OUT: i32 = 2;
    pub const LAUNCH_FAILED: i32 = 3;
    pub const BLOCKED_BY_LEASE: i32 = 4;
    pub const PERSISTENCE_FAILED: i32 = 5;
}

/// Failure of a single atomic write.
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("failed to serialize payload for {path}: {source}")]
    Serialize {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to rename {from} to {to}: {source}")]
    Rename {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Error)]
pub enum LockError {
    #[error("timed out after {waited:?} waiting for lock {path}")]
    Timeout { path: PathBuf, waited: Duration },

    #[error("failed to lock {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Failure of a read or update against the aggregation file.
#[derive(Debug, Error)]
pub enum AggregationError {
    #[error("could not acquire aggregation lock {path} within {waited:?}")]
    LockTimeout { path: PathBuf, waited: Duration },

    #[error(transparent)]
    Lock(LockError),

    #[error("failed to read aggregation file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("aggregation file {path} is not a JSON object of job statuses: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to encode status for job {job}: {source}")]
    Encode {
        job: String,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Persist(#[from] PersistError),
}

impl From<LockError> for AggregationError {
    fn from(e: LockError) -> Self {
        match e {
            LockError::Timeout { path, waited } => AggregationError::LockTimeout { path, waited },
            other => AggregationError::Lock(other),
        }
    }
}

/// Fatal wrapper errors. Command failures are not errors: they are captured
/// in the status record.
#[derive(Debug, Error)]
pub enum WrapperError {
    #[error("failed to persist status file {path}: {source}")]
    StatusFilePersistence {
        path: PathBuf,
        #[source]
        source: PersistError,
    },

    #[error(transparent)]
    Aggregation(#[from] AggregationError),
}

impl WrapperError {
    pub fn exit_code(&self) -> i32 {
        match self {
            WrapperError::StatusFilePersistence { .. } => exit::PERSISTENCE_FAILED,
            WrapperError::Aggregation(_) => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_timeout_maps_to_aggregation_timeout() {
        let err: AggregationError = LockError::Timeout {
            path: PathBuf::from("/tmp/cron.json.lock"),
            waited: Duration::from_secs(10),
        }
        .into();
        assert!(matches!(err, AggregationError::LockTimeout { .. }));
    }

    #[test]
    fn test_persistence_failure_exit_code_is_distinct() {
        let err = WrapperError::StatusFilePersistence {
            path: PathBuf::from("/tmp/job.json"),
            source: PersistError::Io {
                path: PathBuf::from("/tmp/job.json~x"),
                source: std::io::Error::from(std::io::ErrorKind::PermissionDenied),
            },
        };
        assert_eq!(err.exit_code(), exit::PERSISTENCE_FAILED);
        assert_ne!(err.exit_code(), exit::TIMED_OUT);
        assert_ne!(err.exit_code(), exit::BLOCKED_BY_LEASE);
    }
}
