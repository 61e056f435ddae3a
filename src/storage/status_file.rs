//! The per-job status file, `<folder>/<job>.json`.

use std::path::Path;

use tracing::{debug, warn};

use super::atomic::AtomicFileWriter;
use crate::error::WrapperError;
use crate::status::StatusRecord;

/// Read the last record written for a job.
///
/// A missing file means first run. A file that cannot be read or parsed is
/// treated the same way, so the execution counter restarts at 1.
pub fn load_previous(path: &Path) -> Option<StatusRecord> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "no previous status file");
            return None;
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "previous status file is unreadable, ignoring it");
            return None;
        }
    };

    match serde_json::from_slice::<StatusRecord>(&bytes) {
        Ok(record) => {
            debug!(path = %path.display(), execution_number = record.execution_number, "imported latest status");
            Some(record.without_previous())
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "previous status file is not a valid record, ignoring it");
            None
        }
    }
}

pub fn save(writer: &AtomicFileWriter, path: &Path, record: &StatusRecord) -> Result<(), WrapperError> {
    debug!(path = %path.display(), status = %record.status, "writing status file");
    writer
        .write_json(path, record)
        .map_err(|source| WrapperError::StatusFilePersistence {
            path: path.to_path_buf(),
            source,
        })
}
