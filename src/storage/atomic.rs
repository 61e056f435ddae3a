//! Write-to-temp-then-rename persistence.
//!
//! Readers of the target path see either the old content or the new
//! content, never a partial file. Temp files are `<path>~<uuid>` in the
//! same directory so the rename stays on one filesystem and concurrent
//! writers never share a temp file.

use std::ffi::OsString;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::debug;

use crate::error::PersistError;

#[derive(Debug, Clone, Copy)]
pub struct AtomicFileWriter {
    fsync: bool,
}

impl Default for AtomicFileWriter {
    fn default() -> Self {
        Self { fsync: true }
    }
}

impl AtomicFileWriter {
    pub fn new(fsync: bool) -> Self {
        Self { fsync }
    }

    /// Serialize `value` as JSON and atomically replace `path` with it.
    pub fn write_json<T: Serialize + ?Sized>(&self, path: &Path, value: &T) -> Result<(), PersistError> {
        // Serialize before touching the filesystem.
        let bytes = serde_json::to_vec(value).map_err(|source| PersistError::Serialize {
            path: path.to_path_buf(),
            source,
        })?;
        self.write_bytes(path, &bytes)
    }

    pub fn write_bytes(&self, path: &Path, bytes: &[u8]) -> Result<(), PersistError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| PersistError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let tmp = temp_path_for(path);
        debug!(tmp = %tmp.display(), "writing temp file");
        if let Err(source) = self.write_temp(&tmp, bytes) {
            let _ = fs::remove_file(&tmp);
            return Err(PersistError::Io { path: tmp, source });
        }

        debug!(tmp = %tmp.display(), path = %path.display(), "renaming temp file into place");
        if let Err(source) = fs::rename(&tmp, path) {
            let _ = fs::remove_file(&tmp);
            return Err(PersistError::Rename {
                from: tmp,
                to: path.to_path_buf(),
                source,
            });
        }
        Ok(())
    }

    fn write_temp(&self, tmp: &Path, bytes: &[u8]) -> std::io::Result<()> {
        let mut file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(tmp)?;
        file.write_all(bytes)?;
        if self.fsync {
            file.sync_all()?;
        }
        Ok(())
    }
}

/// `<path>~<uuid v4>`
pub fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(format!("~{}", uuid::Uuid::new_v4()));
    PathBuf::from(name)
}
