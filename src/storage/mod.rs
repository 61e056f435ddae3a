//! File-based persistence: atomic writes, the aggregation lock, the shared
//! aggregation file, and per-job status files.

pub mod aggregate;
pub mod atomic;
pub mod lock;
pub mod status_file;

pub use aggregate::AggregationStore;
pub use atomic::AtomicFileWriter;
pub use lock::{FileLock, FileLockGuard};
