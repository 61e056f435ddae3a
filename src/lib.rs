//! cron-wrapper -- run a scheduled command and record its outcome as JSON.
//!
//! Each run of a named job writes `<job>.json` and merges the same record
//! into a host-wide aggregation file. A RUNNING record acts as an advisory
//! lease that keeps a second instance of the job from starting until the
//! first finishes or its timeout passes.

pub mod config;
pub mod error;
pub mod lease;
pub mod logging;
pub mod runner;
pub mod status;
pub mod storage;
pub mod wrapper;

pub use config::{JobOptions, WrapperConfig};
pub use error::{exit, WrapperError};
pub use runner::{CommandRunner, Outcome, ShellRunner};
pub use status::{JobStatus, StatusRecord};
pub use wrapper::{JobWrapper, RunSummary};
