//! Job execution status records.
//!
//! A `StatusRecord` is created RUNNING when the wrapper is allowed to
//! proceed and is finalized exactly once, to FINISHED or FAILED, when the
//! command's outcome is known.

pub mod timestamp;

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::exit;
use crate::runner::Outcome;

/// Lifecycle state persisted in a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Running,
    Finished,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, JobStatus::Running)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Running => write!(f, "RUNNING"),
            JobStatus::Finished => write!(f, "FINISHED"),
            JobStatus::Failed => write!(f, "FAILED"),
        }
    }
}

/// One execution of a job, as written to `<job>.json` and into the
/// aggregation file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusRecord {
    /// Job name. Records written by older wrappers may lack it.
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub execution_number: u64,
    pub status: JobStatus,
    #[serde(with = "timestamp")]
    pub started_at: DateTime<Utc>,
    #[serde(
        default,
        with = "timestamp::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub finished_at: Option<DateTime<Utc>>,
    /// End of the lease this record holds on the job name.
    #[serde(with = "timestamp")]
    pub expires_at: DateTime<Utc>,
    #[serde(default, alias = "duration", skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub return_code: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub std_out: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub std_err: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_details: Option<String>,
    #[serde(default)]
    pub timed_out: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success: Option<bool>,
    /// The record this execution replaced. Never nests further.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous: Option<Box<StatusRecord>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_directory: Option<String>,
}

impl StatusRecord {
    /// Create a RUNNING record whose lease lasts `timeout` from `started_at`.
    pub fn begin(
        name: impl Into<String>,
        execution_number: u64,
        started_at: DateTime<Utc>,
        timeout: Duration,
    ) -> Self {
        let ttl = chrono::Duration::from_std(timeout)
            .unwrap_or_else(|_| chrono::Duration::weeks(52 * 100));
        let expires_at = timestamp::clamp_to_rfc3339(
            started_at
                .checked_add_signed(ttl)
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
        );

        Self {
            name: name.into(),
            execution_number,
            status: JobStatus::Running,
            started_at,
            finished_at: None,
            expires_at,
            duration_seconds: None,
            return_code: None,
            std_out: None,
            std_err: None,
            error: None,
            error_details: None,
            timed_out: false,
            success: None,
            previous: None,
            execution_id: None,
            user: None,
            working_directory: None,
        }
    }

    /// Embed `previous` (minus its own history) for reporting.
    pub fn with_previous(mut self, previous: Option<StatusRecord>) -> Self {
        self.previous = previous.map(|mut p| {
            p.previous = None;
            Box::new(p)
        });
        self
    }

    pub fn with_execution_id(mut self, id: impl Into<String>) -> Self {
        self.execution_id = Some(id.into());
        self
    }

    /// Record who ran the job and from where (debug mode).
    pub fn with_environment(mut self, user: Option<String>, working_directory: Option<String>) -> Self {
        self.user = user;
        self.working_directory = working_directory;
        self
    }

    /// Drop the embedded history, as done whenever a record is read back
    /// to serve as the previous execution.
    pub fn without_previous(mut self) -> Self {
        self.previous = None;
        self
    }

    /// Apply the command outcome and move to a terminal state.
    ///
    /// Returns the exit code the wrapper should report. A record that is
    /// already terminal is left untouched.
    pub fn finish(&mut self, outcome: Outcome, finished_at: DateTime<Utc>, report_output: bool) -> i32 {
        if self.status.is_terminal() {
            warn!(job = %self.name, status = %self.status, "record already finalized, ignoring outcome");
            return self.exit_code().unwrap_or(exit::SUCCESS);
        }

        let success = match outcome {
            Outcome::Completed {
                exit_code,
                stdout,
                stderr,
            } => {
                self.return_code = Some(exit_code);
                if report_output {
                    self.std_out = Some(stdout);
                    self.std_err = Some(stderr.clone());
                }
                if exit_code != 0 {
                    self.error = Some(stderr.clone());
                    self.error_details = Some(stderr);
                }
                exit_code == 0
            }
            Outcome::TimedOut(diag) => {
                self.timed_out = true;
                self.error = Some(diag.message);
                self.error_details = Some(diag.details);
                false
            }
            Outcome::LaunchFailed(diag) => {
                self.error = Some(diag.message);
                self.error_details = Some(diag.details);
                false
            }
        };

        self.status = if success {
            JobStatus::Finished
        } else {
            JobStatus::Failed
        };
        self.success = Some(success);
        self.finished_at = Some(finished_at);
        self.duration_seconds = Some(
            (finished_at - self.started_at)
                .to_std()
                .map(|d| d.as_secs_f64())
                .unwrap_or(0.0),
        );

        self.exit_code().unwrap_or(exit::SUCCESS)
    }

    /// Exit code implied by a terminal record; `None` while RUNNING.
    pub fn exit_code(&self) -> Option<i32> {
        match self.status {
            JobStatus::Running => None,
            JobStatus::Finished => Some(exit::SUCCESS),
            JobStatus::Failed if self.timed_out => Some(exit::TIMED_OUT),
            JobStatus::Failed => Some(self.return_code.unwrap_or(exit::LAUNCH_FAILED)),
        }
    }
}
