//! Advisory lease check against the previous status record.
//!
//! A RUNNING record claims its job name until `expiresAt`. The check only
//! deters overlapping runs: two wrappers that read the old record before
//! either writes a new one will both proceed, and the later rename of the
//! per-job file wins.

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::status::{JobStatus, StatusRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaseDecision {
    /// Run the command as execution `execution_number`.
    Proceed { execution_number: u64 },
    /// Another instance holds an unexpired lease.
    Blocked { expires_at: DateTime<Utc> },
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LeaseGuard {
    force: bool,
}

impl LeaseGuard {
    pub fn new(force: bool) -> Self {
        Self { force }
    }

    pub fn decide(&self, previous: Option<&StatusRecord>, now: DateTime<Utc>) -> LeaseDecision {
        let Some(prev) = previous else {
            return LeaseDecision::Proceed {
                execution_number: 1,
            };
        };
        let execution_number = prev.execution_number.saturating_add(1);

        if prev.status != JobStatus::Running {
            return LeaseDecision::Proceed { execution_number };
        }

        warn!(
            job = %prev.name,
            expires_at = %prev.expires_at.to_rfc3339(),
            "another instance of the same job is already running"
        );

        if prev.expires_at < now {
            warn!(job = %prev.name, "executing because the other instance's lease has EXPIRED");
            LeaseDecision::Proceed { execution_number }
        } else if self.force {
            warn!(
                job = %prev.name,
                "executing because FORCE is enabled; concurrent runs may corrupt job data"
            );
            LeaseDecision::Proceed { execution_number }
        } else {
            info!(job = %prev.name, "quitting without executing");
            LeaseDecision::Blocked {
                expires_at: prev.expires_at,
            }
        }
    }
}
