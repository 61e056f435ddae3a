//! Job execution lifecycle: lease check, RUNNING record, command, final
//! record.

use chrono::Utc;
use tracing::{debug, error, info, warn};

use crate::config::{JobOptions, JobPaths, WrapperConfig};
use crate::error::{exit, AggregationError, WrapperError};
use crate::lease::{LeaseDecision, LeaseGuard};
use crate::runner::CommandRunner;
use crate::status::{JobStatus, StatusRecord};
use crate::storage::{status_file, AggregationStore, AtomicFileWriter};

/// Result of one wrapper invocation.
#[derive(Debug, Clone)]
pub struct RunSummary {
    /// Code the process should exit with.
    pub exit_code: i32,
    /// Final record; `None` when the lease blocked the run.
    pub record: Option<StatusRecord>,
}

pub struct JobWrapper<R: CommandRunner> {
    options: JobOptions,
    paths: JobPaths,
    save_execution_id: bool,
    writer: AtomicFileWriter,
    aggregate: AggregationStore,
    lease: LeaseGuard,
    runner: R,
}

impl<R: CommandRunner> JobWrapper<R> {
    pub fn new(config: &WrapperConfig, options: JobOptions, runner: R) -> Self {
        let paths = JobPaths::resolve(config, &options.name, options.output_file.as_deref());
        let writer = AtomicFileWriter::new(config.output.fsync);
        let aggregate = AggregationStore::new(
            paths.aggregation_file.clone(),
            config.lock_timeout(),
            writer,
        );
        Self {
            lease: LeaseGuard::new(options.force),
            save_execution_id: config.execution.save_execution_id,
            options,
            paths,
            writer,
            aggregate,
            runner,
        }
    }

    /// Run the job once.
    ///
    /// Command failures end up in the returned record and exit code. Only a
    /// failure to write the job's own status file is an error.
    pub async fn run(&self) -> Result<RunSummary, WrapperError> {
        let opts = &self.options;
        if opts.force {
            warn!(
                job = %opts.name,
                "using --force may corrupt job data if multiple instances run at the same time"
            );
        }

        let previous = if opts.skip_read {
            None
        } else {
            status_file::load_previous(&self.paths.status_file)
        };

        let execution_number = match self.lease.decide(previous.as_ref(), Utc::now()) {
            LeaseDecision::Proceed { execution_number } => execution_number,
            LeaseDecision::Blocked { expires_at } => {
                error!(
                    job = %opts.name,
                    expires_at = %expires_at.to_rfc3339(),
                    exit_code = exit::BLOCKED_BY_LEASE,
                    "blocked by an active lease from another instance"
                );
                return Ok(RunSummary {
                    exit_code: exit::BLOCKED_BY_LEASE,
                    record: None,
                });
            }
        };

        let mut record = StatusRecord::begin(&opts.name, execution_number, Utc::now(), opts.timeout);
        if opts.report_previous {
            record = record.with_previous(previous);
        }
        if self.save_execution_id {
            record = record.with_execution_id(uuid::Uuid::new_v4().to_string());
        }
        if opts.debug {
            record = record.with_environment(current_user(), current_dir());
        }

        // Siblings starting now must see the lease before the command runs.
        self.persist(&record).await?;

        let outcome = self.runner.run(&opts.command, opts.timeout).await;
        let exit_code = record.finish(outcome, Utc::now(), opts.report_stdout);
        log_outcome(&record, exit_code);

        self.persist(&record).await?;

        info!(job = %opts.name, exit_code, "exiting");
        Ok(RunSummary {
            exit_code,
            record: Some(record),
        })
    }

    async fn persist(&self, record: &StatusRecord) -> Result<(), WrapperError> {
        let opts = &self.options;
        debug!(job = %opts.name, status = %record.status, "updating status");
        if opts.verbose || opts.debug {
            match serde_json::to_string_pretty(record) {
                Ok(json) => debug!("STATUS UPDATE {json}"),
                Err(e) => debug!(error = %e, "could not render status payload"),
            }
        }
        if opts.skip_write {
            return Ok(());
        }

        status_file::save(&self.writer, &self.paths.status_file, record)?;

        if !opts.skip_aggregation {
            // The job's own file is already written; the aggregate is best effort.
            if let Err(e) = self.aggregate.update(&opts.name, record).await {
                match e {
                    AggregationError::LockTimeout { .. } => {
                        error!(job = %opts.name, error = %e, "failed to acquire lock for aggregation update")
                    }
                    _ => error!(job = %opts.name, error = %e, "failed to write aggregated status"),
                }
            }
        }
        Ok(())
    }
}

/// Read a job's entry from the aggregation file.
pub async fn inspect(config: &WrapperConfig, name: &str) -> Result<Option<StatusRecord>, WrapperError> {
    let paths = JobPaths::resolve(config, name, None);
    let store = AggregationStore::new(
        paths.aggregation_file,
        config.lock_timeout(),
        AtomicFileWriter::new(config.output.fsync),
    );
    Ok(store.read(name).await?)
}

fn log_outcome(record: &StatusRecord, exit_code: i32) {
    match record.status {
        JobStatus::Finished => {
            info!(job = %record.name, duration = ?record.duration_seconds, "execution finished")
        }
        JobStatus::Failed if record.timed_out => error!(
            job = %record.name,
            exit_code,
            error = record.error.as_deref().unwrap_or_default(),
            "EXECUTION TIMED OUT"
        ),
        JobStatus::Failed if record.return_code.is_none() => error!(
            job = %record.name,
            exit_code,
            error = record.error.as_deref().unwrap_or_default(),
            "LAUNCH FAILED"
        ),
        JobStatus::Failed => error!(
            job = %record.name,
            exit_code,
            error = record.error.as_deref().unwrap_or_default(),
            "EXECUTION FAILED"
        ),
        JobStatus::Running => {}
    }
}

fn current_user() -> Option<String> {
    std::env::var("USER")
        .or_else(|_| std::env::var("LOGNAME"))
        .ok()
}

fn current_dir() -> Option<String> {
    std::env::current_dir()
        .ok()
        .map(|p| p.display().to_string())
}
