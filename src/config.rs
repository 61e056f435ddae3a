//! TOML configuration and per-invocation options.
//!
//! A `WrapperConfig` is built once at startup (file layers plus CLI
//! overrides) and handed to every component that needs it.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV_VAR: &str = "CRON_WRAPPER_CONFIG";

/// System-wide config location, used when the env var is unset.
pub const SYSTEM_CONFIG_PATH: &str = "/etc/cron-wrapper/config.toml";

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WrapperConfig {
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub aggregation: AggregationConfig,
    #[serde(default)]
    pub execution: ExecutionConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl WrapperConfig {
    /// Load configuration from a TOML file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("failed to parse config file: {}", path.display()))?;
        debug!(path = %path.display(), "loaded wrapper configuration");
        Ok(config)
    }

    /// Try to load configuration from, in order:
    /// 1. The path in `CRON_WRAPPER_CONFIG`.
    /// 2. `/etc/cron-wrapper/config.toml`.
    /// 3. Compiled-in defaults.
    pub fn load_or_default() -> Self {
        if let Ok(env_path) = std::env::var(CONFIG_ENV_VAR) {
            let path = Path::new(&env_path);
            match Self::load(path) {
                Ok(cfg) => return cfg,
                Err(e) => {
                    warn!(
                        path = %path.display(),
                        error = %e,
                        "CRON_WRAPPER_CONFIG set but file could not be loaded, trying fallback"
                    );
                }
            }
        }

        let system_path = Path::new(SYSTEM_CONFIG_PATH);
        if system_path.exists() {
            match Self::load(system_path) {
                Ok(cfg) => return cfg,
                Err(e) => {
                    warn!(
                        path = %system_path.display(),
                        error = %e,
                        "system config file exists but could not be loaded, using defaults"
                    );
                }
            }
        }

        debug!("no config file found, using compiled-in defaults");
        Self::default()
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_secs(self.aggregation.lock_timeout_secs)
    }
}

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

/// Where status files land.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Folder holding `<job>.json` files and the aggregation file.
    pub folder: PathBuf,
    /// File name of the aggregation file inside `folder`.
    pub aggregated_filename: String,
    /// Flush temp files to disk before renaming them into place.
    pub fsync: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            folder: PathBuf::from("/var/cron-wrapper/data"),
            aggregated_filename: "cron.json".to_string(),
            fsync: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregationConfig {
    /// How long to wait for the aggregation lock before giving up.
    pub lock_timeout_secs: u64,
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            lock_timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    /// Shell used to interpret the command (`<shell> -c <command>`).
    pub shell: String,
    /// Timeout applied when `--timeout` is not given.
    pub default_timeout_secs: u64,
    /// Stamp every record with a random `executionId`.
    pub save_execution_id: bool,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            shell: "/bin/sh".to_string(),
            default_timeout_secs: 60,
            save_execution_id: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Minimum tracing level (`trace`, `debug`, `info`, `warn`, `error`).
    pub level: String,
    pub format: LogFormat,
    /// Append log lines to this file instead of stderr.
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
            file: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Text,
    Json,
}

// ---------------------------------------------------------------------------
// Per-invocation options
// ---------------------------------------------------------------------------

/// Everything that varies between two invocations of the wrapper.
#[derive(Debug, Clone)]
pub struct JobOptions {
    pub name: String,
    pub command: String,
    pub timeout: Duration,
    pub force: bool,
    pub verbose: bool,
    pub debug: bool,
    pub output_file: Option<PathBuf>,
    pub report_stdout: bool,
    pub report_previous: bool,
    pub skip_write: bool,
    pub skip_read: bool,
    pub skip_aggregation: bool,
}

impl JobOptions {
    /// Options for `name` running `command` with every toggle off.
    pub fn new(name: impl Into<String>, command: impl Into<String>, timeout: Duration) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
            timeout,
            force: false,
            verbose: false,
            debug: false,
            output_file: None,
            report_stdout: false,
            report_previous: false,
            skip_write: false,
            skip_read: false,
            skip_aggregation: false,
        }
    }
}

/// Resolved file locations for one job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobPaths {
    pub status_file: PathBuf,
    pub aggregation_file: PathBuf,
}

impl JobPaths {
    pub fn resolve(config: &WrapperConfig, name: &str, output_file: Option<&Path>) -> Self {
        let status_file = match output_file {
            Some(path) => path.to_path_buf(),
            None => config.output.folder.join(format!("{name}.json")),
        };
        let aggregation_file = config.output.folder.join(&config.output.aggregated_filename);
        debug!(
            status_file = %status_file.display(),
            aggregation_file = %aggregation_file.display(),
            "resolved output paths"
        );
        Self {
            status_file,
            aggregation_file,
        }
    }
}

/// `<path>.lock`, the sibling lock file guarding `path`.
pub fn lock_path_for(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".lock");
    PathBuf::from(name)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
