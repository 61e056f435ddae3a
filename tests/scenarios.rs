//! End-to-end runs of the binary against a temporary output folder.

use std::path::{Path, PathBuf};
use std::time::Duration;

use assert_cmd::Command;
use chrono::Utc;
use cron_wrapper::storage::FileLock;
use cron_wrapper::StatusRecord;
use serde_json::Value;
use tempfile::TempDir;

struct Fixture {
    dir: TempDir,
    config: PathBuf,
}

impl Fixture {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let config = dir.path().join("wrapper.toml");
        let data = dir.path().join("data");
        std::fs::write(
            &config,
            format!(
                "[output]\nfolder = {:?}\nfsync = false\n\n[aggregation]\nlock_timeout_secs = 1\n",
                data.display().to_string()
            ),
        )
        .unwrap();
        Self { dir, config }
    }

    fn data(&self) -> PathBuf {
        self.dir.path().join("data")
    }

    fn status_path(&self, job: &str) -> PathBuf {
        self.data().join(format!("{job}.json"))
    }

    fn cmd(&self) -> Command {
        let mut cmd = Command::cargo_bin("cron-wrapper").unwrap();
        cmd.arg("--config").arg(&self.config).env_remove("RUST_LOG");
        cmd
    }

    fn write_record(&self, job: &str, record: &StatusRecord) {
        std::fs::create_dir_all(self.data()).unwrap();
        std::fs::write(self.status_path(job), serde_json::to_vec(record).unwrap()).unwrap();
    }
}

fn read_json(path: &Path) -> Value {
    serde_json::from_slice(&std::fs::read(path).unwrap()).unwrap()
}

#[test]
fn test_first_run_echo_finishes() {
    let fx = Fixture::new();

    fx.cmd()
        .args(["greet", "echo hi", "--timeout", "60"])
        .assert()
        .code(0);

    let status = read_json(&fx.status_path("greet"));
    assert_eq!(status["executionNumber"], 1);
    assert_eq!(status["status"], "FINISHED");
    assert_eq!(status["success"], true);
    assert_eq!(status["returnCode"], 0);
    assert_eq!(status["timedOut"], false);
    assert!(status["durationSeconds"].is_f64());
}

#[test]
fn test_active_lease_exits_4_without_running() {
    let fx = Fixture::new();
    let active = StatusRecord::begin("guarded", 3, Utc::now(), Duration::from_secs(3600));
    fx.write_record("guarded", &active);
    let before = std::fs::read(fx.status_path("guarded")).unwrap();
    let marker = fx.dir.path().join("ran");

    fx.cmd()
        .arg("guarded")
        .arg(format!("touch {}", marker.display()))
        .assert()
        .code(4);

    assert!(!marker.exists(), "command must not run");
    assert_eq!(std::fs::read(fx.status_path("guarded")).unwrap(), before);
    assert!(!fx.data().join("cron.json").exists());
}

#[test]
fn test_force_overrides_active_lease() {
    let fx = Fixture::new();
    let active = StatusRecord::begin("guarded", 3, Utc::now(), Duration::from_secs(3600));
    fx.write_record("guarded", &active);

    fx.cmd().args(["guarded", "true", "--force"]).assert().code(0);

    assert_eq!(read_json(&fx.status_path("guarded"))["executionNumber"], 4);
}

#[test]
fn test_expired_lease_runs_with_next_number() {
    let fx = Fixture::new();
    let stale = StatusRecord::begin(
        "stale",
        8,
        Utc::now() - chrono::Duration::hours(2),
        Duration::from_secs(3600),
    );
    fx.write_record("stale", &stale);

    fx.cmd().args(["stale", "true"]).assert().code(0);

    let status = read_json(&fx.status_path("stale"));
    assert_eq!(status["executionNumber"], 9);
    assert_eq!(status["status"], "FINISHED");
}

#[test]
fn test_timeout_exits_2() {
    let fx = Fixture::new();

    fx.cmd()
        .args(["sleepy", "sleep 5", "--timeout", "1"])
        .timeout(Duration::from_secs(20))
        .assert()
        .code(2);

    let status = read_json(&fx.status_path("sleepy"));
    assert_eq!(status["status"], "FAILED");
    assert_eq!(status["timedOut"], true);
    assert_eq!(status["success"], false);
    assert!(status["error"].as_str().unwrap().contains("timed out"));
}

#[test]
fn test_child_exit_code_is_propagated() {
    let fx = Fixture::new();

    fx.cmd()
        .args(["failing", "echo broken >&2; exit 7", "--report-stdout"])
        .assert()
        .code(7);

    let status = read_json(&fx.status_path("failing"));
    assert_eq!(status["status"], "FAILED");
    assert_eq!(status["returnCode"], 7);
    assert_eq!(status["error"], "broken");
    assert_eq!(status["stdErr"], "broken");
}

#[test]
fn test_launch_failure_exits_3() {
    let fx = Fixture::new();
    let config = fx.dir.path().join("noshell.toml");
    std::fs::write(
        &config,
        format!(
            "[output]\nfolder = {:?}\n\n[execution]\nshell = \"/nonexistent/shell\"\n",
            fx.data().display().to_string()
        ),
    )
    .unwrap();

    Command::cargo_bin("cron-wrapper")
        .unwrap()
        .arg("--config")
        .arg(&config)
        .args(["noshell", "true"])
        .assert()
        .code(3);

    let status = read_json(&fx.status_path("noshell"));
    assert_eq!(status["status"], "FAILED");
    assert_eq!(status["timedOut"], false);
    assert!(status.get("returnCode").is_none());
}

#[test]
fn test_aggregation_keeps_other_jobs() {
    let fx = Fixture::new();
    std::fs::create_dir_all(fx.data()).unwrap();
    let job_b = serde_json::json!({
        "executionNumber": 4,
        "status": "FINISHED",
        "startedAt": "2024-05-01T10:00:00+00:00",
        "expiresAt": "2024-05-01T10:01:00+00:00",
        "success": true
    });
    std::fs::write(
        fx.data().join("cron.json"),
        serde_json::json!({ "jobB": job_b.clone() }).to_string(),
    )
    .unwrap();

    fx.cmd().args(["jobA", "true"]).assert().code(0);

    let agg = read_json(&fx.data().join("cron.json"));
    assert_eq!(agg["jobB"], job_b);
    assert_eq!(agg["jobA"]["status"], "FINISHED");
    assert_eq!(agg["jobA"], read_json(&fx.status_path("jobA")));
}

#[test]
fn test_aggregation_lock_timeout_keeps_job_outcome() {
    let fx = Fixture::new();
    std::fs::create_dir_all(fx.data()).unwrap();
    let _held = FileLock::new(fx.data().join("cron.json.lock"))
        .try_acquire()
        .unwrap()
        .expect("test holds the aggregation lock");

    fx.cmd()
        .args(["locked", "exit 6"])
        .timeout(Duration::from_secs(20))
        .assert()
        .code(6);

    let status = read_json(&fx.status_path("locked"));
    assert_eq!(status["status"], "FAILED");
    assert_eq!(status["returnCode"], 6);
    assert!(!fx.data().join("cron.json").exists());
}

#[test]
fn test_status_flag_prints_aggregated_entry() {
    let fx = Fixture::new();

    fx.cmd()
        .args(["report", "--status"])
        .assert()
        .code(1);

    fx.cmd().args(["report", "true"]).assert().code(0);

    fx.cmd()
        .args(["report", "--status"])
        .assert()
        .code(0)
        .stdout(predicates::str::contains("\"status\": \"FINISHED\""));
}

#[test]
fn test_output_folder_flag_overrides_config() {
    let fx = Fixture::new();
    let elsewhere = fx.dir.path().join("elsewhere");

    fx.cmd()
        .args(["moved", "true", "--output-folder"])
        .arg(&elsewhere)
        .assert()
        .code(0);

    assert!(elsewhere.join("moved.json").exists());
    assert!(elsewhere.join("cron.json").exists());
    assert!(!fx.status_path("moved").exists());
}
