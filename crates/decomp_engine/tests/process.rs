#![cfg(unix)]

use std::sync::Arc;
use std::time::{Duration, Instant};

use decomp_core::{JobId, JobTable};
use decomp_engine::{DiskStore, LogSink, ProcessRunner, RunFailure};
use pretty_assertions::assert_eq;
use tempfile::TempDir;

struct Harness {
    temp: TempDir,
    table: Arc<JobTable>,
    runner: ProcessRunner,
    job_id: JobId,
}

impl Harness {
    fn new() -> Self {
        decomp_logging::initialize_for_tests();
        let temp = TempDir::new().unwrap();
        let table = Arc::new(JobTable::new(1000));
        let store = Arc::new(DiskStore::new(temp.path().join("jobs")));
        let runner = ProcessRunner::new(LogSink::new(table.clone(), store));
        Self {
            temp,
            table,
            runner,
            job_id: JobId::parse("proc").unwrap(),
        }
    }

    async fn sh(&self, script: &str, timeout: Duration) -> Result<(), RunFailure> {
        let args = vec!["-c".to_string(), script.to_string()];
        self.runner
            .run(&self.job_id, "sh", &args, self.temp.path(), timeout)
            .await
    }

    fn lines(&self) -> Vec<String> {
        self.table
            .get(&self.job_id)
            .map(|entry| entry.tail_logs(1000).0)
            .unwrap_or_default()
    }
}

#[tokio::test]
async fn stdout_lines_arrive_in_order() {
    let harness = Harness::new();
    harness
        .sh("echo one; echo two; printf three", Duration::from_secs(10))
        .await
        .expect("exit 0");
    assert_eq!(harness.lines(), vec!["one", "two", "three"]);
}

#[tokio::test]
async fn stderr_is_captured_too() {
    let harness = Harness::new();
    harness
        .sh("echo to-stderr 1>&2", Duration::from_secs(10))
        .await
        .expect("exit 0");
    assert_eq!(harness.lines(), vec!["to-stderr"]);
}

#[tokio::test]
async fn runs_in_working_directory() {
    let harness = Harness::new();
    harness
        .sh("touch marker", Duration::from_secs(10))
        .await
        .expect("exit 0");
    assert!(harness.temp.path().join("marker").exists());
}

#[tokio::test]
async fn nonzero_exit_reports_code_and_last_line() {
    let harness = Harness::new();
    let err = harness
        .sh("echo working 1>&2; echo 'broken input' 1>&2; exit 3", Duration::from_secs(10))
        .await
        .unwrap_err();
    assert_eq!(
        err,
        RunFailure::ExitCode {
            code: 3,
            last_line: Some("broken input".to_string()),
        }
    );
    assert_eq!(err.to_string(), "process exited with code 3: broken input");
}

#[tokio::test]
async fn invalid_utf8_output_is_replaced() {
    let harness = Harness::new();
    harness
        .sh("printf 'ok \\377\\n'", Duration::from_secs(10))
        .await
        .expect("exit 0");
    assert_eq!(harness.lines(), vec!["ok \u{FFFD}"]);
}

#[tokio::test]
async fn timeout_kills_the_whole_process_group() {
    let harness = Harness::new();
    let started = Instant::now();
    // The backgrounded sleep inherits the pipes; the run only returns
    // promptly if it is killed along with the shell.
    let err = harness
        .sh("echo started; sleep 30 & sleep 30", Duration::from_millis(300))
        .await
        .unwrap_err();

    assert!(matches!(err, RunFailure::Timeout(_)));
    assert!(err.to_string().contains("timeout"));
    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(harness.lines(), vec!["started"]);
}

#[tokio::test]
async fn missing_program_is_a_spawn_failure() {
    let harness = Harness::new();
    let err = harness
        .runner
        .run(
            &harness.job_id,
            "definitely-not-a-real-tool-4711",
            &[],
            harness.temp.path(),
            Duration::from_secs(1),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, RunFailure::Spawn { .. }));
    assert!(harness.lines().is_empty());
}
