#![cfg(unix)]

use std::path::Path;
use std::time::{Duration, Instant};

use decomp_core::{JobId, JobRecord, JobStatus};
use decomp_engine::{
    BrowseError, EngineConfig, EntryKind, JobService, Listing, LogSource, QueryError,
    SubmitError, ToolCommand,
};
use pretty_assertions::assert_eq;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const ARTIFACT: &[u8] = b"0123456789";

async fn artifact_server() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/app.apk"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(ARTIFACT))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/missing.apk"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    server
}

fn config(root: &Path, script: &str) -> EngineConfig {
    let mut config = EngineConfig::default_with_root(root);
    config.tool = ToolCommand::new("sh", ["-c", script]);
    config.tool_timeout = Duration::from_secs(10);
    config
}

fn start(root: &Path, script: &str) -> JobService {
    decomp_logging::initialize_for_tests();
    JobService::start(config(root, script)).expect("service starts")
}

async fn wait_terminal(service: &JobService, job_id: &JobId) -> JobRecord {
    let deadline = Instant::now() + Duration::from_secs(15);
    loop {
        let record = service.status(job_id).expect("job known");
        if record.status.is_terminal() {
            return record;
        }
        assert!(Instant::now() < deadline, "job {job_id} stuck in {}", record.status);
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

fn all_logs(service: &JobService, job_id: &JobId) -> Vec<String> {
    service.logs(job_id, 10_000).expect("logs").logs
}

#[tokio::test]
async fn successful_job_ends_done_with_output() {
    let server = artifact_server().await;
    let temp = TempDir::new().unwrap();
    let service = start(temp.path(), "echo decompiling {input}; mkdir -p sources resources");

    let url = format!("{}/app.apk", server.uri());
    let record = service.submit(Some("abc"), &url).expect("accepted");
    assert_eq!(record.status, JobStatus::Queued);

    let done = wait_terminal(&service, &record.job_id).await;
    assert_eq!(done.status, JobStatus::Done);
    assert_eq!(done.error, None);
    let output_dir = service.store().output_dir(&record.job_id);
    assert_eq!(done.output_dir.as_deref(), Some(output_dir.as_path()));
    assert_eq!(done.sources_dir, Some(output_dir.join("sources")));
    assert_eq!(done.resources_dir, Some(output_dir.join("resources")));
    assert_eq!(std::fs::read(output_dir.join("app.apk")).unwrap(), ARTIFACT);

    let logs = all_logs(&service, &record.job_id);
    assert!(logs.iter().any(|line| line.contains("Downloading")));
    assert!(logs.iter().any(|line| line.starts_with("decompiling ")));
    assert!(logs
        .last()
        .is_some_and(|line| line.contains("finished successfully")));
}

#[tokio::test]
async fn download_failure_never_runs_the_tool() {
    let server = artifact_server().await;
    let temp = TempDir::new().unwrap();
    let marker = temp.path().join("tool-ran");
    let service = start(temp.path(), &format!("touch {}", marker.display()));

    let url = format!("{}/missing.apk", server.uri());
    let record = service.submit(None, &url).expect("accepted");
    let failed = wait_terminal(&service, &record.job_id).await;

    assert_eq!(failed.status, JobStatus::Error);
    assert!(failed.error.as_deref().is_some_and(|e| e.contains("404")));
    assert!(!marker.exists());
    let logs = all_logs(&service, &record.job_id);
    assert!(!logs.iter().any(|line| line.starts_with("Running")));
    assert!(logs.iter().any(|line| line.starts_with("ERROR:")));
}

#[tokio::test]
async fn slow_tool_times_out() {
    let server = artifact_server().await;
    let temp = TempDir::new().unwrap();
    let mut config = config(temp.path(), "echo begin; sleep 30");
    config.tool_timeout = Duration::from_millis(300);
    decomp_logging::initialize_for_tests();
    let service = JobService::start(config).unwrap();

    let started = Instant::now();
    let url = format!("{}/app.apk", server.uri());
    let record = service.submit(Some("slow"), &url).unwrap();
    let failed = wait_terminal(&service, &record.job_id).await;

    assert_eq!(failed.status, JobStatus::Error);
    assert!(failed.error.as_deref().is_some_and(|e| e.contains("timeout")));
    assert!(started.elapsed() < Duration::from_secs(10));
}

#[tokio::test]
async fn status_survives_losing_memory() {
    let server = artifact_server().await;
    let temp = TempDir::new().unwrap();
    let service = start(temp.path(), "true");

    let record = service
        .submit(Some("restart"), &format!("{}/app.apk", server.uri()))
        .unwrap();
    let before = wait_terminal(&service, &record.job_id).await;
    let logs_before = all_logs(&service, &record.job_id);

    service.table().clear();

    assert_eq!(service.status(&record.job_id).unwrap(), before);
    let logs = service.logs(&record.job_id, 10_000).unwrap();
    assert_eq!(logs.source, LogSource::Disk);
    assert_eq!(logs.status, JobStatus::Done);
    assert_eq!(logs.logs, logs_before);
}

#[tokio::test]
async fn log_tail_prefers_memory_until_lines_were_evicted() {
    let server = artifact_server().await;
    let temp = TempDir::new().unwrap();
    let mut config = config(temp.path(), "i=0; while [ $i -lt 20 ]; do echo line $i; i=$((i+1)); done");
    config.log_capacity = 8;
    decomp_logging::initialize_for_tests();
    let service = JobService::start(config).unwrap();

    let record = service
        .submit(Some("tail"), &format!("{}/app.apk", server.uri()))
        .unwrap();
    wait_terminal(&service, &record.job_id).await;

    let short = service.logs(&record.job_id, 3).unwrap();
    assert_eq!(short.source, LogSource::Memory);
    assert_eq!(short.logs.len(), 3);

    let long = service.logs(&record.job_id, 50).unwrap();
    assert_eq!(long.source, LogSource::Disk);
    assert!(long.logs.len() > 20);
    assert_eq!(long.logs[long.logs.len() - 3..], short.logs[..]);
}

#[tokio::test]
async fn unknown_job_has_no_status_and_no_log() {
    let temp = TempDir::new().unwrap();
    let service = start(temp.path(), "true");
    let id = JobId::parse("ghost").unwrap();

    assert!(matches!(service.status(&id), Err(QueryError::NotFound(_))));
    assert!(matches!(service.logs(&id, 10), Err(QueryError::NoLog(_))));
    assert!(matches!(service.browse(&id, ""), Err(QueryError::NotFound(_))));
}

#[tokio::test]
async fn submit_rejects_bad_input() {
    let temp = TempDir::new().unwrap();
    let service = start(temp.path(), "true");

    assert!(matches!(
        service.submit(None, "ftp://example.com/app.apk"),
        Err(SubmitError::InvalidSourceUrl(_))
    ));
    assert!(matches!(
        service.submit(Some("../escape"), "http://example.com/app.apk"),
        Err(SubmitError::InvalidJobId(_))
    ));
    assert!(service.table().is_empty());
}

#[tokio::test]
async fn running_job_cannot_be_resubmitted() {
    let server = artifact_server().await;
    let temp = TempDir::new().unwrap();
    let service = start(temp.path(), "sleep 5");
    let url = format!("{}/app.apk", server.uri());

    service.submit(Some("busy"), &url).unwrap();
    let err = service.submit(Some("busy"), &url).unwrap_err();
    assert!(matches!(err, SubmitError::Active(_, _)));
}

#[tokio::test]
async fn finished_job_can_be_restarted_with_fresh_log() {
    let server = artifact_server().await;
    let temp = TempDir::new().unwrap();
    let service = start(temp.path(), "echo pass");
    let url = format!("{}/app.apk", server.uri());

    let record = service.submit(Some("again"), &url).unwrap();
    wait_terminal(&service, &record.job_id).await;
    let first_run = all_logs(&service, &record.job_id);

    service.submit(Some("again"), &url).unwrap();
    let second = wait_terminal(&service, &record.job_id).await;
    assert_eq!(second.status, JobStatus::Done);
    let second_run = all_logs(&service, &record.job_id);
    assert_eq!(second_run.len(), first_run.len());
    assert!(second_run[0].starts_with("Queued job for"));
}

#[tokio::test]
async fn single_worker_runs_jobs_in_submission_order() {
    let server = artifact_server().await;
    let temp = TempDir::new().unwrap();
    let order = temp.path().join("order.txt");
    let script = format!(
        "echo start {{output_dir}} >> {0}; sleep 0.2; echo end {{output_dir}} >> {0}",
        order.display()
    );
    let service = start(temp.path(), &script);
    let url = format!("{}/app.apk", server.uri());

    let first = service.submit(Some("first"), &url).unwrap();
    let second = service.submit(Some("second"), &url).unwrap();
    wait_terminal(&service, &first.job_id).await;
    wait_terminal(&service, &second.job_id).await;

    let first_dir = service.store().output_dir(&first.job_id);
    let second_dir = service.store().output_dir(&second.job_id);
    let expected = vec![
        format!("start {}", first_dir.display()),
        format!("end {}", first_dir.display()),
        format!("start {}", second_dir.display()),
        format!("end {}", second_dir.display()),
    ];
    let recorded: Vec<String> = std::fs::read_to_string(&order)
        .unwrap()
        .lines()
        .map(str::to_string)
        .collect();
    assert_eq!(recorded, expected);
}

#[tokio::test]
async fn output_is_browsable_but_not_escapable() {
    let server = artifact_server().await;
    let temp = TempDir::new().unwrap();
    let service = start(
        temp.path(),
        "mkdir -p sources/com && echo 'class A {}' > sources/com/A.java",
    );
    let record = service
        .submit(Some("browse"), &format!("{}/app.apk", server.uri()))
        .unwrap();
    wait_terminal(&service, &record.job_id).await;

    match service.browse(&record.job_id, "").unwrap() {
        Listing::Directory { entries, .. } => {
            let names: Vec<(&str, EntryKind)> =
                entries.iter().map(|e| (e.name.as_str(), e.kind)).collect();
            assert_eq!(
                names,
                vec![("sources", EntryKind::Dir), ("app.apk", EntryKind::File)]
            );
        }
        other => panic!("expected directory, got {other:?}"),
    }

    let file = service
        .read_file(&record.job_id, "sources/com/A.java", 256)
        .unwrap();
    assert_eq!(file.content, "class A {}\n");
    assert!(!file.truncated);

    for escape in ["../meta.json", "sources/../../job.log", "../../"] {
        assert!(
            matches!(
                service.browse(&record.job_id, escape),
                Err(QueryError::Browse(BrowseError::Traversal(_)))
            ),
            "{escape} escaped"
        );
        assert!(matches!(
            service.read_file(&record.job_id, escape, 1),
            Err(QueryError::Browse(BrowseError::Traversal(_)))
        ));
    }
}

#[tokio::test]
async fn shutdown_drains_queued_jobs() {
    let server = artifact_server().await;
    let temp = TempDir::new().unwrap();
    let service = start(temp.path(), "true");
    let url = format!("{}/app.apk", server.uri());
    let ids: Vec<JobId> = (0..3)
        .map(|i| service.submit(Some(&format!("drain-{i}")), &url).unwrap().job_id)
        .collect();

    let store_root = service.config().root.clone();
    service.shutdown().await;

    let store = decomp_engine::DiskStore::new(store_root);
    for id in ids {
        let record = store.read_meta(&id).unwrap().unwrap();
        assert_eq!(record.status, JobStatus::Done);
    }
}

#[tokio::test]
async fn resubmitting_as_soon_as_done_is_observed_runs_again() {
    let server = artifact_server().await;
    let temp = TempDir::new().unwrap();
    let service = start(temp.path(), "true");
    let url = format!("{}/app.apk", server.uri());
    let job_id = JobId::parse("abc").unwrap();

    service.submit(Some("abc"), &url).unwrap();
    for _ in 0..5 {
        // Poll the table without sleeping so the resubmit lands right after
        // the worker's last status write.
        let deadline = Instant::now() + Duration::from_secs(15);
        while !service.table().get(&job_id).unwrap().status().is_terminal() {
            assert!(Instant::now() < deadline, "job stuck");
            tokio::task::yield_now().await;
        }
        let on_disk = service.store().read_meta(&job_id).unwrap().unwrap();
        assert_eq!(on_disk.status, JobStatus::Done);

        let record = service.submit(Some("abc"), &url).unwrap();
        assert_eq!(record.status, JobStatus::Queued);
    }

    let last = wait_terminal(&service, &job_id).await;
    assert_eq!(last.status, JobStatus::Done);
    assert_eq!(last.error, None);
}

#[tokio::test]
async fn rerun_does_not_serve_previous_output() {
    let server = artifact_server().await;
    let temp = TempDir::new().unwrap();
    let service = start(temp.path(), "mkdir -p sources && echo old > sources/A.java");

    let record = service
        .submit(Some("rerun"), &format!("{}/app.apk", server.uri()))
        .unwrap();
    wait_terminal(&service, &record.job_id).await;
    assert!(service.read_file(&record.job_id, "sources/A.java", 1).is_ok());

    service
        .submit(Some("rerun"), &format!("{}/missing.apk", server.uri()))
        .unwrap();
    let failed = wait_terminal(&service, &record.job_id).await;
    assert_eq!(failed.status, JobStatus::Error);

    match service.browse(&record.job_id, "").unwrap() {
        Listing::Directory { entries, .. } => assert!(entries.is_empty(), "{entries:?}"),
        other => panic!("expected directory, got {other:?}"),
    }
    assert!(matches!(
        service.read_file(&record.job_id, "sources/A.java", 1),
        Err(QueryError::Browse(BrowseError::NotFound(_)))
    ));
}
