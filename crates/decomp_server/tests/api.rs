#![cfg(unix)]

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use decomp_engine::{EngineConfig, JobService, ToolCommand};
use decomp_server::{api_routes, AppState};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

struct TestApp {
    _temp: TempDir,
    router: Router,
    artifacts: MockServer,
}

impl TestApp {
    async fn start(script: &str) -> Self {
        decomp_logging::initialize_for_tests();
        let artifacts = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/app.apk"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"0123456789".to_vec()))
            .mount(&artifacts)
            .await;
        Mock::given(method("GET"))
            .and(path("/gone.apk"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&artifacts)
            .await;

        let temp = TempDir::new().unwrap();
        let mut config = EngineConfig::default_with_root(temp.path());
        config.tool = ToolCommand::new("sh", ["-c", script]);
        config.tool_timeout = Duration::from_secs(10);
        let jobs = JobService::start(config).unwrap();
        let router = api_routes(Arc::new(AppState::new(jobs)));
        Self {
            _temp: temp,
            router,
            artifacts,
        }
    }

    fn artifact_url(&self, name: &str) -> String {
        format!("{}/{name}", self.artifacts.uri())
    }

    async fn get(&self, uri: &str) -> (StatusCode, Value) {
        let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
        self.send(request).await
    }

    async fn post(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        let request = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        self.send(request).await
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = if body.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body).unwrap_or(Value::Null)
        };
        (status, json)
    }

    async fn wait_terminal(&self, status_url: &str) -> Value {
        let deadline = Instant::now() + Duration::from_secs(15);
        loop {
            let (code, doc) = self.get(status_url).await;
            assert_eq!(code, StatusCode::OK);
            if doc["status"] == "done" || doc["status"] == "error" {
                return doc;
            }
            assert!(Instant::now() < deadline, "job stuck: {doc}");
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }
}

#[tokio::test]
async fn health_reports_ok() {
    let app = TestApp::start("true").await;
    let (status, body) = app.get("/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn submitted_job_can_be_followed_to_completion() {
    let app = TestApp::start("mkdir -p sources && echo 'class A {}' > sources/A.java").await;

    let (status, accepted) = app
        .post(
            "/jobs",
            json!({"job_id": "abc", "source_url": app.artifact_url("app.apk")}),
        )
        .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(
        accepted,
        json!({
            "job_id": "abc",
            "status_url": "/jobs/abc/status",
            "logs_url": "/jobs/abc/logs",
            "browse_url": "/jobs/abc/browse",
        })
    );

    let doc = app.wait_terminal("/jobs/abc/status").await;
    assert_eq!(doc["status"], "done");
    assert_eq!(doc["job_id"], "abc");
    assert!(doc.get("error").is_none());
    assert!(doc["sources_dir"].as_str().unwrap().ends_with("sources"));

    let (status, logs) = app.get("/jobs/abc/logs?tail=1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(logs["job_id"], "abc");
    assert_eq!(logs["status"], "done");
    let lines = logs["logs"].as_array().unwrap();
    assert_eq!(lines.len(), 1);
    assert!(lines[0].as_str().unwrap().contains("finished successfully"));

    let (status, listing) = app.get("/jobs/abc/browse").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listing["kind"], "directory");
    assert_eq!(
        listing["entries"],
        json!([
            {"name": "sources", "type": "dir", "size_bytes": 0},
            {"name": "app.apk", "type": "file", "size_bytes": 10},
        ])
    );

    let (status, file) = app.get("/jobs/abc/file?path=sources/A.java").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(file["content"], "class A {}\n");
    assert_eq!(file["truncated"], false);
    assert_eq!(file["size_bytes"], 11);
}

#[tokio::test]
async fn file_reads_are_capped_by_max_kb() {
    let app = TestApp::start("head -c 3000 /dev/zero | tr '\\0' 'a' > big.txt").await;
    app.post(
        "/jobs",
        json!({"job_id": "big", "source_url": app.artifact_url("app.apk")}),
    )
    .await;
    app.wait_terminal("/jobs/big/status").await;

    let (status, file) = app.get("/jobs/big/file?path=big.txt&max_kb=1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(file["size_bytes"], 3000);
    assert_eq!(file["truncated"], true);
    assert_eq!(file["content"].as_str().unwrap().len(), 1024);
}

#[tokio::test]
async fn failed_download_is_reported_in_status() {
    let app = TestApp::start("true").await;
    let (status, accepted) = app
        .post("/jobs", json!({"source_url": app.artifact_url("gone.apk")}))
        .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let job_id = accepted["job_id"].as_str().unwrap().to_string();
    assert_eq!(job_id.len(), 24);

    let doc = app.wait_terminal(&format!("/jobs/{job_id}/status")).await;
    assert_eq!(doc["status"], "error");
    assert!(doc["error"].as_str().unwrap().contains("404"));
}

#[tokio::test]
async fn traversal_is_forbidden() {
    let app = TestApp::start("true").await;
    app.post(
        "/jobs",
        json!({"job_id": "trav", "source_url": app.artifact_url("app.apk")}),
    )
    .await;
    app.wait_terminal("/jobs/trav/status").await;

    for uri in [
        "/jobs/trav/browse?path=../",
        "/jobs/trav/browse?path=../../etc",
        "/jobs/trav/file?path=../meta.json",
        "/jobs/trav/file?path=sources/../../job.log",
    ] {
        let (status, body) = app.get(uri).await;
        assert_eq!(status, StatusCode::FORBIDDEN, "{uri}");
        assert!(body.get("content").is_none());
        assert!(body.get("entries").is_none());
    }
}

#[tokio::test]
async fn unknown_jobs_are_not_found() {
    let app = TestApp::start("true").await;
    assert_eq!(app.get("/jobs/nope/status").await.0, StatusCode::NOT_FOUND);
    assert_eq!(app.get("/jobs/nope/logs").await.0, StatusCode::NOT_FOUND);
    assert_eq!(app.get("/jobs/nope/browse").await.0, StatusCode::NOT_FOUND);
    assert_eq!(app.get("/status/nope").await.0, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn bad_submissions_are_rejected() {
    let app = TestApp::start("true").await;

    let (status, body) = app
        .post("/jobs", json!({"source_url": "file:///etc/passwd"}))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Invalid source url");

    let (status, body) = app
        .post(
            "/jobs",
            json!({"job_id": ".hidden", "source_url": "http://example.com/a.apk"}),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Invalid job id");

    assert_eq!(app.get("/jobs/.hidden/status").await.0, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn active_job_cannot_be_resubmitted() {
    let app = TestApp::start("sleep 5").await;
    let body = json!({"job_id": "busy", "source_url": app.artifact_url("app.apk")});
    assert_eq!(app.post("/jobs", body.clone()).await.0, StatusCode::ACCEPTED);

    let (status, error) = app.post("/jobs", body).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(error["error"], "Job is still running");
}

#[tokio::test]
async fn legacy_endpoints_drive_the_same_jobs() {
    let app = TestApp::start("true").await;
    let (status, accepted) = app
        .post(
            "/decompile",
            json!({"scan_id": "scan-1", "apk_url": app.artifact_url("app.apk")}),
        )
        .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(
        accepted,
        json!({"status": "accepted", "scan_id": "scan-1", "status_url": "/status/scan-1"})
    );

    let doc = app.wait_terminal("/status/scan-1").await;
    assert_eq!(doc["status"], "done");
    let (_, same) = app.get("/jobs/scan-1/status").await;
    assert_eq!(same, doc);
}
