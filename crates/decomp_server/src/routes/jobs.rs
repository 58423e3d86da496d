use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use decomp_core::{JobId, JobRecord};
use decomp_engine::{FileContent, JobLogs, Listing, DEFAULT_LOG_TAIL, DEFAULT_MAX_KB};
use serde::{Deserialize, Serialize};

use crate::error::ApiResult;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SubmitRequest {
    pub source_url: String,
    #[serde(default)]
    pub job_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SubmitResponse {
    pub job_id: JobId,
    pub status_url: String,
    pub logs_url: String,
    pub browse_url: String,
}

impl SubmitResponse {
    fn for_job(job_id: JobId) -> Self {
        Self {
            status_url: format!("/jobs/{job_id}/status"),
            logs_url: format!("/jobs/{job_id}/logs"),
            browse_url: format!("/jobs/{job_id}/browse"),
            job_id,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct LogsQuery {
    pub tail: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct BrowseQuery {
    #[serde(default)]
    pub path: String,
}

#[derive(Debug, Deserialize)]
pub struct FileQuery {
    pub path: String,
    pub max_kb: Option<u64>,
}

/// POST /jobs
async fn submit_job(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SubmitRequest>,
) -> ApiResult<(StatusCode, Json<SubmitResponse>)> {
    let record = state
        .jobs
        .submit(request.job_id.as_deref(), &request.source_url)?;
    Ok((
        StatusCode::ACCEPTED,
        Json(SubmitResponse::for_job(record.job_id)),
    ))
}

/// GET /jobs/{job_id}/status
async fn job_status(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<JobRecord>> {
    let job_id = JobId::parse(&job_id)?;
    Ok(Json(state.jobs.status(&job_id)?))
}

/// GET /jobs/{job_id}/logs
async fn job_logs(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<String>,
    Query(query): Query<LogsQuery>,
) -> ApiResult<Json<JobLogs>> {
    let job_id = JobId::parse(&job_id)?;
    let tail = query.tail.unwrap_or(DEFAULT_LOG_TAIL);
    Ok(Json(state.jobs.logs(&job_id, tail)?))
}

/// GET /jobs/{job_id}/browse
async fn browse_output(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<String>,
    Query(query): Query<BrowseQuery>,
) -> ApiResult<Json<Listing>> {
    let job_id = JobId::parse(&job_id)?;
    Ok(Json(state.jobs.browse(&job_id, &query.path)?))
}

/// GET /jobs/{job_id}/file
async fn read_output_file(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<String>,
    Query(query): Query<FileQuery>,
) -> ApiResult<Json<FileContent>> {
    let job_id = JobId::parse(&job_id)?;
    let max_kb = query.max_kb.unwrap_or(DEFAULT_MAX_KB);
    Ok(Json(state.jobs.read_file(&job_id, &query.path, max_kb)?))
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/jobs", post(submit_job))
        .route("/jobs/{job_id}/status", get(job_status))
        .route("/jobs/{job_id}/logs", get(job_logs))
        .route("/jobs/{job_id}/browse", get(browse_output))
        .route("/jobs/{job_id}/file", get(read_output_file))
}
