//! Endpoints kept for clients of the scan-oriented API.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use decomp_core::{JobId, JobRecord};
use serde::{Deserialize, Serialize};

use crate::error::ApiResult;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct DecompileRequest {
    pub apk_url: String,
    #[serde(default)]
    pub scan_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DecompileResponse {
    pub status: String,
    pub scan_id: JobId,
    pub status_url: String,
}

/// POST /decompile
async fn decompile(
    State(state): State<Arc<AppState>>,
    Json(request): Json<DecompileRequest>,
) -> ApiResult<(StatusCode, Json<DecompileResponse>)> {
    let record = state
        .jobs
        .submit(request.scan_id.as_deref(), &request.apk_url)?;
    Ok((
        StatusCode::ACCEPTED,
        Json(DecompileResponse {
            status: "accepted".to_string(),
            status_url: format!("/status/{}", record.job_id),
            scan_id: record.job_id,
        }),
    ))
}

/// GET /status/{scan_id}
async fn scan_status(
    State(state): State<Arc<AppState>>,
    Path(scan_id): Path<String>,
) -> ApiResult<Json<JobRecord>> {
    let scan_id = JobId::parse(&scan_id)?;
    Ok(Json(state.jobs.status(&scan_id)?))
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/decompile", post(decompile))
        .route("/status/{scan_id}", get(scan_status))
}
