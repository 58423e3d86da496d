//! HTTP routes.
//!
//! - GET  /health
//! - POST /jobs
//! - GET  /jobs/{job_id}/status
//! - GET  /jobs/{job_id}/logs?tail=N
//! - GET  /jobs/{job_id}/browse?path=
//! - GET  /jobs/{job_id}/file?path=&max_kb=
//! - POST /decompile and GET /status/{scan_id} for older clients

pub mod health;
pub mod jobs;
pub mod legacy;

use std::sync::Arc;

use axum::Router;

use crate::state::AppState;

pub fn api_routes(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(health::router())
        .merge(jobs::router())
        .merge(legacy::router())
        .with_state(state)
}
