use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use decomp_core::InvalidJobId;
use decomp_engine::{BrowseError, QueryError, SubmitError};
use decomp_logging::{decomp_error, decomp_warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// JSON body of every error response.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: None,
        }
    }

    pub fn with_details(error: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: Some(details.into()),
        }
    }
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid job id: {0}")]
    InvalidJobId(#[from] InvalidJobId),

    #[error(transparent)]
    Submit(#[from] SubmitError),

    #[error(transparent)]
    Query(#[from] QueryError),
}

impl ApiError {
    fn parts(&self) -> (StatusCode, ErrorResponse) {
        match self {
            ApiError::InvalidJobId(err) => (
                StatusCode::BAD_REQUEST,
                ErrorResponse::with_details("Invalid job id", err.to_string()),
            ),
            ApiError::Submit(err) => submit_parts(err),
            ApiError::Query(err) => query_parts(err),
        }
    }
}

fn submit_parts(err: &SubmitError) -> (StatusCode, ErrorResponse) {
    let details = err.to_string();
    match err {
        SubmitError::InvalidJobId(_) => (
            StatusCode::BAD_REQUEST,
            ErrorResponse::with_details("Invalid job id", details),
        ),
        SubmitError::InvalidSourceUrl(_) => (
            StatusCode::BAD_REQUEST,
            ErrorResponse::with_details("Invalid source url", details),
        ),
        SubmitError::Active(_, _) => (
            StatusCode::CONFLICT,
            ErrorResponse::with_details("Job is still running", details),
        ),
        SubmitError::Closed(_) => (
            StatusCode::SERVICE_UNAVAILABLE,
            ErrorResponse::new("Service is shutting down"),
        ),
        SubmitError::Store(_) => {
            decomp_error!("Failed to record submission: {}", details);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorResponse::with_details("Storage error", details),
            )
        }
    }
}

fn query_parts(err: &QueryError) -> (StatusCode, ErrorResponse) {
    let details = err.to_string();
    match err {
        QueryError::NotFound(_) => (
            StatusCode::NOT_FOUND,
            ErrorResponse::with_details("Job not found", details),
        ),
        QueryError::NoLog(_) => (
            StatusCode::NOT_FOUND,
            ErrorResponse::with_details("Log not found", details),
        ),
        QueryError::Browse(BrowseError::Traversal(_)) => {
            decomp_warn!("Rejected path: {}", details);
            (
                StatusCode::FORBIDDEN,
                ErrorResponse::with_details("Path outside job output", details),
            )
        }
        QueryError::Browse(BrowseError::NotFound(_)) => (
            StatusCode::NOT_FOUND,
            ErrorResponse::with_details("Path not found", details),
        ),
        QueryError::Browse(BrowseError::NotAFile(_)) => (
            StatusCode::BAD_REQUEST,
            ErrorResponse::with_details("Not a file", details),
        ),
        QueryError::Browse(BrowseError::Io(_)) | QueryError::Store(_) => {
            decomp_error!("Query failed: {}", details);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorResponse::with_details("Internal error", details),
            )
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = self.parts();
        (status, Json(body)).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
