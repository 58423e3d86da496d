use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::{JobId, JobStatus, TransitionError};

/// The job document served by status queries and persisted as `meta.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRecord {
    pub job_id: JobId,
    pub status: JobStatus,
    #[serde(default)]
    pub source_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_dir: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sources_dir: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources_dir: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl JobRecord {
    /// Initial record written at submission time.
    pub fn queued(
        job_id: JobId,
        source_url: impl Into<String>,
        output_dir: PathBuf,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            job_id,
            status: JobStatus::Queued,
            source_url: source_url.into(),
            output_dir: Some(output_dir),
            sources_dir: None,
            resources_dir: None,
            error: None,
            created_at: at,
            updated_at: at,
        }
    }

    /// Record for a job that produced output before it was registered.
    pub fn placeholder(job_id: JobId, at: DateTime<Utc>) -> Self {
        Self {
            job_id,
            status: JobStatus::Unknown,
            source_url: String::new(),
            output_dir: None,
            sources_dir: None,
            resources_dir: None,
            error: None,
            created_at: at,
            updated_at: at,
        }
    }

    /// Merge `patch` into this record. The status change is validated first so
    /// a rejected patch leaves the record untouched.
    pub fn apply(&mut self, patch: &JobPatch) -> Result<(), TransitionError> {
        if let Some(next) = patch.status {
            self.status = self.status.transition(next)?;
        }
        if let Some(url) = &patch.source_url {
            self.source_url = url.clone();
        }
        if let Some(dir) = &patch.output_dir {
            self.output_dir = Some(dir.clone());
        }
        if let Some(dir) = &patch.sources_dir {
            self.sources_dir = Some(dir.clone());
        }
        if let Some(dir) = &patch.resources_dir {
            self.resources_dir = Some(dir.clone());
        }
        if let Some(error) = &patch.error {
            self.error = Some(error.clone());
        }
        self.updated_at = patch.at;
        Ok(())
    }
}

/// A set of field updates stamped with a single timestamp.
///
/// The same patch is applied to the in-memory table and to the disk record so
/// both documents stay identical.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobPatch {
    pub status: Option<JobStatus>,
    pub source_url: Option<String>,
    pub output_dir: Option<PathBuf>,
    pub sources_dir: Option<PathBuf>,
    pub resources_dir: Option<PathBuf>,
    pub error: Option<String>,
    pub at: DateTime<Utc>,
}

impl JobPatch {
    pub fn at(at: DateTime<Utc>) -> Self {
        Self {
            status: None,
            source_url: None,
            output_dir: None,
            sources_dir: None,
            resources_dir: None,
            error: None,
            at,
        }
    }

    pub fn now() -> Self {
        Self::at(Utc::now())
    }

    pub fn status(status: JobStatus) -> Self {
        Self::now().with_status(status)
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self::now()
            .with_status(JobStatus::Error)
            .with_error(message)
    }

    pub fn with_status(mut self, status: JobStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_output_dir(mut self, dir: PathBuf) -> Self {
        self.output_dir = Some(dir);
        self
    }

    pub fn with_sources_dir(mut self, dir: PathBuf) -> Self {
        self.sources_dir = Some(dir);
        self
    }

    pub fn with_resources_dir(mut self, dir: PathBuf) -> Self {
        self.resources_dir = Some(dir);
        self
    }

    pub fn with_error(mut self, message: impl Into<String>) -> Self {
        self.error = Some(message.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidSourceUrl {
    #[error("invalid url: {0}")]
    Parse(String),
    #[error("unsupported url scheme {0:?}")]
    Scheme(String),
}

/// Source urls must be absolute http(s) urls.
pub fn validate_source_url(raw: &str) -> Result<Url, InvalidSourceUrl> {
    let url = Url::parse(raw.trim()).map_err(|err| InvalidSourceUrl::Parse(err.to_string()))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(InvalidSourceUrl::Scheme(other.to_string())),
    }
}
