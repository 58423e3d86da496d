use std::sync::{Arc, Mutex, PoisonError};

use chrono::Utc;
use decomp_core::{
    validate_source_url, InvalidJobId, InvalidSourceUrl, JobId, JobRecord, JobStatus, JobTable,
};
use decomp_logging::{decomp_info, decomp_warn};
use serde::Serialize;
use thiserror::Error;

use crate::browse::{self, BrowseError, FileContent, Listing};
use crate::config::{ConfigError, EngineConfig};
use crate::fetch::{Fetcher, ReqwestFetcher};
use crate::ids::generate_job_id;
use crate::persist::{ensure_dir, PersistError};
use crate::process::ProcessRunner;
use crate::scheduler::{JobScheduler, SchedulerClosed};
use crate::sink::LogSink;
use crate::store::{DiskStore, StoreError};
use crate::worker::JobContext;

pub const DEFAULT_LOG_TAIL: usize = 200;
pub const MAX_LOG_TAIL: usize = 10_000;

#[derive(Debug, Error)]
pub enum StartError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("job root unusable: {0}")]
    Root(#[from] PersistError),
}

#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("invalid job id: {0}")]
    InvalidJobId(#[from] InvalidJobId),
    #[error("invalid source url: {0}")]
    InvalidSourceUrl(#[from] InvalidSourceUrl),
    #[error("job {0} is still {1}")]
    Active(JobId, JobStatus),
    #[error("failed to record job: {0}")]
    Store(#[from] StoreError),
    #[error(transparent)]
    Closed(#[from] SchedulerClosed),
}

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("job {0} not found")]
    NotFound(JobId),
    #[error("job {0} has no log")]
    NoLog(JobId),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Browse(#[from] BrowseError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogSource {
    Memory,
    Disk,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobLogs {
    pub job_id: JobId,
    pub status: JobStatus,
    pub logs: Vec<String>,
    pub source: LogSource,
}

/// Process-wide entry point: submission, scheduling and reconciled queries.
///
/// Queries prefer the in-memory table and fall back to the disk records for
/// jobs that were submitted before the current process started.
pub struct JobService {
    ctx: Arc<JobContext>,
    scheduler: JobScheduler,
    submit_lock: Mutex<()>,
}

impl JobService {
    /// Starts the service with the real HTTP fetcher.
    pub fn start(config: EngineConfig) -> Result<Self, StartError> {
        let fetcher = Arc::new(ReqwestFetcher::new(config.fetch.clone()));
        Self::start_with_fetcher(config, fetcher)
    }

    pub fn start_with_fetcher(
        config: EngineConfig,
        fetcher: Arc<dyn Fetcher>,
    ) -> Result<Self, StartError> {
        config.validate()?;
        ensure_dir(&config.root)?;

        let table = Arc::new(JobTable::new(config.log_capacity));
        let store = Arc::new(DiskStore::new(config.root.clone()));
        let sink = LogSink::new(table.clone(), store.clone());
        let runner = ProcessRunner::new(sink.clone());
        decomp_info!(
            "Job root {}, tool {:?}, timeout {}s",
            config.root.display(),
            config.tool.program,
            config.tool_timeout.as_secs()
        );

        let ctx = Arc::new(JobContext {
            config,
            table,
            store,
            sink,
            fetcher,
            runner,
        });
        let scheduler = JobScheduler::start(ctx.clone());
        Ok(Self {
            ctx,
            scheduler,
            submit_lock: Mutex::new(()),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.ctx.config
    }

    pub fn table(&self) -> &Arc<JobTable> {
        &self.ctx.table
    }

    pub fn store(&self) -> &DiskStore {
        &self.ctx.store
    }

    pub fn pending(&self) -> usize {
        self.scheduler.pending()
    }

    /// Records a `queued` job in both stores and hands it to the scheduler.
    ///
    /// Reusing the id of a finished (or no longer resident) job starts it over
    /// with a fresh record, an empty log and an empty output directory.
    pub fn submit(&self, job_id: Option<&str>, source_url: &str) -> Result<JobRecord, SubmitError> {
        let source_url = validate_source_url(source_url)?.to_string();
        let job_id = match job_id.map(str::trim).filter(|id| !id.is_empty()) {
            Some(raw) => JobId::parse(raw)?,
            None => generate_job_id(&source_url),
        };

        let _guard = self
            .submit_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(entry) = self.ctx.table.get(&job_id) {
            let status = entry.status();
            if !status.is_terminal() {
                return Err(SubmitError::Active(job_id, status));
            }
        }

        let record = JobRecord::queued(
            job_id.clone(),
            source_url.clone(),
            self.ctx.store.output_dir(&job_id),
            Utc::now(),
        );
        self.ctx.store.reset_output(&job_id)?;
        self.ctx.store.write_record(&record)?;
        self.ctx.store.reset_log(&job_id)?;
        self.ctx.table.insert(record.clone());
        self.ctx
            .sink
            .emit(&job_id, format!("Queued job for {source_url}"));

        if let Err(closed) = self.scheduler.enqueue(job_id.clone(), source_url) {
            decomp_warn!("Rejected job {}: {}", job_id, closed);
            self.ctx.record_failure(&job_id, closed.to_string());
            return Err(closed.into());
        }
        decomp_info!("Accepted job {}", job_id);
        Ok(record)
    }

    /// The job document, from memory if resident, otherwise from disk.
    pub fn status(&self, job_id: &JobId) -> Result<JobRecord, QueryError> {
        if let Some(entry) = self.ctx.table.get(job_id) {
            return Ok(entry.snapshot());
        }
        self.ctx
            .store
            .read_meta(job_id)?
            .ok_or_else(|| QueryError::NotFound(job_id.clone()))
    }

    /// The last `tail` log lines. The disk log must exist; the in-memory ring
    /// answers when it still holds the whole requested window.
    pub fn logs(&self, job_id: &JobId, tail: usize) -> Result<JobLogs, QueryError> {
        let tail = tail.clamp(1, MAX_LOG_TAIL);
        if !self.ctx.store.has_log(job_id) {
            return Err(QueryError::NoLog(job_id.clone()));
        }

        if let Some(entry) = self.ctx.table.get(job_id) {
            let (lines, complete) = entry.tail_logs(tail);
            if complete {
                return Ok(JobLogs {
                    job_id: job_id.clone(),
                    status: entry.status(),
                    logs: lines,
                    source: LogSource::Memory,
                });
            }
        }

        let lines = self
            .ctx
            .store
            .tail_log(job_id, tail)?
            .ok_or_else(|| QueryError::NoLog(job_id.clone()))?;
        let status = match self.status(job_id) {
            Ok(record) => record.status,
            Err(QueryError::NotFound(_)) => JobStatus::Unknown,
            Err(err) => return Err(err),
        };
        Ok(JobLogs {
            job_id: job_id.clone(),
            status,
            logs: lines,
            source: LogSource::Disk,
        })
    }

    pub fn browse(&self, job_id: &JobId, path: &str) -> Result<Listing, QueryError> {
        self.status(job_id)?;
        Ok(browse::browse(&self.ctx.store.output_dir(job_id), path)?)
    }

    pub fn read_file(&self, job_id: &JobId, path: &str, max_kb: u64) -> Result<FileContent, QueryError> {
        self.status(job_id)?;
        Ok(browse::read_file(
            &self.ctx.store.output_dir(job_id),
            path,
            max_kb,
        )?)
    }

    /// Stops intake and waits for queued and running jobs to finish.
    pub async fn shutdown(self) {
        self.scheduler.shutdown().await;
    }
}
