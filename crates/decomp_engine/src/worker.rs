use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use decomp_core::{JobId, JobPatch, JobStatus, JobTable, TransitionError};
use decomp_logging::{decomp_error, decomp_info, decomp_warn};
use thiserror::Error;

use crate::config::EngineConfig;
use crate::fetch::{DownloadProgress, Fetcher, ProgressSink};
use crate::persist::{ensure_dir, PersistError};
use crate::process::{ProcessRunner, RunFailure};
use crate::sink::LogSink;
use crate::store::{DiskStore, StoreError};
use crate::FetchError;

const PROGRESS_STEP_BYTES: u64 = 10 * 1024 * 1024;
const MIB: f64 = 1024.0 * 1024.0;

/// Anything that ends a job in `error`.
#[derive(Debug, Error)]
pub enum JobFailure {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Run(#[from] RunFailure),
    #[error("storage error: {0}")]
    Store(#[from] StoreError),
    #[error("output directory error: {0}")]
    OutputDir(#[from] PersistError),
    #[error(transparent)]
    Transition(#[from] TransitionError),
}

/// Everything a worker needs to carry a job through its phases.
pub struct JobContext {
    pub config: EngineConfig,
    pub table: Arc<JobTable>,
    pub store: Arc<DiskStore>,
    pub sink: LogSink,
    pub fetcher: Arc<dyn Fetcher>,
    pub runner: ProcessRunner,
}

impl JobContext {
    /// Writes `patch` to the disk record, then to the job table.
    ///
    /// A status visible in memory has always reached disk first, so a job that
    /// looks terminal in the table has no write left in flight.
    pub(crate) fn commit(&self, job_id: &JobId, patch: &JobPatch) -> Result<(), JobFailure> {
        self.store.write_meta(job_id, patch)?;
        self.table.apply(job_id, patch)?;
        Ok(())
    }

    /// Records a failure in both stores. Unlike [`JobContext::commit`], a
    /// failed disk write still marks the in-memory entry.
    pub(crate) fn record_failure(&self, job_id: &JobId, message: impl Into<String>) {
        let patch = JobPatch::failed(message);
        if let Err(err) = self.store.write_meta(job_id, &patch) {
            decomp_error!("Failed to persist error state for job {}: {}", job_id, err);
        }
        if let Err(err) = self.table.apply(job_id, &patch) {
            decomp_warn!("Failed to mark job {} as failed in memory: {}", job_id, err);
        }
    }
}

/// Carries one job from `queued` to `done` or `error`.
///
/// Every transition is written to the job table and the disk record before
/// the next phase starts. Failures never escape: they end up in the record.
pub struct JobWorker {
    ctx: Arc<JobContext>,
}

impl JobWorker {
    pub fn new(ctx: Arc<JobContext>) -> Self {
        Self { ctx }
    }

    /// Runs the job and returns its terminal status.
    pub async fn run(&self, job_id: &JobId, source_url: &str) -> JobStatus {
        match self.execute(job_id, source_url).await {
            Ok(()) => JobStatus::Done,
            Err(failure) => {
                self.fail(job_id, &failure);
                JobStatus::Error
            }
        }
    }

    async fn execute(&self, job_id: &JobId, source_url: &str) -> Result<(), JobFailure> {
        let ctx = &self.ctx;
        let sink = &ctx.sink;

        self.transition(job_id, &JobPatch::status(JobStatus::Downloading))?;
        sink.emit(job_id, format!("Downloading artifact: {source_url}"));

        let output_dir = ctx.store.output_dir(job_id);
        ensure_dir(&output_dir)?;
        let artifact = output_dir.join(&ctx.config.artifact_name);
        let progress = LoggedProgress::new(sink.clone(), job_id.clone());
        let summary = ctx
            .fetcher
            .fetch_to_file(source_url, &artifact, &progress)
            .await?;
        sink.emit(
            job_id,
            format!("Download complete: {:.2} MB", summary.bytes as f64 / MIB),
        );

        self.transition(job_id, &JobPatch::status(JobStatus::Decompiling))?;
        let tool = &ctx.config.tool;
        let args = tool.render_args(&artifact, &output_dir);
        sink.emit(job_id, format!("Running {} {}", tool.program, args.join(" ")));
        ctx.runner
            .run(job_id, &tool.program, &args, &output_dir, ctx.config.tool_timeout)
            .await?;

        sink.emit(
            job_id,
            format!("Job finished successfully. Output: {}", output_dir.display()),
        );
        self.transition(job_id, &done_patch(&output_dir))?;
        decomp_info!("Job {} done", job_id);
        Ok(())
    }

    fn transition(&self, job_id: &JobId, patch: &JobPatch) -> Result<(), JobFailure> {
        self.ctx.commit(job_id, patch)
    }

    fn fail(&self, job_id: &JobId, failure: &JobFailure) {
        let message = failure.to_string();
        self.ctx.sink.emit(job_id, format!("ERROR: {message}"));
        decomp_error!("Job {} failed: {}", job_id, message);
        self.ctx.record_failure(job_id, message);
    }
}

fn done_patch(output_dir: &Path) -> JobPatch {
    JobPatch::status(JobStatus::Done)
        .with_output_dir(output_dir.to_path_buf())
        .with_sources_dir(output_dir.join("sources"))
        .with_resources_dir(output_dir.join("resources"))
}

/// Writes a download progress line every [`PROGRESS_STEP_BYTES`].
struct LoggedProgress {
    sink: LogSink,
    job_id: JobId,
    next_report: AtomicU64,
}

impl LoggedProgress {
    fn new(sink: LogSink, job_id: JobId) -> Self {
        Self {
            sink,
            job_id,
            next_report: AtomicU64::new(PROGRESS_STEP_BYTES),
        }
    }
}

impl ProgressSink for LoggedProgress {
    fn emit(&self, progress: DownloadProgress) {
        let threshold = self.next_report.load(Ordering::Relaxed);
        if progress.bytes < threshold {
            return;
        }
        self.next_report
            .store(progress.bytes + PROGRESS_STEP_BYTES, Ordering::Relaxed);
        let line = match progress.total {
            Some(total) => format!(
                "Downloaded {:.2} / {:.2} MB",
                progress.bytes as f64 / MIB,
                total as f64 / MIB
            ),
            None => format!("Downloaded {:.2} MB", progress.bytes as f64 / MIB),
        };
        self.sink.emit(&self.job_id, line);
    }
}
