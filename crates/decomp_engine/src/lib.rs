//! Decomp engine: job execution, log capture, persistence and output browsing.
mod browse;
mod config;
mod fetch;
mod ids;
mod persist;
mod process;
mod scheduler;
mod service;
mod sink;
mod store;
mod types;
mod worker;

pub use browse::{
    browse, read_file, resolve_within, BrowseError, EntryInfo, EntryKind, FileContent, Listing,
    DEFAULT_MAX_KB, MAX_KB_LIMIT,
};
pub use config::{ConfigError, EngineConfig, ToolCommand, INPUT_PLACEHOLDER, OUTPUT_DIR_PLACEHOLDER};
pub use fetch::{DownloadProgress, FetchSettings, Fetcher, NoProgress, ProgressSink, ReqwestFetcher};
pub use ids::generate_job_id;
pub use persist::{ensure_dir, AtomicFileWriter, PersistError};
pub use process::{ProcessRunner, RunFailure};
pub use scheduler::{JobScheduler, SchedulerClosed};
pub use service::{
    JobLogs, JobService, LogSource, QueryError, StartError, SubmitError, DEFAULT_LOG_TAIL,
    MAX_LOG_TAIL,
};
pub use sink::LogSink;
pub use store::{DiskStore, StoreError, LOG_FILENAME, META_FILENAME, OUTPUT_DIRNAME};
pub use types::{DownloadSummary, FailureKind, FetchError};
pub use worker::{JobContext, JobFailure, JobWorker};
