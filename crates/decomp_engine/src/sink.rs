use std::sync::Arc;

use decomp_core::{JobId, JobTable};
use decomp_logging::{decomp_job_line, decomp_warn};

use crate::store::{trim_line_ending, DiskStore, StoreError};

/// The single write path for job log lines.
///
/// Each pushed line lands in the job's disk log and in its in-memory ring
/// under the ring's lock, so concurrent writers for one job produce the same
/// order in both copies. A line is mirrored to the process logger as well.
#[derive(Debug, Clone)]
pub struct LogSink {
    table: Arc<JobTable>,
    store: Arc<DiskStore>,
}

impl LogSink {
    pub fn new(table: Arc<JobTable>, store: Arc<DiskStore>) -> Self {
        Self { table, store }
    }

    /// Appends one line. The disk append completes before this returns.
    ///
    /// A line that cannot be written to disk is not added to the ring either.
    pub fn push(&self, job_id: &JobId, line: &str) -> Result<(), StoreError> {
        let line = trim_line_ending(line);
        let entry = self.table.get_or_create(job_id);
        let result = entry.with_logs(|ring| {
            self.store.append_log(job_id, line)?;
            ring.push(line);
            Ok(())
        });
        decomp_job_line!(job_id, line);
        result
    }

    /// Like [`LogSink::push`], but a storage failure is only reported to the
    /// process log.
    pub fn emit(&self, job_id: &JobId, line: impl AsRef<str>) {
        if let Err(err) = self.push(job_id, line.as_ref()) {
            decomp_warn!("Failed to persist log line for job {}: {}", job_id, err);
        }
    }
}
