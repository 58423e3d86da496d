use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use chrono::Utc;

use crate::{JobId, JobPatch, JobRecord, JobStatus, LogRing, TransitionError, DEFAULT_LOG_CAPACITY};

/// Live state of one job: its document and its recent log lines.
#[derive(Debug)]
pub struct JobEntry {
    record: Mutex<JobRecord>,
    logs: Mutex<LogRing>,
}

impl JobEntry {
    fn new(record: JobRecord, log_capacity: usize) -> Self {
        Self {
            record: Mutex::new(record),
            logs: Mutex::new(LogRing::new(log_capacity)),
        }
    }

    pub fn snapshot(&self) -> JobRecord {
        lock(&self.record).clone()
    }

    pub fn status(&self) -> JobStatus {
        lock(&self.record).status
    }

    pub fn apply(&self, patch: &JobPatch) -> Result<(), TransitionError> {
        lock(&self.record).apply(patch)
    }

    pub fn set_status(&self, status: JobStatus) -> Result<(), TransitionError> {
        self.apply(&JobPatch::status(status))
    }

    /// Locks the log ring for the duration of `f`.
    ///
    /// Callers that must keep another log copy in the same order perform that
    /// write inside `f`.
    pub fn with_logs<R>(&self, f: impl FnOnce(&mut LogRing) -> R) -> R {
        f(&mut lock(&self.logs))
    }

    pub fn append_log_line(&self, line: impl Into<String>) {
        lock(&self.logs).push(line);
    }

    /// The last `n` retained lines and whether they equal the full history's tail.
    pub fn tail_logs(&self, n: usize) -> (Vec<String>, bool) {
        let logs = lock(&self.logs);
        (logs.tail(n), logs.covers_tail(n))
    }
}

/// Process-wide cache of live jobs. Entries vanish with the process.
#[derive(Debug)]
pub struct JobTable {
    entries: RwLock<HashMap<JobId, Arc<JobEntry>>>,
    log_capacity: usize,
}

impl JobTable {
    pub fn new(log_capacity: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            log_capacity,
        }
    }

    pub fn log_capacity(&self) -> usize {
        self.log_capacity
    }

    pub fn get(&self, job_id: &JobId) -> Option<Arc<JobEntry>> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(job_id)
            .cloned()
    }

    /// Returns the existing entry, or registers an `unknown` placeholder.
    /// Calling it repeatedly for the same id always yields the same entry.
    pub fn get_or_create(&self, job_id: &JobId) -> Arc<JobEntry> {
        if let Some(entry) = self.get(job_id) {
            return entry;
        }
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries
            .entry(job_id.clone())
            .or_insert_with(|| {
                Arc::new(JobEntry::new(
                    JobRecord::placeholder(job_id.clone(), Utc::now()),
                    self.log_capacity,
                ))
            })
            .clone()
    }

    /// Registers `record` with an empty log ring, replacing any previous entry.
    pub fn insert(&self, record: JobRecord) -> Arc<JobEntry> {
        let job_id = record.job_id.clone();
        let entry = Arc::new(JobEntry::new(record, self.log_capacity));
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(job_id, entry.clone());
        entry
    }

    /// Returns `Ok(false)` when the job is not resident.
    pub fn set_status(&self, job_id: &JobId, status: JobStatus) -> Result<bool, TransitionError> {
        self.apply(job_id, &JobPatch::status(status))
    }

    /// Returns `Ok(false)` when the job is not resident.
    pub fn apply(&self, job_id: &JobId, patch: &JobPatch) -> Result<bool, TransitionError> {
        match self.get(job_id) {
            Some(entry) => entry.apply(patch).map(|()| true),
            None => Ok(false),
        }
    }

    pub fn append_log_line(&self, job_id: &JobId, line: impl Into<String>) {
        self.get_or_create(job_id).append_log_line(line);
    }

    pub fn remove(&self, job_id: &JobId) -> Option<Arc<JobEntry>> {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(job_id)
    }

    /// Drops every entry, as a process restart would.
    pub fn clear(&self) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for JobTable {
    fn default() -> Self {
        Self::new(DEFAULT_LOG_CAPACITY)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
