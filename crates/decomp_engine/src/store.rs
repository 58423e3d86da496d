//! Disk record store: one metadata document and one append-only log per job.
//!
//! ```text
//! <root>/<job_id>/meta.json
//! <root>/<job_id>/job.log
//! <root>/<job_id>/output/
//! ```

use std::collections::VecDeque;
use std::fs::{self, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use decomp_core::{JobId, JobPatch, JobRecord, TransitionError};
use decomp_logging::decomp_debug;
use thiserror::Error;

use crate::persist::{ensure_dir, AtomicFileWriter, PersistError};

pub const META_FILENAME: &str = "meta.json";
pub const LOG_FILENAME: &str = "job.log";
pub const OUTPUT_DIRNAME: &str = "output";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("persist error: {0}")]
    Persist(#[from] PersistError),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("corrupt metadata for job {job_id}: {message}")]
    Corrupt { job_id: JobId, message: String },
    #[error(transparent)]
    Transition(#[from] TransitionError),
}

#[derive(Debug, Clone)]
pub struct DiskStore {
    root: PathBuf,
}

impl DiskStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn job_dir(&self, job_id: &JobId) -> PathBuf {
        self.root.join(job_id.as_str())
    }

    /// Where the job's artifact and tool output live. A pure function of the
    /// root and the id.
    pub fn output_dir(&self, job_id: &JobId) -> PathBuf {
        self.job_dir(job_id).join(OUTPUT_DIRNAME)
    }

    pub fn meta_path(&self, job_id: &JobId) -> PathBuf {
        self.job_dir(job_id).join(META_FILENAME)
    }

    pub fn log_path(&self, job_id: &JobId) -> PathBuf {
        self.job_dir(job_id).join(LOG_FILENAME)
    }

    /// Overwrites the whole document.
    pub fn write_record(&self, record: &JobRecord) -> Result<(), StoreError> {
        let json = serde_json::to_vec_pretty(record).map_err(|err| StoreError::Corrupt {
            job_id: record.job_id.clone(),
            message: err.to_string(),
        })?;
        AtomicFileWriter::new(self.job_dir(&record.job_id)).write(META_FILENAME, &json)?;
        Ok(())
    }

    /// Merges `patch` into the stored document (or into a fresh `unknown`
    /// document if none exists) and writes it back atomically.
    pub fn write_meta(&self, job_id: &JobId, patch: &JobPatch) -> Result<JobRecord, StoreError> {
        let mut record = self
            .read_meta(job_id)?
            .unwrap_or_else(|| JobRecord::placeholder(job_id.clone(), patch.at));
        record.apply(patch)?;
        self.write_record(&record)?;
        Ok(record)
    }

    pub fn read_meta(&self, job_id: &JobId) -> Result<Option<JobRecord>, StoreError> {
        let bytes = match fs::read(self.meta_path(job_id)) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|err| StoreError::Corrupt {
                job_id: job_id.clone(),
                message: err.to_string(),
            })
    }

    /// Appends `line` plus a newline with a single write on an append-mode
    /// handle.
    pub fn append_log(&self, job_id: &JobId, line: &str) -> Result<(), StoreError> {
        let dir = self.job_dir(job_id);
        ensure_dir(&dir)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(dir.join(LOG_FILENAME))?;
        let mut buf = String::with_capacity(line.len() + 1);
        buf.push_str(line);
        buf.push('\n');
        file.write_all(buf.as_bytes())?;
        Ok(())
    }

    /// Truncates (or creates) the job's log file.
    pub fn reset_log(&self, job_id: &JobId) -> Result<(), StoreError> {
        let dir = self.job_dir(job_id);
        ensure_dir(&dir)?;
        fs::File::create(dir.join(LOG_FILENAME))?;
        decomp_debug!("Reset log for job {}", job_id);
        Ok(())
    }

    /// Removes the job's output tree, if any. The next run recreates it.
    pub fn reset_output(&self, job_id: &JobId) -> Result<(), StoreError> {
        match fs::remove_dir_all(self.output_dir(job_id)) {
            Ok(()) => {
                decomp_debug!("Cleared output of job {}", job_id);
                Ok(())
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    pub fn has_log(&self, job_id: &JobId) -> bool {
        self.log_path(job_id).is_file()
    }

    /// The last `n` lines of the disk log, or `None` when no log exists.
    /// Invalid UTF-8 is replaced rather than rejected.
    pub fn tail_log(&self, job_id: &JobId, n: usize) -> Result<Option<Vec<String>>, StoreError> {
        let file = match fs::File::open(self.log_path(job_id)) {
            Ok(file) => file,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let mut reader = BufReader::new(file);
        let mut tail: VecDeque<String> = VecDeque::with_capacity(n.min(1024));
        let mut buf = Vec::new();
        loop {
            buf.clear();
            if reader.read_until(b'\n', &mut buf)? == 0 {
                break;
            }
            if n == 0 {
                continue;
            }
            if tail.len() == n {
                tail.pop_front();
            }
            tail.push_back(trim_line_ending(&String::from_utf8_lossy(&buf)).to_string());
        }
        Ok(Some(tail.into()))
    }
}

pub(crate) fn trim_line_ending(line: &str) -> &str {
    line.trim_end_matches(['\n', '\r'])
}
