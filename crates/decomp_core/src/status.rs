use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Lifecycle of a job.
///
/// `queued -> downloading -> decompiling -> done`, with `error` reachable from
/// every non-terminal state. `unknown` only exists for log lines that arrive
/// before a record was initialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    #[default]
    Unknown,
    Queued,
    Downloading,
    Decompiling,
    Done,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid status transition {from} -> {to}")]
pub struct TransitionError {
    pub from: JobStatus,
    pub to: JobStatus,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::Error)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Unknown => "unknown",
            JobStatus::Queued => "queued",
            JobStatus::Downloading => "downloading",
            JobStatus::Decompiling => "decompiling",
            JobStatus::Done => "done",
            JobStatus::Error => "error",
        }
    }

    /// Whether `self -> next` is a legal move. Re-asserting the current
    /// status is allowed and is a no-op for the caller.
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        if self == next {
            return true;
        }
        match self {
            JobStatus::Unknown => true,
            JobStatus::Queued => matches!(next, JobStatus::Downloading | JobStatus::Error),
            JobStatus::Downloading => matches!(next, JobStatus::Decompiling | JobStatus::Error),
            JobStatus::Decompiling => matches!(next, JobStatus::Done | JobStatus::Error),
            JobStatus::Done | JobStatus::Error => false,
        }
    }

    pub fn transition(self, next: JobStatus) -> Result<JobStatus, TransitionError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(TransitionError {
                from: self,
                to: next,
            })
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
