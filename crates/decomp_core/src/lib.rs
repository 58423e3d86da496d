//! Decomp core: job data model, status state machine and in-memory job table.
mod job_id;
mod record;
mod ring;
mod status;
mod table;

pub use job_id::{InvalidJobId, JobId, MAX_JOB_ID_LEN};
pub use record::{validate_source_url, InvalidSourceUrl, JobPatch, JobRecord};
pub use ring::{LogRing, DEFAULT_LOG_CAPACITY};
pub use status::{JobStatus, TransitionError};
pub use table::{JobEntry, JobTable};
