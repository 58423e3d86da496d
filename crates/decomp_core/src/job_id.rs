use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const MAX_JOB_ID_LEN: usize = 128;

/// Opaque job identifier that is always safe to use as a single path segment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct JobId(String);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidJobId {
    #[error("job id is empty")]
    Empty,
    #[error("job id longer than {MAX_JOB_ID_LEN} characters")]
    TooLong,
    #[error("job id contains forbidden character {0:?}")]
    ForbiddenChar(char),
    #[error("job id must not start with '.'")]
    LeadingDot,
    #[error("job id {0:?} is a reserved device name")]
    Reserved(String),
}

impl JobId {
    pub fn parse(raw: &str) -> Result<Self, InvalidJobId> {
        if raw.is_empty() {
            return Err(InvalidJobId::Empty);
        }
        if raw.len() > MAX_JOB_ID_LEN {
            return Err(InvalidJobId::TooLong);
        }
        if let Some(c) = raw.chars().find(|c| !is_allowed(*c)) {
            return Err(InvalidJobId::ForbiddenChar(c));
        }
        // Also rules out "." and "..".
        if raw.starts_with('.') {
            return Err(InvalidJobId::LeadingDot);
        }
        if is_reserved_windows_name(raw) {
            return Err(InvalidJobId::Reserved(raw.to_string()));
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn is_allowed(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.')
}

fn is_reserved_windows_name(name: &str) -> bool {
    const RESERVED: &[&str] = &[
        "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
        "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
    ];
    let stem = name.split('.').next().unwrap_or(name);
    RESERVED.iter().any(|r| r.eq_ignore_ascii_case(stem))
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for JobId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl FromStr for JobId {
    type Err = InvalidJobId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for JobId {
    type Error = InvalidJobId;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<JobId> for String {
    fn from(value: JobId) -> Self {
        value.0
    }
}
