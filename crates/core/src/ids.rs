#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};

/// Sequence number of a segment within one job.
pub type SeqNo = u64;

/// Per-job claim counter; the first claim of a job is 0.
pub type ClaimId = u64;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct JobId(u64);

impl JobId {
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }

    pub fn parse(value: &str) -> Result<Self, JobIdError> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(JobIdError::Empty);
        }
        if !trimmed.chars().all(|c| c.is_ascii_digit()) {
            return Err(JobIdError::NotDecimal);
        }
        trimmed
            .parse::<u64>()
            .map(Self)
            .map_err(|_| JobIdError::TooLarge)
    }
}

impl From<u64> for JobId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum JobIdError {
    #[error("job id must not be empty")]
    Empty,
    #[error("job id must be a decimal integer")]
    NotDecimal,
    #[error("job id does not fit in 64 bits")]
    TooLarge,
}
