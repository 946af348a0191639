#![forbid(unsafe_code)]

use crate::{JobId, Profile, ProfileError, canonical_profiles};

/// Blocks after job creation during which the first claim must land.
pub const CLAIM_WINDOW_BLOCKS: u64 = 256;

const MAX_STREAM_ID_LEN: usize = 256;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Job {
    id: JobId,
    stream_id: String,
    profiles: Vec<Profile>,
    broadcaster: String,
    max_price_per_segment: u64,
    creation_block: u64,
    end_block: u64,
    stop_reason: Option<String>,
}

impl Job {
    pub fn try_new(
        id: JobId,
        stream_id: impl Into<String>,
        profiles: Vec<Profile>,
        broadcaster: impl Into<String>,
        max_price_per_segment: u64,
        creation_block: u64,
        end_block: u64,
    ) -> Result<Self, JobError> {
        let stream_id = stream_id.into();
        if stream_id.trim().is_empty() {
            return Err(JobError::EmptyStreamId);
        }
        if stream_id.len() > MAX_STREAM_ID_LEN {
            return Err(JobError::StreamIdTooLong);
        }
        if end_block < creation_block {
            return Err(JobError::EndBeforeCreation {
                creation_block,
                end_block,
            });
        }
        Ok(Self {
            id,
            stream_id,
            profiles: canonical_profiles(profiles)?,
            broadcaster: broadcaster.into(),
            max_price_per_segment,
            creation_block,
            end_block,
            stop_reason: None,
        })
    }

    pub fn with_stop_reason(mut self, reason: Option<String>) -> Self {
        self.stop_reason = reason;
        self
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn stream_id(&self) -> &str {
        &self.stream_id
    }

    /// Profiles in canonical order.
    pub fn profiles(&self) -> &[Profile] {
        &self.profiles
    }

    pub fn broadcaster(&self) -> &str {
        &self.broadcaster
    }

    pub fn max_price_per_segment(&self) -> u64 {
        self.max_price_per_segment
    }

    pub fn creation_block(&self) -> u64 {
        self.creation_block
    }

    pub fn end_block(&self) -> u64 {
        self.end_block
    }

    pub fn stop_reason(&self) -> Option<&str> {
        self.stop_reason.as_deref()
    }

    pub fn is_expired(&self, current_block: u64) -> bool {
        current_block > self.end_block
    }

    /// True once `current_block` lies strictly beyond the first-claim window.
    pub fn claim_window_elapsed(&self, current_block: u64, window: u64) -> bool {
        current_block > self.creation_block.saturating_add(window)
    }

    /// A job may claim while its first-claim window is open, and forever after
    /// its first successful claim.
    pub fn may_claim(&self, current_block: u64, window: u64, prior_claims: u64) -> bool {
        prior_claims > 0 || !self.claim_window_elapsed(current_block, window)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum JobError {
    #[error("stream id must not be empty")]
    EmptyStreamId,
    #[error("stream id is too long")]
    StreamIdTooLong,
    #[error("end block {end_block} precedes creation block {creation_block}")]
    EndBeforeCreation { creation_block: u64, end_block: u64 },
    #[error(transparent)]
    Profiles(#[from] ProfileError),
}
