//! Shore service seam
//!
//! The coordinator only needs "give me everything newer than sequence N".
//! The transport behind it (HTTP, NAVTEX receiver, file replay) is the
//! implementor's business.

mod file_feed;

pub use file_feed::FileShoreClient;

use async_trait::async_trait;
use std::time::Duration;

use crate::types::{SafetyMessage, SequenceNumber};

/// Messages returned by one successful poll. May be empty.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PollResult {
    pub messages: Vec<SafetyMessage>,
}

/// Poll failures. Distinct from an empty `PollResult`.
#[derive(Debug, thiserror::Error)]
pub enum PollError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("poll timed out after {0:?}")]
    Timeout(Duration),
    #[error("feed error: {0}")]
    Feed(String),
}

/// Client for the shore MSI service.
#[async_trait]
pub trait ShoreClient: Send + Sync {
    /// Fetch every update (new warnings, re-issues, tombstones) with a
    /// sequence number above `last_sequence`.
    async fn poll(&self, last_sequence: SequenceNumber) -> Result<PollResult, PollError>;

    /// Name for logging
    fn name(&self) -> &str;
}
