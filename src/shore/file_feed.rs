//! File-backed shore feed
//!
//! Reads a JSON array of `SafetyMessage` from disk on every poll and returns
//! the entries whose sequence number is above the requested one. Lets the handler run against a
//! recorded or hand-edited feed without a shore connection.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::{PollError, PollResult, ShoreClient};
use crate::types::{SafetyMessage, SequenceNumber};

pub struct FileShoreClient {
    path: PathBuf,
}

impl FileShoreClient {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_feed(&self) -> Result<Vec<SafetyMessage>, PollError> {
        let bytes = std::fs::read(&self.path)
            .map_err(|e| PollError::Transport(format!("{}: {e}", self.path.display())))?;
        serde_json::from_slice(&bytes)
            .map_err(|e| PollError::Feed(format!("{}: {e}", self.path.display())))
    }
}

#[async_trait]
impl ShoreClient for FileShoreClient {
    async fn poll(&self, last_sequence: SequenceNumber) -> Result<PollResult, PollError> {
        let mut messages: Vec<SafetyMessage> = self
            .read_feed()?
            .into_iter()
            .filter(|m| m.sequence > last_sequence)
            .collect();
        messages.sort_by_key(|m| m.sequence);

        debug!(
            path = %self.path.display(),
            last_sequence,
            returned = messages.len(),
            "File feed polled"
        );
        Ok(PollResult { messages })
    }

    fn name(&self) -> &str {
        "file-feed"
    }
}
