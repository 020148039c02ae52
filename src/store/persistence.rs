//! On-disk schema for the message store
//!
//! One JSON document per installation:
//!
//! ```text
//! { "version": 2,
//!   "last_sequence": 17,
//!   "messages": [ SafetyMessage, ... ],
//!   "acknowledged": [ids], "visible_by_position": [ids],
//!   "visible_by_route": [ids], "relevant_to_active_route": [ids] }
//! ```
//!
//! Writes go to a sibling temp file which is then renamed over the target,
//! so a crash mid-write leaves the previous file intact.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use super::{MessageStatus, StoredMessage};
use crate::types::{MessageId, SafetyMessage, SequenceNumber};

/// Current schema version. Files with any other version are rejected.
pub const FORMAT_VERSION: u32 = 2;

/// Storage errors
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("corrupt store file: {0}")]
    Corrupt(String),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub(crate) struct StoreFile {
    pub version: u32,
    pub last_sequence: SequenceNumber,
    pub messages: Vec<SafetyMessage>,
    pub acknowledged: BTreeSet<MessageId>,
    pub visible_by_position: BTreeSet<MessageId>,
    pub visible_by_route: BTreeSet<MessageId>,
    pub relevant_to_active_route: BTreeSet<MessageId>,
}

impl StoreFile {
    pub fn from_entries(
        entries: &BTreeMap<MessageId, StoredMessage>,
        last_sequence: SequenceNumber,
    ) -> Self {
        let mut file = Self {
            version: FORMAT_VERSION,
            last_sequence,
            messages: Vec::with_capacity(entries.len()),
            ..Self::default()
        };

        for (id, entry) in entries {
            file.messages.push(entry.message.clone());
            let s = entry.status;
            if s.acknowledged {
                file.acknowledged.insert(*id);
            }
            if s.visible_by_position {
                file.visible_by_position.insert(*id);
            }
            if s.visible_by_route {
                file.visible_by_route.insert(*id);
            }
            if s.relevant_to_active_route {
                file.relevant_to_active_route.insert(*id);
            }
        }
        file
    }

    /// Rebuild the in-memory entries, rejecting anything that breaks a store
    /// invariant (status for an unknown id, duplicate ids, stored tombstones,
    /// a sequence number behind a stored message).
    pub fn into_entries(
        self,
    ) -> Result<(BTreeMap<MessageId, StoredMessage>, SequenceNumber), StoreError> {
        if self.version != FORMAT_VERSION {
            return Err(StoreError::Corrupt(format!(
                "unsupported format version {} (expected {FORMAT_VERSION})",
                self.version
            )));
        }

        let mut entries = BTreeMap::new();
        for message in self.messages {
            if message.deleted {
                return Err(StoreError::Corrupt(format!("tombstone {} stored as message", message.id)));
            }
            if message.sequence > self.last_sequence {
                return Err(StoreError::Corrupt(format!(
                    "message {} has sequence {} beyond last_sequence {}",
                    message.id, message.sequence, self.last_sequence
                )));
            }
            let id = message.id;
            let stored = StoredMessage {
                message,
                status: MessageStatus::default(),
            };
            if entries.insert(id, stored).is_some() {
                return Err(StoreError::Corrupt(format!("duplicate message id {id}")));
            }
        }

        let sets: [(&str, BTreeSet<MessageId>, fn(&mut MessageStatus)); 4] = [
            ("acknowledged", self.acknowledged, |s| s.acknowledged = true),
            ("visible_by_position", self.visible_by_position, |s| s.visible_by_position = true),
            ("visible_by_route", self.visible_by_route, |s| s.visible_by_route = true),
            ("relevant_to_active_route", self.relevant_to_active_route, |s| {
                s.relevant_to_active_route = true;
            }),
        ];
        for (name, ids, apply) in sets {
            for id in ids {
                let entry = entries.get_mut(&id).ok_or_else(|| {
                    StoreError::Corrupt(format!("{name} entry for unknown message {id}"))
                })?;
                apply(&mut entry.status);
            }
        }

        Ok((entries, self.last_sequence))
    }

    pub fn read(path: &Path) -> Result<Self, StoreError> {
        let bytes = fs::read(path)?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    pub fn write_atomic(&self, path: &Path) -> Result<(), StoreError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let tmp = temp_path(path);
        let json = serde_json::to_vec_pretty(self)?;
        fs::write(&tmp, &json)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(std::ffi::OsStr::to_os_string)
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: MessageId, acknowledged: bool) -> StoredMessage {
        StoredMessage {
            message: SafetyMessage::new(id, format!("message {id}")),
            status: MessageStatus {
                acknowledged,
                visible_by_position: true,
                ..MessageStatus::default()
            },
        }
    }

    #[test]
    fn test_entries_survive_file_round_trip() {
        let mut entries = BTreeMap::new();
        entries.insert(3, entry(3, true));
        entries.insert(5, entry(5, false));

        let file = StoreFile::from_entries(&entries, 9);
        let (restored, seq) = file.into_entries().unwrap();
        assert_eq!(seq, 9);
        assert_eq!(restored, entries);
    }

    #[test]
    fn test_dangling_status_is_corrupt() {
        let mut entries = BTreeMap::new();
        entries.insert(1, entry(1, false));
        let mut file = StoreFile::from_entries(&entries, 1);
        file.acknowledged.insert(99);

        let err = file.into_entries().unwrap_err();
        assert!(matches!(err, StoreError::Corrupt(_)));
    }

    #[test]
    fn test_unknown_version_is_corrupt() {
        let file = StoreFile {
            version: 7,
            ..StoreFile::default()
        };
        assert!(matches!(file.into_entries(), Err(StoreError::Corrupt(_))));
    }

    #[test]
    fn test_write_atomic_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("msi.json");
        StoreFile::from_entries(&BTreeMap::new(), 0)
            .write_atomic(&path)
            .unwrap();

        assert!(path.exists());
        assert!(!temp_path(&path).exists());
        assert_eq!(StoreFile::read(&path).unwrap().version, FORMAT_VERSION);
    }
}
