//! Message types: SafetyMessage, MessagePriority, MessageView

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Position;

/// Message identifier, unique per warning. A re-issued or withdrawn
/// warning keeps its id.
pub type MessageId = i64;

/// Shore feed position. Every update the shore publishes (new warning,
/// re-issue, tombstone) gets a higher number than the one before; the
/// largest seen is the high-water mark sent with the next poll.
pub type SequenceNumber = i64;

/// Shore-assigned priority of a warning
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MessagePriority {
    #[default]
    Routine,
    Important,
    Vital,
}

impl std::fmt::Display for MessagePriority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Routine => write!(f, "ROUTINE"),
            Self::Important => write!(f, "IMPORTANT"),
            Self::Vital => write!(f, "VITAL"),
        }
    }
}

/// A maritime safety warning as received from the shore service.
///
/// Never mutated after receipt; a later message with the same id replaces
/// the stored copy wholesale. A message with `deleted == true` is a
/// tombstone and only its id is meaningful.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SafetyMessage {
    pub id: MessageId,
    pub sequence: SequenceNumber,
    /// Area vertices. `None` means a general-area warning with no location.
    #[serde(default)]
    pub area: Option<Vec<Position>>,
    #[serde(default)]
    pub valid_from: Option<DateTime<Utc>>,
    #[serde(default)]
    pub valid_to: Option<DateTime<Utc>>,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub navtex_area: Option<String>,
    #[serde(default)]
    pub priority: MessagePriority,
    #[serde(default)]
    pub created: Option<DateTime<Utc>>,
    /// Tombstone marker: the shore service withdrew this id
    #[serde(default)]
    pub deleted: bool,
}

impl SafetyMessage {
    /// Create a general-area message with the given id and text. The
    /// sequence number starts equal to the id; see `with_sequence`.
    pub fn new(id: MessageId, content: impl Into<String>) -> Self {
        Self {
            id,
            sequence: id,
            area: None,
            valid_from: None,
            valid_to: None,
            content: content.into(),
            title: None,
            navtex_area: None,
            priority: MessagePriority::Routine,
            created: None,
            deleted: false,
        }
    }

    /// Create a tombstone withdrawing `id`.
    pub fn tombstone(id: MessageId) -> Self {
        Self {
            deleted: true,
            ..Self::new(id, String::new())
        }
    }

    pub fn with_sequence(mut self, sequence: SequenceNumber) -> Self {
        self.sequence = sequence;
        self
    }

    pub fn with_area(mut self, area: Vec<Position>) -> Self {
        self.area = Some(area);
        self
    }

    pub fn with_validity(
        mut self,
        valid_from: Option<DateTime<Utc>>,
        valid_to: Option<DateTime<Utc>>,
    ) -> Self {
        self.valid_from = valid_from;
        self.valid_to = valid_to;
        self
    }

    /// Area points, if the message has a usable location.
    ///
    /// An empty vertex list is treated the same as no area.
    pub fn area_points(&self) -> Option<&[Position]> {
        match self.area.as_deref() {
            Some(points) if !points.is_empty() => Some(points),
            _ => None,
        }
    }

    /// Whether the validity window has opened at `now`, allowing `tolerance`
    /// for clock differences with the shore service.
    pub fn has_started(&self, now: DateTime<Utc>, tolerance: chrono::Duration) -> bool {
        // Past the representable range every start time has been reached
        self.valid_from.map_or(true, |from| {
            now.checked_add_signed(tolerance).map_or(true, |limit| from <= limit)
        })
    }

    /// Whether the validity window closed strictly before `now`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.valid_to.is_some_and(|to| to < now)
    }
}

/// A message together with its status flags, as shown to the user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageView {
    pub message: SafetyMessage,
    pub acknowledged: bool,
    pub visible_by_position: bool,
    pub visible_by_route: bool,
    pub relevant_to_active_route: bool,
}

impl MessageView {
    /// Visible if near own ship or near a displayed route
    pub fn visible(&self) -> bool {
        self.visible_by_position || self.visible_by_route
    }

    pub fn id(&self) -> MessageId {
        self.message.id
    }
}
