//! Message Store
//!
//! The authoritative record of every known safety message and its status
//! flags (acknowledged, visible by position, visible by route, relevant to
//! the active route).
//!
//! All state sits behind one mutex, so a merge or a recompute is observed
//! either entirely or not at all. Each message owns its status inline, which
//! means deleting a message cannot leave a status entry behind.
//!
//! Persistence snapshots the state under the mutex, releases it, then writes
//! the file while holding a second mutex that serializes writers.

pub mod persistence;

pub use persistence::StoreError;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, error, info, warn};

use crate::clock::Clock;
use crate::config::SharedSettings;
use crate::geo::{self, BoundingBox};
use crate::types::{MessageId, MessageView, Position, Route, SafetyMessage, SequenceNumber};
use persistence::StoreFile;

/// Per-message status owned by the store
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MessageStatus {
    pub acknowledged: bool,
    pub visible_by_position: bool,
    pub visible_by_route: bool,
    pub relevant_to_active_route: bool,
}

impl MessageStatus {
    pub const fn visible(&self) -> bool {
        self.visible_by_position || self.visible_by_route
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct StoredMessage {
    pub message: SafetyMessage,
    pub status: MessageStatus,
}

impl StoredMessage {
    fn view(&self) -> MessageView {
        MessageView {
            message: self.message.clone(),
            acknowledged: self.status.acknowledged,
            visible_by_position: self.status.visible_by_position,
            visible_by_route: self.status.visible_by_route,
            relevant_to_active_route: self.status.relevant_to_active_route,
        }
    }
}

/// Inputs of the last recompute, kept so that a message merged later gets
/// flags consistent with the rest of the store.
#[derive(Debug, Default)]
struct RelevanceContext {
    position: Option<Position>,
    route_boxes: Vec<BoundingBox>,
    active_route_box: Option<BoundingBox>,
    active_route_set: bool,
}

#[derive(Debug, Default)]
struct StoreState {
    entries: BTreeMap<MessageId, StoredMessage>,
    last_sequence: SequenceNumber,
    context: RelevanceContext,
}

/// Thread-safe store of safety messages
pub struct MessageStore {
    path: PathBuf,
    settings: SharedSettings,
    clock: Arc<dyn Clock>,
    state: Mutex<StoreState>,
    persist_lock: Mutex<()>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| {
        warn!("Store mutex poisoned by a panicking thread — continuing with inner state");
        PoisonError::into_inner(poisoned)
    })
}

impl MessageStore {
    /// Create an empty store that persists to `path`.
    pub fn new(path: impl Into<PathBuf>, settings: SharedSettings, clock: Arc<dyn Clock>) -> Self {
        Self {
            path: path.into(),
            settings,
            clock,
            state: Mutex::new(StoreState::default()),
            persist_lock: Mutex::new(()),
        }
    }

    /// Restore the store from `path`.
    ///
    /// A missing file yields an empty store. An unreadable, unparsable or
    /// inconsistent file is logged, deleted so it cannot fail the next start
    /// too, and also yields an empty store.
    pub fn load(path: impl Into<PathBuf>, settings: SharedSettings, clock: Arc<dyn Clock>) -> Self {
        let store = Self::new(path, settings, clock);

        if !store.path.exists() {
            info!(path = %store.path.display(), "No MSI store file — starting empty");
            return store;
        }

        match store.restore() {
            Ok(()) => info!(
                path = %store.path.display(),
                messages = store.len(),
                last_sequence = store.last_sequence(),
                "MSI store loaded"
            ),
            Err(e) => {
                error!(path = %store.path.display(), error = %e, "Discarding unusable MSI store file");
                if let Err(rm) = std::fs::remove_file(&store.path) {
                    warn!(path = %store.path.display(), error = %rm, "Could not remove bad MSI store file");
                }
            }
        }

        store
    }

    /// Open `path` for reading without repairing it. A missing file yields
    /// an empty store; an unusable file is returned as an error and left on
    /// disk.
    pub fn open(
        path: impl Into<PathBuf>,
        settings: SharedSettings,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, StoreError> {
        let store = Self::new(path, settings, clock);
        if store.path.exists() {
            store.restore()?;
        }
        Ok(store)
    }

    fn restore(&self) -> Result<(), StoreError> {
        let (entries, last_sequence) = StoreFile::read(&self.path).and_then(StoreFile::into_entries)?;
        let mut state = lock(&self.state);
        state.entries = entries;
        state.last_sequence = last_sequence;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    // ========================================================================
    // Merge
    // ========================================================================

    /// Merge a poll result.
    ///
    /// Tombstones remove the message and its status; other messages are
    /// upserted with their acknowledgement cleared. `last_sequence` advances
    /// to the highest sequence number seen. Afterwards position and
    /// route visibility are recomputed for the whole store when the
    /// respective input is given. Always persists. Returns whether anything
    /// observable changed.
    pub fn merge(
        &self,
        messages: Vec<SafetyMessage>,
        position: Option<Position>,
        routes: Option<&[Route]>,
    ) -> bool {
        let changed = {
            let mut state = lock(&self.state);
            let mut changed = false;
            let (radius, now, tolerance) = self.relevance_params();

            for message in messages {
                let id = message.id;
                if message.sequence > state.last_sequence {
                    state.last_sequence = message.sequence;
                    changed = true;
                }

                if message.deleted {
                    if state.entries.remove(&id).is_some() {
                        debug!(id, "MSI withdrawn by shore");
                        changed = true;
                    }
                    continue;
                }

                // Re-received warnings must be acknowledged again
                let status = state.context.status_for(&message, radius);
                let fresh = StoredMessage { message, status };
                match state.entries.insert(id, fresh.clone()) {
                    Some(prev) if prev == fresh => {}
                    _ => changed = true,
                }
            }

            if let Some(pos) = position {
                changed |= state.apply_position(pos, radius);
            }
            if let Some(routes) = routes {
                changed |= state.apply_routes(routes);
            }

            debug!(
                messages = state.entries.len(),
                last_sequence = state.last_sequence,
                unacknowledged = state.count_pending(now, tolerance),
                "MSI merge complete"
            );
            changed
        };

        self.persist_logged();
        changed
    }

    // ========================================================================
    // Relevance
    // ========================================================================

    /// Recompute position visibility for every message. Returns whether any flag flipped.
    pub fn set_visibility_by_position(&self, position: Position) -> bool {
        let radius = self.settings.load().relevance.radius_nm;
        lock(&self.state).apply_position(position, radius)
    }

    /// Recompute route visibility for every message against the displayed
    /// routes in `routes`. An empty list clears route visibility for
    /// located messages.
    pub fn set_visibility_by_routes(&self, routes: &[Route]) -> bool {
        lock(&self.state).apply_routes(routes)
    }

    /// Mark messages whose area touches the bounding box of the active route.
    pub fn set_relevance_to_active_route(&self, route: &Route) -> bool {
        let mut state = lock(&self.state);
        state.context.active_route_box = BoundingBox::of_route(route);
        state.context.active_route_set = true;
        state.refresh(|ctx, msg, status| status.relevant_to_active_route = ctx.active_relevance(msg))
    }

    /// Clear active-route relevance everywhere (route deactivated).
    pub fn clear_active_route_relevance(&self) -> bool {
        let mut state = lock(&self.state);
        state.context.active_route_box = None;
        state.context.active_route_set = false;
        state.refresh(|_, _, status| status.relevant_to_active_route = false)
    }

    // ========================================================================
    // User actions
    // ========================================================================

    /// Acknowledge a message. No-op for unknown or already acknowledged ids.
    pub fn acknowledge(&self, id: MessageId) -> bool {
        let mut state = lock(&self.state);
        match state.entries.get_mut(&id) {
            Some(entry) if !entry.status.acknowledged => {
                entry.status.acknowledged = true;
                true
            }
            _ => false,
        }
    }

    /// Remove a message locally. No-op for unknown ids.
    pub fn delete(&self, id: MessageId) -> bool {
        lock(&self.state).entries.remove(&id).is_some()
    }

    // ========================================================================
    // Expiry
    // ========================================================================

    /// Remove every message whose `valid_to` lies in the past.
    pub fn cleanup_expired(&self) -> bool {
        let now = self.clock.now();
        let mut state = lock(&self.state);
        let before = state.entries.len();
        state.entries.retain(|_, entry| !entry.message.is_expired(now));
        let removed = before - state.entries.len();
        if removed > 0 {
            info!(removed, remaining = state.entries.len(), "Expired MSI removed");
        }
        removed > 0
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// At least one started, unacknowledged and visible message exists.
    pub fn has_unacknowledged_relevant(&self) -> bool {
        self.unacknowledged_count() > 0
    }

    /// Number of started, unacknowledged and visible messages.
    pub fn unacknowledged_count(&self) -> usize {
        let (_, now, tolerance) = self.relevance_params();
        lock(&self.state).count_pending(now, tolerance)
    }

    /// Every message with its status, ordered by id.
    pub fn snapshot(&self) -> Vec<MessageView> {
        lock(&self.state).entries.values().map(StoredMessage::view).collect()
    }

    /// Only the visible messages, ordered by id.
    pub fn visible_snapshot(&self) -> Vec<MessageView> {
        lock(&self.state)
            .entries
            .values()
            .filter(|e| e.status.visible())
            .map(StoredMessage::view)
            .collect()
    }

    pub fn get(&self, id: MessageId) -> Option<MessageView> {
        lock(&self.state).entries.get(&id).map(StoredMessage::view)
    }

    /// Highest sequence number ever merged; sent with the next poll.
    pub fn last_sequence(&self) -> SequenceNumber {
        lock(&self.state).last_sequence
    }

    pub fn len(&self) -> usize {
        lock(&self.state).entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // ========================================================================
    // Persistence
    // ========================================================================

    /// Write the current state to the store file.
    pub fn persist(&self) -> Result<(), StoreError> {
        let _writer = lock(&self.persist_lock);
        let file = {
            let state = lock(&self.state);
            StoreFile::from_entries(&state.entries, state.last_sequence)
        };
        file.write_atomic(&self.path)?;
        debug!(path = %self.path.display(), messages = file.messages.len(), "MSI store persisted");
        Ok(())
    }

    /// Persist, logging failure. The in-memory store stays authoritative.
    pub fn persist_logged(&self) {
        if let Err(e) = self.persist() {
            warn!(path = %self.path.display(), error = %e, "Failed to persist MSI store");
        }
    }

    fn relevance_params(&self) -> (f64, chrono::DateTime<chrono::Utc>, chrono::Duration) {
        let settings = self.settings.load();
        (
            settings.relevance.radius_nm,
            self.clock.now(),
            settings.relevance.validity_tolerance(),
        )
    }
}

impl RelevanceContext {
    fn position_visibility(&self, message: &SafetyMessage, radius_nm: f64) -> bool {
        match (message.area_points(), self.position) {
            (None, _) => true,
            (Some(points), Some(pos)) => geo::within_radius(&pos, points, radius_nm),
            (Some(_), None) => false,
        }
    }

    fn route_visibility(&self, message: &SafetyMessage) -> bool {
        message
            .area_points()
            .map_or(true, |points| self.route_boxes.iter().any(|b| b.contains_any(points)))
    }

    fn active_relevance(&self, message: &SafetyMessage) -> bool {
        if !self.active_route_set {
            return false;
        }
        match (message.area_points(), &self.active_route_box) {
            (None, _) => true,
            (Some(points), Some(bbox)) => bbox.contains_any(points),
            (Some(_), None) => false,
        }
    }

    /// Flags for a newly merged message, acknowledgement excluded.
    fn status_for(&self, message: &SafetyMessage, radius_nm: f64) -> MessageStatus {
        MessageStatus {
            acknowledged: false,
            visible_by_position: self.position_visibility(message, radius_nm),
            visible_by_route: self.route_visibility(message),
            relevant_to_active_route: self.active_relevance(message),
        }
    }
}

impl StoreState {
    /// Apply `update` to every entry; true if any status changed.
    fn refresh<F>(&mut self, update: F) -> bool
    where
        F: Fn(&RelevanceContext, &SafetyMessage, &mut MessageStatus),
    {
        let ctx = &self.context;
        let mut changed = false;
        for entry in self.entries.values_mut() {
            let before = entry.status;
            update(ctx, &entry.message, &mut entry.status);
            changed |= before != entry.status;
        }
        changed
    }

    fn apply_position(&mut self, position: Position, radius_nm: f64) -> bool {
        self.context.position = Some(position);
        self.refresh(|ctx, msg, status| {
            status.visible_by_position = ctx.position_visibility(msg, radius_nm);
        })
    }

    fn apply_routes(&mut self, routes: &[Route]) -> bool {
        self.context.route_boxes = geo::visible_route_boxes(routes);
        self.refresh(|ctx, msg, status| status.visible_by_route = ctx.route_visibility(msg))
    }

    fn count_pending(&self, now: chrono::DateTime<chrono::Utc>, tolerance: chrono::Duration) -> usize {
        self.entries
            .values()
            .filter(|e| {
                !e.status.acknowledged
                    && e.status.visible()
                    && e.message.has_started(now, tolerance)
                    && !e.message.is_expired(now)
            })
            .count()
    }
}
