//! MSI Handler - coordinator between shore, own ship, routes and the store
//!
//! ```text
//! every tick:
//!   PHASE 1: Poll      (only when the poll interval has elapsed since the last success)
//!   PHASE 2: Expire    (drop warnings past valid_to)
//!   PHASE 3: Recompute (position if moved beyond threshold, routes always)
//!   -> if anything changed: persist, notify listeners once
//! ```
//!
//! Position fixes, route events and user actions arrive on caller threads
//! between ticks and are applied immediately. Listeners are never called
//! while a store or registry lock is held.

mod listeners;
mod status;

pub use listeners::{Listener, ListenerId, ListenerRegistry};
pub use status::{LinkHealth, LinkStatus};

use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::config::{MsiSettings, SharedSettings};
use crate::geo;
use crate::routes::{RouteEvent, RouteSource};
use crate::shore::{PollError, ShoreClient};
use crate::store::MessageStore;
use crate::types::{MessageId, MessageView, Position};
use status::LinkTracker;

/// Own-ship fixes: the latest one, and the one the last recompute used.
///
/// The lock is held while the store is updated, so `last_recompute` always
/// names the fix the store's position flags were computed from.
#[derive(Debug, Default)]
struct PositionTracker {
    latest: Option<Position>,
    last_recompute: Option<Position>,
}

impl PositionTracker {
    /// Latest fix if it moved more than `threshold_nm` from the last recompute.
    fn pending(&self, threshold_nm: f64) -> Option<Position> {
        let latest = self.latest?;
        match self.last_recompute {
            Some(prev) if geo::distance_nm(&prev, &latest) <= threshold_nm => None,
            _ => Some(latest),
        }
    }
}

/// Coordinator for the MSI store
pub struct MsiHandler {
    store: Arc<MessageStore>,
    shore: Arc<dyn ShoreClient>,
    routes: Arc<dyn RouteSource>,
    settings: SharedSettings,
    clock: Arc<dyn Clock>,
    listeners: ListenerRegistry,
    position: Mutex<PositionTracker>,
    link: Mutex<LinkTracker>,
    /// Serializes timer polls with on-demand polls
    poll_lock: tokio::sync::Mutex<()>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MsiHandler {
    pub fn new(
        store: Arc<MessageStore>,
        shore: Arc<dyn ShoreClient>,
        routes: Arc<dyn RouteSource>,
        settings: SharedSettings,
        clock: Arc<dyn Clock>,
    ) -> Self {
        info!(
            shore = shore.name(),
            messages = store.len(),
            last_sequence = store.last_sequence(),
            "Initializing MSI handler"
        );
        Self {
            store,
            shore,
            routes,
            settings,
            clock,
            listeners: ListenerRegistry::default(),
            position: Mutex::new(PositionTracker::default()),
            link: Mutex::new(LinkTracker::default()),
            poll_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn store(&self) -> &Arc<MessageStore> {
        &self.store
    }

    pub fn settings(&self) -> Arc<MsiSettings> {
        self.settings.load_full()
    }

    // ========================================================================
    // Listeners
    // ========================================================================

    pub fn add_listener<F>(&self, callback: F) -> ListenerId
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.listeners.add(callback)
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.listeners.remove(id)
    }

    // ========================================================================
    // Timer loop
    // ========================================================================

    /// Spawn the timer loop on the current tokio runtime.
    pub fn spawn(self: &Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        let handler = Arc::clone(self);
        tokio::spawn(async move { handler.run(cancel).await })
    }

    /// Run ticks until `cancel` fires. The first tick runs immediately; the
    /// tick period is re-read every cycle so a settings reload applies.
    pub async fn run(&self, cancel: CancellationToken) {
        info!(
            tick_secs = self.settings.load().polling.tick_secs,
            poll_interval_secs = self.settings.load().polling.interval_secs,
            "MSI handler loop started"
        );

        loop {
            self.tick().await;

            let period = self.settings.load().polling.tick();
            tokio::select! {
                () = cancel.cancelled() => break,
                () = tokio::time::sleep(period) => {}
            }
        }

        info!("MSI handler loop stopped");
    }

    /// One poll → expire → recompute cycle. Returns whether anything changed.
    pub async fn tick(&self) -> bool {
        let polled = self.poll_phase(false).await;
        let expired = self.store.cleanup_expired();
        let recomputed = self.recompute_phase();

        // Merge already persisted its own changes
        if expired || recomputed {
            self.store.persist_logged();
        }

        let changed = polled || expired || recomputed;
        if changed {
            debug!(polled, expired, recomputed, "MSI tick changed state");
            self.listeners.notify();
        }
        changed
    }

    /// Poll the shore now regardless of the interval ("update now").
    pub async fn poll_now(&self) -> bool {
        let changed = self.poll_phase(true).await;
        if changed {
            self.listeners.notify();
        }
        changed
    }

    async fn poll_phase(&self, force: bool) -> bool {
        let _polling = self.poll_lock.lock().await;
        let settings = self.settings.load_full();

        let now = self.clock.now();
        if !force && !self.poll_due(now, &settings) {
            return false;
        }

        let last_sequence = self.store.last_sequence();
        let timeout = settings.polling.timeout();
        let outcome = match tokio::time::timeout(timeout, self.shore.poll(last_sequence)).await {
            Ok(result) => result,
            Err(_) => Err(PollError::Timeout(timeout)),
        };

        match outcome {
            Ok(result) => {
                lock(&self.link).record_success(self.clock.now());
                let received = result.messages.len();
                let routes = self.routes.routes();

                let changed = {
                    let mut tracker = lock(&self.position);
                    let position = tracker.latest;
                    let changed = self.store.merge(result.messages, position, Some(&routes));
                    if position.is_some() {
                        tracker.last_recompute = position;
                    }
                    changed
                };

                info!(
                    shore = self.shore.name(),
                    last_sequence,
                    received,
                    changed,
                    "MSI poll complete"
                );
                changed
            }
            Err(e) => {
                let failures = {
                    let mut link = lock(&self.link);
                    link.record_failure(self.clock.now(), e.to_string());
                    link.status(settings.polling.unhealthy_after_failures).consecutive_failures
                };
                warn!(
                    shore = self.shore.name(),
                    error = %e,
                    consecutive_failures = failures,
                    "MSI poll failed — keeping current messages, retrying next tick"
                );
                false
            }
        }
    }

    fn poll_due(&self, now: DateTime<Utc>, settings: &MsiSettings) -> bool {
        let Some(last) = lock(&self.link).last_success() else {
            return true;
        };
        // An interval past the representable range means "not yet"
        i64::try_from(settings.polling.interval_secs)
            .ok()
            .and_then(chrono::Duration::try_seconds)
            .and_then(|interval| last.checked_add_signed(interval))
            .is_some_and(|due| now >= due)
    }

    fn recompute_phase(&self) -> bool {
        let threshold = self.settings.load().relevance.position_update_distance_nm;

        let mut changed = false;
        {
            let mut tracker = lock(&self.position);
            if let Some(pos) = tracker.pending(threshold) {
                changed |= self.store.set_visibility_by_position(pos);
                tracker.last_recompute = Some(pos);
            }
        }
        changed |= self.store.set_visibility_by_routes(&self.routes.routes());
        changed
    }

    // ========================================================================
    // Event inputs
    // ========================================================================

    /// Own-ship fix. Recomputes position relevance only when the ship moved
    /// beyond the configured distance since the last recompute. Returns
    /// whether listeners were notified.
    pub fn on_position(&self, position: Position) -> bool {
        let threshold = self.settings.load().relevance.position_update_distance_nm;
        let changed = {
            let mut tracker = lock(&self.position);
            tracker.latest = Some(position);
            let Some(pos) = tracker.pending(threshold) else {
                return false;
            };
            debug!(position = %pos, "Own ship moved — recomputing MSI position relevance");
            tracker.last_recompute = Some(pos);
            self.store.set_visibility_by_position(pos)
        };
        self.publish(changed)
    }

    /// Route manager change. Applied immediately rather than on the next tick.
    pub fn on_route_event(&self, event: RouteEvent) -> bool {
        debug!(%event, "Route event");
        let changed = match event {
            RouteEvent::Added(_) | RouteEvent::Removed(_) | RouteEvent::VisibilityChanged(_) => {
                let mut changed = self.store.set_visibility_by_routes(&self.routes.routes());
                changed |= self.refresh_active_route();
                changed
            }
            RouteEvent::Activated(_) => self.refresh_active_route(),
            RouteEvent::Deactivated => self.store.clear_active_route_relevance(),
        };
        self.publish(changed)
    }

    fn refresh_active_route(&self) -> bool {
        match self.routes.active_route() {
            Some(route) => self.store.set_relevance_to_active_route(&route),
            None => self.store.clear_active_route_relevance(),
        }
    }

    /// Replace the active settings (config reload). Position relevance is
    /// recomputed at once so a new radius applies without waiting for movement.
    pub fn update_settings(&self, settings: MsiSettings) -> bool {
        info!(
            radius_nm = settings.relevance.radius_nm,
            poll_interval_secs = settings.polling.interval_secs,
            "MSI settings updated"
        );
        self.settings.store(Arc::new(settings));

        let changed = {
            let mut tracker = lock(&self.position);
            let latest = tracker.latest;
            latest.is_some_and(|pos| {
                tracker.last_recompute = Some(pos);
                self.store.set_visibility_by_position(pos)
            })
        };
        self.publish(changed)
    }

    // ========================================================================
    // User actions and queries
    // ========================================================================

    pub fn acknowledge(&self, id: MessageId) -> bool {
        let changed = self.store.acknowledge(id);
        if changed {
            info!(id, "MSI acknowledged");
        }
        self.publish(changed)
    }

    pub fn delete(&self, id: MessageId) -> bool {
        let changed = self.store.delete(id);
        if changed {
            info!(id, "MSI deleted by user");
        }
        self.publish(changed)
    }

    pub fn snapshot(&self) -> Vec<MessageView> {
        self.store.snapshot()
    }

    pub fn visible_snapshot(&self) -> Vec<MessageView> {
        self.store.visible_snapshot()
    }

    pub fn has_unacknowledged_relevant(&self) -> bool {
        self.store.has_unacknowledged_relevant()
    }

    pub fn unacknowledged_count(&self) -> usize {
        self.store.unacknowledged_count()
    }

    pub fn link_status(&self) -> LinkStatus {
        let threshold = self.settings.load().polling.unhealthy_after_failures;
        lock(&self.link).status(threshold)
    }

    /// Time of the last successful poll.
    pub fn last_update(&self) -> Option<DateTime<Utc>> {
        lock(&self.link).last_success()
    }

    /// Persist and notify when `changed`. Returns `changed`.
    fn publish(&self, changed: bool) -> bool {
        if changed {
            self.store.persist_logged();
            self.listeners.notify();
        }
        changed
    }
}
