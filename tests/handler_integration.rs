//! Handler Integration Tests
//!
//! Drives `MsiHandler` with a scripted shore client and a manual clock:
//! tick phases, poll gating, link failures, event inputs and listener
//! notification.

use async_trait::async_trait;
use chrono::{Duration, TimeZone, Utc};
use msi_handler::config::{self, MsiSettings};
use msi_handler::{
    Clock, FileShoreClient, InMemoryRoutes, LinkHealth, ManualClock, MessageId, MessageStore,
    MsiHandler, PollError, PollResult, Position, Route, SafetyMessage, SequenceNumber,
    ShoreClient,
};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

// ============================================================================
// Fakes
// ============================================================================

/// Shore client answering from a queue; an empty queue answers "nothing new".
#[derive(Default)]
struct ScriptedShore {
    responses: Mutex<VecDeque<Result<Vec<SafetyMessage>, String>>>,
    calls: Mutex<Vec<SequenceNumber>>,
}

impl ScriptedShore {
    fn push_ok(&self, messages: Vec<SafetyMessage>) {
        self.responses.lock().unwrap().push_back(Ok(messages));
    }

    fn push_err(&self, error: &str) {
        self.responses.lock().unwrap().push_back(Err(error.to_string()));
    }

    fn calls(&self) -> Vec<SequenceNumber> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ShoreClient for ScriptedShore {
    async fn poll(&self, last_sequence: SequenceNumber) -> Result<PollResult, PollError> {
        self.calls.lock().unwrap().push(last_sequence);
        match self.responses.lock().unwrap().pop_front() {
            Some(Ok(messages)) => Ok(PollResult { messages }),
            Some(Err(e)) => Err(PollError::Transport(e)),
            None => Ok(PollResult::default()),
        }
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// Shore client that never answers in time.
struct StalledShore;

#[async_trait]
impl ShoreClient for StalledShore {
    async fn poll(&self, _last_sequence: SequenceNumber) -> Result<PollResult, PollError> {
        tokio::time::sleep(std::time::Duration::from_secs(30)).await;
        Ok(PollResult::default())
    }

    fn name(&self) -> &str {
        "stalled"
    }
}

// ============================================================================
// Fixture
// ============================================================================

struct Fixture {
    handler: Arc<MsiHandler>,
    shore: Arc<ScriptedShore>,
    routes: Arc<InMemoryRoutes>,
    clock: Arc<ManualClock>,
    notifications: Arc<AtomicUsize>,
    _dir: TempDir,
}

fn settings_with_radius(radius_nm: f64) -> MsiSettings {
    let mut settings = MsiSettings::default();
    settings.relevance.radius_nm = radius_nm;
    settings.polling.timeout_secs = 1;
    settings
}

fn fixture_with(settings: MsiSettings, routes: Vec<Route>) -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap()));
    let shared = config::shared(settings);
    let store = Arc::new(MessageStore::new(
        dir.path().join("msi.json"),
        shared.clone(),
        clock.clone(),
    ));
    let shore = Arc::new(ScriptedShore::default());
    let routes = Arc::new(InMemoryRoutes::new(routes));
    let handler = Arc::new(MsiHandler::new(
        store,
        shore.clone(),
        routes.clone(),
        shared,
        clock.clone(),
    ));

    let notifications = Arc::new(AtomicUsize::new(0));
    let counter = notifications.clone();
    handler.add_listener(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    Fixture {
        handler,
        shore,
        routes,
        clock,
        notifications,
        _dir: dir,
    }
}

fn fixture(radius_nm: f64) -> Fixture {
    fixture_with(settings_with_radius(radius_nm), Vec::new())
}

impl Fixture {
    fn notified(&self) -> usize {
        self.notifications.load(Ordering::SeqCst)
    }
}

fn located(id: MessageId, lat: f64, lon: f64) -> SafetyMessage {
    SafetyMessage::new(id, format!("Wreck {id}")).with_area(vec![Position::new(lat, lon)])
}

fn channel_route() -> Route {
    Route::new(1, vec![Position::new(54.0, 10.0), Position::new(56.0, 12.0)])
}

// ============================================================================
// Tick and polling
// ============================================================================

#[tokio::test]
async fn first_tick_polls_and_notifies_once() {
    let f = fixture(100.0);
    f.shore.push_ok(vec![
        SafetyMessage::new(1, "Buoy off station"),
        SafetyMessage::new(2, "Gunnery exercise"),
    ]);

    assert!(f.handler.tick().await);
    assert_eq!(f.notified(), 1);
    assert_eq!(f.shore.calls(), vec![0]);
    assert_eq!(f.handler.snapshot().len(), 2);
    assert!(f.handler.store().path().exists());

    // Nothing due, nothing changed
    assert!(!f.handler.tick().await);
    assert_eq!(f.notified(), 1);
    assert_eq!(f.shore.calls().len(), 1);
}

#[tokio::test]
async fn poll_interval_gates_and_forwards_last_sequence() {
    let f = fixture(100.0);
    f.shore.push_ok(vec![SafetyMessage::new(4, "d"), SafetyMessage::new(7, "g")]);

    f.handler.tick().await;
    assert_eq!(f.shore.calls(), vec![0]);

    f.clock.advance(Duration::seconds(599));
    f.handler.tick().await;
    assert_eq!(f.shore.calls().len(), 1);

    f.clock.advance(Duration::seconds(2));
    f.handler.tick().await;
    assert_eq!(f.shore.calls(), vec![0, 7]);
    assert_eq!(f.handler.last_update(), Some(f.clock.now()));
}

#[tokio::test]
async fn poll_now_ignores_interval() {
    let f = fixture(100.0);
    f.handler.tick().await;

    f.shore.push_ok(vec![SafetyMessage::new(3, "urgent")]);
    assert!(f.handler.poll_now().await);
    assert_eq!(f.shore.calls().len(), 2);
    assert_eq!(f.notified(), 1);
    assert_eq!(f.handler.store().last_sequence(), 3);

    // Empty answer: no change, no notification
    assert!(!f.handler.poll_now().await);
    assert_eq!(f.notified(), 1);
}

#[tokio::test]
async fn failed_poll_keeps_messages_and_retries_next_tick() {
    let f = fixture(100.0);
    f.shore.push_ok(vec![SafetyMessage::new(1, "Light unreliable")]);
    f.handler.tick().await;
    let updated_at = f.handler.last_update();
    assert_eq!(f.handler.link_status().health, LinkHealth::Healthy);

    f.shore.push_err("connection refused");
    f.shore.push_err("connection refused");
    f.shore.push_err("connection refused");
    f.clock.advance(Duration::seconds(601));

    assert!(!f.handler.tick().await);
    assert_eq!(f.handler.snapshot().len(), 1);
    assert_eq!(f.handler.last_update(), updated_at);
    let status = f.handler.link_status();
    assert_eq!(status.consecutive_failures, 1);
    assert!(matches!(status.health, LinkHealth::Degraded { .. }));
    assert!(status.last_error.unwrap().contains("connection refused"));

    // Retried on every tick, not after another interval
    f.handler.tick().await;
    f.handler.tick().await;
    assert_eq!(f.shore.calls().len(), 4);
    assert!(matches!(
        f.handler.link_status().health,
        LinkHealth::Unhealthy { .. }
    ));

    // Queue drained: next poll succeeds
    f.handler.tick().await;
    let status = f.handler.link_status();
    assert_eq!(status.health, LinkHealth::Healthy);
    assert_eq!(status.consecutive_failures, 0);
    assert_eq!(status.successful_polls, 2);
    assert_eq!(f.notified(), 1);
}

#[tokio::test]
async fn known_id_is_withdrawn_and_reissued_through_the_feed() {
    let dir = tempfile::tempdir().unwrap();
    let feed = dir.path().join("feed.json");
    let write_feed = |messages: &[SafetyMessage]| {
        std::fs::write(&feed, serde_json::to_vec(messages).unwrap()).unwrap();
    };
    let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap()));
    let shared = config::shared(settings_with_radius(100.0));
    let store = Arc::new(MessageStore::new(dir.path().join("msi.json"), shared.clone(), clock.clone()));
    let handler = MsiHandler::new(
        store,
        Arc::new(FileShoreClient::new(&feed)),
        Arc::new(InMemoryRoutes::default()),
        shared,
        clock,
    );

    let original = SafetyMessage::new(5, "Wreck marked by buoy").with_sequence(1);
    write_feed(&[original.clone()]);
    assert!(handler.poll_now().await);
    assert!(handler.acknowledge(5));
    assert_eq!(handler.store().last_sequence(), 1);

    // Shore withdraws id 5 under a new sequence number
    let withdrawn = SafetyMessage::tombstone(5).with_sequence(2);
    write_feed(&[original.clone(), withdrawn.clone()]);
    assert!(handler.poll_now().await);
    assert!(handler.store().get(5).is_none());
    assert_eq!(handler.store().last_sequence(), 2);

    // ...and re-issues it: it comes back and needs a fresh acknowledgement
    let reissued = SafetyMessage::new(5, "Wreck marked by buoy, position corrected").with_sequence(3);
    write_feed(&[original, withdrawn, reissued]);
    assert!(handler.poll_now().await);
    let view = handler.store().get(5).unwrap();
    assert!(!view.acknowledged);
    assert_eq!(view.message.sequence, 3);
    assert!(handler.has_unacknowledged_relevant());
}

#[tokio::test]
async fn oversized_interval_does_not_stop_the_loop() {
    let mut settings = settings_with_radius(100.0);
    settings.polling.interval_secs = 100_000_000_000_000_000;
    settings.relevance.validity_tolerance_secs = i64::MAX;
    let f = fixture_with(settings, Vec::new());
    f.shore.push_ok(vec![SafetyMessage::new(1, "x")]);

    assert!(f.handler.tick().await);
    f.clock.advance(Duration::days(365));
    assert!(!f.handler.tick().await);
    assert_eq!(f.shore.calls().len(), 1);
    assert_eq!(f.handler.unacknowledged_count(), 1);
}

#[tokio::test]
async fn stalled_poll_times_out_as_failure() {
    let dir = tempfile::tempdir().unwrap();
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let shared = config::shared(settings_with_radius(100.0));
    let store = Arc::new(MessageStore::new(dir.path().join("msi.json"), shared.clone(), clock.clone()));
    let handler = MsiHandler::new(
        store,
        Arc::new(StalledShore),
        Arc::new(InMemoryRoutes::default()),
        shared,
        clock,
    );

    assert!(!handler.poll_now().await);
    let status = handler.link_status();
    assert_eq!(status.consecutive_failures, 1);
    assert!(status.last_error.unwrap().contains("timed out"));
    assert!(handler.last_update().is_none());
}

#[tokio::test]
async fn tick_removes_expired_messages() {
    let f = fixture(100.0);
    let now = f.clock.now();
    f.shore.push_ok(vec![
        SafetyMessage::new(1, "short").with_validity(None, Some(now + Duration::hours(1))),
        SafetyMessage::new(2, "open ended"),
    ]);
    f.handler.tick().await;

    f.clock.advance(Duration::hours(2));
    assert!(f.handler.tick().await);
    let ids: Vec<_> = f.handler.snapshot().iter().map(|v| v.id()).collect();
    assert_eq!(ids, vec![2]);
    assert_eq!(f.notified(), 2);
}

// ============================================================================
// Event inputs
// ============================================================================

#[tokio::test]
async fn position_updates_are_debounced() {
    let f = fixture(100.0);
    f.shore.push_ok(vec![located(1, 55.0, 11.0)]);
    f.handler.tick().await;
    assert!(!f.handler.snapshot()[0].visible_by_position);

    // ~17 nm from the wreck
    assert!(f.handler.on_position(Position::new(55.0, 11.5)));
    assert!(f.handler.snapshot()[0].visible_by_position);
    assert!(f.handler.has_unacknowledged_relevant());

    // Small move: below the update distance
    assert!(!f.handler.on_position(Position::new(55.001, 11.5)));

    // Far away: warning drops out
    assert!(f.handler.on_position(Position::new(58.0, 11.0)));
    assert!(!f.handler.snapshot()[0].visible_by_position);
    assert!(!f.handler.has_unacknowledged_relevant());
    assert_eq!(f.notified(), 3);
}

#[test]
fn concurrent_fixes_leave_store_matching_latest_fix() {
    let f = fixture(100.0);
    f.handler.store().merge(vec![located(1, 55.0, 11.0)], None, None);
    let near = Position::new(55.0, 11.5);
    let far = Position::new(58.0, 11.0);

    for _ in 0..50 {
        let workers: Vec<_> = (0..2)
            .map(|_| {
                let handler = Arc::clone(&f.handler);
                std::thread::spawn(move || {
                    for i in 0..40 {
                        handler.on_position(if i % 2 == 0 { near } else { far });
                    }
                })
            })
            .collect();
        for w in workers {
            w.join().unwrap();
        }

        // Both threads finished on `far`; the warning must be out of range
        assert!(!f.handler.store().get(1).unwrap().visible_by_position);
        f.handler.on_position(far);
        assert!(!f.handler.store().get(1).unwrap().visible_by_position);
    }
}

#[tokio::test]
async fn route_events_update_visibility_and_active_relevance() {
    let f = fixture_with(settings_with_radius(5.0), vec![channel_route()]);
    f.shore.push_ok(vec![
        located(1, 55.0, 11.0),
        located(2, 60.0, 20.0),
        SafetyMessage::new(3, "NAVAREA I general"),
    ]);
    f.handler.tick().await;

    let on_route = f.handler.store().get(1).unwrap();
    assert!(on_route.visible_by_route);
    assert!(!on_route.relevant_to_active_route);
    assert!(!f.handler.store().get(2).unwrap().visible_by_route);

    let event = f.routes.activate(1).unwrap();
    assert!(f.handler.on_route_event(event));
    assert!(f.handler.store().get(1).unwrap().relevant_to_active_route);
    assert!(!f.handler.store().get(2).unwrap().relevant_to_active_route);
    assert!(f.handler.store().get(3).unwrap().relevant_to_active_route);

    assert!(f.handler.on_route_event(f.routes.deactivate()));
    assert!(f.handler.snapshot().iter().all(|v| !v.relevant_to_active_route));

    let event = f.routes.set_visible(1, false).unwrap();
    assert!(f.handler.on_route_event(event));
    assert!(!f.handler.store().get(1).unwrap().visible_by_route);
    assert!(f.handler.store().get(3).unwrap().visible_by_route);
}

#[tokio::test]
async fn removing_active_route_clears_relevance() {
    let f = fixture_with(settings_with_radius(5.0), vec![channel_route()]);
    f.shore.push_ok(vec![located(1, 55.0, 11.0)]);
    f.handler.tick().await;

    let event = f.routes.activate(1).unwrap();
    f.handler.on_route_event(event);
    assert!(f.handler.store().get(1).unwrap().relevant_to_active_route);

    let event = f.routes.remove(1).unwrap();
    assert!(f.handler.on_route_event(event));
    let view = f.handler.store().get(1).unwrap();
    assert!(!view.relevant_to_active_route);
    assert!(!view.visible_by_route);
}

#[tokio::test]
async fn update_settings_applies_new_radius_immediately() {
    let f = fixture(100.0);
    f.shore.push_ok(vec![located(1, 55.0, 11.0)]);
    f.handler.tick().await;
    f.handler.on_position(Position::new(55.0, 11.5));
    assert!(f.handler.snapshot()[0].visible_by_position);

    assert!(f.handler.update_settings(settings_with_radius(5.0)));
    assert!(!f.handler.snapshot()[0].visible_by_position);
    assert!((f.handler.settings().relevance.radius_nm - 5.0).abs() < f64::EPSILON);
}

// ============================================================================
// User actions and listeners
// ============================================================================

#[tokio::test]
async fn acknowledge_and_delete_notify_only_on_change() {
    let f = fixture(100.0);
    f.shore.push_ok(vec![SafetyMessage::new(1, "a"), SafetyMessage::new(2, "b")]);
    f.handler.tick().await;
    assert_eq!(f.handler.unacknowledged_count(), 2);

    assert!(f.handler.acknowledge(1));
    assert!(!f.handler.acknowledge(1));
    assert!(!f.handler.acknowledge(99));
    assert_eq!(f.handler.unacknowledged_count(), 1);

    assert!(f.handler.delete(2));
    assert!(!f.handler.delete(2));
    assert!(!f.handler.has_unacknowledged_relevant());
    assert_eq!(f.notified(), 3);

    // Persisted by the actions themselves
    let restored = MessageStore::load(
        f.handler.store().path(),
        config::shared(settings_with_radius(100.0)),
        f.clock.clone(),
    );
    assert_eq!(restored.len(), 1);
    assert!(restored.get(1).unwrap().acknowledged);
}

#[tokio::test]
async fn listener_can_call_back_into_handler() {
    let f = fixture(100.0);
    let weak = Arc::downgrade(&f.handler);
    f.handler.add_listener(move || {
        if let Some(handler) = weak.upgrade() {
            handler.acknowledge(1);
            let _ = handler.visible_snapshot();
        }
    });
    f.shore.push_ok(vec![SafetyMessage::new(1, "Drifting container")]);

    let done = tokio::time::timeout(std::time::Duration::from_secs(5), f.handler.tick()).await;
    assert_eq!(done, Ok(true));
    assert!(f.handler.store().get(1).unwrap().acknowledged);
}

#[tokio::test]
async fn removed_listener_is_not_called() {
    let f = fixture(100.0);
    let extra = Arc::new(AtomicUsize::new(0));
    let counter = extra.clone();
    let id = f.handler.add_listener(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    assert!(f.handler.remove_listener(id));
    assert!(!f.handler.remove_listener(id));

    f.shore.push_ok(vec![SafetyMessage::new(1, "x")]);
    f.handler.tick().await;
    assert_eq!(extra.load(Ordering::SeqCst), 0);
    assert_eq!(f.notified(), 1);
}

// ============================================================================
// Timer loop
// ============================================================================

#[tokio::test]
async fn spawned_loop_ticks_and_stops_on_cancel() {
    let f = fixture(100.0);
    f.shore.push_ok(vec![SafetyMessage::new(1, "first")]);

    let cancel = CancellationToken::new();
    let worker = f.handler.spawn(cancel.clone());

    let deadline = tokio::time::Instant::now() + std::time::Duration::from_secs(5);
    while f.notified() == 0 && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    assert_eq!(f.notified(), 1);

    cancel.cancel();
    let stopped = tokio::time::timeout(std::time::Duration::from_secs(5), worker).await;
    assert!(matches!(stopped, Ok(Ok(()))));
}
