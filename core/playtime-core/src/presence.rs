//! Lifecycle signals in, live displays out.
//!
//! [`PresenceCoordinator`] is the entry point for everything that happens to a
//! subject from the outside: it becomes ready, it issues a command, it
//! disconnects, it toggles its display. Activity is forwarded to the
//! [`ActivityTracker`]; display opt-in is persisted in [`DisplayPreferences`].
//!
//! [`DisplayBoard`] holds the live display handles. It is the session store's
//! observer, so a subject's display refreshes as soon as a session ends, and a
//! refresh timer re-renders every live display to show the growing open
//! session. Text is pushed only when it changed since the last push.
//!
//! Display operations for one subject (enable, disable, toggle, restore,
//! disconnect) run under that subject's display lock, so the live handle and
//! the persisted opt-in always agree once they return.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use dashmap::DashMap;
use tracing::{debug, info};

use crate::format::display_text;
use crate::ids::{PartitionId, SubjectId};
use crate::periodic::PeriodicTask;
use crate::preferences::DisplayPreferences;
use crate::store::{PartitionReport, SessionObserver, SessionStore};
use crate::sync::lock;
use crate::tracker::ActivityTracker;

/// Somewhere to show a subject's playtime.
///
/// Implementations must not call back into the coordinator.
pub trait DisplayHandle: Send + Sync {
    fn push_text(&self, text: &str);
    /// Replaces whatever is shown with nothing.
    fn clear(&self);
}

struct LiveDisplay {
    handle: Arc<dyn DisplayHandle>,
    last_text: Mutex<Option<String>>,
}

impl LiveDisplay {
    fn render(&self, total_ms: u64) -> bool {
        let text = display_text(total_ms);
        let mut last = lock(&self.last_text);
        if last.as_deref() == Some(text.as_str()) {
            return false;
        }
        self.handle.push_text(&text);
        *last = Some(text);
        true
    }
}

/// Live display handles, keyed by subject.
#[derive(Default)]
pub struct DisplayBoard {
    live: DashMap<SubjectId, Arc<LiveDisplay>>,
}

impl DisplayBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs `handle` for `subject`, replacing any previous one.
    pub fn attach(&self, subject: SubjectId, handle: Arc<dyn DisplayHandle>) {
        let display = Arc::new(LiveDisplay {
            handle,
            last_text: Mutex::new(None),
        });
        self.live.insert(subject, display);
    }

    /// Removes and returns the subject's handle.
    pub fn detach(&self, subject: SubjectId) -> Option<Arc<dyn DisplayHandle>> {
        self.live
            .remove(&subject)
            .map(|(_, display)| Arc::clone(&display.handle))
    }

    pub fn is_attached(&self, subject: SubjectId) -> bool {
        self.live.contains_key(&subject)
    }

    pub fn subjects(&self) -> Vec<SubjectId> {
        self.live.iter().map(|entry| *entry.key()).collect()
    }

    /// Renders `total_ms` on the subject's display. Returns `true` if text was
    /// pushed, `false` if there is no display or the text is unchanged.
    pub fn refresh(&self, subject: SubjectId, total_ms: u64) -> bool {
        let Some(display) = self
            .live
            .get(&subject)
            .map(|entry| Arc::clone(entry.value()))
        else {
            return false;
        };
        display.render(total_ms)
    }

    /// Detaches and clears every handle.
    pub fn clear_all(&self) -> usize {
        let mut cleared = 0;
        for subject in self.subjects() {
            if let Some(handle) = self.detach(subject) {
                handle.clear();
                cleared += 1;
            }
        }
        cleared
    }
}

impl SessionObserver for DisplayBoard {
    fn session_ended(&self, subject: SubjectId, live_total_ms: u64) {
        self.refresh(subject, live_total_ms);
    }
}

fn refresh_all(store: &SessionStore, board: &DisplayBoard) -> usize {
    board
        .subjects()
        .into_iter()
        .filter(|subject| board.refresh(*subject, store.live_total(*subject)))
        .count()
}

pub struct PresenceCoordinator {
    tracker: Arc<ActivityTracker>,
    store: Arc<SessionStore>,
    board: Arc<DisplayBoard>,
    preferences: Arc<DisplayPreferences>,
    display_locks: DashMap<SubjectId, Arc<Mutex<()>>>,
    refresh: PeriodicTask,
    shutdown_grace: Duration,
    shut_down: AtomicBool,
}

impl PresenceCoordinator {
    /// Wires the coordinator and starts the display refresh timer.
    ///
    /// `board` should be the same board the store notifies.
    pub fn start(
        tracker: Arc<ActivityTracker>,
        store: Arc<SessionStore>,
        board: Arc<DisplayBoard>,
        preferences: Arc<DisplayPreferences>,
        refresh_interval: Duration,
        shutdown_grace: Duration,
    ) -> Self {
        let refresh = {
            let store = Arc::clone(&store);
            let board = Arc::clone(&board);
            PeriodicTask::spawn("display-refresh", refresh_interval, move || {
                refresh_all(&store, &board);
            })
        };

        Self {
            tracker,
            store,
            board,
            preferences,
            display_locks: DashMap::new(),
            refresh,
            shutdown_grace,
            shut_down: AtomicBool::new(false),
        }
    }

    fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }

    fn display_lock(&self, subject: SubjectId) -> Arc<Mutex<()>> {
        Arc::clone(self.display_locks.entry(subject).or_default().value())
    }

    // ─────────────────────────────────────────────────────────────────────
    // Activity
    // ─────────────────────────────────────────────────────────────────────

    /// Reports that `subject` is active in `partition`.
    pub fn register_player(&self, subject: SubjectId, partition: PartitionId) {
        if self.is_shut_down() {
            return;
        }
        self.tracker.register_player(subject, partition);
    }

    pub fn unregister_player(&self, subject: SubjectId) {
        self.tracker.unregister_player(subject);
    }

    /// The subject connected and is ready: start tracking it and bring back
    /// its display if it opted in earlier.
    pub fn on_ready(&self, subject: SubjectId, partition: PartitionId, handle: Arc<dyn DisplayHandle>) {
        self.register_player(subject, partition);
        self.restore_if_preferred(subject, handle);
    }

    /// The subject asked for its playtime. Counts as activity.
    pub fn on_command(&self, subject: SubjectId, partition: PartitionId) -> PartitionReport {
        self.register_player(subject, partition);
        self.store.partition_report(subject, partition)
    }

    /// The subject left. Its session is credited and its live display dropped;
    /// the opt-in preference is kept for the next connect.
    pub fn on_disconnect(&self, subject: SubjectId) {
        self.unregister_player(subject);
        let slot = self.display_lock(subject);
        let _display = lock(&slot);
        if let Some(handle) = self.board.detach(subject) {
            handle.clear();
        }
        debug!(subject = %subject, "Subject disconnected");
    }

    /// Subjects currently assigned to a partition.
    pub fn tracked_subjects(&self) -> Vec<SubjectId> {
        self.tracker.active_players().into_keys().collect()
    }

    // ─────────────────────────────────────────────────────────────────────
    // Live display
    // ─────────────────────────────────────────────────────────────────────

    /// Attaches `handle`, shows the current total, and persists the opt-in.
    pub fn enable_display(&self, subject: SubjectId, handle: Arc<dyn DisplayHandle>) {
        let slot = self.display_lock(subject);
        let _display = lock(&slot);
        self.enable_locked(subject, handle);
    }

    /// Detaches and clears the live display and persists the opt-out.
    pub fn disable_display(&self, subject: SubjectId) {
        let slot = self.display_lock(subject);
        let _display = lock(&slot);
        self.disable_locked(subject);
    }

    fn enable_locked(&self, subject: SubjectId, handle: Arc<dyn DisplayHandle>) {
        if self.is_shut_down() {
            return;
        }
        self.board.attach(subject, handle);
        self.preferences.set_enabled(subject, true);
        self.board.refresh(subject, self.store.live_total(subject));
        debug!(subject = %subject, "Display enabled");
    }

    fn disable_locked(&self, subject: SubjectId) {
        if let Some(handle) = self.board.detach(subject) {
            handle.clear();
        }
        self.preferences.set_enabled(subject, false);
        debug!(subject = %subject, "Display disabled");
    }

    /// Whether a live handle is attached right now. This can be `false`
    /// while the persisted preference is `true`, e.g. after a restart.
    pub fn is_display_active(&self, subject: SubjectId) -> bool {
        self.board.is_attached(subject)
    }

    pub fn is_display_preferred(&self, subject: SubjectId) -> bool {
        self.preferences.is_enabled(subject)
    }

    /// Re-enables the display if the subject opted in and none is live.
    /// Returns whether a display was enabled.
    pub fn restore_if_preferred(&self, subject: SubjectId, handle: Arc<dyn DisplayHandle>) -> bool {
        let slot = self.display_lock(subject);
        let _display = lock(&slot);
        if self.board.is_attached(subject) || !self.preferences.is_enabled(subject) {
            return false;
        }
        self.enable_locked(subject, handle);
        self.board.is_attached(subject)
    }

    /// Flips the display and returns the new state.
    pub fn toggle_display(&self, subject: SubjectId, handle: Arc<dyn DisplayHandle>) -> bool {
        let slot = self.display_lock(subject);
        let _display = lock(&slot);
        if self.board.is_attached(subject) {
            self.disable_locked(subject);
        } else {
            self.enable_locked(subject, handle);
        }
        self.board.is_attached(subject)
    }

    /// Re-renders every live display. Returns how many pushed new text.
    pub fn refresh_displays(&self) -> usize {
        refresh_all(&self.store, &self.board)
    }

    /// Unregisters every tracked subject, clears all live displays and stops
    /// the refresh timer. Idempotent; later signals are ignored.
    pub fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }

        let subjects = self.tracked_subjects();
        for subject in &subjects {
            self.unregister_player(*subject);
        }
        let cleared = self.board.clear_all();
        self.refresh.stop(self.shutdown_grace);
        info!(
            subjects = subjects.len(),
            displays = cleared,
            "Presence coordinator shut down"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{Clock, ManualClock};
    use std::sync::atomic::AtomicUsize;
    use std::thread;
    use std::time::Instant;

    const NEVER: Duration = Duration::from_secs(3600);
    const GRACE: Duration = Duration::from_secs(2);

    #[derive(Default)]
    struct RecordingHandle {
        pushes: Mutex<Vec<String>>,
        clears: AtomicUsize,
    }

    impl RecordingHandle {
        fn pushes(&self) -> Vec<String> {
            self.pushes.lock().unwrap().clone()
        }

        fn clears(&self) -> usize {
            self.clears.load(Ordering::SeqCst)
        }
    }

    impl DisplayHandle for RecordingHandle {
        fn push_text(&self, text: &str) {
            self.pushes.lock().unwrap().push(text.to_string());
        }

        fn clear(&self) {
            self.clears.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct Fixture {
        clock: Arc<ManualClock>,
        store: Arc<SessionStore>,
        preferences: Arc<DisplayPreferences>,
        coordinator: PresenceCoordinator,
    }

    fn fixture_with(refresh_interval: Duration, preferences: DisplayPreferences) -> Fixture {
        let clock = Arc::new(ManualClock::new(0));
        let board = Arc::new(DisplayBoard::new());
        let store = Arc::new(SessionStore::new_in_memory(
            Arc::clone(&clock) as Arc<dyn Clock>,
            Some(Arc::clone(&board) as Arc<dyn SessionObserver>),
        ));
        let tracker = Arc::new(ActivityTracker::start(Arc::clone(&store), NEVER, GRACE));
        let preferences = Arc::new(preferences);
        let coordinator = PresenceCoordinator::start(
            tracker,
            Arc::clone(&store),
            board,
            Arc::clone(&preferences),
            refresh_interval,
            GRACE,
        );
        Fixture {
            clock,
            store,
            preferences,
            coordinator,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(NEVER, DisplayPreferences::new_in_memory())
    }

    #[test]
    fn enable_pushes_current_total_and_persists_opt_in() {
        let f = fixture();
        let subject = SubjectId::new_random();
        let handle = Arc::new(RecordingHandle::default());

        f.coordinator.enable_display(subject, handle.clone());

        assert!(f.coordinator.is_display_active(subject));
        assert!(f.preferences.is_enabled(subject));
        assert_eq!(handle.pushes(), vec!["0s".to_string()]);
    }

    #[test]
    fn refresh_pushes_only_changed_text() {
        let f = fixture();
        let subject = SubjectId::new_random();
        let world = PartitionId::new_random();
        let handle = Arc::new(RecordingHandle::default());

        f.coordinator.register_player(subject, world);
        f.coordinator.enable_display(subject, handle.clone());

        f.clock.advance_ms(400);
        assert_eq!(f.coordinator.refresh_displays(), 0);
        f.clock.advance_ms(600);
        assert_eq!(f.coordinator.refresh_displays(), 1);
        assert_eq!(f.coordinator.refresh_displays(), 0);

        assert_eq!(handle.pushes(), vec!["0s".to_string(), "1s".to_string()]);
    }

    #[test]
    fn session_end_refreshes_the_display() {
        let f = fixture();
        let subject = SubjectId::new_random();
        let (a, b) = (PartitionId::new_random(), PartitionId::new_random());
        let handle = Arc::new(RecordingHandle::default());

        f.coordinator.register_player(subject, a);
        f.coordinator.enable_display(subject, handle.clone());
        f.clock.advance_ms(65_000);
        f.coordinator.register_player(subject, b);

        assert_eq!(handle.pushes().last().map(String::as_str), Some("1m 5s"));
    }

    #[test]
    fn disable_clears_handle_and_persists_opt_out() {
        let f = fixture();
        let subject = SubjectId::new_random();
        let handle = Arc::new(RecordingHandle::default());

        f.coordinator.enable_display(subject, handle.clone());
        f.coordinator.disable_display(subject);

        assert!(!f.coordinator.is_display_active(subject));
        assert!(!f.preferences.is_enabled(subject));
        assert_eq!(handle.clears(), 1);
    }

    #[test]
    fn toggle_flips_state() {
        let f = fixture();
        let subject = SubjectId::new_random();
        let handle: Arc<dyn DisplayHandle> = Arc::new(RecordingHandle::default());

        assert!(f.coordinator.toggle_display(subject, Arc::clone(&handle)));
        assert!(!f.coordinator.toggle_display(subject, Arc::clone(&handle)));
        assert!(f.coordinator.toggle_display(subject, handle));
    }

    #[test]
    fn restore_only_when_preferred_and_inactive() {
        let f = fixture();
        let opted_in = SubjectId::new_random();
        let opted_out = SubjectId::new_random();
        f.preferences.set_enabled(opted_in, true);

        let first = Arc::new(RecordingHandle::default());
        assert!(f.coordinator.restore_if_preferred(opted_in, first.clone()));
        assert_eq!(first.pushes().len(), 1);

        let second = Arc::new(RecordingHandle::default());
        assert!(!f.coordinator.restore_if_preferred(opted_in, second.clone()));
        assert!(second.pushes().is_empty());

        assert!(!f
            .coordinator
            .restore_if_preferred(opted_out, Arc::new(RecordingHandle::default())));
        assert!(!f.coordinator.is_display_active(opted_out));
    }

    #[test]
    fn opt_in_survives_restart_but_live_handle_does_not() {
        let temp = tempfile::tempdir().expect("temp dir");
        let path = temp.path().join("display-preferences.json");
        let subject = SubjectId::new_random();
        let world = PartitionId::new_random();

        let before = fixture_with(NEVER, DisplayPreferences::open(path.clone()));
        before
            .coordinator
            .enable_display(subject, Arc::new(RecordingHandle::default()));
        before.coordinator.shutdown();

        let after = fixture_with(NEVER, DisplayPreferences::open(path));
        assert!(!after.coordinator.is_display_active(subject));
        assert!(after.coordinator.is_display_preferred(subject));

        let handle = Arc::new(RecordingHandle::default());
        after.coordinator.on_ready(subject, world, handle.clone());
        assert!(after.coordinator.is_display_active(subject));
        assert_eq!(handle.pushes(), vec!["0s".to_string()]);
    }

    #[test]
    fn disconnect_credits_time_and_keeps_preference() {
        let f = fixture();
        let subject = SubjectId::new_random();
        let world = PartitionId::new_random();
        let handle = Arc::new(RecordingHandle::default());

        f.coordinator.register_player(subject, world);
        f.coordinator.enable_display(subject, handle.clone());
        f.clock.advance_ms(3_000);
        f.coordinator.on_disconnect(subject);

        assert_eq!(f.store.total_playtime(subject), 3_000);
        assert!(!f.store.has_open_session(subject, world));
        assert!(!f.coordinator.is_display_active(subject));
        assert!(f.preferences.is_enabled(subject));
        assert_eq!(handle.clears(), 1);
        assert!(f.coordinator.tracked_subjects().is_empty());
    }

    #[test]
    fn command_registers_activity_and_reports() {
        let f = fixture();
        let subject = SubjectId::new_random();
        let world = PartitionId::new_random();

        let first = f.coordinator.on_command(subject, world);
        assert_eq!(first.total_ms, 0);
        assert!(f.store.has_open_session(subject, world));

        f.clock.advance_ms(2_500);
        let second = f.coordinator.on_command(subject, world);
        assert_eq!(second.partition, world);
        assert_eq!(second.session_ms, 2_500);
        assert_eq!(second.total_ms, 2_500);
    }

    #[test]
    fn shutdown_ends_sessions_and_clears_displays() {
        let f = fixture();
        let alice = SubjectId::new_random();
        let bob = SubjectId::new_random();
        let world = PartitionId::new_random();
        let handle = Arc::new(RecordingHandle::default());

        f.coordinator.register_player(alice, world);
        f.coordinator.register_player(bob, world);
        f.coordinator.enable_display(alice, handle.clone());
        f.clock.advance_ms(1_000);
        f.coordinator.shutdown();

        assert_eq!(f.store.total_playtime(alice), 1_000);
        assert_eq!(f.store.total_playtime(bob), 1_000);
        assert!(!f.coordinator.is_display_active(alice));
        assert_eq!(handle.clears(), 1);
        // The opt-in is a user choice, not session state.
        assert!(f.preferences.is_enabled(alice));

        f.coordinator.register_player(alice, world);
        assert!(!f.store.has_open_session(alice, world));
    }

    #[test]
    fn racing_enable_and_disable_leave_preference_matching_display() {
        let f = fixture();
        let subjects: Vec<SubjectId> = (0..32).map(|_| SubjectId::new_random()).collect();

        thread::scope(|scope| {
            for subject in subjects.iter().copied() {
                let coordinator = &f.coordinator;
                scope.spawn(move || {
                    for _ in 0..20 {
                        coordinator.enable_display(subject, Arc::new(RecordingHandle::default()));
                    }
                });
                scope.spawn(move || {
                    for _ in 0..20 {
                        coordinator.disable_display(subject);
                    }
                });
                scope.spawn(move || {
                    for _ in 0..20 {
                        coordinator.toggle_display(subject, Arc::new(RecordingHandle::default()));
                    }
                });
            }
        });

        for subject in subjects {
            assert_eq!(
                f.coordinator.is_display_active(subject),
                f.coordinator.is_display_preferred(subject)
            );
        }
    }

    #[test]
    fn tracked_subjects_follow_tracker_assignments() {
        let f = fixture();
        let subjects: Vec<SubjectId> = (0..16).map(|_| SubjectId::new_random()).collect();
        let world = PartitionId::new_random();

        thread::scope(|scope| {
            for subject in subjects.iter().copied() {
                let coordinator = &f.coordinator;
                scope.spawn(move || {
                    for _ in 0..50 {
                        coordinator.register_player(subject, world);
                    }
                });
                scope.spawn(move || {
                    for _ in 0..50 {
                        coordinator.unregister_player(subject);
                    }
                });
            }
        });

        let tracked = f.coordinator.tracked_subjects();
        for subject in &subjects {
            let assigned = f.coordinator.tracker.current_partition(*subject).is_some();
            assert_eq!(tracked.contains(subject), assigned);
            assert_eq!(f.store.has_open_session(*subject, world), assigned);
        }

        f.coordinator.shutdown();
        for subject in &subjects {
            assert!(!f.store.has_open_session(*subject, world));
        }
    }

    #[test]
    fn refresh_timer_updates_live_displays() {
        let f = fixture_with(Duration::from_millis(10), DisplayPreferences::new_in_memory());
        let subject = SubjectId::new_random();
        let world = PartitionId::new_random();
        let handle = Arc::new(RecordingHandle::default());

        f.coordinator.register_player(subject, world);
        f.coordinator.enable_display(subject, handle.clone());
        f.clock.advance_ms(7_000);

        let deadline = Instant::now() + Duration::from_secs(5);
        while handle.pushes().len() < 2 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(handle.pushes().last().map(String::as_str), Some("7s"));
        f.coordinator.shutdown();
    }
}
