//! End-to-end session lifecycle against a real snapshot file.

use std::sync::Arc;
use std::time::Duration;

use fs_err as fs;
use playtime_core::{
    ActivityTracker, Clock, DisplayBoard, DisplayPreferences, ManualClock, PartitionId,
    PlaytimeEngine, PresenceCoordinator, RuntimeConfig, SessionObserver, SessionStore,
    StorageConfig, SubjectId,
};
use serde_json::Value;

const NEVER: Duration = Duration::from_secs(3600);
const GRACE: Duration = Duration::from_secs(2);

struct Harness {
    clock: Arc<ManualClock>,
    store: Arc<SessionStore>,
    coordinator: PresenceCoordinator,
    storage: StorageConfig,
    _temp: tempfile::TempDir,
}

fn harness() -> Harness {
    let temp = tempfile::tempdir().expect("temp dir");
    let storage = StorageConfig::with_root(temp.path().to_path_buf());
    let clock = Arc::new(ManualClock::new(0));
    let board = Arc::new(DisplayBoard::new());
    let store = Arc::new(SessionStore::open(
        storage.playtime_file(),
        Arc::clone(&clock) as Arc<dyn Clock>,
        Some(Arc::clone(&board) as Arc<dyn SessionObserver>),
    ));
    let tracker = Arc::new(ActivityTracker::start(Arc::clone(&store), NEVER, GRACE));
    let preferences = Arc::new(DisplayPreferences::open(storage.preferences_file()));
    let coordinator = PresenceCoordinator::start(
        tracker,
        Arc::clone(&store),
        board,
        preferences,
        NEVER,
        GRACE,
    );

    Harness {
        clock,
        store,
        coordinator,
        storage,
        _temp: temp,
    }
}

fn persisted_ms(storage: &StorageConfig, subject: SubjectId, partition: PartitionId) -> Option<u64> {
    let content = fs::read_to_string(storage.playtime_file()).ok()?;
    let document: Value = serde_json::from_str(&content).expect("snapshot is JSON");
    document
        .get(subject.to_string())?
        .get(partition.to_string())?
        .as_u64()
}

#[test]
fn test_transition_then_disconnect() {
    let h = harness();
    let subject = SubjectId::new_random();
    let world_a = PartitionId::new_random();
    let world_b = PartitionId::new_random();

    // t=0: ready in A. Nothing closed yet, nothing written.
    h.coordinator.register_player(subject, world_a);
    assert_eq!(h.store.save_count(), 0);
    assert_eq!(persisted_ms(&h.storage, subject, world_a), None);

    // t=5000: moves to B. A is credited and persisted immediately.
    h.clock.set_ms(5_000);
    h.coordinator.register_player(subject, world_b);
    assert_eq!(h.store.save_count(), 1);
    assert_eq!(persisted_ms(&h.storage, subject, world_a), Some(5_000));
    assert_eq!(persisted_ms(&h.storage, subject, world_b), None);

    // t=8000: disconnect. B is credited and persisted.
    h.clock.set_ms(8_000);
    h.coordinator.on_disconnect(subject);
    assert_eq!(h.store.save_count(), 2);
    assert_eq!(persisted_ms(&h.storage, subject, world_a), Some(5_000));
    assert_eq!(persisted_ms(&h.storage, subject, world_b), Some(3_000));

    let totals = h.store.totals(subject);
    assert_eq!(totals.get(&world_a), Some(&5_000));
    assert_eq!(totals.get(&world_b), Some(&3_000));
    assert!(!h.store.has_open_session(subject, world_a));
    assert!(!h.store.has_open_session(subject, world_b));
}

#[test]
fn test_many_subjects_in_parallel() {
    let h = harness();
    let worlds: Vec<PartitionId> = (0..3).map(|_| PartitionId::new_random()).collect();
    let subjects: Vec<SubjectId> = (0..16).map(|_| SubjectId::new_random()).collect();

    std::thread::scope(|scope| {
        for (index, subject) in subjects.iter().copied().enumerate() {
            let (h, worlds) = (&h, &worlds);
            scope.spawn(move || {
                for step in 0..30 {
                    let world = worlds[(index + step) % worlds.len()];
                    h.coordinator.register_player(subject, world);
                }
            });
        }
    });

    h.clock.advance_ms(1_000);
    for subject in &subjects {
        h.coordinator.on_disconnect(*subject);
    }

    for subject in &subjects {
        // Only the final assignment was open when the clock moved.
        assert_eq!(h.store.total_playtime(*subject), 1_000);
        for world in &worlds {
            assert!(!h.store.has_open_session(*subject, *world));
        }
    }
}

#[test]
fn test_engine_restart_keeps_closed_time_only() {
    let temp = tempfile::tempdir().expect("temp dir");
    let storage = StorageConfig::with_root(temp.path().to_path_buf());
    let config = RuntimeConfig::default();
    let clock = Arc::new(ManualClock::new(0));
    let subject = SubjectId::new_random();
    let world = PartitionId::new_random();

    let engine = PlaytimeEngine::start(storage.clone(), &config, Arc::clone(&clock) as Arc<dyn Clock>);
    engine.presence().register_player(subject, world);
    clock.advance_ms(4_000);
    engine.presence().on_disconnect(subject);
    engine.presence().register_player(subject, world);
    clock.advance_ms(2_000);
    // Simulated crash: the open session is never closed or saved.
    drop(engine);

    let restarted = PlaytimeEngine::start(storage, &config, Arc::clone(&clock) as Arc<dyn Clock>);
    assert_eq!(restarted.store().total_playtime(subject), 4_000);
    assert!(!restarted.store().has_open_session(subject, world));
    restarted.shutdown();
}
