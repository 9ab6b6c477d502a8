//! Integration tests for encounter snapshot storage.
//!
//! Run with: `cargo test -p aidnd-core --test snapshot_store`

use aidnd_core::conditions::ConditionRules;
use aidnd_core::dice::DiceExpression;
use aidnd_core::persist::{
    SessionId, SnapshotStore, StoreError, SNAPSHOT_SCHEMA, SNAPSHOT_VERSION, STALE_TEMP_AGE,
};
use aidnd_core::testing::{sample_encounter, ScriptedDice};
use aidnd_core::{ActiveCondition, AttackOptions, CombatantId, Encounter};
use serde_json::json;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tempfile::TempDir;

fn session(id: &str) -> SessionId {
    SessionId::parse(id).expect("valid session id")
}

/// The sample encounter after one fighter hit and a poisoned goblin.
fn mid_fight() -> Encounter {
    let encounter = sample_encounter();
    let mut dice = ScriptedDice::new([15, 5]);
    let (encounter, outcome) = encounter
        .resolve_attack(
            &CombatantId::from("fighter"),
            &CombatantId::from("goblin-2"),
            &DiceExpression::d20(),
            &"1d8+3".parse().unwrap(),
            &AttackOptions::melee(),
            &ConditionRules::standard(),
            &mut dice,
        )
        .unwrap();
    assert!(outcome.hit);

    let (encounter, _) = encounter
        .add_condition(
            &CombatantId::from("goblin-1"),
            ActiveCondition::new("Poisoned").for_rounds(2),
        )
        .unwrap();
    encounter.next_turn().0
}

fn write_raw(store: &SnapshotStore, id: &str, value: serde_json::Value) {
    std::fs::create_dir_all(store.dir()).unwrap();
    std::fs::write(store.dir().join(format!("{id}.json")), value.to_string()).unwrap();
}

// =============================================================================
// Round trip
// =============================================================================

#[tokio::test]
async fn test_round_trip_preserves_everything() {
    let dir = TempDir::new().expect("Failed to create temp directory");
    let store = SnapshotStore::new(dir.path().join("encounters"));
    let id = session("table-1");
    let encounter = mid_fight();

    store.save(&id, &encounter).await.unwrap();
    let loaded = store.load(&id).await.unwrap();

    assert_eq!(loaded, encounter);
    assert_eq!(loaded.turn_index(), 1);
    let goblin = loaded.combatant(&CombatantId::from("goblin-1")).unwrap();
    assert!(goblin.has_condition("poisoned"));
    let hurt = loaded.combatant(&CombatantId::from("goblin-2")).unwrap();
    assert_eq!(hurt.hit_points.current, 0);

    let saved = store.load_saved(&id).await.unwrap();
    assert_eq!(saved.schema, SNAPSHOT_SCHEMA);
    assert_eq!(saved.version, SNAPSHOT_VERSION);
    assert_eq!(saved.session_id, id);
}

#[tokio::test]
async fn test_save_replaces_whole_snapshot() {
    let dir = TempDir::new().expect("Failed to create temp directory");
    let store = SnapshotStore::new(dir.path());
    let id = session("s1");

    store.save(&id, &sample_encounter()).await.unwrap();
    let later = mid_fight();
    store.save(&id, &later).await.unwrap();

    assert_eq!(store.load(&id).await.unwrap(), later);
    assert_eq!(store.list().await.unwrap(), vec![id]);
}

// =============================================================================
// Crash safety
// =============================================================================

/// Backdate a file's modification time so it looks abandoned.
fn age_file(path: &Path, age: Duration) {
    let file = std::fs::File::options().write(true).open(path).unwrap();
    file.set_modified(SystemTime::now() - age).unwrap();
}

#[tokio::test]
async fn test_orphaned_temp_file_does_not_affect_reads() {
    let dir = TempDir::new().expect("Failed to create temp directory");
    let store = SnapshotStore::new(dir.path());
    let id = session("s1");
    let committed = sample_encounter();
    store.save(&id, &committed).await.unwrap();

    // A writer that died between creating its temp file and the rename.
    let orphan = dir.path().join("s1.json.tmp-0123456789abcdef");
    std::fs::write(&orphan, "{\"schema\": \"aidnd.enc").unwrap();
    age_file(&orphan, STALE_TEMP_AGE * 2);
    // One that may still be mid-write.
    let recent = dir.path().join("s2.json.tmp-fedcba9876543210");
    std::fs::write(&recent, "{").unwrap();

    assert_eq!(store.load(&id).await.unwrap(), committed);
    assert_eq!(store.list().await.unwrap(), vec![id.clone()]);

    assert_eq!(store.sweep_temp_files().await.unwrap(), 1);
    assert!(!orphan.exists());
    assert!(recent.exists());
    assert_eq!(store.sweep_temp_files().await.unwrap(), 0);

    assert_eq!(store.sweep_temp_files_older_than(Duration::ZERO).await.unwrap(), 1);
    assert!(!recent.exists());
    assert_eq!(store.load(&id).await.unwrap(), committed);
}

#[tokio::test]
async fn test_open_sweeps_stale_temp_files() {
    let dir = TempDir::new().expect("Failed to create temp directory");
    let orphan = dir.path().join("s1.json.tmp-0123456789abcdef");
    std::fs::write(&orphan, "{").unwrap();
    age_file(&orphan, Duration::from_secs(3600));

    let store = SnapshotStore::open(dir.path()).await.unwrap();
    assert!(!orphan.exists());
    assert!(store.list().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_sweep_on_missing_dir_is_noop() {
    let dir = TempDir::new().expect("Failed to create temp directory");
    let store = SnapshotStore::new(dir.path().join("never-created"));
    assert_eq!(store.sweep_temp_files().await.unwrap(), 0);
    assert!(store.list().await.unwrap().is_empty());
}

// =============================================================================
// Rejected snapshots
// =============================================================================

#[tokio::test]
async fn test_inconsistent_encounter_is_never_written() {
    let dir = TempDir::new().expect("Failed to create temp directory");
    let store = SnapshotStore::new(dir.path());
    let id = session("s1");

    let mut raw = serde_json::to_value(sample_encounter()).unwrap();
    raw["turn_index"] = json!(7);
    let broken: Encounter = serde_json::from_value(raw).unwrap();

    assert!(matches!(
        store.save(&id, &broken).await,
        Err(StoreError::Inconsistent(_))
    ));
    assert!(matches!(store.load(&id).await, Err(StoreError::NotFound(_))));
}

#[tokio::test]
async fn test_version_mismatch() {
    let dir = TempDir::new().expect("Failed to create temp directory");
    let store = SnapshotStore::new(dir.path());
    write_raw(
        &store,
        "s1",
        json!({
            "schema": SNAPSHOT_SCHEMA,
            "version": 2,
            "session_id": "s1",
            "saved_at": "2026-01-01T00:00:00Z",
            "encounter": serde_json::to_value(sample_encounter()).unwrap()
        }),
    );

    assert!(matches!(
        store.load(&session("s1")).await,
        Err(StoreError::VersionMismatch { expected: 1, found: 2 })
    ));
}

#[tokio::test]
async fn test_corrupt_snapshots() {
    let dir = TempDir::new().expect("Failed to create temp directory");
    let store = SnapshotStore::new(dir.path());

    std::fs::write(dir.path().join("truncated.json"), "{\"schema\": \"aidnd.encounter\", \"vers").unwrap();
    assert!(matches!(
        store.load(&session("truncated")).await,
        Err(StoreError::Corrupt { .. })
    ));

    let mut bad_turn = serde_json::to_value(sample_encounter()).unwrap();
    bad_turn["turn_index"] = json!(3);
    write_raw(
        &store,
        "bad-turn",
        json!({
            "schema": SNAPSHOT_SCHEMA,
            "version": SNAPSHOT_VERSION,
            "session_id": "bad-turn",
            "saved_at": "2026-01-01T00:00:00Z",
            "encounter": bad_turn
        }),
    );
    assert!(matches!(
        store.load(&session("bad-turn")).await,
        Err(StoreError::Corrupt { .. })
    ));

    write_raw(
        &store,
        "renamed",
        json!({
            "schema": SNAPSHOT_SCHEMA,
            "version": SNAPSHOT_VERSION,
            "session_id": "original",
            "saved_at": "2026-01-01T00:00:00Z",
            "encounter": serde_json::to_value(sample_encounter()).unwrap()
        }),
    );
    assert!(matches!(
        store.load(&session("renamed")).await,
        Err(StoreError::Corrupt { .. })
    ));

    write_raw(&store, "foreign", json!({"schema": "something.else", "version": 1}));
    assert!(matches!(
        store.load(&session("foreign")).await,
        Err(StoreError::Corrupt { .. })
    ));
}

#[test]
fn test_session_ids_cannot_escape_the_directory() {
    for bad in ["../escape", "nested/id", "", "with.dot"] {
        assert!(matches!(
            SessionId::parse(bad),
            Err(StoreError::InvalidSessionId(_))
        ));
    }
}

// =============================================================================
// Lifecycle
// =============================================================================

#[tokio::test]
async fn test_archive_and_delete() {
    let dir = TempDir::new().expect("Failed to create temp directory");
    let store = SnapshotStore::new(dir.path());
    let first = session("first");
    let second = session("second");

    store.save(&second, &sample_encounter()).await.unwrap();
    store.save(&first, &sample_encounter()).await.unwrap();
    assert_eq!(store.list().await.unwrap(), vec![first.clone(), second.clone()]);

    let archived = store.archive(&first).await.unwrap();
    assert!(archived.starts_with(dir.path().join("archive")));
    assert!(archived.exists());
    assert!(matches!(store.load(&first).await, Err(StoreError::NotFound(_))));
    assert!(matches!(store.archive(&first).await, Err(StoreError::NotFound(_))));

    store.delete(&second).await.unwrap();
    assert!(matches!(store.delete(&second).await, Err(StoreError::NotFound(_))));
    assert!(store.list().await.unwrap().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_sessions_do_not_interfere() {
    let dir = TempDir::new().expect("Failed to create temp directory");
    let store = SnapshotStore::new(dir.path());

    let tasks: Vec<_> = (0..8)
        .map(|i| {
            let store = store.clone();
            tokio::spawn(async move {
                let id = session(&format!("session-{i}"));
                let (encounter, _) = sample_encounter()
                    .apply_damage(&CombatantId::from("fighter"), i)
                    .unwrap();
                store.save(&id, &encounter).await.unwrap();
                (id, encounter)
            })
        })
        .collect();

    for task in tasks {
        let (id, expected) = task.await.expect("task panicked");
        assert_eq!(store.load(&id).await.unwrap(), expected);
    }
    assert_eq!(store.list().await.unwrap().len(), 8);
    assert_eq!(store.sweep_temp_files().await.unwrap(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_sweep_during_another_sessions_saves() {
    let dir = TempDir::new().expect("Failed to create temp directory");
    let store = SnapshotStore::new(dir.path());
    let done = Arc::new(AtomicBool::new(false));

    let sweeper = {
        let store = store.clone();
        let done = done.clone();
        tokio::spawn(async move {
            let mut sweeps = 0u32;
            loop {
                assert_eq!(store.sweep_temp_files().await.unwrap(), 0);
                sweeps += 1;
                if done.load(Ordering::SeqCst) {
                    return sweeps;
                }
                tokio::task::yield_now().await;
            }
        })
    };

    let id = session("table-a");
    let mut encounter = sample_encounter();
    for _ in 0..200 {
        let (next, _) = encounter.next_turn();
        store.save(&id, &next).await.unwrap();
        encounter = next;
    }
    done.store(true, Ordering::SeqCst);

    assert!(sweeper.await.expect("sweeper panicked") > 0);
    assert_eq!(store.load(&id).await.unwrap(), encounter);
}
