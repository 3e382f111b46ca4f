use guardian::core::config::{GuardianConfig, load_config};
use guardian::core::keys;
use guardian::core::mission::{
    Completion, Counters, MissionKind, MissionRecord, MissionSnapshot,
};
use guardian::core::store::{KvStore, MemoryKvStore, SqliteKvStore};
use guardian::plugins::coordinator::{ConsistencyCoordinator, load_snapshot};
use guardian::plugins::events::GuardianEvents;
use std::fs;
use std::sync::Arc;
use tempfile::tempdir;

fn record(id: &str, notification_id: i32, completed: bool) -> MissionRecord {
    MissionRecord {
        id: id.to_string(),
        notification_id,
        title: format!("Mission {}", id),
        kind: MissionKind::Daily,
        is_counter_based: false,
        counters: Counters::default(),
        subtasks: Vec::new(),
        completion: Completion {
            is_completed: completed,
            has_failed: false,
            last_completed: None,
        },
        mastery: None,
        created_at: Some(0),
    }
}

#[test]
fn sqlite_store_round_trips_strings_and_lists() {
    let tmp = tempdir().expect("tempdir");
    let store = SqliteKvStore::open(tmp.path()).expect("open store");

    assert!(store.get_string(keys::MISSIONS).unwrap().is_none());
    store.set_string(keys::MISSIONS, "[]").unwrap();
    assert_eq!(store.get_string(keys::MISSIONS).unwrap().as_deref(), Some("[]"));

    // Overwrite wins.
    store.set_string(keys::MISSIONS, "[1]").unwrap();
    assert_eq!(store.get_string(keys::MISSIONS).unwrap().as_deref(), Some("[1]"));

    let lines = vec!["a".to_string(), "b".to_string()];
    store.set_string_list(keys::REPAIR_LOG, &lines).unwrap();
    assert_eq!(store.get_string_list(keys::REPAIR_LOG).unwrap().unwrap(), lines);

    store.remove(keys::MISSIONS).unwrap();
    assert!(store.get_string(keys::MISSIONS).unwrap().is_none());
}

#[test]
fn sqlite_store_appends_audit_events() {
    let tmp = tempdir().expect("tempdir");
    let store = SqliteKvStore::open(tmp.path()).expect("open store");
    store.set_string("missions", "[]").unwrap();
    store.get_string("missions").unwrap();

    let log =
        fs::read_to_string(tmp.path().join(keys::STORE_EVENTS_LOG)).expect("audit log exists");
    let ops: Vec<String> = log
        .lines()
        .map(|l| {
            let v: serde_json::Value = serde_json::from_str(l).expect("valid jsonl");
            v["op"].as_str().unwrap().to_string()
        })
        .collect();
    assert!(ops.contains(&"store.init".to_string()));
    assert!(ops.contains(&"kv.set".to_string()));
    assert!(ops.contains(&"kv.get".to_string()));
}

#[test]
fn sqlite_store_persists_across_reopen() {
    let tmp = tempdir().expect("tempdir");
    {
        let store = SqliteKvStore::open(tmp.path()).unwrap();
        store.set_string("missions", "[{\"x\":1}]").unwrap();
    }
    let store = SqliteKvStore::open(tmp.path()).unwrap();
    assert_eq!(
        store.get_string("missions").unwrap().as_deref(),
        Some("[{\"x\":1}]")
    );
}

#[test]
fn snapshot_partitions_missions_by_completion_flag() {
    let store = MemoryKvStore::new();
    let merged = serde_json::to_string(&vec![record("a", 1, false), record("b", 2, true)]).unwrap();
    store.set_string(keys::MISSIONS, &merged).unwrap();
    let deleted = serde_json::to_string(&vec![record("c", 3, false)]).unwrap();
    store.set_string(keys::DELETED_MISSIONS, &deleted).unwrap();

    let snapshot = load_snapshot(&store).unwrap();
    assert_eq!(snapshot.active.len(), 1);
    assert_eq!(snapshot.completed.len(), 1);
    assert_eq!(snapshot.deleted.len(), 1);
    assert_eq!(snapshot.active[0].id, "a");
    assert_eq!(snapshot.completed[0].id, "b");
}

#[test]
fn coordinator_save_merges_active_and_completed() {
    let store = Arc::new(MemoryKvStore::new());
    let events = Arc::new(GuardianEvents::new(None));
    let mut coordinator =
        ConsistencyCoordinator::new(Arc::clone(&store) as Arc<dyn KvStore>, GuardianConfig::default(), events)
            .unwrap();
    coordinator
        .replace_records(MissionSnapshot {
            active: vec![record("a", 1, false)],
            completed: vec![record("b", 2, true)],
            deleted: vec![record("c", 3, false)],
        })
        .unwrap();

    let merged: Vec<MissionRecord> =
        serde_json::from_str(&store.get_string(keys::MISSIONS).unwrap().unwrap()).unwrap();
    assert_eq!(merged.len(), 2);
    let reloaded = load_snapshot(store.as_ref()).unwrap();
    assert_eq!(reloaded.active.len(), 1);
    assert_eq!(reloaded.completed.len(), 1);
    assert_eq!(reloaded.deleted.len(), 1);
}

#[test]
fn config_loads_from_toml_file() {
    let tmp = tempdir().expect("tempdir");
    fs::write(
        tmp.path().join("guardian.toml"),
        "local_interval_secs = 5\nsweep_interval_secs = 10\nalert_cooldown_secs = 60\n",
    )
    .unwrap();
    let config = load_config(tmp.path()).unwrap();
    assert_eq!(config.local_interval_secs, 5);
    assert_eq!(config.sweep_interval_secs, 10);
    assert_eq!(config.alert_cooldown_secs, 60);
    // Unspecified knobs keep their defaults.
    assert_eq!(config.escalation_threshold, 3);
}
