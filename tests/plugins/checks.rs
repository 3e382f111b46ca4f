use guardian::core::mission::{
    Completion, Counters, MasteryLink, MissionKind, MissionRecord, MissionSnapshot, SubtaskRecord,
};
use guardian::core::store::SqliteKvStore;
use guardian::plugins::checks::{HealthCheckRegistry, Priority, load_learning_history};
use guardian::plugins::repairs::RepairRegistry;
use guardian::subsystems;
use tempfile::tempdir;

fn record(id: &str, notification_id: i32) -> MissionRecord {
    MissionRecord {
        id: id.to_string(),
        notification_id,
        title: format!("Mission {}", id),
        kind: MissionKind::Simple,
        is_counter_based: false,
        counters: Counters::default(),
        subtasks: Vec::new(),
        completion: Completion::default(),
        mastery: None,
        created_at: Some(0),
    }
}

fn default_registries() -> (HealthCheckRegistry, RepairRegistry) {
    let mut checks = HealthCheckRegistry::new();
    let mut repairs = RepairRegistry::new();
    subsystems::register_defaults(&mut checks, &mut repairs);
    (checks, repairs)
}

#[test]
fn defaults_register_a_check_and_repair_per_issue() {
    let (checks, repairs) = default_registries();
    assert_eq!(checks.len(), subsystems::DEFAULTS.len());
    assert_eq!(repairs.len(), subsystems::DEFAULTS.len());
    for d in subsystems::DEFAULTS {
        assert!(checks.contains(d.name));
        assert!(repairs.contains_for_issue(d.name));
    }
}

#[test]
fn clean_snapshot_raises_no_issues() {
    let (checks, _) = default_registries();
    let snapshot = MissionSnapshot {
        active: vec![record("a", 1), record("b", 2)],
        completed: Vec::new(),
        deleted: Vec::new(),
    };
    let results = checks.run_all(&snapshot);
    assert!(results.iter().all(|r| !r.has_issue && r.error.is_none()));
}

#[test]
fn results_come_back_in_descending_priority_order() {
    let (checks, _) = default_registries();
    // Trip one issue per priority tier.
    let mut dup = record("a", 1); // duplicate id: critical
    dup.title = String::new(); // empty title: high
    let mut mastery = record("b", 2);
    mastery.subtasks.push(SubtaskRecord {
        name: "drill".to_string(),
        is_counter_based: false,
        current_count: 0,
        current_completions: 0,
        required_completions: 1,
        mastery: Some(MasteryLink {
            mastery_id: "focus".to_string(),
            value: -1.0,
        }),
    });
    let mut future = record("c", 3);
    future.created_at = Some(u64::MAX);
    let snapshot = MissionSnapshot {
        active: vec![dup, record("a", 4), mastery, future],
        completed: Vec::new(),
        deleted: Vec::new(),
    };

    let results = checks.run_all(&snapshot);
    let firing: Vec<(&str, Priority)> = results
        .iter()
        .filter(|r| r.has_issue)
        .map(|r| (r.name.as_str(), r.priority))
        .collect();
    assert_eq!(firing, vec![
        (subsystems::DUPLICATE_MISSION_ID, Priority::Critical),
        (subsystems::EMPTY_TITLE, Priority::High),
        (subsystems::INVALID_MASTERY, Priority::Medium),
        (subsystems::FUTURE_CREATED_AT, Priority::Low),
    ]);
    // Priorities never increase along the result order.
    let priorities: Vec<Priority> = results.iter().map(|r| r.priority).collect();
    assert!(priorities.windows(2).all(|w| w[0] >= w[1]));
}

#[test]
fn run_subset_serves_the_cheap_polling_path() {
    let (checks, _) = default_registries();
    let snapshot = MissionSnapshot::default();
    let results = checks.run_subset(&snapshot, Priority::High, 3);
    assert_eq!(results.len(), 3);
    assert!(results.iter().all(|r| r.priority >= Priority::High));
}

#[test]
fn learned_checks_persist_across_registry_rebuilds() {
    let tmp = tempdir().expect("tempdir");
    let store = SqliteKvStore::open(tmp.path()).unwrap();
    let (mut checks, _) = default_registries();

    assert!(checks
        .learn(&store, "Orphaned subtask", "subtask without a parent", Priority::Medium, subsystems::resolve_check)
        .unwrap());
    // Learning a known default is a no-op.
    assert!(!checks
        .learn(&store, subsystems::EMPTY_TITLE, "", Priority::Low, subsystems::resolve_check)
        .unwrap());

    let (mut rebuilt, _) = default_registries();
    let restored = rebuilt.load(&store, subsystems::resolve_check).unwrap();
    assert_eq!(restored, 1);
    assert!(rebuilt.contains("Orphaned subtask"));
    // The unknown name rehydrated to the never-fires fallback.
    let snapshot = MissionSnapshot::default();
    let result = rebuilt
        .run_all(&snapshot)
        .into_iter()
        .find(|r| r.name == "Orphaned subtask")
        .unwrap();
    assert!(!result.has_issue);
    assert!(result.error.is_none());

    let history = load_learning_history(&store).unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].kind, "check");
    assert_eq!(history[0].name, "Orphaned subtask");
}

#[test]
fn learned_repairs_rehydrate_against_the_dispatch_table() {
    let tmp = tempdir().expect("tempdir");
    let store = SqliteKvStore::open(tmp.path()).unwrap();
    let (_, mut repairs) = default_registries();

    assert!(repairs
        .learn(&store, "Orphaned subtask", "drop orphans", Priority::Medium, subsystems::resolve_repair)
        .unwrap());

    let (_, mut rebuilt) = default_registries();
    assert_eq!(rebuilt.load(&store, subsystems::resolve_repair).unwrap(), 1);
    // Unknown learned repair falls back to a no-op.
    let mut snapshot = MissionSnapshot {
        active: vec![record("a", 1)],
        completed: Vec::new(),
        deleted: Vec::new(),
    };
    let before = snapshot.clone();
    let outcome = rebuilt.apply_for_issue("Orphaned subtask", &mut snapshot);
    assert!(outcome.changes.is_empty());
    assert!(outcome.error.is_none());
    assert_eq!(snapshot, before);
}
