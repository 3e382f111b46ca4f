use guardian::core::config::GuardianConfig;
use guardian::core::mission::{
    Completion, Counters, MasteryLink, MissionKind, MissionRecord, MissionSnapshot, SubtaskRecord,
};
use guardian::core::store::SqliteKvStore;
use guardian::plugins::checks::Priority;
use guardian::plugins::coordinator::ConsistencyCoordinator;
use guardian::plugins::events::{GuardianEvent, GuardianEvents};
use guardian::subsystems;
use rustc_hash::FxHashSet;
use std::sync::Arc;
use tempfile::{TempDir, tempdir};

fn record(id: &str, notification_id: i32) -> MissionRecord {
    MissionRecord {
        id: id.to_string(),
        notification_id,
        title: format!("Mission {}", id),
        kind: MissionKind::Daily,
        is_counter_based: false,
        counters: Counters::default(),
        subtasks: Vec::new(),
        completion: Completion::default(),
        mastery: None,
        created_at: Some(0),
    }
}

fn coordinator_in(tmp: &TempDir) -> ConsistencyCoordinator {
    let store = Arc::new(SqliteKvStore::open(tmp.path()).unwrap());
    let events = Arc::new(GuardianEvents::new(None));
    ConsistencyCoordinator::new(store, GuardianConfig::default(), events).unwrap()
}

fn seed(coordinator: &mut ConsistencyCoordinator, snapshot: MissionSnapshot) {
    coordinator.replace_records(snapshot).unwrap();
}

#[test]
fn duplicate_notification_id_end_to_end() {
    let tmp = tempdir().expect("tempdir");
    let mut coordinator = coordinator_in(&tmp);
    seed(
        &mut coordinator,
        MissionSnapshot {
            active: vec![record("a", 42), record("b", 42)],
            completed: Vec::new(),
            deleted: Vec::new(),
        },
    );

    let findings = coordinator.validate_all(true);
    assert!(findings
        .iter()
        .any(|f| f.contains(subsystems::DUPLICATE_NOTIFICATION_ID)));

    let snapshot = coordinator.snapshot();
    let ids: Vec<i32> = snapshot
        .all_records()
        .map(|r| r.notification_id)
        .collect();
    // Exactly one record keeps 42; the other got a fresh in-range value.
    assert_eq!(ids.iter().filter(|&&id| id == 42).count(), 1);
    let fresh = *ids.iter().find(|&&id| id != 42).unwrap();
    assert!(fresh > 0);
    assert!((fresh as i64) <= 0x7FFF_FFFF);
    // First occurrence wins: record "a" is the keeper.
    assert_eq!(snapshot.active[0].id, "a");
    assert_eq!(snapshot.active[0].notification_id, 42);

    let entries = coordinator.repair_log_entries();
    assert!(entries
        .iter()
        .any(|e| e.issue == subsystems::DUPLICATE_NOTIFICATION_ID));
}

#[test]
fn duplicate_identifiers_unique_across_all_three_sets() {
    let tmp = tempdir().expect("tempdir");
    let mut coordinator = coordinator_in(&tmp);
    let mut done = record("x", 7);
    done.completion.is_completed = true;
    seed(
        &mut coordinator,
        MissionSnapshot {
            active: vec![record("x", 7), record("y", 8), record("y", 9)],
            completed: vec![done],
            deleted: vec![record("x", 7), record("z", 8)],
        },
    );

    let changes = coordinator.repair_duplicate_identifiers();
    assert!(!changes.is_empty());

    let snapshot = coordinator.snapshot();
    let mut ids = FxHashSet::default();
    let mut notification_ids = FxHashSet::default();
    for r in snapshot.all_records() {
        assert!(ids.insert(r.id.clone()), "duplicate id survived: {}", r.id);
        assert!(
            notification_ids.insert(r.notification_id),
            "duplicate notification id survived: {}",
            r.notification_id
        );
        assert!(r.notification_id > 0);
    }

    // Idempotence: a second run changes nothing.
    assert!(coordinator.repair_duplicate_identifiers().is_empty());
}

#[test]
fn zero_mastery_subtask_repaired_to_one() {
    let tmp = tempdir().expect("tempdir");
    let mut coordinator = coordinator_in(&tmp);
    let mut r = record("a", 1);
    r.subtasks.push(SubtaskRecord {
        name: "morning drill".to_string(),
        is_counter_based: false,
        current_count: 0,
        current_completions: 0,
        required_completions: 1,
        mastery: Some(MasteryLink {
            mastery_id: "discipline".to_string(),
            value: 0.0,
        }),
    });
    seed(
        &mut coordinator,
        MissionSnapshot {
            active: vec![r],
            completed: Vec::new(),
            deleted: Vec::new(),
        },
    );

    let changes = coordinator.repair_invalid_mastery_values();
    assert_eq!(changes.len(), 1);
    assert!(changes[0].contains("morning drill"));

    let value = coordinator.snapshot().active[0].subtasks[0]
        .mastery
        .as_ref()
        .unwrap()
        .value;
    assert!((value - 1.0).abs() < f64::EPSILON);

    let entries = coordinator.repair_log_entries();
    assert!(entries
        .iter()
        .any(|e| e.issue == subsystems::INVALID_MASTERY && e.action.contains("morning drill")));

    // Second run is a no-op.
    assert!(coordinator.repair_invalid_mastery_values().is_empty());
}

#[test]
fn contradictory_completion_is_mutually_exclusive_after_sweep() {
    let tmp = tempdir().expect("tempdir");
    let mut coordinator = coordinator_in(&tmp);
    let mut bad = record("a", 1);
    bad.completion.is_completed = true;
    bad.completion.has_failed = true;
    seed(
        &mut coordinator,
        MissionSnapshot {
            active: vec![bad, record("b", 2)],
            completed: Vec::new(),
            deleted: Vec::new(),
        },
    );

    coordinator.validate_all(true);
    for r in coordinator.snapshot().all_records() {
        assert!(!(r.completion.is_completed && r.completion.has_failed));
    }
    // Completed wins over failed.
    let repaired = coordinator
        .snapshot()
        .all_records()
        .find(|r| r.id == "a")
        .unwrap();
    assert!(repaired.completion.is_completed);
    assert!(!repaired.completion.has_failed);
}

#[test]
fn repairs_survive_a_persistence_round_trip() {
    let tmp = tempdir().expect("tempdir");
    {
        let mut coordinator = coordinator_in(&tmp);
        let mut untitled = record("a", 1);
        untitled.title = String::new();
        seed(
            &mut coordinator,
            MissionSnapshot {
                active: vec![untitled, record("b", 2)],
                completed: Vec::new(),
                deleted: Vec::new(),
            },
        );
        let findings = coordinator.validate_all(true);
        assert!(!findings.iter().any(|f| f.starts_with("post-reload:")));
    }
    // A brand-new coordinator over the same store sees the repaired state.
    let coordinator = coordinator_in(&tmp);
    assert!(coordinator
        .snapshot()
        .all_records()
        .all(|r| !r.title.trim().is_empty()));
    assert!(coordinator.run_checks().iter().all(|r| !r.has_issue));
}

#[test]
fn validate_without_repair_reports_but_does_not_mutate() {
    let tmp = tempdir().expect("tempdir");
    let mut coordinator = coordinator_in(&tmp);
    seed(
        &mut coordinator,
        MissionSnapshot {
            active: vec![record("a", 5), record("b", 5)],
            completed: Vec::new(),
            deleted: Vec::new(),
        },
    );
    let before = serde_json::to_string(coordinator.snapshot()).unwrap();
    let findings = coordinator.validate_all(false);
    assert!(!findings.is_empty());
    let after = serde_json::to_string(coordinator.snapshot()).unwrap();
    assert_eq!(before, after);
}

#[test]
fn backup_is_written_before_repairs_and_restorable() {
    let tmp = tempdir().expect("tempdir");
    let mut coordinator = coordinator_in(&tmp);
    seed(
        &mut coordinator,
        MissionSnapshot {
            active: vec![record("a", 9), record("b", 9)],
            completed: Vec::new(),
            deleted: Vec::new(),
        },
    );
    coordinator.validate_all(true);
    // The backup preserves the pre-repair duplicate.
    assert!(coordinator.restore_backup().unwrap());
    let ids: Vec<i32> = coordinator
        .snapshot()
        .all_records()
        .map(|r| r.notification_id)
        .collect();
    assert_eq!(ids, vec![9, 9]);
}

#[test]
fn recurring_issue_escalates_effective_priority() {
    let tmp = tempdir().expect("tempdir");
    let mut coordinator = coordinator_in(&tmp);

    let broken = || {
        let mut r = record("a", 1);
        r.mastery = Some(MasteryLink {
            mastery_id: "focus".to_string(),
            value: -2.0,
        });
        MissionSnapshot {
            active: vec![r],
            completed: Vec::new(),
            deleted: Vec::new(),
        }
    };

    for _ in 0..3 {
        seed(&mut coordinator, broken());
        coordinator.validate_all(true);
    }

    assert_eq!(coordinator.frequency().count(subsystems::INVALID_MASTERY), 3);
    assert!(coordinator
        .frequency()
        .escalation_candidate(subsystems::INVALID_MASTERY));
    // Declared stays medium; effective went up.
    assert_eq!(
        coordinator.checks().declared_priority(subsystems::INVALID_MASTERY),
        Some(Priority::Medium)
    );
    assert!(
        coordinator.checks().effective_priority(subsystems::INVALID_MASTERY).unwrap()
            > Priority::Medium
    );
}

#[test]
fn learning_emits_an_event_and_persists() {
    let tmp = tempdir().expect("tempdir");
    let store = Arc::new(SqliteKvStore::open(tmp.path()).unwrap());
    let events = Arc::new(GuardianEvents::new(None));
    let rx = events.subscribe();
    let mut coordinator =
        ConsistencyCoordinator::new(store, GuardianConfig::default(), events).unwrap();

    assert!(coordinator
        .learn_check("Orphaned subtask", "subtask without a parent", Priority::Medium)
        .unwrap());
    assert!(coordinator
        .learn_repair("Orphaned subtask", "drop orphans", Priority::Medium)
        .unwrap());
    // Re-learning is a no-op and emits nothing further.
    assert!(!coordinator
        .learn_check("Orphaned subtask", "", Priority::Low)
        .unwrap());

    let received: Vec<GuardianEvent> = rx.try_iter().collect();
    assert_eq!(received.len(), 2);

    // A rebuilt coordinator knows the learned entries.
    let rebuilt = coordinator_in(&tmp);
    assert!(rebuilt.checks().contains("Orphaned subtask"));
    assert!(rebuilt.repairs().contains_for_issue("Orphaned subtask"));
}

#[test]
fn statistics_reflect_the_live_lists() {
    let tmp = tempdir().expect("tempdir");
    let mut coordinator = coordinator_in(&tmp);
    let mut done = record("b", 2);
    done.completion.is_completed = true;
    seed(
        &mut coordinator,
        MissionSnapshot {
            active: vec![record("a", 1)],
            completed: vec![done],
            deleted: vec![record("c", 3)],
        },
    );
    let stats = coordinator.statistics();
    assert_eq!(stats.total_missions, 2);
    assert_eq!(stats.completed_missions, 1);
    assert_eq!(stats.deleted_missions, 1);
    assert!((stats.completion_rate - 50.0).abs() < f64::EPSILON);

    let report = coordinator.health_report();
    assert_eq!(report.overall, "healthy");
    assert_eq!(report.issues_found, 0);
}
