use guardian::core::config::GuardianConfig;
use guardian::core::mission::{
    Completion, Counters, MasteryLink, MissionKind, MissionRecord, MissionSnapshot,
};
use guardian::core::store::SqliteKvStore;
use guardian::plugins::checks::HealthCheckRegistry;
use guardian::plugins::coordinator::ConsistencyCoordinator;
use guardian::plugins::events::GuardianEvents;
use guardian::plugins::repairs::RepairRegistry;
use guardian::plugins::sandbox::{SandboxSimulator, fingerprint};
use guardian::subsystems;
use std::sync::Arc;
use tempfile::tempdir;

fn record(id: &str, notification_id: i32) -> MissionRecord {
    MissionRecord {
        id: id.to_string(),
        notification_id,
        title: format!("Mission {}", id),
        kind: MissionKind::Weekly,
        is_counter_based: false,
        counters: Counters::default(),
        subtasks: Vec::new(),
        completion: Completion::default(),
        mastery: None,
        created_at: Some(0),
    }
}

fn default_repairs() -> RepairRegistry {
    let mut checks = HealthCheckRegistry::new();
    let mut repairs = RepairRegistry::new();
    subsystems::register_defaults(&mut checks, &mut repairs);
    repairs
}

/// A snapshot tripping every default issue at once.
fn messy_snapshot() -> MissionSnapshot {
    let mut untitled = record("dup", 11);
    untitled.title = "  ".to_string();
    let mut contradictory = record("c", 12);
    contradictory.completion.is_completed = true;
    contradictory.completion.has_failed = true;
    let mut counters = record("k", 13);
    counters.is_counter_based = true;
    counters.counters = Counters {
        current: -4,
        target: 10,
    };
    let mut mastery = record("m", 14);
    mastery.mastery = Some(MasteryLink {
        mastery_id: "strength".to_string(),
        value: 0.0,
    });
    MissionSnapshot {
        active: vec![untitled, record("dup", 11), contradictory],
        completed: vec![counters],
        deleted: vec![mastery],
    }
}

#[test]
fn simulate_never_touches_live_state_for_any_issue_key() {
    let repairs = default_repairs();
    let simulator = SandboxSimulator::new(&repairs);
    let live = messy_snapshot();
    let before = serde_json::to_string(&live).unwrap();

    for d in subsystems::DEFAULTS {
        let report = simulator.simulate(d.name, &live);
        let after = serde_json::to_string(&live).unwrap();
        assert_eq!(before, after, "live state drifted while simulating '{}'", d.name);
        assert_eq!(report.issue_key, d.name);
    }
    // Even an unknown key leaves live state alone.
    simulator.simulate("No such issue", &live);
    assert_eq!(before, serde_json::to_string(&live).unwrap());
}

#[test]
fn successful_simulation_reports_changes_and_passing_tests() {
    let repairs = default_repairs();
    let simulator = SandboxSimulator::new(&repairs);
    let live = MissionSnapshot {
        active: vec![record("a", 21), record("b", 21)],
        completed: Vec::new(),
        deleted: Vec::new(),
    };
    let report = simulator.simulate(subsystems::DUPLICATE_NOTIFICATION_ID, &live);
    assert!(report.success);
    assert_eq!(report.changes.len(), 1);
    assert!(report.test_results.is_empty());
    assert!(report.summary.contains("applied cleanly"));
    assert!(report
        .resulting_state
        .duplicate_notification_ids()
        .is_empty());
}

#[test]
fn simulation_still_fails_when_other_defects_remain() {
    // Repairing one issue kind leaves the others; the assertion suite must
    // refuse the sandbox result.
    let repairs = default_repairs();
    let simulator = SandboxSimulator::new(&repairs);
    let live = messy_snapshot();
    let report = simulator.simulate(subsystems::EMPTY_TITLE, &live);
    assert!(!report.success);
    assert!(!report.changes.is_empty());
    assert!(report
        .test_results
        .iter()
        .any(|t| t.contains("duplicate mission id")));
}

#[test]
fn coordinator_commit_adopts_simulated_state() {
    let tmp = tempdir().expect("tempdir");
    let store = Arc::new(SqliteKvStore::open(tmp.path()).unwrap());
    let events = Arc::new(GuardianEvents::new(None));
    let mut coordinator =
        ConsistencyCoordinator::new(store, GuardianConfig::default(), events).unwrap();
    coordinator
        .replace_records(MissionSnapshot {
            active: vec![record("a", 5), record("b", 5)],
            completed: Vec::new(),
            deleted: Vec::new(),
        })
        .unwrap();

    let report = coordinator.simulate_repair(subsystems::DUPLICATE_NOTIFICATION_ID);
    assert!(report.success);
    assert!(coordinator.has_pending_sandbox());
    // Live state is still the duplicate until commit.
    assert_eq!(coordinator.snapshot().duplicate_notification_ids(), vec![5]);

    coordinator.commit_pending().unwrap();
    assert!(!coordinator.has_pending_sandbox());
    assert!(coordinator.snapshot().duplicate_notification_ids().is_empty());

    // The commit was saved: a rebuilt coordinator sees the repair.
    let store = Arc::new(SqliteKvStore::open(tmp.path()).unwrap());
    let events = Arc::new(GuardianEvents::new(None));
    let rebuilt = ConsistencyCoordinator::new(store, GuardianConfig::default(), events).unwrap();
    assert!(rebuilt.snapshot().duplicate_notification_ids().is_empty());
}

#[test]
fn commit_refuses_failed_reports_and_drifted_state() {
    let tmp = tempdir().expect("tempdir");
    let store = Arc::new(SqliteKvStore::open(tmp.path()).unwrap());
    let events = Arc::new(GuardianEvents::new(None));
    let mut coordinator =
        ConsistencyCoordinator::new(store, GuardianConfig::default(), events).unwrap();
    coordinator
        .replace_records(MissionSnapshot {
            active: vec![record("a", 5), record("b", 5)],
            completed: Vec::new(),
            deleted: Vec::new(),
        })
        .unwrap();

    // Unknown issue: the report fails, so commit must refuse it.
    let failed = coordinator.simulate_repair("No such issue");
    assert!(!failed.success);
    assert!(coordinator.commit_sandbox(failed).is_err());

    // Drift between simulate and commit is refused too.
    let report = coordinator.simulate_repair(subsystems::DUPLICATE_NOTIFICATION_ID);
    assert!(report.success);
    coordinator
        .replace_records(MissionSnapshot {
            active: vec![record("c", 6)],
            completed: Vec::new(),
            deleted: Vec::new(),
        })
        .unwrap();
    let err = coordinator.commit_sandbox(report).unwrap_err();
    assert!(err.to_string().contains("changed since simulation"));
}

#[test]
fn fingerprints_distinguish_different_states() {
    let a = messy_snapshot();
    let mut b = messy_snapshot();
    b.active[0].notification_id += 1;
    assert_eq!(fingerprint(&a).unwrap(), fingerprint(&messy_snapshot()).unwrap());
    assert_ne!(fingerprint(&a).unwrap(), fingerprint(&b).unwrap());
}
