//! Default check/repair registration: the fixed dispatch table.
//!
//! Adding a new built-in issue kind: append one entry to `DEFAULTS`.
//! Persisted registry state stores names only; rehydration resolves them
//! here, so behavior always comes from this table (or the no-op fallbacks).

use crate::core::mission::{MissionSnapshot, generate_mission_id, generate_notification_id};
use crate::core::time;
use crate::plugins::checks::{Check, HealthCheckRegistry, Priority};
use crate::plugins::repairs::{Repair, RepairRegistry, repair_key};
use crate::core::error::GuardianError;
use rustc_hash::FxHashSet;

pub const DUPLICATE_MISSION_ID: &str = "Duplicate mission ID";
pub const DUPLICATE_NOTIFICATION_ID: &str = "Duplicate notification ID";
pub const EMPTY_TITLE: &str = "Empty mission title";
pub const CONTRADICTORY_COMPLETION: &str = "Contradictory completion state";
pub const INVALID_COUNTERS: &str = "Invalid counter values";
pub const INVALID_MASTERY: &str = "Invalid mastery value";
pub const EMPTY_SUBTASK_NAME: &str = "Empty subtask name";
pub const FUTURE_CREATED_AT: &str = "Future creation timestamp";

pub struct DefaultIssue {
    pub name: &'static str,
    pub description: &'static str,
    pub priority: Priority,
    pub make_check: fn() -> Box<dyn Check>,
    pub make_repair: fn() -> Box<dyn Repair>,
    pub repair_description: &'static str,
}

/// All built-in issue kinds, declaration order = registration order.
pub const DEFAULTS: &[DefaultIssue] = &[
    DefaultIssue {
        name: DUPLICATE_MISSION_ID,
        description: "Two or more records share a mission id",
        priority: Priority::Critical,
        make_check: || Box::new(DuplicateMissionIdCheck),
        make_repair: || Box::new(FixDuplicateMissionIds),
        repair_description: "Regenerate ids for every record after the first occurrence",
    },
    DefaultIssue {
        name: DUPLICATE_NOTIFICATION_ID,
        description: "Two or more records share a notification id",
        priority: Priority::Critical,
        make_check: || Box::new(DuplicateNotificationIdCheck),
        make_repair: || Box::new(FixDuplicateNotificationIds),
        repair_description: "Regenerate notification ids for every record after the first occurrence",
    },
    DefaultIssue {
        name: EMPTY_TITLE,
        description: "A mission has an empty title",
        priority: Priority::High,
        make_check: || Box::new(EmptyTitleCheck),
        make_repair: || Box::new(FixEmptyTitles),
        repair_description: "Fill empty titles with a recovery placeholder",
    },
    DefaultIssue {
        name: CONTRADICTORY_COMPLETION,
        description: "A mission is marked both completed and failed",
        priority: Priority::High,
        make_check: || Box::new(ContradictoryCompletionCheck),
        make_repair: || Box::new(FixContradictoryCompletion),
        repair_description: "Clear the failed flag when both flags are set",
    },
    DefaultIssue {
        name: INVALID_COUNTERS,
        description: "A counter-based mission or subtask has negative counts",
        priority: Priority::Medium,
        make_check: || Box::new(InvalidCounterCheck),
        make_repair: || Box::new(FixInvalidCounters),
        repair_description: "Clamp negative counts to zero",
    },
    DefaultIssue {
        name: INVALID_MASTERY,
        description: "A mastery link carries a non-positive value",
        priority: Priority::Medium,
        make_check: || Box::new(InvalidMasteryCheck),
        make_repair: || Box::new(FixInvalidMasteryValues),
        repair_description: "Reset non-positive mastery values to 1.0",
    },
    DefaultIssue {
        name: EMPTY_SUBTASK_NAME,
        description: "A subtask has an empty name",
        priority: Priority::Medium,
        make_check: || Box::new(EmptySubtaskNameCheck),
        make_repair: || Box::new(FixEmptySubtaskNames),
        repair_description: "Fill empty subtask names with their position",
    },
    DefaultIssue {
        name: FUTURE_CREATED_AT,
        description: "A mission claims to have been created in the future",
        priority: Priority::Low,
        make_check: || Box::new(FutureCreatedAtCheck),
        make_repair: || Box::new(FixFutureCreatedAt),
        repair_description: "Clamp future creation timestamps to now",
    },
];

/// Resolve a check implementation by issue name.
pub fn resolve_check(name: &str) -> Option<Box<dyn Check>> {
    DEFAULTS
        .iter()
        .find(|d| d.name == name)
        .map(|d| (d.make_check)())
}

/// Resolve a repair implementation by registry key (`fix_<issue>`).
pub fn resolve_repair(key: &str) -> Option<Box<dyn Repair>> {
    DEFAULTS
        .iter()
        .find(|d| repair_key(d.name) == key)
        .map(|d| (d.make_repair)())
}

/// Bootstrap both registries with the curated default set.
pub fn register_defaults(checks: &mut HealthCheckRegistry, repairs: &mut RepairRegistry) {
    for d in DEFAULTS {
        checks.register(d.name, d.description, d.priority, (d.make_check)());
        repairs.register(
            &repair_key(d.name),
            d.repair_description,
            d.priority,
            (d.make_repair)(),
        );
    }
}

// --- checks ---

pub struct DuplicateMissionIdCheck;

impl Check for DuplicateMissionIdCheck {
    fn run(&self, snapshot: &MissionSnapshot) -> Result<bool, GuardianError> {
        Ok(!snapshot.duplicate_ids().is_empty())
    }
}

pub struct DuplicateNotificationIdCheck;

impl Check for DuplicateNotificationIdCheck {
    fn run(&self, snapshot: &MissionSnapshot) -> Result<bool, GuardianError> {
        Ok(!snapshot.duplicate_notification_ids().is_empty())
    }
}

pub struct EmptyTitleCheck;

impl Check for EmptyTitleCheck {
    fn run(&self, snapshot: &MissionSnapshot) -> Result<bool, GuardianError> {
        Ok(snapshot.all_records().any(|r| r.title.trim().is_empty()))
    }
}

pub struct ContradictoryCompletionCheck;

impl Check for ContradictoryCompletionCheck {
    fn run(&self, snapshot: &MissionSnapshot) -> Result<bool, GuardianError> {
        Ok(snapshot
            .all_records()
            .any(|r| r.completion.is_completed && r.completion.has_failed))
    }
}

pub struct InvalidCounterCheck;

impl Check for InvalidCounterCheck {
    fn run(&self, snapshot: &MissionSnapshot) -> Result<bool, GuardianError> {
        Ok(snapshot.all_records().any(|r| {
            (r.is_counter_based && (r.counters.current < 0 || r.counters.target < 0))
                || r.subtasks.iter().any(|s| {
                    s.current_count < 0 || s.current_completions < 0 || s.required_completions < 0
                })
        }))
    }
}

pub struct InvalidMasteryCheck;

impl Check for InvalidMasteryCheck {
    fn run(&self, snapshot: &MissionSnapshot) -> Result<bool, GuardianError> {
        Ok(snapshot.all_records().any(|r| {
            r.mastery.as_ref().is_some_and(|m| m.value <= 0.0)
                || r.subtasks
                    .iter()
                    .any(|s| s.mastery.as_ref().is_some_and(|m| m.value <= 0.0))
        }))
    }
}

pub struct EmptySubtaskNameCheck;

impl Check for EmptySubtaskNameCheck {
    fn run(&self, snapshot: &MissionSnapshot) -> Result<bool, GuardianError> {
        Ok(snapshot
            .all_records()
            .any(|r| r.subtasks.iter().any(|s| s.name.trim().is_empty())))
    }
}

pub struct FutureCreatedAtCheck;

impl Check for FutureCreatedAtCheck {
    fn run(&self, snapshot: &MissionSnapshot) -> Result<bool, GuardianError> {
        let now = time::now_epoch_ms();
        Ok(snapshot
            .all_records()
            .any(|r| r.created_at.is_some_and(|c| c > now)))
    }
}

// --- repairs ---

pub struct FixDuplicateMissionIds;

impl Repair for FixDuplicateMissionIds {
    /// First occurrence (active -> completed -> deleted order) keeps its id;
    /// every later collider gets a fresh, collision-checked one.
    fn apply(&self, snapshot: &mut MissionSnapshot) -> Result<Vec<String>, GuardianError> {
        let mut all_ids = snapshot.id_set();
        let mut seen: FxHashSet<String> = FxHashSet::default();
        let mut changes = Vec::new();
        for record in snapshot.all_records_mut() {
            if seen.insert(record.id.clone()) {
                continue;
            }
            let fresh = generate_mission_id(&all_ids);
            changes.push(format!(
                "mission '{}': replaced duplicate id {} with {}",
                record.title, record.id, fresh
            ));
            all_ids.insert(fresh.clone());
            seen.insert(fresh.clone());
            record.id = fresh;
        }
        Ok(changes)
    }
}

pub struct FixDuplicateNotificationIds;

impl Repair for FixDuplicateNotificationIds {
    fn apply(&self, snapshot: &mut MissionSnapshot) -> Result<Vec<String>, GuardianError> {
        let mut all_ids = snapshot.notification_id_set();
        let mut seen: FxHashSet<i32> = FxHashSet::default();
        let mut changes = Vec::new();
        for record in snapshot.all_records_mut() {
            if seen.insert(record.notification_id) {
                continue;
            }
            let fresh = generate_notification_id(&all_ids);
            changes.push(format!(
                "mission {}: replaced duplicate notification id {} with {}",
                record.id, record.notification_id, fresh
            ));
            all_ids.insert(fresh);
            seen.insert(fresh);
            record.notification_id = fresh;
        }
        Ok(changes)
    }
}

pub struct FixEmptyTitles;

impl Repair for FixEmptyTitles {
    fn apply(&self, snapshot: &mut MissionSnapshot) -> Result<Vec<String>, GuardianError> {
        let mut changes = Vec::new();
        for record in snapshot.all_records_mut() {
            if record.title.trim().is_empty() {
                record.title = format!("Recovered mission {}", &record.id);
                changes.push(format!("mission {}: filled empty title", record.id));
            }
        }
        Ok(changes)
    }
}

pub struct FixContradictoryCompletion;

impl Repair for FixContradictoryCompletion {
    /// Completed wins: a record that reached completion cannot also have
    /// failed, so the failed flag is the one that goes.
    fn apply(&self, snapshot: &mut MissionSnapshot) -> Result<Vec<String>, GuardianError> {
        let mut changes = Vec::new();
        for record in snapshot.all_records_mut() {
            if record.completion.is_completed && record.completion.has_failed {
                record.completion.has_failed = false;
                changes.push(format!(
                    "mission {}: cleared failed flag on completed mission",
                    record.id
                ));
            }
        }
        Ok(changes)
    }
}

pub struct FixInvalidCounters;

impl Repair for FixInvalidCounters {
    fn apply(&self, snapshot: &mut MissionSnapshot) -> Result<Vec<String>, GuardianError> {
        let mut changes = Vec::new();
        for record in snapshot.all_records_mut() {
            if record.is_counter_based && record.counters.current < 0 {
                changes.push(format!(
                    "mission {}: reset negative current count {} to 0",
                    record.id, record.counters.current
                ));
                record.counters.current = 0;
            }
            if record.is_counter_based && record.counters.target < 0 {
                changes.push(format!(
                    "mission {}: reset negative target count {} to 0",
                    record.id, record.counters.target
                ));
                record.counters.target = 0;
            }
            for sub in &mut record.subtasks {
                if sub.current_count < 0 {
                    changes.push(format!(
                        "mission {} subtask '{}': reset negative count to 0",
                        record.id, sub.name
                    ));
                    sub.current_count = 0;
                }
                if sub.current_completions < 0 {
                    changes.push(format!(
                        "mission {} subtask '{}': reset negative completions to 0",
                        record.id, sub.name
                    ));
                    sub.current_completions = 0;
                }
                if sub.required_completions < 0 {
                    changes.push(format!(
                        "mission {} subtask '{}': reset negative required completions to 0",
                        record.id, sub.name
                    ));
                    sub.required_completions = 0;
                }
            }
        }
        Ok(changes)
    }
}

pub struct FixInvalidMasteryValues;

impl Repair for FixInvalidMasteryValues {
    fn apply(&self, snapshot: &mut MissionSnapshot) -> Result<Vec<String>, GuardianError> {
        let mut changes = Vec::new();
        for record in snapshot.all_records_mut() {
            if let Some(link) = &mut record.mastery {
                if link.value <= 0.0 {
                    changes.push(format!(
                        "mission {}: reset mastery value {} to 1.0",
                        record.id, link.value
                    ));
                    link.value = 1.0;
                }
            }
            for sub in &mut record.subtasks {
                if let Some(link) = &mut sub.mastery {
                    if link.value <= 0.0 {
                        changes.push(format!(
                            "mission {} subtask '{}': reset mastery value {} to 1.0",
                            record.id, sub.name, link.value
                        ));
                        link.value = 1.0;
                    }
                }
            }
        }
        Ok(changes)
    }
}

pub struct FixEmptySubtaskNames;

impl Repair for FixEmptySubtaskNames {
    fn apply(&self, snapshot: &mut MissionSnapshot) -> Result<Vec<String>, GuardianError> {
        let mut changes = Vec::new();
        for record in snapshot.all_records_mut() {
            for (idx, sub) in record.subtasks.iter_mut().enumerate() {
                if sub.name.trim().is_empty() {
                    sub.name = format!("Subtask {}", idx + 1);
                    changes.push(format!(
                        "mission {}: named empty subtask #{}",
                        record.id,
                        idx + 1
                    ));
                }
            }
        }
        Ok(changes)
    }
}

pub struct FixFutureCreatedAt;

impl Repair for FixFutureCreatedAt {
    fn apply(&self, snapshot: &mut MissionSnapshot) -> Result<Vec<String>, GuardianError> {
        let now = time::now_epoch_ms();
        let mut changes = Vec::new();
        for record in snapshot.all_records_mut() {
            if let Some(created) = record.created_at {
                if created > now {
                    record.created_at = Some(now);
                    changes.push(format!(
                        "mission {}: clamped future created_at {} to {}",
                        record.id, created, now
                    ));
                }
            }
        }
        Ok(changes)
    }
}
