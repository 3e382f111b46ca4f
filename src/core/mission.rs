//! Mission data model: the records under consistency management.
//!
//! The coordinator owns the authoritative lists; everything else sees a
//! [`MissionSnapshot`] either by reference (checks) or by deep clone
//! (sandbox). All types derive `Clone` so a snapshot clone shares nothing
//! with the original.

use crate::core::time;
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use ulid::Ulid;

pub const MAX_NOTIFICATION_ID: i64 = 0x7FFF_FFFF;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum MissionKind {
    Daily,
    Weekly,
    Simple,
    Persistent,
}

impl MissionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MissionKind::Daily => "daily",
            MissionKind::Weekly => "weekly",
            MissionKind::Simple => "simple",
            MissionKind::Persistent => "persistent",
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct MasteryLink {
    pub mastery_id: String,
    pub value: f64,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Counters {
    pub current: i64,
    pub target: i64,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct Completion {
    pub is_completed: bool,
    pub has_failed: bool,
    pub last_completed: Option<u64>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SubtaskRecord {
    pub name: String,
    pub is_counter_based: bool,
    #[serde(default)]
    pub current_count: i64,
    #[serde(default)]
    pub current_completions: i64,
    #[serde(default)]
    pub required_completions: i64,
    #[serde(default)]
    pub mastery: Option<MasteryLink>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct MissionRecord {
    pub id: String,
    pub notification_id: i32,
    pub title: String,
    pub kind: MissionKind,
    pub is_counter_based: bool,
    #[serde(default)]
    pub counters: Counters,
    #[serde(default)]
    pub subtasks: Vec<SubtaskRecord>,
    #[serde(default)]
    pub completion: Completion,
    #[serde(default)]
    pub mastery: Option<MasteryLink>,
    #[serde(default)]
    pub created_at: Option<u64>,
}

impl MissionRecord {
    /// Per-record structural findings. Empty means the record is sound.
    /// Identifier uniqueness is a snapshot-level property, not checked here.
    pub fn structural_findings(&self, now_ms: u64) -> Vec<String> {
        let mut findings = Vec::new();
        if self.id.trim().is_empty() {
            findings.push(format!("mission has empty id (title '{}')", self.title));
        }
        if self.title.trim().is_empty() {
            findings.push(format!("mission {} has empty title", self.id));
        }
        if self.notification_id <= 0 {
            findings.push(format!(
                "mission {} has out-of-range notification id {}",
                self.id, self.notification_id
            ));
        }
        if self.completion.is_completed && self.completion.has_failed {
            findings.push(format!(
                "mission {} is both completed and failed",
                self.id
            ));
        }
        if self.is_counter_based && (self.counters.current < 0 || self.counters.target < 0) {
            findings.push(format!(
                "mission {} has negative counters ({}/{})",
                self.id, self.counters.current, self.counters.target
            ));
        }
        if let Some(link) = &self.mastery {
            if link.value <= 0.0 {
                findings.push(format!(
                    "mission {} has non-positive mastery value {}",
                    self.id, link.value
                ));
            }
        }
        if let Some(created) = self.created_at {
            if created > now_ms {
                findings.push(format!(
                    "mission {} has created_at in the future ({} > {})",
                    self.id, created, now_ms
                ));
            }
        }
        for (idx, sub) in self.subtasks.iter().enumerate() {
            if sub.name.trim().is_empty() {
                findings.push(format!("mission {} subtask #{} has empty name", self.id, idx));
            }
            if sub.current_count < 0 || sub.current_completions < 0 || sub.required_completions < 0
            {
                findings.push(format!(
                    "mission {} subtask '{}' has negative counters",
                    self.id, sub.name
                ));
            }
            if let Some(link) = &sub.mastery {
                if link.value <= 0.0 {
                    findings.push(format!(
                        "mission {} subtask '{}' has non-positive mastery value {}",
                        self.id, sub.name, link.value
                    ));
                }
            }
        }
        findings
    }
}

/// The three record sets, in canonical iteration order: active, completed,
/// deleted. Uniqueness invariants span the union.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct MissionSnapshot {
    pub active: Vec<MissionRecord>,
    pub completed: Vec<MissionRecord>,
    pub deleted: Vec<MissionRecord>,
}

impl MissionSnapshot {
    pub fn all_records(&self) -> impl Iterator<Item = &MissionRecord> {
        self.active
            .iter()
            .chain(self.completed.iter())
            .chain(self.deleted.iter())
    }

    pub fn all_records_mut(&mut self) -> impl Iterator<Item = &mut MissionRecord> {
        self.active
            .iter_mut()
            .chain(self.completed.iter_mut())
            .chain(self.deleted.iter_mut())
    }

    pub fn len(&self) -> usize {
        self.active.len() + self.completed.len() + self.deleted.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Mission ids seen more than once, in first-occurrence order.
    pub fn duplicate_ids(&self) -> Vec<String> {
        let mut seen = FxHashSet::default();
        let mut dups = Vec::new();
        for record in self.all_records() {
            if !seen.insert(record.id.clone()) && !dups.contains(&record.id) {
                dups.push(record.id.clone());
            }
        }
        dups
    }

    /// Notification ids seen more than once, in first-occurrence order.
    pub fn duplicate_notification_ids(&self) -> Vec<i32> {
        let mut seen = FxHashSet::default();
        let mut dups = Vec::new();
        for record in self.all_records() {
            if !seen.insert(record.notification_id) && !dups.contains(&record.notification_id) {
                dups.push(record.notification_id);
            }
        }
        dups
    }

    pub fn id_set(&self) -> FxHashSet<String> {
        self.all_records().map(|r| r.id.clone()).collect()
    }

    pub fn notification_id_set(&self) -> FxHashSet<i32> {
        self.all_records().map(|r| r.notification_id).collect()
    }

    pub fn statistics(&self) -> MissionStatistics {
        let total = self.active.len() + self.completed.len();
        let completed = self
            .active
            .iter()
            .chain(self.completed.iter())
            .filter(|r| r.completion.is_completed)
            .count();
        let failed = self
            .active
            .iter()
            .chain(self.completed.iter())
            .filter(|r| r.completion.has_failed)
            .count();
        let counter_based = self
            .active
            .iter()
            .chain(self.completed.iter())
            .filter(|r| r.is_counter_based)
            .count();
        let mut by_kind = BTreeMap::new();
        for r in self.active.iter().chain(self.completed.iter()) {
            *by_kind.entry(r.kind.as_str().to_string()).or_insert(0usize) += 1;
        }
        let total_subtasks = self
            .active
            .iter()
            .chain(self.completed.iter())
            .map(|r| r.subtasks.len())
            .sum();
        let completion_rate = if total > 0 {
            completed as f64 / total as f64 * 100.0
        } else {
            0.0
        };
        MissionStatistics {
            total_missions: total,
            completed_missions: completed,
            failed_missions: failed,
            counter_missions: counter_based,
            missions_by_kind: by_kind,
            total_subtasks,
            deleted_missions: self.deleted.len(),
            completion_rate,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct MissionStatistics {
    pub total_missions: usize,
    pub completed_missions: usize,
    pub failed_missions: usize,
    pub counter_missions: usize,
    pub missions_by_kind: BTreeMap<String, usize>,
    pub total_subtasks: usize,
    pub deleted_missions: usize,
    pub completion_rate: f64,
}

/// Generate a mission id: timestamp, random component, secondary suffix.
/// Regenerated until it misses `existing`.
pub fn generate_mission_id(existing: &FxHashSet<String>) -> String {
    loop {
        let ulid = Ulid::new().to_string().to_lowercase();
        let suffix: String = Ulid::new()
            .to_string()
            .to_lowercase()
            .chars()
            .rev()
            .take(4)
            .collect();
        let candidate = format!("m-{}-{}-{}", time::now_epoch_ms(), ulid, suffix);
        if !existing.contains(&candidate) {
            return candidate;
        }
    }
}

/// Generate a notification id in `(0, 0x7FFF_FFFF]`, collision-checked.
pub fn generate_notification_id(existing: &FxHashSet<i32>) -> i32 {
    loop {
        let random = (Ulid::new().random() % MAX_NOTIFICATION_ID as u128) as i64;
        let mut candidate = ((time::now_epoch_ms() as i64 + random) % MAX_NOTIFICATION_ID) as i32;
        if candidate <= 0 {
            candidate = 1;
        }
        if !existing.contains(&candidate) {
            return candidate;
        }
    }
}
