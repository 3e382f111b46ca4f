//! Health-check registry: named, priority-ranked predicates over the
//! mission snapshot.
//!
//! Checks are trait objects resolved from a static dispatch table; the
//! persisted form carries only name and metadata. A learned name with no
//! implementation rehydrates to [`NeverFires`] so old state can never crash
//! a sweep.

use crate::core::error::GuardianError;
use crate::core::keys;
use crate::core::mission::MissionSnapshot;
use crate::core::store::KvStore;
use crate::core::time;
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Medium,
    High,
    Critical,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
            Priority::Critical => "critical",
        }
    }

    /// One tier up, capped at critical.
    pub fn escalated(self) -> Self {
        match self {
            Priority::Low => Priority::Medium,
            Priority::Medium => Priority::High,
            Priority::High => Priority::Critical,
            Priority::Critical => Priority::Critical,
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A predicate over the mission snapshot. Returns true iff an issue is
/// present. Errors are caught at the registry boundary.
pub trait Check: Send + Sync {
    fn run(&self, snapshot: &MissionSnapshot) -> Result<bool, GuardianError>;
}

/// Fallback for names with no known implementation.
pub struct NeverFires;

impl Check for NeverFires {
    fn run(&self, _snapshot: &MissionSnapshot) -> Result<bool, GuardianError> {
        Ok(false)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckResult {
    pub name: String,
    pub has_issue: bool,
    pub priority: Priority,
    pub error: Option<String>,
}

/// Persisted descriptor: name + metadata, never behavior.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct StoredCheck {
    pub name: String,
    pub description: String,
    pub priority: Priority,
    pub learned: bool,
    pub created_at: String,
}

struct CheckEntry {
    meta: StoredCheck,
    /// Raised by escalation; the declared priority in `meta` never moves.
    effective: Priority,
    check: Box<dyn Check>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct LearningEvent {
    pub ts: String,
    pub event_id: String,
    pub kind: String,
    pub name: String,
    pub description: String,
}

/// Append a learning event to the shared history list.
pub fn record_learning_event(
    store: &dyn KvStore,
    kind: &str,
    name: &str,
    description: &str,
) -> Result<(), GuardianError> {
    let event = LearningEvent {
        ts: time::now_epoch_z(),
        event_id: time::new_event_id(),
        kind: kind.to_string(),
        name: name.to_string(),
        description: description.to_string(),
    };
    let mut history = store
        .get_string_list(keys::LEARNING_HISTORY)?
        .unwrap_or_default();
    history.push(serde_json::to_string(&event)?);
    store.set_string_list(keys::LEARNING_HISTORY, &history)
}

pub fn load_learning_history(store: &dyn KvStore) -> Result<Vec<LearningEvent>, GuardianError> {
    let raw = store
        .get_string_list(keys::LEARNING_HISTORY)?
        .unwrap_or_default();
    let mut events = Vec::with_capacity(raw.len());
    for line in raw {
        events.push(serde_json::from_str(&line)?);
    }
    Ok(events)
}

#[derive(Default)]
pub struct HealthCheckRegistry {
    entries: Vec<CheckEntry>,
}

impl HealthCheckRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// First registration wins; a duplicate name is an idempotent no-op.
    pub fn register(
        &mut self,
        name: &str,
        description: &str,
        priority: Priority,
        check: Box<dyn Check>,
    ) -> bool {
        self.register_entry(name, description, priority, false, check)
    }

    fn register_entry(
        &mut self,
        name: &str,
        description: &str,
        priority: Priority,
        learned: bool,
        check: Box<dyn Check>,
    ) -> bool {
        if self.contains(name) {
            return false;
        }
        self.entries.push(CheckEntry {
            meta: StoredCheck {
                name: name.to_string(),
                description: description.to_string(),
                priority,
                learned,
                created_at: time::now_epoch_z(),
            },
            effective: priority,
            check,
        });
        true
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|e| e.meta.name == name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn names(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.meta.name.clone()).collect()
    }

    pub fn effective_priority(&self, name: &str) -> Option<Priority> {
        self.entries
            .iter()
            .find(|e| e.meta.name == name)
            .map(|e| e.effective)
    }

    pub fn declared_priority(&self, name: &str) -> Option<Priority> {
        self.entries
            .iter()
            .find(|e| e.meta.name == name)
            .map(|e| e.meta.priority)
    }

    /// Raise a check's effective priority one tier. Returns (old, new), or
    /// None for unknown names. The declared priority stays put.
    pub fn escalate(&mut self, name: &str) -> Option<(Priority, Priority)> {
        let entry = self.entries.iter_mut().find(|e| e.meta.name == name)?;
        let old = entry.effective;
        entry.effective = entry.effective.escalated();
        Some((old, entry.effective))
    }

    fn run_one(entry: &CheckEntry, snapshot: &MissionSnapshot) -> CheckResult {
        match entry.check.run(snapshot) {
            Ok(has_issue) => CheckResult {
                name: entry.meta.name.clone(),
                has_issue,
                priority: entry.effective,
                error: None,
            },
            // A faulting check never aborts the sweep; it reads as clean
            // with the error recorded.
            Err(e) => CheckResult {
                name: entry.meta.name.clone(),
                has_issue: false,
                priority: entry.effective,
                error: Some(e.to_string()),
            },
        }
    }

    /// Run every check in descending effective-priority order; stable by
    /// registration order within a tier.
    pub fn run_all(&self, snapshot: &MissionSnapshot) -> Vec<CheckResult> {
        let mut order: Vec<&CheckEntry> = self.entries.iter().collect();
        order.sort_by_key(|e| Reverse(e.effective));
        order.iter().map(|e| Self::run_one(e, snapshot)).collect()
    }

    /// Cheap path: only the top-`limit` checks at or above `min_priority`.
    pub fn run_subset(
        &self,
        snapshot: &MissionSnapshot,
        min_priority: Priority,
        limit: usize,
    ) -> Vec<CheckResult> {
        let mut order: Vec<&CheckEntry> = self
            .entries
            .iter()
            .filter(|e| e.effective >= min_priority)
            .collect();
        order.sort_by_key(|e| Reverse(e.effective));
        order
            .iter()
            .take(limit)
            .map(|e| Self::run_one(e, snapshot))
            .collect()
    }

    /// Learn a previously-unseen issue at runtime. No-op if already known;
    /// otherwise registers (resolving behavior from `resolve`), appends to
    /// the learning history, and persists the descriptor set.
    pub fn learn(
        &mut self,
        store: &dyn KvStore,
        name: &str,
        description: &str,
        priority: Priority,
        resolve: impl Fn(&str) -> Option<Box<dyn Check>>,
    ) -> Result<bool, GuardianError> {
        if self.contains(name) {
            return Ok(false);
        }
        let check = resolve(name).unwrap_or_else(|| Box::new(NeverFires));
        self.register_entry(name, description, priority, true, check);
        record_learning_event(store, "check", name, description)?;
        self.save(store)?;
        Ok(true)
    }

    pub fn save(&self, store: &dyn KvStore) -> Result<(), GuardianError> {
        let stored: Vec<&StoredCheck> = self.entries.iter().map(|e| &e.meta).collect();
        let raw = serde_json::to_string(&stored)?;
        store.set_string(keys::HEALTH_CHECKS, &raw)
    }

    /// Rehydrate persisted descriptors against the dispatch table. Already-
    /// registered names are left alone (first registration wins), so the
    /// curated defaults can never be clobbered by stale persisted state.
    pub fn load(
        &mut self,
        store: &dyn KvStore,
        resolve: impl Fn(&str) -> Option<Box<dyn Check>>,
    ) -> Result<usize, GuardianError> {
        let Some(raw) = store.get_string(keys::HEALTH_CHECKS)? else {
            return Ok(0);
        };
        let stored: Vec<StoredCheck> = serde_json::from_str(&raw)?;
        let mut restored = 0;
        for meta in stored {
            if self.contains(&meta.name) {
                continue;
            }
            let check = resolve(&meta.name).unwrap_or_else(|| Box::new(NeverFires));
            self.entries.push(CheckEntry {
                effective: meta.priority,
                meta,
                check,
            });
            restored += 1;
        }
        Ok(restored)
    }
}
