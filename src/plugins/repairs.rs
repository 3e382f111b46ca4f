//! Repair registry: named, priority-ranked mutating strategies, one per
//! issue kind.
//!
//! Same persistence/rehydration pattern as the check registry. Repairs are
//! keyed `fix_<issue>` so a failing check maps to its strategy by name.

use crate::core::error::GuardianError;
use crate::core::keys;
use crate::core::mission::MissionSnapshot;
use crate::core::store::KvStore;
use crate::core::time;
use crate::plugins::checks::{Priority, record_learning_event};
use serde::{Deserialize, Serialize};

/// A mutating strategy resolving one issue kind. Returns the field-level
/// changes it made; an empty list means the state was already sound (the
/// idempotence contract: re-running is a no-op).
pub trait Repair: Send + Sync {
    fn apply(&self, snapshot: &mut MissionSnapshot) -> Result<Vec<String>, GuardianError>;
}

/// Fallback for names with no known implementation.
pub struct NoopRepair;

impl Repair for NoopRepair {
    fn apply(&self, _snapshot: &mut MissionSnapshot) -> Result<Vec<String>, GuardianError> {
        Ok(Vec::new())
    }
}

/// Registry key for the repair resolving `issue`.
pub fn repair_key(issue: &str) -> String {
    format!("fix_{}", issue)
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct StoredRepair {
    pub name: String,
    pub description: String,
    pub priority: Priority,
    pub learned: bool,
    pub created_at: String,
}

struct RepairEntry {
    meta: StoredRepair,
    repair: Box<dyn Repair>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RepairOutcome {
    pub name: String,
    pub changes: Vec<String>,
    pub error: Option<String>,
}

#[derive(Default)]
pub struct RepairRegistry {
    entries: Vec<RepairEntry>,
}

impl RepairRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// First registration wins; a duplicate name is an idempotent no-op.
    pub fn register(
        &mut self,
        name: &str,
        description: &str,
        priority: Priority,
        repair: Box<dyn Repair>,
    ) -> bool {
        self.register_entry(name, description, priority, false, repair)
    }

    fn register_entry(
        &mut self,
        name: &str,
        description: &str,
        priority: Priority,
        learned: bool,
        repair: Box<dyn Repair>,
    ) -> bool {
        if self.contains(name) {
            return false;
        }
        self.entries.push(RepairEntry {
            meta: StoredRepair {
                name: name.to_string(),
                description: description.to_string(),
                priority,
                learned,
                created_at: time::now_epoch_z(),
            },
            repair,
        });
        true
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|e| e.meta.name == name)
    }

    pub fn contains_for_issue(&self, issue: &str) -> bool {
        self.contains(&repair_key(issue))
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

    /// Apply the repair registered for `issue` to `snapshot`. A missing
    /// strategy or a faulting one is reported in the outcome, never raised;
    /// a bad repair must not abort the sweep.
    pub fn apply_for_issue(&self, issue: &str, snapshot: &mut MissionSnapshot) -> RepairOutcome {
        let key = repair_key(issue);
        let Some(entry) = self.entries.iter().find(|e| e.meta.name == key) else {
            return RepairOutcome {
                name: key.clone(),
                changes: Vec::new(),
                error: Some(format!("no repair registered for issue '{}'", issue)),
            };
        };
        match entry.repair.apply(snapshot) {
            Ok(changes) => RepairOutcome {
                name: key,
                changes,
                error: None,
            },
            Err(e) => RepairOutcome {
                name: key,
                changes: Vec::new(),
                error: Some(e.to_string()),
            },
        }
    }

    /// Learn a repair for a previously-unseen issue. No-op if known.
    pub fn learn(
        &mut self,
        store: &dyn KvStore,
        issue: &str,
        description: &str,
        priority: Priority,
        resolve: impl Fn(&str) -> Option<Box<dyn Repair>>,
    ) -> Result<bool, GuardianError> {
        let key = repair_key(issue);
        if self.contains(&key) {
            return Ok(false);
        }
        let repair = resolve(&key).unwrap_or_else(|| Box::new(NoopRepair));
        self.register_entry(&key, description, priority, true, repair);
        record_learning_event(store, "repair", &key, description)?;
        self.save(store)?;
        Ok(true)
    }

    pub fn save(&self, store: &dyn KvStore) -> Result<(), GuardianError> {
        let stored: Vec<&StoredRepair> = self.entries.iter().map(|e| &e.meta).collect();
        let raw = serde_json::to_string(&stored)?;
        store.set_string(keys::REPAIRS, &raw)
    }

    pub fn load(
        &mut self,
        store: &dyn KvStore,
        resolve: impl Fn(&str) -> Option<Box<dyn Repair>>,
    ) -> Result<usize, GuardianError> {
        let Some(raw) = store.get_string(keys::REPAIRS)? else {
            return Ok(0);
        };
        let stored: Vec<StoredRepair> = serde_json::from_str(&raw)?;
        let mut restored = 0;
        for meta in stored {
            if self.contains(&meta.name) {
                continue;
            }
            let repair = resolve(&meta.name).unwrap_or_else(|| Box::new(NoopRepair));
            self.entries.push(RepairEntry { meta, repair });
            restored += 1;
        }
        Ok(restored)
    }
}
