//! Bounded append-only history of issue -> action events.
//!
//! Fixed-capacity ring buffer: oldest entries are evicted first. Persisted
//! independently of the mission lists; the log is diagnostic, not
//! authoritative, so a crash between saves is tolerable.

use crate::core::error::GuardianError;
use crate::core::keys;
use crate::core::store::KvStore;
use crate::core::time;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};

pub const DEFAULT_CAPACITY: usize = 100;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RepairLogEntry {
    pub ts: String,
    pub issue: String,
    pub action: String,
    #[serde(default)]
    pub record_id: Option<String>,
}

impl RepairLogEntry {
    pub fn new(issue: &str, action: &str, record_id: Option<&str>) -> Self {
        Self {
            ts: time::now_epoch_z(),
            issue: issue.to_string(),
            action: action.to_string(),
            record_id: record_id.map(|s| s.to_string()),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RepairLogSummary {
    pub total: usize,
    pub by_issue: BTreeMap<String, usize>,
    pub latest_ts: Option<String>,
}

pub struct RepairLog {
    entries: VecDeque<RepairLogEntry>,
    capacity: usize,
}

impl RepairLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    pub fn load(store: &dyn KvStore, capacity: usize) -> Result<Self, GuardianError> {
        let mut log = Self::new(capacity);
        if let Some(lines) = store.get_string_list(keys::REPAIR_LOG)? {
            for line in lines {
                let entry: RepairLogEntry = serde_json::from_str(&line)?;
                log.push(entry);
            }
        }
        Ok(log)
    }

    fn push(&mut self, entry: RepairLogEntry) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    /// Append and persist. Eviction happens before the write so the stored
    /// form never exceeds capacity.
    pub fn append(
        &mut self,
        store: &dyn KvStore,
        entry: RepairLogEntry,
    ) -> Result<(), GuardianError> {
        self.push(entry);
        self.save(store)
    }

    pub fn save(&self, store: &dyn KvStore) -> Result<(), GuardianError> {
        let mut lines = Vec::with_capacity(self.entries.len());
        for entry in &self.entries {
            lines.push(serde_json::to_string(entry)?);
        }
        store.set_string_list(keys::REPAIR_LOG, &lines)
    }

    pub fn entries(&self) -> impl Iterator<Item = &RepairLogEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn summary(&self) -> RepairLogSummary {
        let mut by_issue = BTreeMap::new();
        for entry in &self.entries {
            *by_issue.entry(entry.issue.clone()).or_insert(0usize) += 1;
        }
        RepairLogSummary {
            total: self.entries.len(),
            by_issue,
            latest_ts: self.entries.back().map(|e| e.ts.clone()),
        }
    }
}
