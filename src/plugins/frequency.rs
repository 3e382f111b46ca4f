//! Issue frequency tracking: occurrence counts per issue name, persisted,
//! driving escalation recommendations once a threshold is crossed.

use crate::core::error::GuardianError;
use crate::core::keys;
use crate::core::store::KvStore;
use std::collections::BTreeMap;

pub const DEFAULT_ESCALATION_THRESHOLD: u32 = 3;

pub struct IssueFrequencyTracker {
    counts: BTreeMap<String, u32>,
    threshold: u32,
}

impl IssueFrequencyTracker {
    pub fn new(threshold: u32) -> Self {
        Self {
            counts: BTreeMap::new(),
            threshold,
        }
    }

    pub fn load(store: &dyn KvStore, threshold: u32) -> Result<Self, GuardianError> {
        let counts = match store.get_string(keys::ISSUE_FREQUENCY)? {
            Some(raw) => serde_json::from_str(&raw)?,
            None => BTreeMap::new(),
        };
        Ok(Self { counts, threshold })
    }

    /// Increment and persist the count for `issue`. Returns the new count.
    pub fn record(&mut self, store: &dyn KvStore, issue: &str) -> Result<u32, GuardianError> {
        let count = self.counts.entry(issue.to_string()).or_insert(0);
        *count += 1;
        let new = *count;
        let raw = serde_json::to_string(&self.counts)?;
        store.set_string(keys::ISSUE_FREQUENCY, &raw)?;
        Ok(new)
    }

    pub fn count(&self, issue: &str) -> u32 {
        self.counts.get(issue).copied().unwrap_or(0)
    }

    /// True once the issue has recurred `threshold` times.
    pub fn escalation_candidate(&self, issue: &str) -> bool {
        self.count(issue) >= self.threshold
    }

    pub fn counts(&self) -> &BTreeMap<String, u32> {
        &self.counts
    }
}
