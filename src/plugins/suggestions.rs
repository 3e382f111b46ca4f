//! Suggestion queue: findings that wait for a human decision.
//!
//! When repairs are not trusted to run on their own, a sweep files each
//! finding here instead. Approval routes the repair through the sandbox;
//! rejection just records who said no and why.

use crate::core::error::GuardianError;
use crate::core::keys;
use crate::core::store::KvStore;
use crate::core::time;
use crate::plugins::checks::Priority;
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::BTreeMap;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SuggestionStatus {
    Pending,
    Approved,
    Rejected,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Suggestion {
    pub id: String,
    pub issue: String,
    #[serde(default)]
    pub record_id: Option<String>,
    #[serde(default)]
    pub record_name: Option<String>,
    pub description: String,
    pub current_value: String,
    pub proposed_fix: String,
    pub severity: Priority,
    pub status: SuggestionStatus,
    pub created_at: String,
    #[serde(default)]
    pub resolved_by: Option<String>,
    #[serde(default)]
    pub resolved_at: Option<String>,
    #[serde(default)]
    pub user_feedback: Option<String>,
    #[serde(default)]
    pub fix_result: Option<String>,
    #[serde(default)]
    pub fix_success: Option<bool>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SuggestionStatistics {
    pub total: usize,
    pub pending: usize,
    pub approved: usize,
    pub rejected: usize,
    pub approval_rate: f64,
    pub by_severity: BTreeMap<String, usize>,
}

#[derive(Default)]
pub struct SuggestionQueue {
    items: Vec<Suggestion>,
}

impl SuggestionQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(store: &dyn KvStore) -> Result<Self, GuardianError> {
        let items = match store.get_string(keys::SUGGESTIONS)? {
            Some(raw) => serde_json::from_str(&raw)?,
            None => Vec::new(),
        };
        Ok(Self { items })
    }

    pub fn save(&self, store: &dyn KvStore) -> Result<(), GuardianError> {
        let raw = serde_json::to_string(&self.items)?;
        store.set_string(keys::SUGGESTIONS, &raw)
    }

    /// File a new pending suggestion. A pending duplicate for the same
    /// (issue, record) pair is not filed twice; returns the existing id.
    #[allow(clippy::too_many_arguments)]
    pub fn file(
        &mut self,
        store: &dyn KvStore,
        issue: &str,
        record_id: Option<&str>,
        record_name: Option<&str>,
        description: &str,
        current_value: &str,
        proposed_fix: &str,
        severity: Priority,
    ) -> Result<String, GuardianError> {
        if let Some(existing) = self.items.iter().find(|s| {
            s.status == SuggestionStatus::Pending
                && s.issue == issue
                && s.record_id.as_deref() == record_id
        }) {
            return Ok(existing.id.clone());
        }
        let suggestion = Suggestion {
            id: time::new_event_id(),
            issue: issue.to_string(),
            record_id: record_id.map(|s| s.to_string()),
            record_name: record_name.map(|s| s.to_string()),
            description: description.to_string(),
            current_value: current_value.to_string(),
            proposed_fix: proposed_fix.to_string(),
            severity,
            status: SuggestionStatus::Pending,
            created_at: time::now_epoch_z(),
            resolved_by: None,
            resolved_at: None,
            user_feedback: None,
            fix_result: None,
            fix_success: None,
        };
        let id = suggestion.id.clone();
        self.items.push(suggestion);
        self.save(store)?;
        Ok(id)
    }

    pub fn get(&self, id: &str) -> Option<&Suggestion> {
        self.items.iter().find(|s| s.id == id)
    }

    /// Pending suggestions, most severe first, newest first within a tier.
    pub fn pending(
        &self,
        limit: usize,
        offset: usize,
        severity: Option<Priority>,
        issue: Option<&str>,
    ) -> Vec<&Suggestion> {
        let mut matches: Vec<&Suggestion> = self
            .items
            .iter()
            .filter(|s| s.status == SuggestionStatus::Pending)
            .filter(|s| severity.is_none_or(|sev| s.severity == sev))
            .filter(|s| issue.is_none_or(|i| s.issue == i))
            .collect();
        matches.sort_by_key(|s| (Reverse(s.severity), Reverse(s.created_at.clone())));
        matches.into_iter().skip(offset).take(limit).collect()
    }

    pub fn pending_count(&self) -> usize {
        self.items
            .iter()
            .filter(|s| s.status == SuggestionStatus::Pending)
            .count()
    }

    /// Transition a pending suggestion to approved, recording the fix
    /// outcome. Errors if unknown or not pending.
    pub fn mark_approved(
        &mut self,
        store: &dyn KvStore,
        id: &str,
        approved_by: &str,
        feedback: Option<&str>,
        fix_result: &str,
        fix_success: bool,
    ) -> Result<(), GuardianError> {
        let suggestion = self.take_pending(id)?;
        suggestion.status = SuggestionStatus::Approved;
        suggestion.resolved_by = Some(approved_by.to_string());
        suggestion.resolved_at = Some(time::now_epoch_z());
        suggestion.user_feedback = feedback.map(|s| s.to_string());
        suggestion.fix_result = Some(fix_result.to_string());
        suggestion.fix_success = Some(fix_success);
        self.save(store)
    }

    pub fn mark_rejected(
        &mut self,
        store: &dyn KvStore,
        id: &str,
        rejected_by: &str,
        feedback: Option<&str>,
    ) -> Result<(), GuardianError> {
        let suggestion = self.take_pending(id)?;
        suggestion.status = SuggestionStatus::Rejected;
        suggestion.resolved_by = Some(rejected_by.to_string());
        suggestion.resolved_at = Some(time::now_epoch_z());
        suggestion.user_feedback = feedback.map(|s| s.to_string());
        self.save(store)
    }

    fn take_pending(&mut self, id: &str) -> Result<&mut Suggestion, GuardianError> {
        let suggestion = self
            .items
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or_else(|| GuardianError::NotFound(format!("suggestion {}", id)))?;
        if suggestion.status != SuggestionStatus::Pending {
            return Err(GuardianError::ValidationError(format!(
                "suggestion {} is not pending",
                id
            )));
        }
        Ok(suggestion)
    }

    pub fn statistics(&self) -> SuggestionStatistics {
        let total = self.items.len();
        let pending = self.pending_count();
        let approved = self
            .items
            .iter()
            .filter(|s| s.status == SuggestionStatus::Approved)
            .count();
        let rejected = self
            .items
            .iter()
            .filter(|s| s.status == SuggestionStatus::Rejected)
            .count();
        let resolved = approved + rejected;
        let approval_rate = if resolved > 0 {
            approved as f64 / resolved as f64 * 100.0
        } else {
            0.0
        };
        let mut by_severity = BTreeMap::new();
        for s in &self.items {
            *by_severity
                .entry(s.severity.as_str().to_string())
                .or_insert(0usize) += 1;
        }
        SuggestionStatistics {
            total,
            pending,
            approved,
            rejected,
            approval_rate,
            by_severity,
        }
    }
}
