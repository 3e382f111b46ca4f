//! Consistency coordinator: the single owner of the authoritative mission
//! lists.
//!
//! Everything that mutates mission state funnels through here. Checks see
//! the lists by reference; the sandbox gets a deep copy; commits come back
//! through this module's save path. Within one sweep, all in-memory
//! mutations happen first and persistence is written once at the end, so a
//! crash can never leave a half-repaired stored snapshot.

use crate::core::config::GuardianConfig;
use crate::core::error::GuardianError;
use crate::core::keys;
use crate::core::mission::{MissionRecord, MissionSnapshot, MissionStatistics};
use crate::core::store::KvStore;
use crate::core::time;
use crate::plugins::checks::{CheckResult, HealthCheckRegistry, Priority};
use crate::plugins::events::{GuardianEvent, GuardianEvents};
use crate::plugins::frequency::IssueFrequencyTracker;
use crate::plugins::repair_log::{RepairLog, RepairLogEntry, RepairLogSummary};
use crate::plugins::repairs::RepairRegistry;
use crate::plugins::sandbox::{SandboxReport, SandboxSimulator, consistency_assertions, fingerprint};
use crate::plugins::suggestions::{Suggestion, SuggestionQueue, SuggestionStatistics};
use crate::subsystems;
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Clone, Serialize)]
pub struct SweepSummary {
    pub ts: String,
    pub findings: Vec<String>,
    pub repaired_issues: Vec<(String, Priority)>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AreaHealth {
    pub name: String,
    pub status: String,
    pub has_issue: bool,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub overall: String,
    pub issues_found: usize,
    pub areas: Vec<AreaHealth>,
    pub pending_suggestions: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ApprovalResult {
    pub suggestion_id: String,
    pub fix_applied: bool,
    pub fix_result: String,
}

pub struct ConsistencyCoordinator {
    store: Arc<dyn KvStore>,
    config: GuardianConfig,
    events: Arc<GuardianEvents>,
    snapshot: MissionSnapshot,
    checks: HealthCheckRegistry,
    repairs: RepairRegistry,
    frequency: IssueFrequencyTracker,
    repair_log: RepairLog,
    suggestions: SuggestionQueue,
    pending_sandbox: Option<SandboxReport>,
    repaired_this_sweep: Vec<(String, Priority)>,
}

impl ConsistencyCoordinator {
    /// Composition root for the engine state: bootstraps the registries
    /// from the static table, then rehydrates learned entries and all
    /// persisted engine state from the store.
    pub fn new(
        store: Arc<dyn KvStore>,
        config: GuardianConfig,
        events: Arc<GuardianEvents>,
    ) -> Result<Self, GuardianError> {
        let mut checks = HealthCheckRegistry::new();
        let mut repairs = RepairRegistry::new();
        subsystems::register_defaults(&mut checks, &mut repairs);
        checks.load(store.as_ref(), subsystems::resolve_check)?;
        repairs.load(store.as_ref(), subsystems::resolve_repair)?;

        let frequency = IssueFrequencyTracker::load(store.as_ref(), config.escalation_threshold)?;
        let repair_log = RepairLog::load(store.as_ref(), config.repair_log_capacity)?;
        let suggestions = SuggestionQueue::load(store.as_ref())?;
        let snapshot = load_snapshot(store.as_ref())?;

        Ok(Self {
            store,
            config,
            events,
            snapshot,
            checks,
            repairs,
            frequency,
            repair_log,
            suggestions,
            pending_sandbox: None,
            repaired_this_sweep: Vec::new(),
        })
    }

    pub fn snapshot(&self) -> &MissionSnapshot {
        &self.snapshot
    }

    pub fn checks(&self) -> &HealthCheckRegistry {
        &self.checks
    }

    pub fn repairs(&self) -> &RepairRegistry {
        &self.repairs
    }

    pub fn frequency(&self) -> &IssueFrequencyTracker {
        &self.frequency
    }

    pub fn repair_log_summary(&self) -> RepairLogSummary {
        self.repair_log.summary()
    }

    pub fn repair_log_entries(&self) -> Vec<RepairLogEntry> {
        self.repair_log.entries().cloned().collect()
    }

    /// Replace the in-memory lists wholesale (import/seed path) and save.
    pub fn replace_records(&mut self, snapshot: MissionSnapshot) -> Result<(), GuardianError> {
        self.snapshot = snapshot;
        self.save()
    }

    /// Persist the lists: active+completed under `missions`, deleted under
    /// `deleted_missions`.
    pub fn save(&self) -> Result<(), GuardianError> {
        let mut merged: Vec<&MissionRecord> = self.snapshot.active.iter().collect();
        merged.extend(self.snapshot.completed.iter());
        let raw = serde_json::to_string(&merged)?;
        self.store.set_string(keys::MISSIONS, &raw)?;
        let raw_deleted = serde_json::to_string(&self.snapshot.deleted)?;
        self.store.set_string(keys::DELETED_MISSIONS, &raw_deleted)
    }

    pub fn reload(&mut self) -> Result<(), GuardianError> {
        self.snapshot = load_snapshot(self.store.as_ref())?;
        Ok(())
    }

    /// Persist a pre-repair copy under `missions_backup` for manual restore.
    pub fn backup(&self) -> Result<(), GuardianError> {
        let raw = serde_json::to_string(&self.snapshot)?;
        self.store.set_string(keys::MISSIONS_BACKUP, &raw)
    }

    /// Adopt the `missions_backup` snapshot as the live state. Returns
    /// false when no backup exists.
    pub fn restore_backup(&mut self) -> Result<bool, GuardianError> {
        let Some(raw) = self.store.get_string(keys::MISSIONS_BACKUP)? else {
            return Ok(false);
        };
        self.snapshot = serde_json::from_str(&raw)?;
        self.save()?;
        Ok(true)
    }

    pub fn run_checks(&self) -> Vec<CheckResult> {
        self.checks.run_all(&self.snapshot)
    }

    /// Cheap frequent-poll path: top three checks at high or above.
    pub fn run_quick_scan(&self) -> Vec<CheckResult> {
        self.checks.run_subset(&self.snapshot, Priority::High, 3)
    }

    /// Full-sweep validation. Fixed order: global uniqueness first (the
    /// duplicate checks are critical-priority, so the registry ordering
    /// guarantees it), then per-record structural validity, then a final
    /// reload round trip to confirm repairs survived persistence.
    pub fn validate_all(&mut self, attempt_repair: bool) -> Vec<String> {
        let mut findings = Vec::new();
        let mut failing: Vec<(String, Priority)> = Vec::new();
        self.repaired_this_sweep.clear();

        if attempt_repair {
            if let Err(e) = self.backup() {
                findings.push(format!("persistence fault: backup skipped: {}", e));
            }
        }

        let results = self.checks.run_all(&self.snapshot);
        for result in results {
            if let Some(error) = &result.error {
                findings.push(format!("check '{}' faulted: {}", result.name, error));
                continue;
            }
            if !result.has_issue {
                continue;
            }
            findings.push(format!(
                "[{}] issue detected: {}",
                result.priority, result.name
            ));
            if let Err(e) = self.note_issue(&result.name) {
                findings.push(format!("persistence fault: frequency not recorded: {}", e));
            }
            failing.push((result.name.clone(), result.priority));
        }

        if attempt_repair && !failing.is_empty() {
            self.repair_failing(&failing, &mut findings);
        }

        // Record-level detail beyond the boolean checks.
        let now = time::now_epoch_ms();
        for record in self.snapshot.all_records() {
            for finding in record.structural_findings(now) {
                findings.push(format!("detail: {}", finding));
            }
        }

        if attempt_repair {
            match self.save() {
                Ok(()) => match load_snapshot(self.store.as_ref()) {
                    Ok(reloaded) => {
                        for failure in consistency_assertions(&reloaded) {
                            findings.push(format!("post-reload: {}", failure));
                        }
                    }
                    Err(e) => findings.push(format!("persistence fault: reload failed: {}", e)),
                },
                // In-memory state stays authoritative until the next
                // successful save.
                Err(e) => findings.push(format!("persistence fault: save failed: {}", e)),
            }
            if let Err(e) = self.repair_log.save(self.store.as_ref()) {
                findings.push(format!("persistence fault: repair log not saved: {}", e));
            }
        }

        findings
    }

    /// Full sweep with a machine-readable summary for the scheduler.
    pub fn full_sweep(&mut self) -> SweepSummary {
        let findings = self.validate_all(true);
        SweepSummary {
            ts: time::now_epoch_z(),
            findings,
            repaired_issues: self.repaired_this_sweep.clone(),
        }
    }

    fn note_issue(&mut self, issue: &str) -> Result<(), GuardianError> {
        let count = self.frequency.record(self.store.as_ref(), issue)?;
        if self.frequency.escalation_candidate(issue) {
            if let Some((old, new)) = self.checks.escalate(issue) {
                if old != new {
                    self.events.emit(GuardianEvent::Learning {
                        message: format!(
                            "issue '{}' recurred {} times; priority escalated {} -> {}",
                            issue, count, old, new
                        ),
                    });
                }
            }
        }
        Ok(())
    }

    /// Repair every failing issue from one sweep, honoring the trust
    /// setting. Trusted: each repair mutates the live lists directly.
    /// Untrusted: all repairs are applied to a single sandbox clone in
    /// priority order, the assertion suite runs once against the cumulative
    /// result, and the live lists only adopt a fully verified state. Either
    /// way, memory only; the sweep's single save happens afterwards.
    fn repair_failing(&mut self, failing: &[(String, Priority)], findings: &mut Vec<String>) {
        if self.config.trusted_repairs {
            for (issue, priority) in failing {
                let outcome = self.repairs.apply_for_issue(issue, &mut self.snapshot);
                match &outcome.error {
                    Some(error) => {
                        findings.push(format!("repair '{}' skipped: {}", outcome.name, error))
                    }
                    None => {
                        self.record_repairs(issue, *priority, &outcome.changes);
                        findings.extend(outcome.changes.iter().map(|c| format!("repaired: {}", c)));
                    }
                }
            }
            return;
        }

        let mut sandbox = self.snapshot.clone();
        let mut applied: Vec<(String, Priority, Vec<String>)> = Vec::new();
        for (issue, priority) in failing {
            let outcome = self.repairs.apply_for_issue(issue, &mut sandbox);
            match outcome.error {
                Some(error) => {
                    findings.push(format!("repair '{}' skipped: {}", outcome.name, error))
                }
                None => applied.push((issue.clone(), *priority, outcome.changes)),
            }
        }
        let failures = consistency_assertions(&sandbox);
        if failures.is_empty() {
            self.snapshot = sandbox;
            for (issue, priority, changes) in applied {
                self.record_repairs(&issue, priority, &changes);
                findings.extend(changes.iter().map(|c| format!("repaired: {}", c)));
            }
        } else {
            // Live state stays untouched; the defects surface again on the
            // next sweep.
            for failure in failures {
                findings.push(format!("sandbox rejected sweep repairs: {}", failure));
            }
        }
    }

    fn record_repairs(&mut self, issue: &str, priority: Priority, changes: &[String]) {
        if changes.is_empty() {
            return;
        }
        self.repaired_this_sweep.push((issue.to_string(), priority));
        for change in changes {
            self.repair_log
                .append(self.store.as_ref(), RepairLogEntry::new(issue, change, None))
                .ok();
            self.events
                .emit(GuardianEvent::issue("repair", issue, change, None));
        }
    }

    /// Deterministic duplicate-identifier repair: first occurrence wins for
    /// mission ids and notification ids alike.
    pub fn repair_duplicate_identifiers(&mut self) -> Vec<String> {
        let mut changes = self.named_repair(subsystems::DUPLICATE_MISSION_ID);
        changes.extend(self.named_repair(subsystems::DUPLICATE_NOTIFICATION_ID));
        changes
    }

    pub fn repair_empty_titles(&mut self) -> Vec<String> {
        self.named_repair(subsystems::EMPTY_TITLE)
    }

    pub fn repair_contradictory_completion(&mut self) -> Vec<String> {
        self.named_repair(subsystems::CONTRADICTORY_COMPLETION)
    }

    pub fn repair_invalid_counters(&mut self) -> Vec<String> {
        self.named_repair(subsystems::INVALID_COUNTERS)
    }

    pub fn repair_invalid_mastery_values(&mut self) -> Vec<String> {
        self.named_repair(subsystems::INVALID_MASTERY)
    }

    pub fn repair_empty_subtask_names(&mut self) -> Vec<String> {
        self.named_repair(subsystems::EMPTY_SUBTASK_NAME)
    }

    /// One targeted direct repair plus its bookkeeping. Idempotent: with no
    /// matching defects the repair returns no changes and persistence is
    /// never touched.
    fn named_repair(&mut self, issue: &str) -> Vec<String> {
        let priority = self
            .checks
            .effective_priority(issue)
            .unwrap_or(Priority::Medium);
        let outcome = self.repairs.apply_for_issue(issue, &mut self.snapshot);
        if let Some(error) = &outcome.error {
            self.events.emit(GuardianEvent::Learning {
                message: format!("repair '{}' skipped: {}", outcome.name, error),
            });
            return Vec::new();
        }
        if outcome.changes.is_empty() {
            return Vec::new();
        }
        self.record_repairs(issue, priority, &outcome.changes);
        if let Err(e) = self.save() {
            self.events.emit(GuardianEvent::Learning {
                message: format!("persistence fault after repair '{}': {}", issue, e),
            });
        }
        outcome.changes
    }

    /// Run a sandbox simulation without committing; the report is retained
    /// so a later `commit_pending` can adopt it.
    pub fn simulate_repair(&mut self, issue: &str) -> SandboxReport {
        let report = SandboxSimulator::new(&self.repairs).simulate(issue, &self.snapshot);
        self.pending_sandbox = Some(report.clone());
        report
    }

    /// Adopt a previously simulated result. Refuses a failed report and
    /// refuses to commit over live state that drifted since simulation.
    pub fn commit_sandbox(&mut self, report: SandboxReport) -> Result<(), GuardianError> {
        if !report.success {
            return Err(GuardianError::ValidationError(format!(
                "refusing to commit failed sandbox report for '{}'",
                report.issue_key
            )));
        }
        let current = fingerprint(&self.snapshot)?;
        if current != report.base_fingerprint {
            return Err(GuardianError::StoreError(format!(
                "live state changed since simulation of '{}'",
                report.issue_key
            )));
        }
        self.snapshot = report.resulting_state.clone();
        self.save()?;
        for change in &report.changes {
            self.repair_log.append(
                self.store.as_ref(),
                RepairLogEntry::new(&report.issue_key, change, None),
            )?;
            self.events
                .emit(GuardianEvent::issue("repair", &report.issue_key, change, None));
        }
        self.pending_sandbox = None;
        Ok(())
    }

    pub fn commit_pending(&mut self) -> Result<(), GuardianError> {
        let report = self
            .pending_sandbox
            .take()
            .ok_or_else(|| GuardianError::NotFound("no pending sandbox report".to_string()))?;
        self.commit_sandbox(report)
    }

    pub fn has_pending_sandbox(&self) -> bool {
        self.pending_sandbox.is_some()
    }

    pub fn statistics(&self) -> MissionStatistics {
        self.snapshot.statistics()
    }

    pub fn health_report(&self) -> HealthReport {
        let results = self.run_checks();
        let issues_found = results.iter().filter(|r| r.has_issue).count();
        let areas = results
            .into_iter()
            .map(|r| AreaHealth {
                status: if r.error.is_some() {
                    "error".to_string()
                } else if r.has_issue {
                    "warning".to_string()
                } else {
                    "healthy".to_string()
                },
                name: r.name,
                has_issue: r.has_issue,
                error: r.error,
            })
            .collect();
        HealthReport {
            overall: if issues_found == 0 {
                "healthy".to_string()
            } else {
                "warning".to_string()
            },
            issues_found,
            areas,
            pending_suggestions: self.suggestions.pending_count(),
        }
    }

    /// File suggestions for every current finding instead of repairing.
    /// Returns how many new suggestions were filed.
    pub fn scan_suggestions(&mut self) -> Result<usize, GuardianError> {
        let before = self.suggestions.pending_count();
        let now = time::now_epoch_ms();
        let results = self.checks.run_all(&self.snapshot);
        for result in results.iter().filter(|r| r.has_issue && r.error.is_none()) {
            let proposed = subsystems::DEFAULTS
                .iter()
                .find(|d| d.name == result.name)
                .map(|d| d.repair_description)
                .unwrap_or("run the registered repair");
            let affected = affected_records(&self.snapshot, &result.name, now);
            if affected.is_empty() {
                self.suggestions.file(
                    self.store.as_ref(),
                    &result.name,
                    None,
                    None,
                    &format!("detected by check '{}'", result.name),
                    "see sweep findings",
                    proposed,
                    result.priority,
                )?;
            }
            for (record_id, record_name, current_value) in affected {
                self.suggestions.file(
                    self.store.as_ref(),
                    &result.name,
                    Some(&record_id),
                    Some(&record_name),
                    &format!("detected by check '{}'", result.name),
                    &current_value,
                    proposed,
                    result.priority,
                )?;
            }
        }
        Ok(self.suggestions.pending_count().saturating_sub(before))
    }

    pub fn pending_suggestions(
        &self,
        limit: usize,
        offset: usize,
        severity: Option<Priority>,
        issue: Option<&str>,
    ) -> Vec<&Suggestion> {
        self.suggestions.pending(limit, offset, severity, issue)
    }

    pub fn suggestion_statistics(&self) -> SuggestionStatistics {
        self.suggestions.statistics()
    }

    /// Approve a suggestion: its repair runs through the sandbox and the
    /// verified result is committed. The suggestion records the outcome
    /// either way.
    pub fn approve_suggestion(
        &mut self,
        id: &str,
        approved_by: &str,
        feedback: Option<&str>,
    ) -> Result<ApprovalResult, GuardianError> {
        let issue = self
            .suggestions
            .get(id)
            .ok_or_else(|| GuardianError::NotFound(format!("suggestion {}", id)))?
            .issue
            .clone();
        let report = self.simulate_repair(&issue);
        let fix_applied = report.success;
        let fix_result = report.summary.clone();
        if report.success {
            self.commit_sandbox(report)?;
        } else {
            self.pending_sandbox = None;
        }
        self.suggestions.mark_approved(
            self.store.as_ref(),
            id,
            approved_by,
            feedback,
            &fix_result,
            fix_applied,
        )?;
        self.events.emit(GuardianEvent::issue(
            "suggestion_approved",
            &issue,
            &fix_result,
            None,
        ));
        Ok(ApprovalResult {
            suggestion_id: id.to_string(),
            fix_applied,
            fix_result,
        })
    }

    pub fn reject_suggestion(
        &mut self,
        id: &str,
        rejected_by: &str,
        feedback: Option<&str>,
    ) -> Result<(), GuardianError> {
        let issue = self
            .suggestions
            .get(id)
            .ok_or_else(|| GuardianError::NotFound(format!("suggestion {}", id)))?
            .issue
            .clone();
        self.suggestions
            .mark_rejected(self.store.as_ref(), id, rejected_by, feedback)?;
        self.events.emit(GuardianEvent::issue(
            "suggestion_rejected",
            &issue,
            "left unrepaired",
            None,
        ));
        Ok(())
    }

    /// Learn a previously-unseen check at runtime.
    pub fn learn_check(
        &mut self,
        name: &str,
        description: &str,
        priority: Priority,
    ) -> Result<bool, GuardianError> {
        let learned = self.checks.learn(
            self.store.as_ref(),
            name,
            description,
            priority,
            subsystems::resolve_check,
        )?;
        if learned {
            self.events.emit(GuardianEvent::Learning {
                message: format!("learned check '{}' ({})", name, priority),
            });
        }
        Ok(learned)
    }

    pub fn learn_repair(
        &mut self,
        issue: &str,
        description: &str,
        priority: Priority,
    ) -> Result<bool, GuardianError> {
        let learned = self.repairs.learn(
            self.store.as_ref(),
            issue,
            description,
            priority,
            subsystems::resolve_repair,
        )?;
        if learned {
            self.events.emit(GuardianEvent::Learning {
                message: format!("learned repair for '{}' ({})", issue, priority),
            });
        }
        Ok(learned)
    }
}

/// Per-record detail for one issue kind, used when filing suggestions.
/// Each entry is (record id, record name, current value).
fn affected_records(
    snapshot: &MissionSnapshot,
    issue: &str,
    now: u64,
) -> Vec<(String, String, String)> {
    match issue {
        subsystems::DUPLICATE_MISSION_ID => snapshot
            .duplicate_ids()
            .into_iter()
            .map(|id| (id.clone(), format!("records sharing id {}", id), id))
            .collect(),
        subsystems::DUPLICATE_NOTIFICATION_ID => snapshot
            .duplicate_notification_ids()
            .into_iter()
            .map(|id| {
                (
                    format!("notification:{}", id),
                    format!("records sharing notification id {}", id),
                    id.to_string(),
                )
            })
            .collect(),
        _ => snapshot
            .all_records()
            .filter_map(|r| {
                record_issue_value(r, issue, now)
                    .map(|value| (r.id.clone(), r.title.clone(), value))
            })
            .collect(),
    }
}

/// The offending value for `issue` on one record, if that record has it.
fn record_issue_value(record: &MissionRecord, issue: &str, now: u64) -> Option<String> {
    match issue {
        subsystems::EMPTY_TITLE if record.title.trim().is_empty() => {
            Some("title is empty".to_string())
        }
        subsystems::CONTRADICTORY_COMPLETION
            if record.completion.is_completed && record.completion.has_failed =>
        {
            Some("is_completed=true, has_failed=true".to_string())
        }
        subsystems::INVALID_COUNTERS
            if (record.is_counter_based
                && (record.counters.current < 0 || record.counters.target < 0))
                || record.subtasks.iter().any(|s| {
                    s.current_count < 0 || s.current_completions < 0 || s.required_completions < 0
                }) =>
        {
            Some(format!(
                "counters {}/{}",
                record.counters.current, record.counters.target
            ))
        }
        subsystems::INVALID_MASTERY
            if record.mastery.as_ref().is_some_and(|m| m.value <= 0.0)
                || record
                    .subtasks
                    .iter()
                    .any(|s| s.mastery.as_ref().is_some_and(|m| m.value <= 0.0)) =>
        {
            Some("non-positive mastery value".to_string())
        }
        subsystems::EMPTY_SUBTASK_NAME
            if record.subtasks.iter().any(|s| s.name.trim().is_empty()) =>
        {
            Some("subtask with empty name".to_string())
        }
        subsystems::FUTURE_CREATED_AT
            if record.created_at.is_some_and(|c| c > now) =>
        {
            Some(format!("created_at={:?}", record.created_at))
        }
        _ => None,
    }
}

/// Load the lists: `missions` holds active and completed together (split by
/// the completion flag), `deleted_missions` the rest.
pub fn load_snapshot(store: &dyn KvStore) -> Result<MissionSnapshot, GuardianError> {
    let merged: Vec<MissionRecord> = match store.get_string(keys::MISSIONS)? {
        Some(raw) => serde_json::from_str(&raw)?,
        None => Vec::new(),
    };
    let deleted: Vec<MissionRecord> = match store.get_string(keys::DELETED_MISSIONS)? {
        Some(raw) => serde_json::from_str(&raw)?,
        None => Vec::new(),
    };
    let (completed, active): (Vec<_>, Vec<_>) = merged
        .into_iter()
        .partition(|r| r.completion.is_completed);
    Ok(MissionSnapshot {
        active,
        completed,
        deleted,
    })
}
