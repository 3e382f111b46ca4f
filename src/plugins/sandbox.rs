//! Sandboxed repair simulation: simulate-then-commit.
//!
//! `simulate` deep-clones the live snapshot, applies the candidate repair to
//! the clone only, then re-runs the full consistency assertion suite against
//! the result. Until the coordinator commits the report, the live state is
//! untouched. The report carries a fingerprint of the pre-simulation state
//! so commit can refuse if the live lists drifted in between.

use crate::core::error::GuardianError;
use crate::core::mission::MissionSnapshot;
use crate::core::time;
use crate::plugins::repairs::RepairRegistry;
use serde::Serialize;
use sha2::{Digest, Sha256};

/// Stable digest of a snapshot's serialized form.
pub fn fingerprint(snapshot: &MissionSnapshot) -> Result<String, GuardianError> {
    let json = serde_json::to_string(snapshot)?;
    let mut hasher = Sha256::new();
    hasher.update(json.as_bytes());
    Ok(format!("{:x}", hasher.finalize()))
}

#[derive(Debug, Clone, Serialize)]
pub struct SandboxReport {
    pub issue_key: String,
    pub success: bool,
    pub summary: String,
    pub changes: Vec<String>,
    pub test_results: Vec<String>,
    pub resulting_state: MissionSnapshot,
    /// Fingerprint of the live state the simulation started from.
    pub base_fingerprint: String,
    pub ts: String,
}

/// Re-run the consistency assertions against a (sandboxed) snapshot.
/// Returns one line per failing assertion.
pub fn consistency_assertions(snapshot: &MissionSnapshot) -> Vec<String> {
    let mut failures = Vec::new();
    for id in snapshot.duplicate_ids() {
        failures.push(format!("assertion failed: duplicate mission id {}", id));
    }
    for id in snapshot.duplicate_notification_ids() {
        failures.push(format!("assertion failed: duplicate notification id {}", id));
    }
    let now = time::now_epoch_ms();
    for record in snapshot.all_records() {
        for finding in record.structural_findings(now) {
            failures.push(format!("assertion failed: {}", finding));
        }
    }
    failures
}

pub struct SandboxSimulator<'a> {
    repairs: &'a RepairRegistry,
}

impl<'a> SandboxSimulator<'a> {
    pub fn new(repairs: &'a RepairRegistry) -> Self {
        Self { repairs }
    }

    /// Apply the repair for `issue_key` to a private deep copy of `live`
    /// and re-verify the result. `live` is never mutated; all failure modes
    /// (unknown issue, faulting repair, assertions still failing) end up in
    /// the report, never as an error.
    pub fn simulate(&self, issue_key: &str, live: &MissionSnapshot) -> SandboxReport {
        let base_fingerprint = match fingerprint(live) {
            Ok(fp) => fp,
            Err(e) => {
                return SandboxReport {
                    issue_key: issue_key.to_string(),
                    success: false,
                    summary: format!("sandbox setup failed for '{}'", issue_key),
                    changes: Vec::new(),
                    test_results: vec![format!("Exception: {}", e)],
                    resulting_state: live.clone(),
                    base_fingerprint: String::new(),
                    ts: time::now_epoch_z(),
                };
            }
        };

        let mut sandbox = live.clone();
        let mut test_results = Vec::new();
        let mut success = true;

        let outcome = self.repairs.apply_for_issue(issue_key, &mut sandbox);
        if let Some(error) = &outcome.error {
            success = false;
            test_results.push(format!("Exception: {}", error));
        }

        let failures = consistency_assertions(&sandbox);
        if !failures.is_empty() {
            success = false;
            test_results.extend(failures);
        }

        let summary = if success {
            format!(
                "repair '{}' applied cleanly in sandbox: {} change(s), all assertions pass",
                outcome.name,
                outcome.changes.len()
            )
        } else {
            format!(
                "repair '{}' rejected by sandbox: {} failing result(s)",
                outcome.name,
                test_results.len()
            )
        };

        SandboxReport {
            issue_key: issue_key.to_string(),
            success,
            summary,
            changes: outcome.changes,
            test_results,
            resulting_state: sandbox,
            base_fingerprint,
            ts: time::now_epoch_z(),
        }
    }
}
