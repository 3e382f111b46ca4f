//! Fixed store keys. Every persisted structure lives under one of these;
//! values are JSON text. Renaming a key orphans existing state.

pub const MISSIONS: &str = "missions";
pub const DELETED_MISSIONS: &str = "deleted_missions";
pub const MISSIONS_BACKUP: &str = "missions_backup";

pub const HEALTH_CHECKS: &str = "ai_guardian_health_checks";
pub const REPAIRS: &str = "ai_guardian_repairs";
pub const LEARNING_HISTORY: &str = "ai_guardian_learning_history";
pub const ISSUE_FREQUENCY: &str = "ai_guardian_issue_frequency";
pub const SUGGESTIONS: &str = "mechanicum_issues";
pub const REPAIR_LOG: &str = "mission_repair_log";

/// Append-only audit trail of store operations.
pub const STORE_EVENTS_LOG: &str = "store.events.jsonl";
/// Append-only log of engine events (activity, learning, issue/action).
pub const EVENTS_LOG: &str = "guardian.events.jsonl";

pub const STORE_DB_NAME: &str = "guardian.db";
