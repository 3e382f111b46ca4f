//! Notification boundary: a fire-and-forget sink plus a two-phase plan.
//!
//! `compute_notification_plan` is pure; `apply_notification_plan` is the
//! only side-effecting step. The split keeps repair-triggered rescheduling
//! from ever re-entering the planner.

use crate::core::mission::{MissionKind, MissionRecord};
use crate::plugins::checks::Priority;
use serde::Serialize;

/// Delivery is best-effort; the engine never depends on it succeeding.
pub trait NotificationSink: Send + Sync {
    fn show(&self, title: &str, body: &str, priority: Priority);
}

/// Sink that renders to stderr; the production binding in a headless build.
pub struct LogSink;

impl NotificationSink for LogSink {
    fn show(&self, title: &str, body: &str, priority: Priority) {
        eprintln!("[notify:{}] {}: {}", priority, title, body);
    }
}

/// Sink that swallows everything; used by tests and `--quiet` runs.
pub struct NullSink;

impl NotificationSink for NullSink {
    fn show(&self, _title: &str, _body: &str, _priority: Priority) {}
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct NotificationPlan {
    pub notification_id: i32,
    pub title: String,
    pub body: String,
    pub kind: MissionKind,
}

/// Pure step: decide what (if anything) a record's reminder should say.
/// Completed, failed, and persistent missions get no reminder.
pub fn compute_notification_plan(record: &MissionRecord) -> Option<NotificationPlan> {
    if record.completion.is_completed || record.completion.has_failed {
        return None;
    }
    if record.kind == MissionKind::Persistent {
        return None;
    }
    let body = match record.kind {
        MissionKind::Daily => "Daily mission is waiting".to_string(),
        MissionKind::Weekly => "Weekly mission is waiting".to_string(),
        MissionKind::Simple => "Mission is waiting".to_string(),
        MissionKind::Persistent => unreachable!(),
    };
    Some(NotificationPlan {
        notification_id: record.notification_id,
        title: record.title.clone(),
        body,
        kind: record.kind,
    })
}

/// Side-effecting step: hand the plan to the sink.
pub fn apply_notification_plan(plan: &NotificationPlan, sink: &dyn NotificationSink) {
    sink.show(&plan.title, &plan.body, Priority::Low);
}
