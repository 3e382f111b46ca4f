//! Broadcast signals consumed by presentation code and never read back.
//!
//! Three channels multiplexed on one enum: an activity boolean, free-text
//! learning events, and structured issue/action events. Subscribers get an
//! `mpsc::Receiver`; dead receivers are pruned on the next emit. Every event
//! is also appended to `guardian.events.jsonl` when a log path is set.

use crate::core::time;
use serde::Serialize;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;
use std::sync::mpsc::{Receiver, Sender, channel};

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GuardianEvent {
    Activity { active: bool },
    Learning { message: String },
    Issue {
        kind: String,
        issue: String,
        action: String,
        record_id: Option<String>,
        ts: String,
    },
}

impl GuardianEvent {
    pub fn issue(kind: &str, issue: &str, action: &str, record_id: Option<&str>) -> Self {
        GuardianEvent::Issue {
            kind: kind.to_string(),
            issue: issue.to_string(),
            action: action.to_string(),
            record_id: record_id.map(|s| s.to_string()),
            ts: time::now_epoch_z(),
        }
    }
}

#[derive(Default)]
pub struct GuardianEvents {
    subscribers: Mutex<Vec<Sender<GuardianEvent>>>,
    log_path: Option<PathBuf>,
}

impl GuardianEvents {
    pub fn new(log_path: Option<PathBuf>) -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
            log_path,
        }
    }

    pub fn subscribe(&self) -> Receiver<GuardianEvent> {
        let (tx, rx) = channel();
        self.subscribers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(tx);
        rx
    }

    /// Fire-and-forget broadcast. Emission never fails the caller; a full
    /// or dropped receiver is simply pruned.
    pub fn emit(&self, event: GuardianEvent) {
        if let Some(path) = &self.log_path {
            if let Ok(line) = serde_json::to_string(&event) {
                if let Ok(mut f) = OpenOptions::new().create(true).append(true).open(path) {
                    let _ = writeln!(f, "{}", line);
                }
            }
        }
        let mut subs = self.subscribers.lock().unwrap_or_else(|e| e.into_inner());
        subs.retain(|tx| tx.send(event.clone()).is_ok());
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }
}
