//! Guardian scheduler: periodic and on-demand sweep execution.
//!
//! Two plain timer threads while running: a frequent lightweight poll and a
//! coarser comprehensive sweep. One sweep in flight at a time: a tick that
//! arrives while the previous sweep is still running is dropped, not queued.
//! Outbound alerts are throttled per category so a sweep that repairs many
//! small issues cannot produce an alert storm.

use crate::core::config::GuardianConfig;
use crate::core::output;
use crate::plugins::checks::Priority;
use crate::plugins::coordinator::ConsistencyCoordinator;
use crate::plugins::events::{GuardianEvent, GuardianEvents};
use crate::plugins::notify::NotificationSink;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Stopped,
    Running,
}

struct SchedulerShared {
    running: Mutex<bool>,
    stop_cv: Condvar,
    in_flight: AtomicBool,
    active: AtomicBool,
    last_alert: Mutex<HashMap<String, u64>>,
}

pub struct GuardianScheduler {
    coordinator: Arc<Mutex<ConsistencyCoordinator>>,
    events: Arc<GuardianEvents>,
    sink: Arc<dyn NotificationSink>,
    config: GuardianConfig,
    shared: Arc<SchedulerShared>,
    handles: Vec<JoinHandle<()>>,
}

impl GuardianScheduler {
    pub fn new(
        coordinator: Arc<Mutex<ConsistencyCoordinator>>,
        events: Arc<GuardianEvents>,
        sink: Arc<dyn NotificationSink>,
        config: GuardianConfig,
    ) -> Self {
        Self {
            coordinator,
            events,
            sink,
            config,
            shared: Arc::new(SchedulerShared {
                running: Mutex::new(false),
                stop_cv: Condvar::new(),
                in_flight: AtomicBool::new(false),
                active: AtomicBool::new(false),
                last_alert: Mutex::new(HashMap::new()),
            }),
            handles: Vec::new(),
        }
    }

    pub fn state(&self) -> SchedulerState {
        let running = self.shared.running.lock().unwrap_or_else(|e| e.into_inner());
        if *running {
            SchedulerState::Running
        } else {
            SchedulerState::Stopped
        }
    }

    pub fn is_active(&self) -> bool {
        self.shared.active.load(Ordering::SeqCst)
    }

    /// Observable side-channel only; never used for coordination.
    pub fn set_active(&self, active: bool) {
        let was = self.shared.active.swap(active, Ordering::SeqCst);
        if was != active {
            self.events.emit(GuardianEvent::Activity { active });
        }
    }

    /// Start the timer threads. A second `start` while running is a no-op.
    pub fn start(&mut self) -> bool {
        {
            let mut running = self.shared.running.lock().unwrap_or_else(|e| e.into_inner());
            if *running {
                return false;
            }
            *running = true;
        }

        let local = self.spawn_loop(self.config.local_interval_secs, TickKind::Quick);
        let sweep = self.spawn_loop(self.config.sweep_interval_secs, TickKind::Comprehensive);
        self.handles.push(local);
        self.handles.push(sweep);
        true
    }

    /// Stop the timers and join. A sweep already executing runs to
    /// completion; nothing is interrupted mid-mutation.
    pub fn stop(&mut self) {
        {
            let mut running = self.shared.running.lock().unwrap_or_else(|e| e.into_inner());
            if !*running {
                return;
            }
            *running = false;
        }
        self.shared.stop_cv.notify_all();
        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
        self.set_active(false);
    }

    fn spawn_loop(&self, interval_secs: u64, kind: TickKind) -> JoinHandle<()> {
        let shared = Arc::clone(&self.shared);
        let coordinator = Arc::clone(&self.coordinator);
        let events = Arc::clone(&self.events);
        let sink = Arc::clone(&self.sink);
        let cooldown = self.config.alert_cooldown_secs;
        std::thread::spawn(move || {
            loop {
                let guard = shared.running.lock().unwrap_or_else(|e| e.into_inner());
                if !*guard {
                    break;
                }
                let (guard, _timeout) = shared
                    .stop_cv
                    .wait_timeout(guard, Duration::from_secs(interval_secs.max(1)))
                    .unwrap_or_else(|e| e.into_inner());
                if !*guard {
                    break;
                }
                drop(guard);
                run_tick(&shared, &coordinator, &events, sink.as_ref(), cooldown, kind);
            }
        })
    }

    /// Caller-triggered sweep, e.g. right after a record mutation. Shares
    /// the in-flight flag with the timers; returns false if dropped because
    /// a sweep was already running.
    pub fn perform_immediate<F>(&self, f: F) -> bool
    where
        F: FnOnce(&mut ConsistencyCoordinator),
    {
        if self.shared.in_flight.swap(true, Ordering::SeqCst) {
            return false;
        }
        self.set_active(true);
        {
            let mut coordinator = self
                .coordinator
                .lock()
                .unwrap_or_else(|e| e.into_inner());
            f(&mut coordinator);
        }
        self.set_active(false);
        self.shared.in_flight.store(false, Ordering::SeqCst);
        true
    }

    /// Emit an alert unless the category is still cooling down or the
    /// priority is below the alerting floor.
    pub fn alert(&self, category: &str, title: &str, body: &str, priority: Priority) -> bool {
        maybe_alert(
            &self.shared,
            self.sink.as_ref(),
            self.config.alert_cooldown_secs,
            category,
            title,
            body,
            priority,
        )
    }
}

impl Drop for GuardianScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

#[derive(Clone, Copy)]
enum TickKind {
    Quick,
    Comprehensive,
}

fn run_tick(
    shared: &Arc<SchedulerShared>,
    coordinator: &Arc<Mutex<ConsistencyCoordinator>>,
    events: &Arc<GuardianEvents>,
    sink: &dyn NotificationSink,
    cooldown: u64,
    kind: TickKind,
) {
    // Re-entrant tick while a sweep is still running: drop it.
    if shared.in_flight.swap(true, Ordering::SeqCst) {
        return;
    }
    let was = shared.active.swap(true, Ordering::SeqCst);
    if !was {
        events.emit(GuardianEvent::Activity { active: true });
    }

    match kind {
        TickKind::Quick => {
            let coordinator = coordinator.lock().unwrap_or_else(|e| e.into_inner());
            let results = coordinator.run_quick_scan();
            for result in results.iter().filter(|r| r.has_issue) {
                maybe_alert(
                    shared,
                    sink,
                    cooldown,
                    "quick_scan",
                    "Data issue detected",
                    &format!("{} ({})", result.name, result.priority),
                    result.priority,
                );
            }
        }
        TickKind::Comprehensive => {
            let summary = {
                let mut coordinator = coordinator.lock().unwrap_or_else(|e| e.into_inner());
                coordinator.full_sweep()
            };
            if !summary.repaired_issues.is_empty() {
                let top = summary
                    .repaired_issues
                    .iter()
                    .map(|(_, p)| *p)
                    .max()
                    .unwrap_or(Priority::Low);
                let lines: Vec<String> = summary
                    .repaired_issues
                    .iter()
                    .map(|(issue, priority)| format!("{} ({})", issue, priority))
                    .collect();
                maybe_alert(
                    shared,
                    sink,
                    cooldown,
                    "sweep_repair",
                    "Mission data repaired",
                    &output::preview_findings(&lines, 3, 80),
                    top,
                );
            }
        }
    }

    shared.active.store(false, Ordering::SeqCst);
    events.emit(GuardianEvent::Activity { active: false });
    shared.in_flight.store(false, Ordering::SeqCst);
}

fn maybe_alert(
    shared: &Arc<SchedulerShared>,
    sink: &dyn NotificationSink,
    cooldown_secs: u64,
    category: &str,
    title: &str,
    body: &str,
    priority: Priority,
) -> bool {
    if priority < Priority::High {
        return false;
    }
    let now = crate::core::time::now_epoch_secs();
    let mut last_alert = shared.last_alert.lock().unwrap_or_else(|e| e.into_inner());
    if let Some(last) = last_alert.get(category) {
        if now.saturating_sub(*last) < cooldown_secs {
            return false;
        }
    }
    last_alert.insert(category.to_string(), now);
    sink.show(title, body, priority);
    true
}
