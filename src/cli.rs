//! CLI struct definitions and dispatch for the `guardian` binary.

use crate::core::config::{self, GuardianConfig};
use crate::core::error::GuardianError;
use crate::core::keys;
use crate::core::mission::MissionRecord;
use crate::core::output;
use crate::core::store::{KvStore, SqliteKvStore};
use crate::plugins::checks::Priority;
use crate::plugins::coordinator::{ConsistencyCoordinator, load_snapshot};
use crate::plugins::events::GuardianEvents;
use crate::plugins::notify::{
    LogSink, NotificationSink, NullSink, apply_notification_plan, compute_notification_plan,
};
use crate::plugins::scheduler::GuardianScheduler;
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

#[derive(Parser, Debug)]
#[clap(
    name = "guardian",
    version = env!("CARGO_PKG_VERSION"),
    about = "Guardian is the local-first, self-healing consistency engine for mission records: it detects structural defects, proves every repair in a sandbox, and commits only verified state."
)]
pub struct Cli {
    /// Store root directory.
    #[clap(long, global = true, default_value = ".guardian/data")]
    pub root: PathBuf,
    /// Suppress outbound notifications.
    #[clap(long, global = true)]
    pub quiet: bool,
    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a full validation sweep across all record sets.
    Sweep {
        /// Detect only; leave defects in place.
        #[clap(long)]
        no_repair: bool,
        /// Output format: 'text' or 'json'.
        #[clap(long, default_value = "text")]
        format: String,
    },
    /// Run all health checks and print per-area status.
    Check {
        #[clap(long, default_value = "text")]
        format: String,
    },
    /// Print mission statistics.
    Stats {
        #[clap(long, default_value = "text")]
        format: String,
    },
    /// Show the repair log.
    Log {
        /// Limit to N most recent entries.
        #[clap(long, default_value = "20")]
        limit: usize,
        #[clap(long, default_value = "text")]
        format: String,
    },
    /// Simulate a repair in the sandbox without committing.
    Simulate {
        /// Issue name to dispatch on.
        #[clap(long)]
        issue: String,
        /// Commit the resulting state if the simulation passes.
        #[clap(long)]
        commit: bool,
        #[clap(long, default_value = "text")]
        format: String,
    },
    /// Manage repair suggestions.
    Suggestions {
        #[clap(subcommand)]
        command: SuggestionsCommand,
    },
    /// Show issue occurrence counts and escalation candidates.
    Frequency {
        #[clap(long, default_value = "text")]
        format: String,
    },
    /// Learn a new check (and optionally its repair) at runtime.
    Learn {
        #[clap(long)]
        name: String,
        #[clap(long, default_value = "")]
        description: String,
        #[clap(long, default_value = "medium", value_parser = parse_priority)]
        priority: Priority,
        /// Also learn a repair keyed for this issue.
        #[clap(long)]
        with_repair: bool,
    },
    /// Import mission records from a JSON file, replacing the live lists.
    Sync {
        #[clap(long)]
        file: PathBuf,
    },
    /// Recompute and deliver the reminder for one mission.
    Remind {
        #[clap(long)]
        id: String,
    },
    /// Restore the mission lists from the pre-repair backup.
    Restore,
    /// Run the scheduler in the foreground for a bounded time.
    Watch {
        #[clap(long, default_value = "300")]
        duration_secs: u64,
    },
}

#[derive(Subcommand, Debug)]
pub enum SuggestionsCommand {
    /// File suggestions for every current finding.
    Scan,
    /// List pending suggestions.
    List {
        #[clap(long, default_value = "20")]
        limit: usize,
        #[clap(long, default_value = "0")]
        offset: usize,
        #[clap(long, value_parser = parse_priority)]
        severity: Option<Priority>,
        #[clap(long)]
        issue: Option<String>,
    },
    /// Approve a suggestion and apply its repair through the sandbox.
    Approve {
        #[clap(long)]
        id: String,
        #[clap(long, default_value = "cli")]
        by: String,
        #[clap(long)]
        feedback: Option<String>,
    },
    /// Reject a suggestion.
    Reject {
        #[clap(long)]
        id: String,
        #[clap(long, default_value = "cli")]
        by: String,
        #[clap(long)]
        feedback: Option<String>,
    },
    /// Show suggestion statistics.
    Stats {
        #[clap(long, default_value = "text")]
        format: String,
    },
}

fn parse_priority(value: &str) -> Result<Priority, String> {
    match value.to_lowercase().as_str() {
        "low" => Ok(Priority::Low),
        "medium" => Ok(Priority::Medium),
        "high" => Ok(Priority::High),
        "critical" => Ok(Priority::Critical),
        other => Err(format!(
            "unknown priority '{}': expected low|medium|high|critical",
            other
        )),
    }
}

pub fn run(cli: Cli) -> Result<(), GuardianError> {
    let store: Arc<dyn KvStore> = Arc::new(SqliteKvStore::open(&cli.root)?);
    let config = config::load_config(&cli.root)?;
    let events = Arc::new(GuardianEvents::new(Some(cli.root.join(keys::EVENTS_LOG))));
    let sink: Arc<dyn NotificationSink> = if cli.quiet {
        Arc::new(NullSink)
    } else {
        Arc::new(LogSink)
    };
    let mut coordinator =
        ConsistencyCoordinator::new(Arc::clone(&store), config.clone(), Arc::clone(&events))?;

    match cli.command {
        Command::Sweep { no_repair, format } => {
            let findings = coordinator.validate_all(!no_repair);
            if format == "json" {
                println!("{}", serde_json::to_string_pretty(&findings)?);
            } else if findings.is_empty() {
                println!("{} all record sets consistent", "OK".green().bold());
            } else {
                for finding in &findings {
                    let line = output::compact_line(finding, 160);
                    if finding.starts_with("repaired:") {
                        println!("{} {}", "FIXED".green(), line);
                    } else if finding.starts_with("persistence fault") {
                        println!("{} {}", "WARN".yellow(), line);
                    } else {
                        println!("{} {}", "ISSUE".red(), line);
                    }
                }
                println!("{} finding(s)", findings.len());
            }
        }
        Command::Check { format } => {
            let report = coordinator.health_report();
            if format == "json" {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                for area in &report.areas {
                    let status = match area.status.as_str() {
                        "healthy" => area.status.green(),
                        "warning" => area.status.yellow(),
                        _ => area.status.red(),
                    };
                    println!("{:10} {}", status, area.name);
                }
                println!(
                    "overall: {} ({} issue(s), {} pending suggestion(s))",
                    report.overall, report.issues_found, report.pending_suggestions
                );
            }
        }
        Command::Stats { format } => {
            let stats = coordinator.statistics();
            if format == "json" {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                println!("missions:        {}", stats.total_missions);
                println!("completed:       {}", stats.completed_missions);
                println!("failed:          {}", stats.failed_missions);
                println!("counter-based:   {}", stats.counter_missions);
                println!("subtasks:        {}", stats.total_subtasks);
                println!("deleted:         {}", stats.deleted_missions);
                for (kind, count) in &stats.missions_by_kind {
                    println!("  {:12} {}", kind, count);
                }
                println!("completion rate: {:.1}%", stats.completion_rate);
            }
        }
        Command::Log { limit, format } => {
            let entries = coordinator.repair_log_entries();
            let recent: Vec<_> = entries.iter().rev().take(limit).collect();
            if format == "json" {
                println!("{}", serde_json::to_string_pretty(&recent)?);
            } else {
                for entry in recent.iter().rev() {
                    println!(
                        "{} [{}] {}",
                        entry.ts,
                        entry.issue,
                        output::compact_line(&entry.action, 120)
                    );
                }
                let summary = coordinator.repair_log_summary();
                println!("{} entr(ies) total", summary.total);
            }
        }
        Command::Simulate {
            issue,
            commit,
            format,
        } => {
            let report = coordinator.simulate_repair(&issue);
            if format == "json" {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                let verdict = if report.success {
                    "PASS".green().bold()
                } else {
                    "FAIL".red().bold()
                };
                println!("{} {}", verdict, report.summary);
                for change in &report.changes {
                    println!("  ~ {}", change);
                }
                for result in &report.test_results {
                    println!("  ! {}", result);
                }
            }
            if commit {
                coordinator.commit_pending()?;
                println!("committed");
            }
        }
        Command::Suggestions { command } => run_suggestions(&mut coordinator, command)?,
        Command::Frequency { format } => {
            let counts = coordinator.frequency().counts().clone();
            if format == "json" {
                println!("{}", serde_json::to_string_pretty(&counts)?);
            } else {
                for (issue, count) in &counts {
                    let marker = if coordinator.frequency().escalation_candidate(issue) {
                        " (escalation candidate)".yellow().to_string()
                    } else {
                        String::new()
                    };
                    println!("{:4}  {}{}", count, issue, marker);
                }
            }
        }
        Command::Learn {
            name,
            description,
            priority,
            with_repair,
        } => {
            let learned = coordinator.learn_check(&name, &description, priority)?;
            println!(
                "check '{}': {}",
                name,
                if learned { "learned" } else { "already known" }
            );
            if with_repair {
                let learned = coordinator.learn_repair(&name, &description, priority)?;
                println!(
                    "repair for '{}': {}",
                    name,
                    if learned { "learned" } else { "already known" }
                );
            }
        }
        Command::Sync { file } => {
            let content = std::fs::read_to_string(&file).map_err(GuardianError::IoError)?;
            let records: Vec<MissionRecord> = serde_json::from_str(&content)?;
            let count = records.len();
            let (completed, active): (Vec<_>, Vec<_>) =
                records.into_iter().partition(|r| r.completion.is_completed);
            let mut snapshot = load_snapshot(store.as_ref())?;
            snapshot.active = active;
            snapshot.completed = completed;
            coordinator.replace_records(snapshot)?;
            println!("synced {} record(s)", count);
        }
        Command::Remind { id } => {
            let record = coordinator
                .snapshot()
                .all_records()
                .find(|r| r.id == id)
                .ok_or_else(|| GuardianError::NotFound(format!("mission {}", id)))?;
            match compute_notification_plan(record) {
                Some(plan) => {
                    apply_notification_plan(&plan, sink.as_ref());
                    println!(
                        "reminder sent for '{}' (notification id {})",
                        plan.title, plan.notification_id
                    );
                }
                None => println!("mission {} has no reminder to send", id),
            }
        }
        Command::Restore => {
            if coordinator.restore_backup()? {
                println!("restored mission lists from backup");
            } else {
                println!("no backup found under '{}'", keys::MISSIONS_BACKUP);
            }
        }
        Command::Watch { duration_secs } => {
            let coordinator = Arc::new(Mutex::new(coordinator));
            let mut scheduler =
                GuardianScheduler::new(coordinator, Arc::clone(&events), sink, config);
            scheduler.start();
            println!("guardian watching for {}s (Ctrl+C to abort)", duration_secs);
            std::thread::sleep(std::time::Duration::from_secs(duration_secs));
            scheduler.stop();
            println!("stopped");
        }
    }
    Ok(())
}

fn run_suggestions(
    coordinator: &mut ConsistencyCoordinator,
    command: SuggestionsCommand,
) -> Result<(), GuardianError> {
    match command {
        SuggestionsCommand::Scan => {
            let filed = coordinator.scan_suggestions()?;
            println!("filed {} new suggestion(s)", filed);
        }
        SuggestionsCommand::List {
            limit,
            offset,
            severity,
            issue,
        } => {
            let pending = coordinator.pending_suggestions(limit, offset, severity, issue.as_deref());
            for s in &pending {
                println!(
                    "{} [{}] {} {}",
                    s.id,
                    s.severity,
                    s.issue,
                    s.record_name.as_deref().unwrap_or("-")
                );
            }
            println!("{} pending shown", pending.len());
        }
        SuggestionsCommand::Approve { id, by, feedback } => {
            let result = coordinator.approve_suggestion(&id, &by, feedback.as_deref())?;
            let verdict = if result.fix_applied {
                "applied".green().to_string()
            } else {
                "not applied".red().to_string()
            };
            println!("suggestion {}: {} ({})", result.suggestion_id, verdict, result.fix_result);
        }
        SuggestionsCommand::Reject { id, by, feedback } => {
            coordinator.reject_suggestion(&id, &by, feedback.as_deref())?;
            println!("suggestion {} rejected", id);
        }
        SuggestionsCommand::Stats { format } => {
            let stats = coordinator.suggestion_statistics();
            if format == "json" {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                println!("total:    {}", stats.total);
                println!("pending:  {}", stats.pending);
                println!("approved: {}", stats.approved);
                println!("rejected: {}", stats.rejected);
                println!("approval: {:.1}%", stats.approval_rate);
            }
        }
    }
    Ok(())
}
