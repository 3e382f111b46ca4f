//! Guardian: a self-healing consistency engine for mission records.
//!
//! Guardian continuously detects structural defects in persisted mission
//! data (duplicate identifiers, invalid counters, contradictory completion
//! states, missing fields), repairs them, learns new issue kinds at
//! runtime, and tracks issue frequency to prioritize recurring problems.
//! Every untrusted repair is proven out against a sandboxed deep copy of
//! the live state before it is committed.
//!
//! # Architecture
//!
//! - **Registries** ([`plugins::checks`], [`plugins::repairs`]): named,
//!   priority-ranked strategies behind `Check`/`Repair` traits. Persisted
//!   state stores names and metadata only; behavior is always resolved from
//!   the static dispatch table in [`subsystems`].
//! - **Coordinator** ([`plugins::coordinator`]): single owner of the
//!   authoritative mission lists. All mutation funnels through its save
//!   path; one persistence write per sweep, after the in-memory mutations.
//! - **Sandbox** ([`plugins::sandbox`]): simulate-then-commit. A simulation
//!   has zero observable effect on live data until the coordinator adopts
//!   its verified result.
//! - **Scheduler** ([`plugins::scheduler`]): periodic lightweight polls and
//!   comprehensive sweeps on plain timer threads, serialized by an
//!   in-flight flag, with throttled outbound alerts.
//! - **Store** ([`core::store`]): an opaque string-keyed JSON store; the
//!   production implementation is SQLite with an append-only audit log.
//!
//! # Example
//!
//! ```no_run
//! use guardian::core::config::GuardianConfig;
//! use guardian::core::store::MemoryKvStore;
//! use guardian::plugins::coordinator::ConsistencyCoordinator;
//! use guardian::plugins::events::GuardianEvents;
//! use std::sync::Arc;
//!
//! let store = Arc::new(MemoryKvStore::new());
//! let events = Arc::new(GuardianEvents::new(None));
//! let mut coordinator =
//!     ConsistencyCoordinator::new(store, GuardianConfig::default(), events).unwrap();
//! let findings = coordinator.validate_all(true);
//! assert!(findings.is_empty());
//! ```

pub mod cli;
pub mod core;
pub mod plugins;
pub mod subsystems;
