//! Scheduler configuration
//!
//! Four independent policies, each with a default and a `legacy()` preset
//! that reproduces the behaviour of the simplest possible scheduler:
//!
//! | Policy | Default | Legacy |
//! |--------|---------|--------|
//! | [`RestartLimit`] | `Bounded(8)` | `Unbounded` |
//! | [`DeadlockDetection`] | `ConflictIsDeadlock` | `ConflictIsDeadlock` |
//! | [`SweepMode`] | `RetainFailed` | `ClearOnFirstSuccess` |
//! | [`GrantPolicy`] | `Strict` | `Strict` |
//!
//! Configuration can be loaded from TOML:
//!
//! ```
//! use lockstep_concurrency::{DeadlockDetection, RestartLimit, SchedulerConfig};
//!
//! let config = SchedulerConfig::from_toml_str(r#"
//!     restart_limit = { bounded = 3 }
//!     deadlock_detection = "wait_for_graph"
//! "#).unwrap();
//!
//! assert_eq!(config.restart_limit, RestartLimit::Bounded(3));
//! assert_eq!(config.deadlock_detection, DeadlockDetection::WaitForGraph);
//! ```

use lockstep_core::{Error, Result};
use lockstep_storage::GrantPolicy;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Default number of restarts before a transaction is abandoned
pub const DEFAULT_MAX_RESTARTS: u32 = 8;

/// How many times a transaction may be aborted and restarted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RestartLimit {
    /// Give up once this many restarts have happened
    Bounded(u32),
    /// Restart forever; a permanently contended key never terminates
    Unbounded,
}

impl RestartLimit {
    /// Whether a transaction that has restarted `attempts` times may
    /// restart once more
    pub fn allows(&self, attempts: u32) -> bool {
        match self {
            RestartLimit::Bounded(max) => attempts < *max,
            RestartLimit::Unbounded => true,
        }
    }
}

impl Default for RestartLimit {
    fn default() -> Self {
        RestartLimit::Bounded(DEFAULT_MAX_RESTARTS)
    }
}

/// What counts as a deadlock when an operation is deferred
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeadlockDetection {
    /// Any lock conflict is treated as a deadlock and aborts the requester
    /// right away. Deliberately naive; there is no cycle check.
    #[default]
    ConflictIsDeadlock,
    /// Record waiter -> holder edges and abort the requester only when its
    /// request closes a cycle
    WaitForGraph,
}

impl FromStr for DeadlockDetection {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "conflict" | "conflict_is_deadlock" => Ok(DeadlockDetection::ConflictIsDeadlock),
            "wait-for" | "wait_for_graph" => Ok(DeadlockDetection::WaitForGraph),
            other => Err(Error::Config(format!(
                "unknown deadlock detection '{}'",
                other
            ))),
        }
    }
}

/// How the deferred sweep treats a queue once one of its operations succeeds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SweepMode {
    /// Only operations that executed leave the queue; the rest stay pending
    #[default]
    RetainFailed,
    /// The first success drops the whole queue, including operations that
    /// failed their retry
    ClearOnFirstSuccess,
}

impl FromStr for SweepMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "retain" | "retain_failed" => Ok(SweepMode::RetainFailed),
            "clear-on-first" | "clear_on_first_success" => Ok(SweepMode::ClearOnFirstSuccess),
            other => Err(Error::Config(format!("unknown sweep mode '{}'", other))),
        }
    }
}

/// Scheduler configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Restart budget per transaction
    pub restart_limit: RestartLimit,
    /// Deadlock detection policy
    pub deadlock_detection: DeadlockDetection,
    /// Deferred sweep policy
    pub sweep_mode: SweepMode,
    /// Lock grant rule for the store the scheduler runs against
    pub grant_policy: GrantPolicy,
}

impl SchedulerConfig {
    /// Unbounded restarts, conflict-is-deadlock, clear-on-first-success sweep
    pub fn legacy() -> Self {
        SchedulerConfig {
            restart_limit: RestartLimit::Unbounded,
            deadlock_detection: DeadlockDetection::ConflictIsDeadlock,
            sweep_mode: SweepMode::ClearOnFirstSuccess,
            grant_policy: GrantPolicy::Strict,
        }
    }

    /// Defaults, but deadlocks are found with a wait-for graph
    pub fn wait_for_graph() -> Self {
        SchedulerConfig {
            deadlock_detection: DeadlockDetection::WaitForGraph,
            ..Default::default()
        }
    }

    /// Set a bounded restart limit
    pub fn with_max_restarts(mut self, max: u32) -> Self {
        self.restart_limit = RestartLimit::Bounded(max);
        self
    }

    /// Remove the restart limit
    pub fn unbounded(mut self) -> Self {
        self.restart_limit = RestartLimit::Unbounded;
        self
    }

    /// Set the deadlock detection policy
    pub fn with_detection(mut self, detection: DeadlockDetection) -> Self {
        self.deadlock_detection = detection;
        self
    }

    /// Set the sweep policy
    pub fn with_sweep_mode(mut self, mode: SweepMode) -> Self {
        self.sweep_mode = mode;
        self
    }

    /// Set the lock grant rule
    pub fn with_grant_policy(mut self, policy: GrantPolicy) -> Self {
        self.grant_policy = policy;
        self
    }

    /// Parse a TOML document; missing fields take their defaults
    pub fn from_toml_str(source: &str) -> Result<Self> {
        toml::from_str(source).map_err(|e| Error::Config(e.to_string()))
    }
}
