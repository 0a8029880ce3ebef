//! Simulation driver.
//!
//! This module provides the `Simulator` struct, which wires a [`Store`] to a
//! [`Scheduler`], runs a batch of operations and collects the outcome into a
//! [`ScheduleReport`].

use lockstep_concurrency::{DeadlockDetection, Scheduler, SchedulerConfig, SweepMode, SweepReport};
use lockstep_core::{Error, Key, Operation, Result, Transaction};
use lockstep_storage::{GrantPolicy, Store};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Initial store contents used unless the builder is told otherwise
pub const DEFAULT_VALUES: [(&str, i64); 3] = [("x", 1), ("y", 2), ("z", 3)];

/// The simulator.
///
/// Owns one store and one scheduler. Successive calls to [`Simulator::run`]
/// keep accumulating into the same histories.
///
/// # Example
///
/// ```
/// use lockstep::{Key, Operation, Simulator};
///
/// let sim = Simulator::builder().value("a", 10).build();
/// let report = sim.run(&[Operation::write(1, "a"), Operation::read(2, "a")]).unwrap();
///
/// assert_eq!(report.values[&Key::new("a")], 11);
/// ```
pub struct Simulator {
    store: Arc<Store>,
    scheduler: Scheduler,
    initial_values: BTreeMap<Key, i64>,
}

impl Simulator {
    /// Simulator with the default values and configuration.
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Create a builder for simulator configuration.
    pub fn builder() -> SimulatorBuilder {
        SimulatorBuilder::new()
    }

    /// The built-in schedule: two transactions writing `x` and `y` in
    /// opposite orders.
    pub fn default_schedule() -> Vec<Operation> {
        vec![
            Operation::write(1, "x"),
            Operation::write(2, "y"),
            Operation::write(1, "y"),
            Operation::write(2, "x"),
        ]
    }

    /// Run a batch: concurrent first attempts, then one deferred sweep.
    ///
    /// Contention never produces an error here; transactions that run out of
    /// restarts are listed in [`ScheduleReport::failures`]. Only invalid
    /// input (an unknown key) fails the whole run.
    pub fn run(&self, operations: &[Operation]) -> Result<ScheduleReport> {
        debug!(operations = operations.len(), config = ?self.scheduler.config(), "running batch");
        let outcome = self.scheduler.process_history(operations)?;

        Ok(ScheduleReport {
            history: self.scheduler.history(),
            final_history: self.scheduler.final_history(),
            initial_values: self.initial_values.clone(),
            values: self.store.values(),
            transactions: self.scheduler.transactions(),
            failures: outcome
                .failures
                .into_iter()
                .map(|(operation, error)| FailureRecord::new(operation, &error))
                .collect(),
            sweep: outcome.sweep,
        })
    }

    /// The underlying scheduler.
    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// The underlying store.
    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }
}

impl Default for Simulator {
    fn default() -> Self {
        Self::new()
    }
}

/// An operation whose task gave up, with the reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureRecord {
    /// The submitted operation
    pub operation: Operation,
    /// Rendered error
    pub error: String,
    /// Whether the restart limit caused it
    pub retry_exhausted: bool,
}

impl FailureRecord {
    fn new(operation: Operation, error: &Error) -> Self {
        Self {
            operation,
            error: error.to_string(),
            retry_exhausted: error.is_retry_exhausted(),
        }
    }
}

/// Everything a run produced.
#[derive(Debug, Clone, Serialize)]
pub struct ScheduleReport {
    /// Every attempted operation, restarts included
    pub history: Vec<Operation>,
    /// Operations that executed, in completion order
    pub final_history: Vec<Operation>,
    /// Store contents before the run
    pub initial_values: BTreeMap<Key, i64>,
    /// Store contents after the run
    pub values: BTreeMap<Key, i64>,
    /// Transaction metadata, ordered by id
    pub transactions: Vec<Transaction>,
    /// Operations that failed
    pub failures: Vec<FailureRecord>,
    /// What the deferred sweep did
    pub sweep: SweepReport,
}

impl ScheduleReport {
    /// Number of writes on `key` in the final history.
    pub fn committed_writes(&self, key: &Key) -> usize {
        self.final_history
            .iter()
            .filter(|op| op.kind.is_write() && &op.key == key)
            .count()
    }

    /// Whether every key ended at its initial value plus the writes on it
    /// in the final history.
    pub fn value_invariant_holds(&self) -> bool {
        self.initial_values.iter().all(|(key, initial)| {
            self.values.get(key).copied() == Some(initial + self.committed_writes(key) as i64)
        })
    }

    /// Human-readable report: both histories and the final values.
    pub fn render(&self) -> String {
        self.to_string()
    }

    /// Pretty-printed JSON.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

impl fmt::Display for ScheduleReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "History:")?;
        for op in &self.history {
            writeln!(f, "{}", op)?;
        }
        writeln!(f)?;
        writeln!(f, "Final History:")?;
        for op in &self.final_history {
            writeln!(f, "{}", op)?;
        }
        writeln!(f)?;
        writeln!(f, "Values:")?;
        for (key, value) in &self.values {
            writeln!(f, "{} = {}", key, value)?;
        }
        if !self.failures.is_empty() {
            writeln!(f)?;
            writeln!(f, "Failures:")?;
            for failure in &self.failures {
                writeln!(f, "{}: {}", failure.operation.notation(), failure.error)?;
            }
        }
        Ok(())
    }
}

/// Builder for simulator configuration.
///
/// # Example
///
/// ```
/// use lockstep::{DeadlockDetection, Simulator};
///
/// let sim = Simulator::builder()
///     .values([("a", 0), ("b", 0)])
///     .detection(DeadlockDetection::WaitForGraph)
///     .max_restarts(2)
///     .build();
///
/// assert_eq!(sim.store().len(), 2);
/// ```
pub struct SimulatorBuilder {
    values: BTreeMap<Key, i64>,
    config: SchedulerConfig,
}

impl SimulatorBuilder {
    /// Create a builder with [`DEFAULT_VALUES`] and the default configuration.
    pub fn new() -> Self {
        Self {
            values: DEFAULT_VALUES
                .iter()
                .map(|(key, value)| (Key::new(*key), *value))
                .collect(),
            config: SchedulerConfig::default(),
        }
    }

    /// Replace all initial values.
    pub fn values<K, I>(mut self, values: I) -> Self
    where
        K: Into<Key>,
        I: IntoIterator<Item = (K, i64)>,
    {
        self.values = values.into_iter().map(|(k, v)| (k.into(), v)).collect();
        self
    }

    /// Add or override one initial value.
    pub fn value(mut self, key: impl Into<Key>, value: i64) -> Self {
        self.values.insert(key.into(), value);
        self
    }

    /// Use a complete scheduler configuration.
    pub fn config(mut self, config: SchedulerConfig) -> Self {
        self.config = config;
        self
    }

    /// Bound restarts per transaction.
    pub fn max_restarts(mut self, max: u32) -> Self {
        self.config = self.config.with_max_restarts(max);
        self
    }

    /// Allow unbounded restarts.
    pub fn unbounded(mut self) -> Self {
        self.config = self.config.unbounded();
        self
    }

    /// Choose the deadlock detection policy.
    pub fn detection(mut self, detection: DeadlockDetection) -> Self {
        self.config = self.config.with_detection(detection);
        self
    }

    /// Choose the sweep policy.
    pub fn sweep_mode(mut self, mode: SweepMode) -> Self {
        self.config = self.config.with_sweep_mode(mode);
        self
    }

    /// Choose the lock grant rule.
    pub fn grant_policy(mut self, policy: GrantPolicy) -> Self {
        self.config = self.config.with_grant_policy(policy);
        self
    }

    /// Build the simulator.
    pub fn build(self) -> Simulator {
        let store = Arc::new(
            Store::with_values(self.values.clone()).with_grant_policy(self.config.grant_policy),
        );
        Simulator {
            scheduler: Scheduler::new(Arc::clone(&store), self.config),
            store,
            initial_values: self.values,
        }
    }
}

impl Default for SimulatorBuilder {
    fn default() -> Self {
        Self::new()
    }
}
