//! # Lockstep
//!
//! A two-phase-locking scheduler simulator over an in-memory key-value
//! store.
//!
//! A batch of read/write operations, each tagged with its transaction, is
//! submitted concurrently. Every operation tries to lock its key (shared for
//! reads, exclusive for writes); granted operations execute and release at
//! once, refused ones are deferred and may abort and restart their
//! transaction. A final sweep retries whatever is still deferred.
//!
//! ## Quick Start
//!
//! ```
//! use lockstep::prelude::*;
//!
//! let sim = Simulator::new();
//! let report = sim.run(&Simulator::default_schedule()).unwrap();
//!
//! assert!(report.value_invariant_holds());
//! println!("{}", report.render());
//! ```
//!
//! ## Crates
//!
//! - [`lockstep_core`] - operations, transactions, errors
//! - [`lockstep_storage`] - store and lock table
//! - [`lockstep_concurrency`] - scheduler, wait-for graph, configuration

#![warn(missing_docs)]

mod simulator;

pub mod prelude;

// Re-export main entry points
pub use simulator::{FailureRecord, ScheduleReport, Simulator, SimulatorBuilder, DEFAULT_VALUES};

// Re-export the building blocks
pub use lockstep_concurrency::{
    BatchOutcome, DeadlockDetection, RestartLimit, Scheduler, SchedulerConfig, SweepMode,
    SweepReport, WaitForGraph,
};
pub use lockstep_core::{
    parse_schedule, Error, Key, OpKind, Operation, Result, Transaction, TransactionState, TxnId,
};
pub use lockstep_storage::{GrantPolicy, LockMode, LockOutcome, LockState, Store};
