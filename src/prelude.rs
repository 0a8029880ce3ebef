//! Convenient imports for Lockstep.
//!
//! ```
//! use lockstep::prelude::*;
//!
//! let ops = parse_schedule("w1(x) r2(x)").unwrap();
//! let report = Simulator::builder().max_restarts(4).build().run(&ops).unwrap();
//! assert!(report.history.len() >= 2);
//! ```

// Main entry point
pub use crate::simulator::{ScheduleReport, Simulator, SimulatorBuilder};

// Error handling
pub use lockstep_core::{Error, Result};

// Core types
pub use lockstep_core::{parse_schedule, Key, OpKind, Operation, TxnId};

// Policies
pub use lockstep_concurrency::{DeadlockDetection, RestartLimit, SchedulerConfig, SweepMode};
pub use lockstep_storage::GrantPolicy;
