//! Concurrency layer for lockstep
//!
//! This crate implements the two-phase-locking scheduler:
//! - Scheduler: lock acquisition, deferral, abort/restart, deferred sweep
//! - WaitForGraph: waiter -> holder edges with cycle detection
//! - SchedulerConfig: restart limit, deadlock detection and sweep policies

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod scheduler;
pub mod wait_for;

pub use config::{DeadlockDetection, RestartLimit, SchedulerConfig, SweepMode};
pub use scheduler::{BatchOutcome, Scheduler, SweepReport};
pub use wait_for::WaitForGraph;
