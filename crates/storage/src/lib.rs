//! Storage layer for lockstep
//!
//! This crate implements the in-memory store the scheduler runs against:
//! - Store: fixed set of integer cells plus the lock table
//! - LockState: per-key lock with tracked holders
//!
//! Values and locks for every key sit behind one mutex. Lock calls are
//! serialized process-wide; there is no per-key locking.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod lock;
pub mod store;

pub use lock::{GrantPolicy, Holder, LockMode, LockState};
pub use store::{LockOutcome, Store};
