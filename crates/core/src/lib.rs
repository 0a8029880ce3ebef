//! Core types for the lockstep scheduler simulator
//!
//! This crate defines the vocabulary shared by every other crate:
//! - [`Operation`]: a read or write on a key, tagged with its transaction
//! - [`TxnId`] and [`Key`]: identifiers
//! - [`Transaction`]: per-transaction metadata (state, restart attempts)
//! - [`Error`]: the workspace-wide error type

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod transaction;
pub mod types;

pub use error::{Error, Result};
pub use transaction::{Transaction, TransactionState};
pub use types::{parse_schedule, Key, OpKind, Operation, TxnId};
