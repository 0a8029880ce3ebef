//! Error types for the scheduler simulator
//!
//! Lock conflicts are not errors: a conflicting operation is deferred and
//! the scheduler decides what to do with it. The variants here cover the
//! few conditions that do reach a caller.

use crate::types::{Key, TxnId};
use thiserror::Error;

/// All lockstep errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// Operation names a key the store was not initialized with
    #[error("unknown key: {0}")]
    UnknownKey(Key),

    /// Release of a lock the transaction does not hold
    #[error("{txn_id} does not hold a lock on {key}")]
    LockNotHeld {
        /// Transaction attempting the release
        txn_id: TxnId,
        /// Key being released
        key: Key,
    },

    /// Transaction was aborted once more than the restart policy allows
    #[error("{txn_id} gave up after {attempts} restarts")]
    RetryLimitExceeded {
        /// Transaction that failed
        txn_id: TxnId,
        /// Restarts performed before giving up
        attempts: u32,
    },

    /// Operation submitted for a transaction that already failed
    #[error("{0} has failed permanently")]
    TransactionFailed(TxnId),

    /// Malformed operation or schedule text
    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    /// Invalid configuration
    #[error("configuration error: {0}")]
    Config(String),
}

/// Result type for lockstep operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Check if this error ended a transaction because of the restart limit.
    pub fn is_retry_exhausted(&self) -> bool {
        matches!(self, Error::RetryLimitExceeded { .. })
    }

    /// Check if this error stems from lock contention rather than bad input.
    pub fn is_conflict_related(&self) -> bool {
        matches!(
            self,
            Error::RetryLimitExceeded { .. } | Error::TransactionFailed(_)
        )
    }

    /// Transaction the error is about, if any.
    pub fn txn_id(&self) -> Option<TxnId> {
        match self {
            Error::LockNotHeld { txn_id, .. } | Error::RetryLimitExceeded { txn_id, .. } => {
                Some(*txn_id)
            }
            Error::TransactionFailed(txn_id) => Some(*txn_id),
            _ => None,
        }
    }
}
