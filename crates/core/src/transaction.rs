//! Transaction metadata
//!
//! A [`Transaction`] is created lazily the first time the scheduler sees an
//! operation for its id and lives for the rest of the process. It carries no
//! operations of its own, only lifecycle state and the restart counter.

use crate::types::TxnId;
use serde::{Deserialize, Serialize};

/// Lifecycle state of a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionState {
    /// Still has work in flight or pending
    Active,
    /// Every operation executed and nothing is left pending
    Committed,
    /// Exceeded the restart policy and was abandoned
    Failed,
}

/// Per-transaction metadata tracked by the scheduler
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Transaction id
    pub id: TxnId,
    /// Lifecycle state
    pub state: TransactionState,
    /// Number of forced aborts so far
    ///
    /// Non-decreasing; grows by exactly one per abort.
    pub attempts: u32,
}

impl Transaction {
    /// Create an active transaction with no attempts
    pub fn new(id: TxnId) -> Self {
        Self {
            id,
            state: TransactionState::Active,
            attempts: 0,
        }
    }

    /// Whether the transaction can still make progress
    pub fn is_active(&self) -> bool {
        self.state == TransactionState::Active
    }

    /// Whether the transaction was abandoned
    pub fn is_failed(&self) -> bool {
        self.state == TransactionState::Failed
    }

    /// Record a forced abort, returning the new attempt count
    pub fn record_abort(&mut self) -> u32 {
        self.attempts += 1;
        self.attempts
    }

    /// Mark the transaction committed (no-op unless active)
    pub fn mark_committed(&mut self) {
        if self.is_active() {
            self.state = TransactionState::Committed;
        }
    }

    /// Make a committed transaction active again (no-op otherwise)
    pub fn reopen(&mut self) {
        if self.state == TransactionState::Committed {
            self.state = TransactionState::Active;
        }
    }

    /// Mark the transaction permanently failed
    pub fn mark_failed(&mut self) {
        self.state = TransactionState::Failed;
    }
}
