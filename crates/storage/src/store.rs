//! In-memory store with a coarse-grained lock table
//!
//! # Design
//!
//! - FxHashMap: O(1) lookups for values and lock entries
//! - One `parking_lot::Mutex` guards both tables for all keys
//! - Keys are fixed when the store is created; nothing is added or evicted
//!
//! Lock acquisition never blocks. A request either gets the lock right away
//! or reports the transactions in its way, and the caller decides what to do
//! with the conflict. Which requests are compatible is decided by the
//! store's [`GrantPolicy`].
//!
//! # Example
//!
//! ```
//! use lockstep_core::Operation;
//! use lockstep_storage::Store;
//!
//! let store = Store::with_values([("x", 1)]);
//! let op = Operation::write(1, "x");
//!
//! assert!(store.acquire(&op));
//! assert_eq!(store.apply(&op).unwrap(), 2);
//! store.release(&op).unwrap();
//! ```

use crate::lock::{GrantPolicy, LockMode, LockState};
use lockstep_core::{Error, Key, OpKind, Operation, Result, TxnId};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::collections::BTreeMap;
use tracing::info;

/// Result of a non-blocking lock request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockOutcome {
    /// Lock granted; carries the mode now held by the requester
    Granted(LockMode),
    /// Lock refused because of the listed holders
    Conflict {
        /// Transactions holding an incompatible lock
        holders: Vec<TxnId>,
    },
}

impl LockOutcome {
    /// Whether the lock was granted
    pub fn is_granted(&self) -> bool {
        matches!(self, LockOutcome::Granted(_))
    }
}

/// Values and lock entries, guarded together
#[derive(Debug, Default)]
struct Tables {
    values: FxHashMap<Key, i64>,
    locks: FxHashMap<Key, LockState>,
}

impl Tables {
    fn lock_mut(&mut self, key: &Key) -> Result<&mut LockState> {
        self.locks
            .get_mut(key)
            .ok_or_else(|| Error::UnknownKey(key.clone()))
    }
}

/// Key-value store plus lock table
///
/// # Thread Safety
///
/// Every method takes the single store mutex for its whole duration, so
/// acquire, apply and release calls are totally ordered across all keys.
#[derive(Debug, Default)]
pub struct Store {
    inner: Mutex<Tables>,
    policy: GrantPolicy,
}

impl Store {
    /// Create an empty store (every operation will hit `UnknownKey`)
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store with the given initial values, all keys unlocked
    pub fn with_values<K, I>(values: I) -> Self
    where
        K: Into<Key>,
        I: IntoIterator<Item = (K, i64)>,
    {
        let mut tables = Tables::default();
        for (key, value) in values {
            let key = key.into();
            tables.locks.insert(key.clone(), LockState::Unlocked);
            tables.values.insert(key, value);
        }
        Self {
            inner: Mutex::new(tables),
            policy: GrantPolicy::default(),
        }
    }

    /// Use `policy` for every later lock request
    pub fn with_grant_policy(mut self, policy: GrantPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Grant policy in effect
    pub fn grant_policy(&self) -> GrantPolicy {
        self.policy
    }

    /// Number of keys
    pub fn len(&self) -> usize {
        self.inner.lock().values.len()
    }

    /// Whether the store has no keys
    pub fn is_empty(&self) -> bool {
        self.inner.lock().values.is_empty()
    }

    /// Whether the store was initialized with `key`
    pub fn contains_key(&self, key: &Key) -> bool {
        self.inner.lock().values.contains_key(key)
    }

    // ========================================================================
    // Lock Table
    // ========================================================================

    /// Try to lock `op.key` in the mode `op.kind` needs, without waiting
    ///
    /// Reads get a shared lock, writes an exclusive one. See
    /// [`LockState`] for the compatibility rules.
    pub fn try_acquire(&self, op: &Operation) -> Result<LockOutcome> {
        let mut tables = self.inner.lock();
        let state = tables.lock_mut(&op.key)?;

        match state.try_grant(op.txn_id, LockMode::for_kind(op.kind), self.policy) {
            Ok(mode) => {
                info!("{} lock granted to {} on {}", mode, op.txn_id, op.key);
                Ok(LockOutcome::Granted(mode))
            }
            Err(holders) => Ok(LockOutcome::Conflict { holders }),
        }
    }

    /// Boolean form of [`Store::try_acquire`]; unknown keys are never granted
    pub fn acquire(&self, op: &Operation) -> bool {
        matches!(self.try_acquire(op), Ok(LockOutcome::Granted(_)))
    }

    /// Release one hold of `op.txn_id` on `op.key`
    ///
    /// Only a holder may release. Other shared holders keep their locks; the
    /// key becomes unlocked once the last hold is gone.
    pub fn release(&self, op: &Operation) -> Result<()> {
        let mut tables = self.inner.lock();
        let state = tables.lock_mut(&op.key)?;

        if !state.release(op.txn_id) {
            return Err(Error::LockNotHeld {
                txn_id: op.txn_id,
                key: op.key.clone(),
            });
        }
        info!("lock released for {} on {}", op.txn_id, op.key);
        Ok(())
    }

    /// Snapshot of the lock state of `key`
    pub fn lock_state(&self, key: &Key) -> Option<LockState> {
        self.inner.lock().locks.get(key).cloned()
    }

    /// Whether every key is unlocked
    pub fn is_quiescent(&self) -> bool {
        self.inner.lock().locks.values().all(LockState::is_unlocked)
    }

    // ========================================================================
    // Values
    // ========================================================================

    /// Current value of `key`
    pub fn read(&self, key: &Key) -> Result<i64> {
        self.value(key).ok_or_else(|| Error::UnknownKey(key.clone()))
    }

    /// Current value of `key`, `None` for unknown keys
    pub fn value(&self, key: &Key) -> Option<i64> {
        self.inner.lock().values.get(key).copied()
    }

    /// Execute `op` under the lock its transaction holds
    ///
    /// Reads leave the value alone; writes increment it by one. Returns the
    /// value after the operation.
    pub fn apply(&self, op: &Operation) -> Result<i64> {
        let mut tables = self.inner.lock();
        let holds_lock = tables
            .locks
            .get(&op.key)
            .map(|state| match op.kind {
                OpKind::Read => state.is_held_by(op.txn_id),
                OpKind::Write => {
                    state.mode() == Some(LockMode::Exclusive) && state.is_held_by(op.txn_id)
                }
            })
            .ok_or_else(|| Error::UnknownKey(op.key.clone()))?;
        if !holds_lock {
            return Err(Error::LockNotHeld {
                txn_id: op.txn_id,
                key: op.key.clone(),
            });
        }

        let value = tables
            .values
            .get_mut(&op.key)
            .ok_or_else(|| Error::UnknownKey(op.key.clone()))?;
        if op.kind.is_write() {
            *value += 1;
        }
        Ok(*value)
    }

    /// Undo the effect of a write that is being taken out of the final
    /// history. Reads have no effect to undo.
    ///
    /// No lock is checked or taken. The write being undone released its
    /// lock when it executed, and the key may be held by someone else by
    /// now; a value logged by that holder can be off by the undone write
    /// until it finishes. Totals still match the final history.
    pub fn revert(&self, op: &Operation) -> Result<i64> {
        let mut tables = self.inner.lock();
        let value = tables
            .values
            .get_mut(&op.key)
            .ok_or_else(|| Error::UnknownKey(op.key.clone()))?;
        if op.kind.is_write() {
            *value -= 1;
        }
        Ok(*value)
    }

    /// Ordered snapshot of every value
    pub fn values(&self) -> BTreeMap<Key, i64> {
        self.inner
            .lock()
            .values
            .iter()
            .map(|(k, v)| (k.clone(), *v))
            .collect()
    }
}
