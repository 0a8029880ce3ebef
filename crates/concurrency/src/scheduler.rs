//! Two-phase-locking scheduler
//!
//! Executes read/write operations against a [`Store`], deferring the ones
//! whose lock is refused and aborting/restarting transactions it considers
//! deadlocked.
//!
//! ## Operation Lifecycle
//!
//! ```text
//! 1. append to history
//! 2. try_acquire() on the store
//! 3. IF granted: append to final history, apply, release
//! 4. ELSE: append to the transaction's deferred queue, set its deadlock
//!    flag, check for deadlock
//! 5. IF deadlocked: abort (drop queued ops from final history, clear the
//!    queue, count the attempt) and run the queued ops again from step 1
//! ```
//!
//! Restarts run as an iterative work loop on the calling thread. Each
//! transaction may restart at most [`RestartLimit`] times; one more abort
//! fails it permanently with [`Error::RetryLimitExceeded`].
//!
//! After a batch of concurrent first attempts, [`Scheduler::process_delays`]
//! retries every deferred queue exactly once.
//!
//! # Thread Safety
//!
//! Scheduler bookkeeping (histories, queues, flags, transactions and the
//! wait-for graph) lives behind one mutex. The store has its own mutex and
//! is only ever locked after, never before, the scheduler state. Lock
//! attempts and execution happen outside the scheduler mutex so operations
//! of different transactions really do race for keys.
//!
//! [`RestartLimit`]: crate::config::RestartLimit

use crate::config::{DeadlockDetection, SchedulerConfig, SweepMode};
use crate::wait_for::WaitForGraph;
use lockstep_core::{Error, Operation, OpKind, Result, Transaction, TxnId};
use lockstep_storage::{LockOutcome, Store};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde::Serialize;
use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Barrier};
use std::thread;
use tracing::{debug, info, warn};

/// Bookkeeping owned by the scheduler
#[derive(Debug, Default)]
struct SchedulerState {
    /// Every attempted operation, restarts included
    history: Vec<Operation>,
    /// Operations that executed under a granted lock
    final_history: Vec<Operation>,
    /// Deferred operations per transaction
    delays: BTreeMap<TxnId, Vec<Operation>>,
    /// Transaction metadata, created lazily
    transactions: BTreeMap<TxnId, Transaction>,
    /// Set when a transaction has an operation deferred
    deadlock_flags: FxHashMap<TxnId, bool>,
    /// Waiter -> holder edges for deferred operations
    wait_for: WaitForGraph,
}

impl SchedulerState {
    fn transaction_mut(&mut self, txn_id: TxnId) -> &mut Transaction {
        self.transactions
            .entry(txn_id)
            .or_insert_with(|| Transaction::new(txn_id))
    }
}

/// What a single attempt at an operation led to
#[derive(Debug)]
enum Attempt {
    Executed,
    Deferred,
    Restart(Vec<Operation>),
}

/// Result of the deferred sweep
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Operations that executed during the sweep, in sweep order
    pub executed: Vec<Operation>,
    /// Operations still deferred after the sweep
    pub pending: BTreeMap<TxnId, Vec<Operation>>,
    /// Operations dropped without executing (clear-on-first-success only)
    pub discarded: Vec<Operation>,
}

/// Result of [`Scheduler::process_history`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    /// Submitted operations whose task ended in an error
    pub failures: Vec<(Operation, Error)>,
    /// What the deferred sweep did
    pub sweep: SweepReport,
}

/// Lock-based transaction scheduler over a shared [`Store`]
///
/// # Example
///
/// ```
/// use lockstep_concurrency::{Scheduler, SchedulerConfig};
/// use lockstep_core::Operation;
/// use lockstep_storage::Store;
/// use std::sync::Arc;
///
/// let store = Arc::new(Store::with_values([("x", 1), ("y", 2)]));
/// let scheduler = Scheduler::new(Arc::clone(&store), SchedulerConfig::default());
///
/// let outcome = scheduler
///     .process_history(&[Operation::write(1, "x"), Operation::read(2, "y")])
///     .unwrap();
///
/// assert!(outcome.failures.is_empty());
/// assert_eq!(scheduler.final_history().len(), 2);
/// assert_eq!(store.value(&"x".into()), Some(2));
/// ```
pub struct Scheduler {
    store: Arc<Store>,
    config: SchedulerConfig,
    state: Mutex<SchedulerState>,
}

impl Scheduler {
    /// Create a scheduler over `store`
    pub fn new(store: Arc<Store>, config: SchedulerConfig) -> Self {
        Self {
            store,
            config,
            state: Mutex::new(SchedulerState::default()),
        }
    }

    /// The store operations run against
    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    /// Active configuration
    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    // ========================================================================
    // Batch Driver
    // ========================================================================

    /// Run a batch: every operation on its own thread, then one sweep
    ///
    /// All threads are released together and joined before the sweep.
    /// Operations naming unknown keys reject the whole batch up front.
    pub fn process_history(&self, operations: &[Operation]) -> Result<BatchOutcome> {
        for op in operations {
            if !self.store.contains_key(&op.key) {
                return Err(Error::UnknownKey(op.key.clone()));
            }
        }
        for op in operations {
            self.register_transaction(op.txn_id);
        }

        let barrier = Barrier::new(operations.len());
        let failures = thread::scope(|scope| {
            let handles: Vec<_> = operations
                .iter()
                .map(|op| {
                    let barrier = &barrier;
                    scope.spawn(move || {
                        barrier.wait();
                        self.execute_operation(op.clone())
                    })
                })
                .collect();

            operations
                .iter()
                .zip(handles)
                .filter_map(|(op, handle)| match handle.join() {
                    Ok(Ok(())) => None,
                    Ok(Err(e)) => {
                        warn!(op = %op.notation(), error = %e, "operation failed");
                        Some((op.clone(), e))
                    }
                    Err(panic) => std::panic::resume_unwind(panic),
                })
                .collect::<Vec<_>>()
        });

        let sweep = self.process_delays()?;
        Ok(BatchOutcome { failures, sweep })
    }

    /// Create metadata for `txn_id` if this is the first time it is seen
    pub fn register_transaction(&self, txn_id: TxnId) {
        self.state.lock().transaction_mut(txn_id);
    }

    // ========================================================================
    // Execute / Abort / Restart
    // ========================================================================

    /// Execute one operation, restarting its transaction as often as the
    /// deadlock policy and restart limit demand
    ///
    /// Returns `Ok(())` once the operation executed or was left deferred.
    /// Fails with [`Error::RetryLimitExceeded`] when the transaction runs out
    /// of restarts, and with [`Error::TransactionFailed`] if it already had.
    pub fn execute_operation(&self, op: Operation) -> Result<()> {
        self.run(VecDeque::from([op]))
    }

    /// Check `txn_id` for deadlock; if found, abort and restart it
    ///
    /// Returns whether a deadlock was detected.
    pub fn check_deadlock(&self, txn_id: TxnId) -> Result<bool> {
        let restart = {
            let mut state = self.state.lock();
            if !self.detect_locked(&state, txn_id) {
                return Ok(false);
            }
            self.abort_locked(&mut state, txn_id)?
        };
        self.run(restart.into())?;
        Ok(true)
    }

    /// Abort `txn_id` and immediately restart its deferred operations
    pub fn abort_transaction(&self, txn_id: TxnId) -> Result<()> {
        let restart = {
            let mut state = self.state.lock();
            self.abort_locked(&mut state, txn_id)?
        };
        self.run(restart.into())
    }

    fn run(&self, mut pending: VecDeque<Operation>) -> Result<()> {
        while let Some(op) = pending.pop_front() {
            match self.attempt(op)? {
                Attempt::Executed | Attempt::Deferred => {}
                Attempt::Restart(ops) => {
                    // Give the holder a chance to finish before retrying
                    thread::yield_now();
                    pending.extend(ops);
                }
            }
        }
        Ok(())
    }

    fn attempt(&self, op: Operation) -> Result<Attempt> {
        {
            let mut state = self.state.lock();
            let txn = state.transaction_mut(op.txn_id);
            if txn.is_failed() {
                return Err(Error::TransactionFailed(op.txn_id));
            }
            // New work in a later batch makes a committed transaction active again
            txn.reopen();
            state.history.push(op.clone());
        }

        match self.store.try_acquire(&op)? {
            LockOutcome::Granted(_) => {
                {
                    let mut state = self.state.lock();
                    // Another operation of the transaction may have failed it
                    // while this one was acquiring
                    if state.transaction_mut(op.txn_id).is_failed() {
                        drop(state);
                        self.store.release(&op)?;
                        return Err(Error::TransactionFailed(op.txn_id));
                    }
                    state.final_history.push(op.clone());
                }
                let value = self.store.apply(&op)?;
                match op.kind {
                    OpKind::Read => info!("{}: reading {} = {}", op.txn_id, op.key, value),
                    OpKind::Write => info!("{}: writing {} = {}", op.txn_id, op.key, value),
                }
                self.store.release(&op)?;
                Ok(Attempt::Executed)
            }
            LockOutcome::Conflict { holders } => {
                let mut state = self.state.lock();
                let txn_id = op.txn_id;
                if state.transaction_mut(txn_id).is_failed() {
                    return Err(Error::TransactionFailed(txn_id));
                }
                info!("{}: operation {} deferred", txn_id, op.kind);
                debug!(txn = %txn_id, key = %op.key, ?holders, "lock conflict");

                state.delays.entry(txn_id).or_default().push(op);
                state.deadlock_flags.insert(txn_id, true);
                state.wait_for.add_wait(txn_id, holders);

                if self.detect_locked(&state, txn_id) {
                    let restart = self.abort_locked(&mut state, txn_id)?;
                    Ok(Attempt::Restart(restart))
                } else {
                    Ok(Attempt::Deferred)
                }
            }
        }
    }

    fn detect_locked(&self, state: &SchedulerState, txn_id: TxnId) -> bool {
        if !state.deadlock_flags.get(&txn_id).copied().unwrap_or(false) {
            return false;
        }
        let detected = match self.config.deadlock_detection {
            DeadlockDetection::ConflictIsDeadlock => true,
            DeadlockDetection::WaitForGraph => match state.wait_for.find_cycle(txn_id) {
                Some(cycle) => {
                    debug!(txn = %txn_id, ?cycle, "wait-for cycle");
                    true
                }
                None => false,
            },
        };
        if detected {
            info!("deadlock detected for {}!", txn_id);
        }
        detected
    }

    /// Abort `txn_id` and hand back the operations to run again.
    ///
    /// Every queued operation takes the first equal entry out of the final
    /// history; a write taken out this way is reverted in the store.
    fn abort_locked(&self, state: &mut SchedulerState, txn_id: TxnId) -> Result<Vec<Operation>> {
        info!("aborting transaction {}...", txn_id);

        let queued = state.delays.remove(&txn_id).unwrap_or_default();
        for op in &queued {
            if let Some(pos) = state.final_history.iter().position(|done| done == op) {
                let removed = state.final_history.remove(pos);
                self.store.revert(&removed)?;
            }
        }
        state.wait_for.clear_waits(txn_id);

        let limit = self.config.restart_limit;
        let txn = state.transaction_mut(txn_id);
        if !limit.allows(txn.attempts) {
            txn.mark_failed();
            let attempts = txn.attempts;
            state.deadlock_flags.insert(txn_id, false);
            state.wait_for.remove(txn_id);
            warn!(txn = %txn_id, attempts, "restart limit reached, giving up");
            return Err(Error::RetryLimitExceeded { txn_id, attempts });
        }

        let attempts = txn.record_abort();
        info!("restarting transaction {}, attempts: {}", txn_id, attempts);
        Ok(queued)
    }

    // ========================================================================
    // Deferred Sweep
    // ========================================================================

    /// Retry every deferred operation once, in transaction id order
    ///
    /// Executed operations move to the final history. What happens to the
    /// rest of a queue depends on [`SweepMode`]. A transaction's deadlock
    /// flag is cleared exactly when its queue ends up empty. Afterwards,
    /// every active transaction with nothing pending is marked committed.
    pub fn process_delays(&self) -> Result<SweepReport> {
        let mut state = self.state.lock();
        let mut report = SweepReport::default();
        let queued: Vec<TxnId> = state.delays.keys().copied().collect();

        for txn_id in queued {
            let ops = state.delays.remove(&txn_id).unwrap_or_default();
            let mut remaining = Vec::new();
            let mut any_executed = false;

            for op in ops {
                match self.store.try_acquire(&op)? {
                    LockOutcome::Granted(_) => {
                        state.final_history.push(op.clone());
                        let value = self.store.apply(&op)?;
                        self.store.release(&op)?;
                        debug!(op = %op.notation(), value, "deferred operation executed");
                        info!("{}: operation {} executed after delay", txn_id, op.kind);
                        report.executed.push(op);
                        any_executed = true;
                    }
                    LockOutcome::Conflict { .. } => remaining.push(op),
                }
            }

            if any_executed && self.config.sweep_mode == SweepMode::ClearOnFirstSuccess {
                report.discarded.append(&mut remaining);
            }

            if remaining.is_empty() {
                state.deadlock_flags.insert(txn_id, false);
                state.wait_for.clear_waits(txn_id);
            } else {
                state.deadlock_flags.insert(txn_id, true);
                report.pending.insert(txn_id, remaining.clone());
                state.delays.insert(txn_id, remaining);
            }
        }

        let SchedulerState {
            transactions,
            delays,
            ..
        } = &mut *state;
        for (txn_id, txn) in transactions.iter_mut() {
            if !delays.contains_key(txn_id) {
                txn.mark_committed();
            }
        }

        Ok(report)
    }

    // ========================================================================
    // Inspection
    // ========================================================================

    /// Every attempted operation, in attempt order
    pub fn history(&self) -> Vec<Operation> {
        self.state.lock().history.clone()
    }

    /// Executed operations, in completion order
    pub fn final_history(&self) -> Vec<Operation> {
        self.state.lock().final_history.clone()
    }

    /// Deferred operations of `txn_id`
    pub fn pending(&self, txn_id: TxnId) -> Vec<Operation> {
        self.state
            .lock()
            .delays
            .get(&txn_id)
            .cloned()
            .unwrap_or_default()
    }

    /// All non-empty deferred queues
    pub fn deferred_queues(&self) -> BTreeMap<TxnId, Vec<Operation>> {
        self.state
            .lock()
            .delays
            .iter()
            .filter(|(_, ops)| !ops.is_empty())
            .map(|(txn_id, ops)| (*txn_id, ops.clone()))
            .collect()
    }

    /// Deadlock flag of `txn_id` (false if never set)
    pub fn deadlock_flag(&self, txn_id: TxnId) -> bool {
        self.state
            .lock()
            .deadlock_flags
            .get(&txn_id)
            .copied()
            .unwrap_or(false)
    }

    /// Metadata of `txn_id`
    pub fn transaction(&self, txn_id: TxnId) -> Option<Transaction> {
        self.state.lock().transactions.get(&txn_id).cloned()
    }

    /// Metadata of every transaction seen, ordered by id
    pub fn transactions(&self) -> Vec<Transaction> {
        self.state.lock().transactions.values().cloned().collect()
    }

    /// Transactions `txn_id` currently waits for
    pub fn waits_for(&self, txn_id: TxnId) -> Vec<TxnId> {
        self.state
            .lock()
            .wait_for
            .waits_for(txn_id)
            .map(|holders| holders.iter().copied().collect())
            .unwrap_or_default()
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
