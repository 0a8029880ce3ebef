//! Simulator Integration Tests
//!
//! End-to-end runs through `lockstep::Simulator`: the built-in scenario,
//! properties that must hold for any schedule, the restart and detection
//! policies, and repeated concurrent runs.
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test --test simulator
//!
//! # Policy tests only
//! cargo test --test simulator policies::
//! ```

use lockstep::{
    Key, Operation, RestartLimit, ScheduleReport, Simulator, TransactionState, TxnId,
};

mod policies;
mod scenario;

// =============================================================================
// SHARED TEST UTILITIES
// =============================================================================

/// Keys of the default store
pub const KEYS: [&str; 3] = ["x", "y", "z"];

/// Take a key away from the scheduler by locking it for an outside
/// transaction that never appears in the schedule.
pub fn hold(sim: &Simulator, txn: u64, key: &str) {
    assert!(
        sim.store().acquire(&Operation::write(txn, key)),
        "{} should be free",
        key
    );
}

/// Like [`hold`], but with a read lock.
pub fn hold_shared(sim: &Simulator, txn: u64, key: &str) {
    assert!(
        sim.store().acquire(&Operation::read(txn, key)),
        "{} should be readable",
        key
    );
}

/// Give a key held with [`hold`] back.
pub fn release(sim: &Simulator, txn: u64, key: &str) {
    sim.store()
        .release(&Operation::write(txn, key))
        .expect("outside transaction holds the key");
}

/// Value of `key` after the run
pub fn value(report: &ScheduleReport, key: &str) -> i64 {
    report.values[&Key::new(key)]
}

/// Failures recorded for one transaction
pub fn failures_of(report: &ScheduleReport, txn: u64) -> usize {
    report
        .failures
        .iter()
        .filter(|f| f.operation.txn_id == TxnId(txn))
        .count()
}

/// Count of `op` in a history
pub fn occurrences(history: &[Operation], op: &Operation) -> usize {
    history.iter().filter(|o| *o == op).count()
}

/// Check everything that must hold once `run` returned, however many runs
/// the simulator has seen.
pub fn check_report(sim: &Simulator, report: &ScheduleReport) {
    let scheduler = sim.scheduler();
    let max_restarts = match scheduler.config().restart_limit {
        RestartLimit::Bounded(max) => max,
        RestartLimit::Unbounded => u32::MAX,
    };

    // value(k) = initial(k) + writes on k in the final history
    assert!(report.value_invariant_holds(), "{}", report.render());

    // Nothing is left locked and no lock entry is malformed
    assert!(sim.store().is_quiescent());
    for key in KEYS {
        let state = sim.store().lock_state(&Key::new(key)).unwrap();
        assert!(state.is_well_formed());
    }

    // Every executed operation was attempted at least as often
    for op in &report.final_history {
        assert!(occurrences(&report.final_history, op) <= occurrences(&report.history, op));
    }

    for txn in &report.transactions {
        assert!(txn.attempts <= max_restarts);

        let pending = scheduler.pending(txn.id);
        if !pending.is_empty() {
            assert!(scheduler.deadlock_flag(txn.id), "{} has pending ops but no flag", txn.id);
        }

        match txn.state {
            TransactionState::Failed => {
                assert_eq!(txn.attempts, max_restarts);
                assert!(pending.is_empty());
                assert!(!scheduler.deadlock_flag(txn.id));
            }
            TransactionState::Committed => assert!(pending.is_empty()),
            TransactionState::Active => assert!(!pending.is_empty()),
        }
    }

    // Failures only ever belong to failed transactions
    for failure in &report.failures {
        let txn = scheduler.transaction(failure.operation.txn_id).unwrap();
        assert!(txn.is_failed());
    }
}
