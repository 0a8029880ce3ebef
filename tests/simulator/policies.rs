//! Restart limits, deadlock detection and sweep modes, driven with keys
//! held by outside transactions so every conflict is deterministic

use super::*;
use lockstep::{DeadlockDetection, Error, SchedulerConfig, SweepMode, TransactionState};

// =============================================================================
// Restart limit
// =============================================================================

#[test]
fn permanently_held_key_exhausts_restarts() {
    let sim = Simulator::builder().max_restarts(3).build();
    hold(&sim, 99, "x");

    let report = sim.run(&[Operation::write(1, "x")]).unwrap();

    let txn = sim.scheduler().transaction(TxnId(1)).unwrap();
    assert_eq!(txn.state, TransactionState::Failed);
    assert_eq!(txn.attempts, 3);
    // The first attempt plus one per restart
    assert_eq!(occurrences(&report.history, &Operation::write(1, "x")), 4);
    assert!(report.final_history.is_empty());
    assert_eq!(value(&report, "x"), 1);
    assert!(!sim.scheduler().deadlock_flag(TxnId(1)));

    assert_eq!(report.failures.len(), 1);
    assert_eq!(
        report.failures[0].error,
        Error::RetryLimitExceeded {
            txn_id: TxnId(1),
            attempts: 3
        }
        .to_string()
    );
}

#[test]
fn zero_restarts_fails_on_first_abort() {
    let sim = Simulator::builder().max_restarts(0).build();
    hold(&sim, 99, "y");

    let report = sim.run(&[Operation::read(4, "y")]).unwrap();
    let txn = sim.scheduler().transaction(TxnId(4)).unwrap();
    assert!(txn.is_failed());
    assert_eq!(txn.attempts, 0);
    assert_eq!(report.history.len(), 1);
}

#[test]
fn failed_transaction_rejects_later_operations() {
    let sim = Simulator::builder().max_restarts(1).build();
    hold(&sim, 99, "x");
    sim.run(&[Operation::write(1, "x")]).unwrap();
    release(&sim, 99, "x");

    let report = sim.run(&[Operation::write(1, "y"), Operation::write(2, "y")]).unwrap();

    assert_eq!(failures_of(&report, 1), 1);
    assert_eq!(failures_of(&report, 2), 0);
    assert!(!report.failures[0].retry_exhausted);
    assert_eq!(report.failures[0].error, Error::TransactionFailed(TxnId(1)).to_string());
    assert_eq!(value(&report, "y"), 3);
}

#[test]
fn other_transactions_are_unaffected_by_a_failure() {
    let sim = Simulator::builder().max_restarts(2).build();
    hold(&sim, 99, "x");

    let report = sim
        .run(&[Operation::write(1, "x"), Operation::write(2, "y"), Operation::read(3, "z")])
        .unwrap();

    assert_eq!(failures_of(&report, 1), 1);
    assert_eq!(value(&report, "y"), 3);
    assert_eq!(
        sim.scheduler().transaction(TxnId(2)).unwrap().state,
        TransactionState::Committed
    );
    assert_eq!(
        sim.scheduler().transaction(TxnId(3)).unwrap().state,
        TransactionState::Committed
    );
}

// =============================================================================
// Deadlock detection
// =============================================================================

#[test]
fn wait_for_graph_defers_without_a_cycle() {
    let sim = Simulator::builder()
        .detection(DeadlockDetection::WaitForGraph)
        .build();
    hold(&sim, 99, "x");

    let report = sim.run(&[Operation::write(1, "x")]).unwrap();

    assert!(report.failures.is_empty());
    assert_eq!(
        report.sweep.pending.get(&TxnId(1)),
        Some(&vec![Operation::write(1, "x")])
    );
    assert!(sim.scheduler().deadlock_flag(TxnId(1)));
    assert_eq!(sim.scheduler().waits_for(TxnId(1)), vec![TxnId(99)]);
    assert_eq!(sim.scheduler().transaction(TxnId(1)).unwrap().attempts, 0);

    // Once the key is free a second sweep finishes the job
    release(&sim, 99, "x");
    let sweep = sim.scheduler().process_delays().unwrap();
    assert_eq!(sweep.executed, vec![Operation::write(1, "x")]);
    assert!(sweep.pending.is_empty());
    assert!(!sim.scheduler().deadlock_flag(TxnId(1)));
    assert!(sim.scheduler().waits_for(TxnId(1)).is_empty());
    assert_eq!(sim.store().value(&Key::new("x")), Some(2));
    assert_eq!(
        sim.scheduler().transaction(TxnId(1)).unwrap().state,
        TransactionState::Committed
    );
}

#[test]
fn wait_for_graph_aborts_only_the_cycle_closer() {
    let sim = Simulator::builder()
        .detection(DeadlockDetection::WaitForGraph)
        .max_restarts(2)
        .build();
    // T1 owns x and T2 owns y outside the schedule; each then asks for the other
    hold(&sim, 1, "x");
    hold(&sim, 2, "y");

    let report = sim
        .run(&[Operation::write(1, "y"), Operation::write(2, "x")])
        .unwrap();

    assert_eq!(report.failures.len(), 1);
    assert!(report.failures[0].retry_exhausted);
    let loser = report.failures[0].operation.txn_id;
    let winner = if loser == TxnId(1) { TxnId(2) } else { TxnId(1) };

    assert_eq!(sim.scheduler().transaction(loser).unwrap().attempts, 2);
    assert_eq!(sim.scheduler().transaction(winner).unwrap().attempts, 0);
    assert_eq!(report.sweep.pending.len(), 1);
    assert!(report.sweep.pending.contains_key(&winner));
    assert!(sim.scheduler().deadlock_flag(winner));
}

#[test]
fn conflict_heuristic_aborts_every_waiter() {
    let sim = Simulator::builder().max_restarts(2).build();
    hold(&sim, 1, "x");
    hold(&sim, 2, "y");

    let report = sim
        .run(&[Operation::write(1, "y"), Operation::write(2, "x")])
        .unwrap();

    assert_eq!(report.failures.len(), 2);
    assert!(report.failures.iter().all(|f| f.retry_exhausted));
    assert!(report.sweep.pending.is_empty());
    assert!(report
        .transactions
        .iter()
        .all(|t| t.is_failed() && t.attempts == 2));
}

#[test]
fn committed_transaction_reopens_in_a_later_batch() {
    let sim = Simulator::builder()
        .detection(DeadlockDetection::WaitForGraph)
        .build();
    let first = sim.run(&[Operation::write(1, "x")]).unwrap();
    assert_eq!(first.transactions[0].state, TransactionState::Committed);

    hold(&sim, 99, "x");
    let second = sim.run(&[Operation::write(1, "x")]).unwrap();

    let txn = sim.scheduler().transaction(TxnId(1)).unwrap();
    assert_eq!(txn.state, TransactionState::Active);
    assert_eq!(sim.scheduler().pending(TxnId(1)), vec![Operation::write(1, "x")]);
    check_report(&sim, &second);

    // The next sweep after the key frees up commits it again
    release(&sim, 99, "x");
    sim.scheduler().process_delays().unwrap();
    assert_eq!(
        sim.scheduler().transaction(TxnId(1)).unwrap().state,
        TransactionState::Committed
    );
    assert_eq!(sim.store().value(&Key::new("x")), Some(3));
}

// =============================================================================
// Sweep modes
// =============================================================================

/// T1 ends up with w1(x) and w1(y) deferred, then x is freed and the
/// sweep runs again.
fn half_blocked_sweep(mode: SweepMode) -> (Simulator, lockstep::SweepReport) {
    let sim = Simulator::builder()
        .config(SchedulerConfig::wait_for_graph().with_sweep_mode(mode))
        .build();
    hold(&sim, 99, "x");
    hold(&sim, 99, "y");

    let report = sim
        .run(&[Operation::write(1, "x"), Operation::write(1, "y")])
        .unwrap();
    assert_eq!(report.sweep.pending[&TxnId(1)].len(), 2);

    release(&sim, 99, "x");
    let sweep = sim.scheduler().process_delays().unwrap();
    (sim, sweep)
}

#[test]
fn retain_failed_keeps_the_blocked_operation() {
    let (sim, sweep) = half_blocked_sweep(SweepMode::RetainFailed);

    assert_eq!(sweep.executed, vec![Operation::write(1, "x")]);
    assert!(sweep.discarded.is_empty());
    assert_eq!(sim.scheduler().pending(TxnId(1)), vec![Operation::write(1, "y")]);
    assert!(sim.scheduler().deadlock_flag(TxnId(1)));
    assert!(sim.scheduler().transaction(TxnId(1)).unwrap().is_active());

    release(&sim, 99, "y");
    let sweep = sim.scheduler().process_delays().unwrap();
    assert_eq!(sweep.executed, vec![Operation::write(1, "y")]);
    assert!(!sim.scheduler().deadlock_flag(TxnId(1)));
    assert_eq!(sim.store().value(&Key::new("y")), Some(3));
}

#[test]
fn clear_on_first_success_drops_the_rest() {
    let (sim, sweep) = half_blocked_sweep(SweepMode::ClearOnFirstSuccess);

    assert_eq!(sweep.executed, vec![Operation::write(1, "x")]);
    assert_eq!(sweep.discarded, vec![Operation::write(1, "y")]);
    assert!(sweep.pending.is_empty());
    assert!(sim.scheduler().pending(TxnId(1)).is_empty());
    assert!(!sim.scheduler().deadlock_flag(TxnId(1)));
    assert_eq!(
        sim.scheduler().transaction(TxnId(1)).unwrap().state,
        TransactionState::Committed
    );
    // The dropped write never happened
    assert_eq!(sim.store().value(&Key::new("y")), Some(2));
}
