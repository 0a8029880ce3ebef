//! The built-in schedule and other fixed scenarios

use super::*;
use lockstep::{parse_schedule, DeadlockDetection, Error, GrantPolicy, TransactionState};

#[test]
fn default_schedule_keeps_values_consistent() {
    let sim = Simulator::new();
    let report = sim.run(&Simulator::default_schedule()).unwrap();

    assert!(report.value_invariant_holds());
    assert!(sim.store().is_quiescent());
    assert_eq!(value(&report, "z"), 3);
    for op in Simulator::default_schedule() {
        assert!(occurrences(&report.history, &op) >= 1, "{} never attempted", op);
    }
    if report.failures.is_empty() {
        assert_eq!(value(&report, "x"), 3);
        assert_eq!(value(&report, "y"), 4);
        assert_eq!(report.final_history.len(), 4);
    }
}

#[test]
fn default_schedule_report_lists_both_histories() {
    let sim = Simulator::new();
    let report = sim.run(&Simulator::default_schedule()).unwrap();
    let rendered = report.render();

    let history_at = rendered.find("History:\n").unwrap();
    let final_at = rendered.find("Final History:\n").unwrap();
    assert!(history_at < final_at);
    for op in &report.final_history {
        assert!(rendered[final_at..].contains(&format!("T{}: w {}\n", op.txn_id.0, op.key)));
    }
}

#[test]
fn transaction_conflicts_with_its_own_hold() {
    let sim = Simulator::builder().max_restarts(2).build();
    // T1 writes x outside the schedule; its own second write is refused
    hold(&sim, 1, "x");

    let report = sim.run(&[Operation::write(1, "x")]).unwrap();

    assert_eq!(failures_of(&report, 1), 1);
    assert!(report.failures[0].retry_exhausted);
    assert_eq!(occurrences(&report.history, &Operation::write(1, "x")), 3);
    assert!(report.final_history.is_empty());
    assert_eq!(value(&report, "x"), 1);
}

#[test]
fn reader_cannot_upgrade_its_own_shared_lock() {
    let sim = Simulator::builder()
        .detection(DeadlockDetection::WaitForGraph)
        .build();
    hold_shared(&sim, 1, "y");

    let report = sim.run(&[Operation::write(1, "y")]).unwrap();

    assert_eq!(report.sweep.pending[&TxnId(1)], vec![Operation::write(1, "y")]);
    assert!(sim.scheduler().waits_for(TxnId(1)).is_empty());
    assert_eq!(value(&report, "y"), 2);
}

#[test]
fn reentrant_locks_let_a_transaction_reuse_its_keys() {
    let sim = Simulator::builder()
        .grant_policy(GrantPolicy::Reentrant)
        .build();
    let ops = parse_schedule("r1(x) w1(x) w1(x) r1(y) w1(z)").unwrap();
    let report = sim.run(&ops).unwrap();

    assert!(report.failures.is_empty());
    assert_eq!(report.history.len(), ops.len());
    assert_eq!(report.final_history.len(), ops.len());
    assert_eq!(value(&report, "x"), 3);
    assert_eq!(value(&report, "y"), 2);
    assert_eq!(value(&report, "z"), 4);

    let txn = sim.scheduler().transaction(TxnId(1)).unwrap();
    assert_eq!(txn.attempts, 0);
    assert_eq!(txn.state, TransactionState::Committed);
}

#[test]
fn readers_share_a_key() {
    let sim = Simulator::new();
    let ops = parse_schedule("r1(x) r2(x) r3(x) r4(x)").unwrap();
    let report = sim.run(&ops).unwrap();

    assert_eq!(report.history.len(), 4);
    assert_eq!(report.final_history.len(), 4);
    assert!(report.sweep.executed.is_empty());
    assert_eq!(value(&report, "x"), 1);
    assert!(report
        .transactions
        .iter()
        .all(|t| t.attempts == 0 && t.state == TransactionState::Committed));
}

#[test]
fn empty_schedule() {
    let sim = Simulator::new();
    let report = sim.run(&[]).unwrap();

    assert!(report.history.is_empty());
    assert!(report.final_history.is_empty());
    assert!(report.transactions.is_empty());
    assert_eq!(report.values, report.initial_values);
}

#[test]
fn unknown_key_rejects_the_whole_batch() {
    let sim = Simulator::new();
    let ops = parse_schedule("w1(x) w2(nope)").unwrap();

    let err = sim.run(&ops).unwrap_err();
    assert_eq!(err, Error::UnknownKey(Key::new("nope")));
    assert!(sim.scheduler().history().is_empty());
    assert_eq!(sim.store().value(&Key::new("x")), Some(1));
}

#[test]
fn runs_accumulate_into_the_same_histories() {
    let sim = Simulator::new();
    sim.run(&[Operation::write(1, "x")]).unwrap();
    let report = sim.run(&[Operation::write(2, "x")]).unwrap();

    assert_eq!(report.history.len(), 2);
    assert_eq!(value(&report, "x"), 3);
    assert!(report.value_invariant_holds());
}
