//! Wait-for graph for deadlock detection
//!
//! An edge `waiter -> holder` means the waiter has an operation deferred on
//! a key the holder had locked. A cycle reachable from a transaction means
//! it can never make progress without someone being aborted.
//!
//! The graph keeps a reverse index next to the forward edges so that
//! removing a transaction cleans up both directions without a full scan.

use lockstep_core::TxnId;
use rustc_hash::{FxHashMap, FxHashSet};
use std::collections::BTreeSet;

/// Directed waiter -> holder graph
#[derive(Debug, Default, Clone)]
pub struct WaitForGraph {
    /// waiter -> transactions it waits for
    waits_for: FxHashMap<TxnId, BTreeSet<TxnId>>,
    /// Reverse index: holder -> transactions waiting for it
    waited_on_by: FxHashMap<TxnId, BTreeSet<TxnId>>,
}

impl WaitForGraph {
    /// Create an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `waiter` is blocked by each of `holders`.
    ///
    /// Self-edges are ignored: a transaction never waits for itself.
    pub fn add_wait(&mut self, waiter: TxnId, holders: impl IntoIterator<Item = TxnId>) {
        for holder in holders {
            if holder == waiter {
                continue;
            }
            self.waits_for.entry(waiter).or_default().insert(holder);
            self.waited_on_by.entry(holder).or_default().insert(waiter);
        }
    }

    /// Drop every outgoing edge of `waiter` (it is no longer blocked).
    pub fn clear_waits(&mut self, waiter: TxnId) {
        if let Some(holders) = self.waits_for.remove(&waiter) {
            for holder in holders {
                if let Some(waiters) = self.waited_on_by.get_mut(&holder) {
                    waiters.remove(&waiter);
                    if waiters.is_empty() {
                        self.waited_on_by.remove(&holder);
                    }
                }
            }
        }
    }

    /// Remove a transaction entirely, in both directions.
    pub fn remove(&mut self, txn_id: TxnId) {
        self.clear_waits(txn_id);
        if let Some(waiters) = self.waited_on_by.remove(&txn_id) {
            for waiter in waiters {
                if let Some(holders) = self.waits_for.get_mut(&waiter) {
                    holders.remove(&txn_id);
                    if holders.is_empty() {
                        self.waits_for.remove(&waiter);
                    }
                }
            }
        }
    }

    /// Transactions `waiter` is blocked by.
    pub fn waits_for(&self, waiter: TxnId) -> Option<&BTreeSet<TxnId>> {
        self.waits_for.get(&waiter)
    }

    /// Transactions blocked by `holder`.
    pub fn waiters_of(&self, holder: TxnId) -> Option<&BTreeSet<TxnId>> {
        self.waited_on_by.get(&holder)
    }

    /// Find a cycle through `start`.
    ///
    /// Returns the transactions on the cycle in edge order, beginning with
    /// `start` (the edge from the last one leads back to `start`).
    pub fn find_cycle(&self, start: TxnId) -> Option<Vec<TxnId>> {
        let mut visited = FxHashSet::default();
        visited.insert(start);
        let mut path = vec![start];
        let mut stack = vec![self.successors(start)];

        while let Some(frontier) = stack.last_mut() {
            match frontier.next() {
                Some(next) if next == start => return Some(path),
                Some(next) => {
                    if visited.insert(next) {
                        path.push(next);
                        stack.push(self.successors(next));
                    }
                }
                None => {
                    stack.pop();
                    path.pop();
                }
            }
        }
        None
    }

    /// Number of edges.
    pub fn edge_count(&self) -> usize {
        self.waits_for.values().map(BTreeSet::len).sum()
    }

    /// Check if the graph has no edges.
    pub fn is_empty(&self) -> bool {
        self.waits_for.is_empty()
    }

    fn successors(&self, txn_id: TxnId) -> std::vec::IntoIter<TxnId> {
        self.waits_for
            .get(&txn_id)
            .map(|holders| holders.iter().copied().collect::<Vec<_>>())
            .unwrap_or_default()
            .into_iter()
    }
}
