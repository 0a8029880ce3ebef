//! Lock table entries
//!
//! Each key carries a [`LockState`]: unlocked, shared by one or more
//! transactions, or held exclusively by one transaction. Holders are tracked
//! with a hold count so that a transaction running several operations on the
//! same key at once releases each of them independently.
//!
//! Compatibility under [`GrantPolicy::Strict`] (the default):
//!
//! | Held \ Requested | Shared | Exclusive |
//! |------------------|--------|-----------|
//! | Unlocked         | grant  | grant     |
//! | Shared           | grant  | refuse    |
//! | Exclusive        | refuse | refuse    |
//!
//! The holding transaction gets no special treatment: a reader asking to
//! write, or a writer asking again, is refused like anyone else.
//! [`GrantPolicy::Reentrant`] relaxes this for the holder only:
//!
//! | Held \ Requested | Shared | Exclusive |
//! |------------------|--------|-----------|
//! | Shared           | grant  | grant only if the requester is the sole holder (upgrade) |
//! | Exclusive        | grant only to the holder | grant only to the holder |

use lockstep_core::{OpKind, TxnId};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::fmt;

/// Lock modes for read/write access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LockMode {
    /// Shared lock for reads (multiple readers allowed).
    Shared,
    /// Exclusive lock for writes (single writer, no readers).
    Exclusive,
}

impl LockMode {
    /// Mode an operation of the given kind needs
    pub fn for_kind(kind: OpKind) -> Self {
        match kind {
            OpKind::Read => LockMode::Shared,
            OpKind::Write => LockMode::Exclusive,
        }
    }
}

impl fmt::Display for LockMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LockMode::Shared => f.write_str("shared"),
            LockMode::Exclusive => f.write_str("exclusive"),
        }
    }
}

/// Whether a transaction that already holds a key may be granted it again
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantPolicy {
    /// Writes need an unlocked key, reads an unlocked or shared one,
    /// whoever the current holder is
    #[default]
    Strict,
    /// The holder may take the key again and a sole reader may upgrade
    Reentrant,
}

/// A transaction holding a lock, with its hold count
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Holder {
    /// Holding transaction
    pub txn_id: TxnId,
    /// Number of outstanding grants to this transaction
    pub count: u32,
}

impl Holder {
    fn new(txn_id: TxnId) -> Self {
        Self { txn_id, count: 1 }
    }
}

/// Lock state of a single key
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LockState {
    /// Nobody holds the key
    #[default]
    Unlocked,
    /// One or more readers hold the key
    Shared(SmallVec<[Holder; 4]>),
    /// A single transaction holds the key
    Exclusive(Holder),
}

impl LockState {
    /// Current mode, `None` when unlocked
    pub fn mode(&self) -> Option<LockMode> {
        match self {
            LockState::Unlocked => None,
            LockState::Shared(_) => Some(LockMode::Shared),
            LockState::Exclusive(_) => Some(LockMode::Exclusive),
        }
    }

    /// Whether nobody holds the key
    pub fn is_unlocked(&self) -> bool {
        matches!(self, LockState::Unlocked)
    }

    /// Transactions currently holding the key
    pub fn holders(&self) -> Vec<TxnId> {
        match self {
            LockState::Unlocked => Vec::new(),
            LockState::Shared(holders) => holders.iter().map(|h| h.txn_id).collect(),
            LockState::Exclusive(holder) => vec![holder.txn_id],
        }
    }

    /// Whether `txn_id` holds the key in any mode
    pub fn is_held_by(&self, txn_id: TxnId) -> bool {
        match self {
            LockState::Unlocked => false,
            LockState::Shared(holders) => holders.iter().any(|h| h.txn_id == txn_id),
            LockState::Exclusive(holder) => holder.txn_id == txn_id,
        }
    }

    /// Structural invariant: no empty shared set, no zero hold counts,
    /// no duplicate shared holders.
    pub fn is_well_formed(&self) -> bool {
        match self {
            LockState::Unlocked => true,
            LockState::Exclusive(holder) => holder.count > 0,
            LockState::Shared(holders) => {
                !holders.is_empty()
                    && holders.iter().all(|h| h.count > 0)
                    && holders.iter().enumerate().all(|(i, h)| {
                        holders[i + 1..].iter().all(|other| other.txn_id != h.txn_id)
                    })
            }
        }
    }

    /// Try to grant `mode` to `txn_id` under `policy`.
    ///
    /// On success returns the mode now held. On conflict returns the other
    /// transactions blocking the request and leaves the state untouched.
    /// Under [`GrantPolicy::Strict`] that list is empty when the requester
    /// is only blocked by its own hold.
    pub(crate) fn try_grant(
        &mut self,
        txn_id: TxnId,
        mode: LockMode,
        policy: GrantPolicy,
    ) -> Result<LockMode, Vec<TxnId>> {
        let reentrant = policy == GrantPolicy::Reentrant;
        match self {
            LockState::Unlocked => {
                *self = match mode {
                    LockMode::Shared => {
                        let mut holders = SmallVec::new();
                        holders.push(Holder::new(txn_id));
                        LockState::Shared(holders)
                    }
                    LockMode::Exclusive => LockState::Exclusive(Holder::new(txn_id)),
                };
                Ok(mode)
            }
            LockState::Shared(holders) => match mode {
                LockMode::Shared => {
                    match holders.iter_mut().find(|h| h.txn_id == txn_id) {
                        Some(holder) => holder.count += 1,
                        None => holders.push(Holder::new(txn_id)),
                    }
                    Ok(LockMode::Shared)
                }
                LockMode::Exclusive => {
                    if reentrant && holders.len() == 1 && holders[0].txn_id == txn_id {
                        let count = holders[0].count + 1;
                        *self = LockState::Exclusive(Holder { txn_id, count });
                        Ok(LockMode::Exclusive)
                    } else {
                        Err(holders
                            .iter()
                            .map(|h| h.txn_id)
                            .filter(|id| *id != txn_id)
                            .collect())
                    }
                }
            },
            LockState::Exclusive(holder) => {
                if holder.txn_id != txn_id {
                    Err(vec![holder.txn_id])
                } else if reentrant {
                    holder.count += 1;
                    Ok(LockMode::Exclusive)
                } else {
                    Err(Vec::new())
                }
            }
        }
    }

    /// Drop one hold of `txn_id`. Returns false if it held nothing.
    pub(crate) fn release(&mut self, txn_id: TxnId) -> bool {
        match self {
            LockState::Unlocked => false,
            LockState::Exclusive(holder) => {
                if holder.txn_id != txn_id {
                    return false;
                }
                holder.count -= 1;
                if holder.count == 0 {
                    *self = LockState::Unlocked;
                }
                true
            }
            LockState::Shared(holders) => {
                let Some(pos) = holders.iter().position(|h| h.txn_id == txn_id) else {
                    return false;
                };
                holders[pos].count -= 1;
                if holders[pos].count == 0 {
                    holders.remove(pos);
                }
                if holders.is_empty() {
                    *self = LockState::Unlocked;
                }
                true
            }
        }
    }
}
