//! Core types for the scheduler simulator
//!
//! This module defines the fundamental types used throughout the system:
//! - [`TxnId`]: Identifier of a transaction
//! - [`Key`]: Name of a cell in the store
//! - [`OpKind`] and [`Operation`]: a single read or write step
//!
//! Operations have a compact textual form used by schedules: the kind
//! letter, the transaction number and the key in parentheses, e.g. `w1(x)`.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Identifier of a transaction
///
/// Transactions are numbered by the caller; the scheduler never allocates
/// ids itself. Displayed as `T<id>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TxnId(pub u64);

impl TxnId {
    /// Raw numeric id
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl From<u64> for TxnId {
    fn from(id: u64) -> Self {
        TxnId(id)
    }
}

impl fmt::Display for TxnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "T{}", self.0)
    }
}

/// Name of a cell in the store
///
/// # Examples
///
/// ```
/// use lockstep_core::Key;
///
/// let key = Key::new("x");
/// assert_eq!(key.as_str(), "x");
/// assert_eq!(key, Key::from("x"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Key(String);

impl Key {
    /// Create a key from anything string-like
    pub fn new(name: impl Into<String>) -> Self {
        Key(name.into())
    }

    /// Borrow the key name
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Key {
    fn from(name: &str) -> Self {
        Key::new(name)
    }
}

impl From<String> for Key {
    fn from(name: String) -> Self {
        Key(name)
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Kind of an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OpKind {
    /// Read: needs a shared lock, leaves the value unchanged
    Read,
    /// Write: needs an exclusive lock, increments the value by one
    Write,
}

impl OpKind {
    /// Schedule letter for this kind (`r` or `w`)
    pub fn as_str(&self) -> &'static str {
        match self {
            OpKind::Read => "r",
            OpKind::Write => "w",
        }
    }

    /// Whether this operation mutates the store
    pub fn is_write(&self) -> bool {
        matches!(self, OpKind::Write)
    }
}

impl fmt::Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OpKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "r" | "read" => Ok(OpKind::Read),
            "w" | "write" => Ok(OpKind::Write),
            other => Err(Error::InvalidOperation(format!(
                "unknown operation kind '{}'",
                other
            ))),
        }
    }
}

/// A single read or write issued by a transaction
///
/// Operations are plain values: two operations with the same transaction,
/// kind and key are equal and cannot be told apart. Removal from histories
/// relies on exactly this equality.
///
/// # Examples
///
/// ```
/// use lockstep_core::{Operation, OpKind, TxnId};
///
/// let op: Operation = "w1(x)".parse().unwrap();
/// assert_eq!(op, Operation::write(1, "x"));
/// assert_eq!(op.kind, OpKind::Write);
/// assert_eq!(op.txn_id, TxnId(1));
/// assert_eq!(op.to_string(), "T1: w x");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Operation {
    /// Transaction issuing the operation
    pub txn_id: TxnId,
    /// Read or write
    pub kind: OpKind,
    /// Key the operation touches
    pub key: Key,
}

impl Operation {
    /// Create an operation
    pub fn new(txn_id: impl Into<TxnId>, kind: OpKind, key: impl Into<Key>) -> Self {
        Self {
            txn_id: txn_id.into(),
            kind,
            key: key.into(),
        }
    }

    /// Shorthand for a read
    pub fn read(txn_id: impl Into<TxnId>, key: impl Into<Key>) -> Self {
        Self::new(txn_id, OpKind::Read, key)
    }

    /// Shorthand for a write
    pub fn write(txn_id: impl Into<TxnId>, key: impl Into<Key>) -> Self {
        Self::new(txn_id, OpKind::Write, key)
    }

    /// Render in schedule notation, e.g. `r2(y)`
    pub fn notation(&self) -> String {
        format!("{}{}({})", self.kind, self.txn_id.0, self.key)
    }
}

impl fmt::Display for Operation {
    /// Report form: `T<id>: <kind> <key>`
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} {}", self.txn_id, self.kind, self.key)
    }
}

impl FromStr for Operation {
    type Err = Error;

    /// Parse schedule notation: `<r|w><txn>(<key>)`
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let invalid = |reason: &str| Error::InvalidOperation(format!("'{}': {}", s, reason));

        let mut chars = s.chars();
        let kind = match chars.next() {
            Some(c) => c.to_string().parse::<OpKind>().map_err(|_| invalid("expected r or w"))?,
            None => return Err(invalid("empty operation")),
        };
        let rest = chars.as_str();

        let open = rest.find('(').ok_or_else(|| invalid("missing '('"))?;
        let inner = rest[open + 1..]
            .strip_suffix(')')
            .ok_or_else(|| invalid("missing ')'"))?;
        let txn = rest[..open]
            .parse::<u64>()
            .map_err(|_| invalid("transaction id must be a number"))?;
        if inner.is_empty() {
            return Err(invalid("empty key"));
        }

        Ok(Operation::new(txn, kind, inner))
    }
}

/// Parse a whole schedule, operations separated by whitespace or commas
///
/// ```
/// use lockstep_core::{parse_schedule, Operation};
///
/// let ops = parse_schedule("w1(x), w2(y) r1(y)").unwrap();
/// assert_eq!(ops, vec![
///     Operation::write(1, "x"),
///     Operation::write(2, "y"),
///     Operation::read(1, "y"),
/// ]);
/// ```
pub fn parse_schedule(schedule: &str) -> Result<Vec<Operation>> {
    schedule
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|token| !token.is_empty())
        .map(str::parse)
        .collect()
}
