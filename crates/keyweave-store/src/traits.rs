//! Ledger trait: the abstract interface to the external key-value store.
//!
//! The engine is storage-agnostic. Implementations include SQLite and an
//! in-memory map; a production deployment can put a distributed ledger
//! behind the same four operations.

use std::collections::BTreeMap;

use crate::error::Result;

/// A single staged write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOp {
    /// Set the key to this value.
    Put(Vec<u8>),
    /// Remove the key.
    Delete,
}

/// An ordered set of writes applied atomically by [`Ledger::apply`].
///
/// Later writes to the same key replace earlier ones.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteBatch {
    ops: BTreeMap<String, WriteOp>,
}

impl WriteBatch {
    /// Create an empty batch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage a put.
    pub fn put(&mut self, key: impl Into<String>, value: Vec<u8>) {
        self.ops.insert(key.into(), WriteOp::Put(value));
    }

    /// Stage a delete.
    pub fn delete(&mut self, key: impl Into<String>) {
        self.ops.insert(key.into(), WriteOp::Delete);
    }

    /// The staged write for `key`, if any.
    pub fn get(&self, key: &str) -> Option<&WriteOp> {
        self.ops.get(key)
    }

    /// Staged writes whose key starts with `prefix`, in key order.
    pub fn scan<'a>(&'a self, prefix: &'a str) -> impl Iterator<Item = (&'a String, &'a WriteOp)> + 'a {
        self.ops
            .range(prefix.to_string()..)
            .take_while(move |(k, _)| k.starts_with(prefix))
    }

    /// Iterate all staged writes in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &WriteOp)> {
        self.ops.iter()
    }

    /// Number of staged writes.
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// True when nothing is staged.
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

/// The Ledger trait: synchronous interface to the key-value store.
///
/// # Design Notes
///
/// - **Synchronous**: every call runs to completion; the engine has no
///   internal threading and no cancellation.
/// - **Atomic batches**: [`Ledger::apply`] must apply all writes of a batch
///   or none of them. Isolation between concurrent transactions is the
///   ledger's concern.
/// - **Ordered scans**: [`Ledger::range_scan`] returns entries sorted by key.
pub trait Ledger: Send + Sync {
    /// Get the value stored under `key`.
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// All entries whose key starts with `prefix`, sorted by key.
    fn range_scan(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>>;

    /// Apply a batch of writes atomically.
    fn apply(&self, batch: &WriteBatch) -> Result<()>;

    /// Store a single value.
    fn put(&self, key: &str, value: Vec<u8>) -> Result<()> {
        let mut batch = WriteBatch::new();
        batch.put(key, value);
        self.apply(&batch)
    }

    /// Remove a single key.
    fn delete(&self, key: &str) -> Result<()> {
        let mut batch = WriteBatch::new();
        batch.delete(key);
        self.apply(&batch)
    }
}
