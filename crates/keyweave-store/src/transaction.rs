//! Transactions: staged writes over a ledger snapshot.
//!
//! Reads see the transaction's own staged writes first, then the ledger.
//! Nothing reaches the ledger until [`Transaction::commit`], which applies
//! the whole batch at once. A transaction that is dropped uncommitted
//! leaves the ledger untouched.

use serde::{de::DeserializeOwned, Serialize};

use keyweave_core::{from_cbor, to_cbor};

use crate::error::Result;
use crate::memo::Memo;
use crate::traits::{Ledger, WriteBatch, WriteOp};

/// One logical unit of work against a [`Ledger`].
pub struct Transaction<'l> {
    ledger: &'l dyn Ledger,
    writes: WriteBatch,
    memo: Memo,
}

impl<'l> Transaction<'l> {
    /// Begin a transaction with memoization enabled.
    pub fn new(ledger: &'l dyn Ledger) -> Self {
        Self::with_memo(ledger, Memo::new(true))
    }

    /// Begin a transaction with a caller-configured memo.
    pub fn with_memo(ledger: &'l dyn Ledger, memo: Memo) -> Self {
        Self {
            ledger,
            writes: WriteBatch::new(),
            memo,
        }
    }

    /// Read a raw value.
    pub fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        match self.writes.get(key) {
            Some(WriteOp::Put(value)) => Ok(Some(value.clone())),
            Some(WriteOp::Delete) => Ok(None),
            None => self.ledger.get(key),
        }
    }

    /// True when a value exists under `key`.
    pub fn contains(&self, key: &str) -> Result<bool> {
        Ok(self.get(key)?.is_some())
    }

    /// Stage a raw put.
    pub fn put(&mut self, key: impl Into<String>, value: Vec<u8>) {
        self.writes.put(key, value);
    }

    /// Stage a delete.
    pub fn delete(&mut self, key: impl Into<String>) {
        self.writes.delete(key);
    }

    /// All entries under `prefix`, merging staged writes over the ledger.
    pub fn range_scan(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>> {
        let mut merged: std::collections::BTreeMap<String, Vec<u8>> =
            self.ledger.range_scan(prefix)?.into_iter().collect();

        for (key, op) in self.writes.scan(prefix) {
            match op {
                WriteOp::Put(value) => {
                    merged.insert(key.clone(), value.clone());
                }
                WriteOp::Delete => {
                    merged.remove(key);
                }
            }
        }

        Ok(merged.into_iter().collect())
    }

    /// Read and decode a CBOR value.
    pub fn get_value<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.get(key)? {
            Some(bytes) => Ok(Some(from_cbor(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Encode and stage a CBOR value.
    pub fn put_value<T: Serialize>(&mut self, key: impl Into<String>, value: &T) -> Result<()> {
        let bytes = to_cbor(value)?;
        self.put(key, bytes);
        Ok(())
    }

    /// Decode every value under `prefix`, in key order.
    pub fn scan_values<T: DeserializeOwned>(&self, prefix: &str) -> Result<Vec<T>> {
        self.range_scan(prefix)?
            .into_iter()
            .map(|(_, bytes)| from_cbor(&bytes).map_err(Into::into))
            .collect()
    }

    /// The transaction's memo table.
    pub fn memo(&self) -> &Memo {
        &self.memo
    }

    /// Mutable access to the memo table.
    pub fn memo_mut(&mut self) -> &mut Memo {
        &mut self.memo
    }

    /// Number of staged writes.
    pub fn pending_writes(&self) -> usize {
        self.writes.len()
    }

    /// Apply every staged write atomically. Returns the number of writes.
    pub fn commit(self) -> Result<usize> {
        let count = self.writes.len();
        if count > 0 {
            self.ledger.apply(&self.writes)?;
        }
        tracing::debug!(writes = count, "transaction committed");
        Ok(count)
    }

    /// Discard every staged write. Returns the number discarded.
    pub fn rollback(self) -> usize {
        let count = self.writes.len();
        if count > 0 {
            tracing::debug!(writes = count, "transaction rolled back");
        }
        count
    }
}
