//! In-memory implementation of the Ledger trait.
//!
//! Same semantics as SQLite but keeps everything in a sorted map with no
//! persistence. Thread-safe via RwLock; a batch is applied under one write
//! lock, which makes it atomic.

use std::collections::BTreeMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::error::{Result, StoreError};
use crate::traits::{Ledger, WriteBatch, WriteOp};

/// In-memory ledger.
///
/// All data is lost when the ledger is dropped.
#[derive(Debug, Default)]
pub struct MemoryLedger {
    entries: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl MemoryLedger {
    /// Create a new empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries.
    pub fn len(&self) -> Result<usize> {
        Ok(self.read()?.len())
    }

    /// True when nothing is stored.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.read()?.is_empty())
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, BTreeMap<String, Vec<u8>>>> {
        self.entries
            .read()
            .map_err(|e| StoreError::Poisoned(e.to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, BTreeMap<String, Vec<u8>>>> {
        self.entries
            .write()
            .map_err(|e| StoreError::Poisoned(e.to_string()))
    }
}

impl Ledger for MemoryLedger {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.read()?.get(key).cloned())
    }

    fn range_scan(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>> {
        let entries = self.read()?;
        Ok(entries
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    fn apply(&self, batch: &WriteBatch) -> Result<()> {
        let mut entries = self.write()?;
        for (key, op) in batch.iter() {
            match op {
                WriteOp::Put(value) => {
                    entries.insert(key.clone(), value.clone());
                }
                WriteOp::Delete => {
                    entries.remove(key);
                }
            }
        }
        Ok(())
    }
}
