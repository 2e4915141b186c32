//! SQLite implementation of the Ledger trait.
//!
//! The persistent ledger backend. It uses rusqlite with bundled SQLite; the
//! connection is guarded by a mutex and each batch runs in one SQLite
//! transaction.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::{params, Connection, OptionalExtension};

use crate::error::{Result, StoreError};
use crate::migration;
use crate::traits::{Ledger, WriteBatch, WriteOp};

/// SQLite-based ledger.
pub struct SqliteLedger {
    conn: Mutex<Connection>,
}

impl SqliteLedger {
    /// Open a SQLite database at the given path.
    ///
    /// Creates the file and runs migrations if it doesn't exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let mut conn = Connection::open(path)?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory SQLite database.
    ///
    /// Useful for testing.
    pub fn open_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| StoreError::Poisoned(e.to_string()))
    }
}

impl Ledger for SqliteLedger {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT value FROM ledger WHERE key = ?1",
            params![key],
            |row| row.get(0),
        )
        .optional()
        .map_err(StoreError::from)
    }

    fn range_scan(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare_cached("SELECT key, value FROM ledger WHERE key >= ?1 ORDER BY key")?;
        let mut rows = stmt.query(params![prefix])?;

        // Keys sharing the prefix are contiguous from the lower bound on.
        let mut entries = Vec::new();
        while let Some(row) = rows.next()? {
            let key: String = row.get(0)?;
            if !key.starts_with(prefix) {
                break;
            }
            entries.push((key, row.get(1)?));
        }

        Ok(entries)
    }

    fn apply(&self, batch: &WriteBatch) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }

        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        {
            let mut upsert = tx.prepare_cached(
                "INSERT INTO ledger (key, value) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            )?;
            let mut remove = tx.prepare_cached("DELETE FROM ledger WHERE key = ?1")?;

            for (key, op) in batch.iter() {
                match op {
                    WriteOp::Put(value) => {
                        upsert.execute(params![key, value])?;
                    }
                    WriteOp::Delete => {
                        remove.execute(params![key])?;
                    }
                }
            }
        }
        tx.commit()?;

        tracing::trace!(writes = batch.len(), "applied ledger batch");
        Ok(())
    }
}
