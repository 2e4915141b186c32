//! # Keyweave Store
//!
//! The ledger collaborator for Keyweave: an opaque, transactional key-value
//! store with get/put/delete/range-scan, plus the request-scoped memo table.
//!
//! ## Overview
//!
//! The engine never talks to a database directly. It reads and writes
//! through a [`Transaction`], which stages every write in memory and hands
//! the whole batch to a [`Ledger`] on commit. Dropping a transaction without
//! committing discards everything it staged, so a multi-edge operation is
//! never half-applied.
//!
//! ## Key Types
//!
//! - [`Ledger`] - The synchronous storage trait
//! - [`MemoryLedger`] - In-memory ledger for tests and embedding
//! - [`SqliteLedger`] - SQLite-backed persistent ledger
//! - [`Transaction`] - Staged writes, overlay reads, atomic commit
//! - [`Memo`] - Typed per-transaction cache
//!
//! ## Usage
//!
//! ```rust
//! use keyweave_store::{Ledger, MemoryLedger, Transaction};
//!
//! let ledger = MemoryLedger::new();
//! let mut tx = Transaction::new(&ledger);
//! tx.put("edge/a/b", b"payload".to_vec());
//! assert!(ledger.get("edge/a/b").unwrap().is_none()); // not yet visible
//! tx.commit().unwrap();
//! assert!(ledger.get("edge/a/b").unwrap().is_some());
//! ```

pub mod error;
pub mod memo;
pub mod memory;
pub mod migration;
pub mod sqlite;
pub mod traits;
pub mod transaction;

pub use error::{Result, StoreError};
pub use memo::Memo;
pub use memory::MemoryLedger;
pub use sqlite::SqliteLedger;
pub use traits::{Ledger, WriteBatch, WriteOp};
pub use transaction::Transaction;
