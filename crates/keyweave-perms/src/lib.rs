//! # Keyweave Permissions
//!
//! The key graph and everything built on it: principal key bundles, the
//! identity graph, hierarchical datatype keys, consents and the audit log.
//!
//! ## Overview
//!
//! Access is possession of a key. A key is reachable when there is a chain
//! of edges, each one encrypting the next key under the previous, from a key
//! the caller already holds. The identity graph answers permission questions
//! ("is this user an admin of that group?") without key material, and every
//! mutation here pairs an identity edge with the key edge that makes it
//! real.
//!
//! ## Key Concepts
//!
//! - **Edge**: `from -> to`, the bytes of `to` wrapped under `from`
//! - **Bundle**: the five keys of a principal and its four invariant edges
//! - **Admin path**: `[user, hit, ..., group]` through the group tree
//! - **Datatype key**: derived per owner and datatype, chained down the tree
//! - **Consent**: a read/write/deny decision for one
//!   `(datatype, target, owner)`, with its own key
//!
//! ## Usage
//!
//! ```rust
//! use keyweave_core::PrincipalId;
//! use keyweave_perms::{group, keyring, KeyOptions};
//! use keyweave_store::{MemoryLedger, Transaction};
//!
//! let ledger = MemoryLedger::new();
//! let mut tx = Transaction::new(&ledger);
//!
//! let alice = group::register_user(&mut tx, &PrincipalId::new("alice"), "doctor").unwrap();
//! let clinic = PrincipalId::new("clinic");
//! group::register_group(&mut tx, &alice, &clinic, "org").unwrap();
//!
//! let keys = keyring::principal_keys(&mut tx, &alice, &clinic, &KeyOptions::full(), 16).unwrap();
//! assert!(keys.private.is_some());
//! tx.commit().unwrap();
//! ```

pub mod audit;
pub mod bundle;
pub mod consent;
pub mod datatype;
pub mod edge;
pub mod error;
pub mod filter;
pub mod graph;
pub mod group;
pub mod identity;
pub mod keyring;
mod layout;

pub use audit::AuditEntry;
pub use bundle::{Credential, KeyBundle, Principal, PrincipalKind};
pub use consent::{AccessLevel, Consent, ConsentGrant, ConsentQuery, ConsentRequest};
pub use datatype::Datatype;
pub use edge::{EdgeData, EdgeInfo};
pub use error::{AccessError, DenialReason, KeyPathError, Result};
pub use filter::{FilterRule, RecordTags};
pub use identity::{IdentityEdge, IdentityLabel};
pub use keyring::{KeyOptions, PrincipalKeys};
