//! # Keyweave
//!
//! Attribute-partitioned, delegable, revocable access control where access
//! is a cryptographic fact: reading protected data needs a key, and a key is
//! only reachable along a chain of decryptions from one the caller holds.
//!
//! ## Overview
//!
//! Keyweave provides:
//!
//! - **Key graph**: directed edges, each wrapping one key under another
//! - **Principals**: users and groups, each with a five-key bundle
//! - **Identity graph**: membership, admin status and subgroups
//! - **Datatypes**: a classification tree with per-owner derived keys
//! - **Consents**: read, write or deny decisions resolved up the tree
//! - **Audit**: per-principal logs readable only through the log key
//!
//! ## Key Concepts
//!
//! - **Admin**: a key path to the group's private-hash key, and from there
//!   to its private key
//! - **Member**: a key path to the group's data key only
//! - **Most specific consent wins**: a consent on a datatype overrides one
//!   on any of its ancestors
//! - **Deny keeps a trace**: a deny cuts the consent key off from the data
//!   but leaves the target's edge to the consent key in place
//!
//! ## Usage
//!
//! ```rust
//! use keyweave::{AccessLevel, ConsentQuery, ConsentRequest, Engine, EngineConfig};
//! use keyweave::core::{DatatypeId, PrincipalId};
//! use keyweave::store::MemoryLedger;
//!
//! let engine = Engine::new(MemoryLedger::new(), EngineConfig::default());
//!
//! let alice = engine.register_user(&PrincipalId::new("alice"), "patient").unwrap();
//! let clinic = engine.register_user(&PrincipalId::new("clinic"), "provider").unwrap();
//!
//! let health = DatatypeId::new("health");
//! engine.register_datatype(&alice, &health, None, "all health data").unwrap();
//!
//! let request = ConsentRequest {
//!     datatype: health.clone(),
//!     owner: alice.principal.clone(),
//!     target: clinic.principal.clone(),
//!     access: AccessLevel::Read,
//!     expiration_date: 0,
//! };
//! engine.put_consent(&alice, &request, 1_700_000_000).unwrap();
//!
//! let query = ConsentQuery {
//!     datatype: health,
//!     owner: alice.principal.clone(),
//!     target: clinic.principal.clone(),
//!     desired: AccessLevel::Read,
//! };
//! let grant = engine.validate_consent(&clinic, &query, 1_700_000_001).unwrap();
//! println!("{}", grant.filter.to_json().unwrap());
//! ```
//!
//! ## Re-exports
//!
//! This crate re-exports the component crates for convenience:
//!
//! - `keyweave::core` - Identifiers, keys and ciphers
//! - `keyweave::store` - Ledger trait, ledgers and transactions
//! - `keyweave::perms` - Key graph, identity graph and consent resolution

pub mod engine;
pub mod error;
pub mod observer;

// Re-export component crates
pub use keyweave_core as core;
pub use keyweave_perms as perms;
pub use keyweave_store as store;

// Re-export main types for convenience
pub use engine::{Engine, EngineConfig};
pub use error::{EngineError, Result};
pub use observer::{AccessEvent, AccessObserver, NoopObserver, TracingObserver};

// Re-export commonly used types
pub use keyweave_core::{ConsentId, DatatypeId, Key, KeyBytes, KeyId, PrincipalId};
pub use keyweave_perms::{
    AccessError, AccessLevel, AuditEntry, Consent, ConsentGrant, ConsentQuery, ConsentRequest, Credential,
    Datatype, DenialReason, EdgeData, EdgeInfo, FilterRule, KeyOptions, Principal, PrincipalKeys, RecordTags,
};
