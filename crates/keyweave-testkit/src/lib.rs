//! # Keyweave Testkit
//!
//! Testing utilities for Keyweave.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Fixtures**: An engine over an in-memory ledger, with helpers for
//!   users, groups, datatype trees and consents
//! - **Generators**: Proptest strategies for IDs, access levels, random
//!   datatype trees and consent scenarios
//!
//! ## Test Fixtures
//!
//! ```rust
//! use keyweave::AccessLevel;
//! use keyweave_testkit::{multi_party_fixture, query, FIXTURE_NOW};
//!
//! let (fixture, parties) = multi_party_fixture(2);
//! let (owner, target) = (&parties[0], &parties[1]);
//! fixture.health_tree(owner);
//! fixture.consent(owner, &target.principal, "health", AccessLevel::Read);
//!
//! let q = query(&owner.principal, &target.principal, "labs", AccessLevel::Read);
//! assert!(fixture.engine.validate_consent(target, &q, FIXTURE_NOW).is_ok());
//! ```
//!
//! ## Property Testing
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use keyweave_testkit::{DatatypeTree, TestFixture};
//!
//! proptest! {
//!     #[test]
//!     fn every_node_reaches_the_root(tree: DatatypeTree) {
//!         let fixture = TestFixture::new();
//!         let alice = fixture.user("alice");
//!         tree.register(&fixture, &alice);
//!         prop_assert_eq!(fixture.engine.datatype_root().unwrap(), Some(tree.id(0)));
//!     }
//! }
//! ```

pub mod fixtures;
pub mod generators;

pub use fixtures::{multi_party_fixture, query, TestFixture, FIXTURE_NOW};
pub use generators::{
    access_level, datatype_id, desired_level, opaque_principal_id, principal_id, ConsentScenario, DatatypeTree,
};
