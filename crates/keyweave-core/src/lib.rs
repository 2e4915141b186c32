//! # Keyweave Core
//!
//! Pure primitives for Keyweave: identifiers, the key naming scheme, key
//! material, and the ciphers that wrap one key under another.
//!
//! This crate contains no I/O and no storage. It is pure computation over
//! key material and identifiers.
//!
//! ## Key Types
//!
//! - [`PrincipalId`], [`DatatypeId`], [`ConsentId`] - Identifier newtypes
//! - [`KeyId`] - Deterministic key identifier, a `(KeyRole, subject)` pair
//! - [`Key`] - A key identifier plus its opaque bytes
//! - [`EncryptionKey`] - ChaCha20-Poly1305 symmetric key
//! - [`X25519StaticSecret`] / [`X25519PublicKey`] - Key pair halves used for sealing
//!
//! ## Naming Scheme
//!
//! Key IDs are derived from the role and the subject alone, so any component
//! that knows a principal's ID can address every key in its bundle without
//! holding a stored reference:
//!
//! ```rust
//! use keyweave_core::{KeyId, PrincipalId};
//!
//! let alice = PrincipalId::new("alice");
//! assert_eq!(KeyId::symmetric(&alice).to_string(), "sym:alice");
//! ```

pub mod codec;
pub mod crypto;
pub mod error;
pub mod ids;
pub mod key;

pub use codec::{from_cbor, ledger_key, ledger_prefix, to_cbor};
pub use crypto::{
    derive_key, hash_hex, EncryptionKey, EncryptionNonce, EphemeralKeyPair, SharedKey,
    X25519PublicKey, X25519StaticSecret, KEY_LEN,
};
pub use error::{CoreError, Result};
pub use ids::{ConsentId, DatatypeId, PrincipalId};
pub use key::{Key, KeyBytes, KeyId, KeyKind, KeyRole};
