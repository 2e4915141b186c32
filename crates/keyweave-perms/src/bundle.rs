//! Principal key bundles.
//!
//! Every user and group owns five keys: a private/public X25519 pair, a
//! symmetric data key, a private-hash key derived from the private key, and
//! a log key that gates audit visibility. Registration wires four edges:
//!
//! ```text
//! private  -> symmetric
//! privhash -> private
//! private  -> privhash
//! symmetric -> log
//! ```
//!
//! There is never an edge `symmetric -> private`, so a collaborator holding
//! only the data key cannot reach the private key. Admin status is a path
//! to `privhash`.

use serde::{Deserialize, Serialize};

use keyweave_core::{
    derive_key, Key, KeyBytes, KeyId, KeyRole, PrincipalId, X25519PublicKey, X25519StaticSecret,
};
use keyweave_store::Transaction;

use crate::edge::EdgeData;
use crate::error::{AccessError, Result};
use crate::graph;
use crate::layout;

/// Derivation context for private-hash keys.
const PRIVHASH_CONTEXT: &str = "keyweave v1 privhash";

/// Users act on their own behalf; groups are acted on by their admins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PrincipalKind {
    User,
    Group,
}

/// A registered principal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub id: PrincipalId,
    pub kind: PrincipalKind,
    /// Free-form role label supplied at registration.
    pub role: String,
}

/// Proof of identity held by a caller: its ID and private key.
///
/// Returned once at registration. The engine keeps no cleartext copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    pub principal: PrincipalId,
    pub private_key: KeyBytes,
}

impl Credential {
    /// The private key as a [`Key`].
    pub fn key(&self) -> Key {
        Key::new(KeyId::private(&self.principal), self.private_key.clone())
    }
}

/// The private-hash key of a principal, computed from its private bytes.
pub fn private_hash_key(principal: &PrincipalId, private: &KeyBytes) -> Key {
    Key::new(
        KeyId::private_hash(principal),
        derive_key(PRIVHASH_CONTEXT, &[private.as_slice()]),
    )
}

/// The full key bundle of one principal.
#[derive(Debug, Clone)]
pub struct KeyBundle {
    pub principal: PrincipalId,
    pub private: Key,
    pub public: Key,
    pub symmetric: Key,
    pub private_hash: Key,
    pub log: Key,
}

impl KeyBundle {
    /// Mint a fresh bundle.
    pub fn generate(principal: &PrincipalId) -> Self {
        let secret = X25519StaticSecret::generate();
        let private = Key::new(KeyId::private(principal), secret.to_bytes());

        Self {
            principal: principal.clone(),
            public: Key::new(KeyId::public(principal), *secret.public_key().as_bytes()),
            private_hash: private_hash_key(principal, private.bytes()),
            symmetric: Key::generate_symmetric(KeyId::symmetric(principal)),
            log: Key::generate_symmetric(KeyId::log(principal)),
            private,
        }
    }

    /// The four invariant edges, as `(from, to)` pairs.
    pub fn invariant_edges(&self) -> [(&Key, &Key); 4] {
        [
            (&self.private, &self.symmetric),
            (&self.private_hash, &self.private),
            (&self.private, &self.private_hash),
            (&self.symmetric, &self.log),
        ]
    }

    /// The credential for this bundle's principal.
    pub fn credential(&self) -> Credential {
        Credential {
            principal: self.principal.clone(),
            private_key: self.private.bytes().clone(),
        }
    }
}

/// True when `from -> to` is one of the four edges every bundle carries.
pub fn is_invariant_edge(from: &KeyId, to: &KeyId) -> bool {
    let from = from.holder();
    from.subject() == to.subject()
        && matches!(
            (from.role(), to.role()),
            (KeyRole::Private, KeyRole::Symmetric)
                | (KeyRole::PrivateHash, KeyRole::Private)
                | (KeyRole::Private, KeyRole::PrivateHash)
                | (KeyRole::Symmetric, KeyRole::Log)
        )
}

/// Register a principal: store its record and public key, mint its bundle
/// and wire the invariant edges. All writes land in `tx`.
pub fn register_principal(
    tx: &mut Transaction<'_>,
    id: &PrincipalId,
    kind: PrincipalKind,
    role: &str,
) -> Result<KeyBundle> {
    if id.is_empty() {
        return Err(AccessError::InvalidInput("empty principal id".to_string()));
    }
    if tx.contains(&layout::principal(id))? {
        return Err(AccessError::AlreadyExists(format!("principal {}", id)));
    }

    let bundle = KeyBundle::generate(id);
    let record = Principal {
        id: id.clone(),
        kind,
        role: role.to_string(),
    };

    tx.put_value(layout::principal(id), &record)?;
    tx.put_value(layout::public_key(id), &bundle.public.to_public()?)?;
    for (from, to) in bundle.invariant_edges() {
        graph::add_access(tx, from, to, EdgeData::new())?;
    }

    tracing::debug!(principal = %id, ?kind, "principal registered");
    Ok(bundle)
}

/// Look up a principal record.
pub fn get_principal(tx: &Transaction<'_>, id: &PrincipalId) -> Result<Option<Principal>> {
    Ok(tx.get_value(&layout::principal(id))?)
}

/// Look up a principal record, failing with `NotFound`.
pub fn require_principal(tx: &Transaction<'_>, id: &PrincipalId) -> Result<Principal> {
    get_principal(tx, id)?.ok_or_else(|| AccessError::NotFound(format!("principal {}", id)))
}

/// The stored public key of a principal.
pub fn public_key(tx: &Transaction<'_>, id: &PrincipalId) -> Result<Key> {
    let public: X25519PublicKey = tx
        .get_value(&layout::public_key(id))?
        .ok_or_else(|| AccessError::NotFound(format!("public key of {}", id)))?;
    Ok(Key::new(KeyId::public(id), *public.as_bytes()))
}

/// True when the credential's private key matches the stored public key.
pub fn verify_credential(tx: &Transaction<'_>, credential: &Credential) -> Result<bool> {
    let stored = public_key(tx, &credential.principal)?;
    let derived = match credential.key().to_public() {
        Ok(public) => public,
        Err(_) => return Ok(false),
    };
    Ok(stored.to_public()? == derived)
}

/// Rebuild a principal's full bundle from its private key, following the
/// invariant edges.
pub fn recover_bundle(tx: &Transaction<'_>, principal: &PrincipalId, private: &KeyBytes) -> Result<KeyBundle> {
    let private = Key::new(KeyId::private(principal), private.clone());
    let symmetric_id = KeyId::symmetric(principal);
    let log_id = KeyId::log(principal);

    let symmetric = graph::get_key(tx, &[private.id().clone(), symmetric_id.clone()], private.bytes())?;
    let log = graph::get_key(tx, &[symmetric_id.clone(), log_id.clone()], &symmetric)?;

    Ok(KeyBundle {
        principal: principal.clone(),
        public: Key::new(KeyId::public(principal), *private.to_public()?.as_bytes()),
        private_hash: private_hash_key(principal, private.bytes()),
        symmetric: Key::new(symmetric_id, symmetric),
        log: Key::new(log_id, log),
        private,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use keyweave_store::MemoryLedger;

    #[test]
    fn test_registration_wires_invariant_edges() {
        let ledger = MemoryLedger::new();
        let mut tx = Transaction::new(&ledger);
        let alice = PrincipalId::new("alice");
        let bundle = register_principal(&mut tx, &alice, PrincipalKind::User, "patient").unwrap();

        for (from, to) in bundle.invariant_edges() {
            assert!(graph::has_edge(&tx, from.id(), to.id()).unwrap());
        }
        assert!(!graph::has_edge(&tx, bundle.symmetric.id(), bundle.private.id()).unwrap());
    }

    #[test]
    fn test_invariant_edge_classification() {
        let alice = PrincipalId::new("alice");
        let bundle = KeyBundle::generate(&alice);
        for (from, to) in bundle.invariant_edges() {
            assert!(is_invariant_edge(from.id(), to.id()));
        }
        // Stored under the private ID either way
        assert!(is_invariant_edge(&KeyId::public(&alice), &KeyId::symmetric(&alice)));

        let clinic = PrincipalId::new("clinic");
        assert!(!is_invariant_edge(&KeyId::private(&alice), &KeyId::symmetric(&clinic)));
        assert!(!is_invariant_edge(&KeyId::symmetric(&alice), &KeyId::private(&alice)));
        assert!(!is_invariant_edge(&KeyId::log(&alice), &KeyId::log(&clinic)));
    }

    #[test]
    fn test_no_shortcut_from_symmetric_to_private() {
        let ledger = MemoryLedger::new();
        let mut tx = Transaction::new(&ledger);
        let alice = PrincipalId::new("alice");
        let bundle = register_principal(&mut tx, &alice, PrincipalKind::User, "patient").unwrap();

        let path = graph::slow_find_path(&tx, bundle.symmetric.id(), bundle.private.id()).unwrap();
        assert_eq!(path, None);
    }

    #[test]
    fn test_privhash_reaches_private() {
        let ledger = MemoryLedger::new();
        let mut tx = Transaction::new(&ledger);
        let alice = PrincipalId::new("alice");
        let bundle = register_principal(&mut tx, &alice, PrincipalKind::User, "patient").unwrap();

        let path = [bundle.private_hash.id().clone(), bundle.private.id().clone()];
        let recovered = graph::get_key(&tx, &path, bundle.private_hash.bytes()).unwrap();
        assert_eq!(&recovered, bundle.private.bytes());
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let ledger = MemoryLedger::new();
        let mut tx = Transaction::new(&ledger);
        let alice = PrincipalId::new("alice");
        register_principal(&mut tx, &alice, PrincipalKind::User, "").unwrap();

        assert!(matches!(
            register_principal(&mut tx, &alice, PrincipalKind::Group, ""),
            Err(AccessError::AlreadyExists(_))
        ));
    }

    #[test]
    fn test_recover_bundle_and_verify_credential() {
        let ledger = MemoryLedger::new();
        let mut tx = Transaction::new(&ledger);
        let alice = PrincipalId::new("alice");
        let bundle = register_principal(&mut tx, &alice, PrincipalKind::User, "").unwrap();
        let credential = bundle.credential();

        let recovered = recover_bundle(&tx, &alice, &credential.private_key).unwrap();
        assert_eq!(recovered.symmetric, bundle.symmetric);
        assert_eq!(recovered.log, bundle.log);
        assert_eq!(recovered.private_hash, bundle.private_hash);

        assert!(verify_credential(&tx, &credential).unwrap());
        let forged = Credential {
            principal: alice,
            private_key: KeyBytes::from(vec![7u8; 32]),
        };
        assert!(!verify_credential(&tx, &forged).unwrap());
    }
}
