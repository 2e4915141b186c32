//! Keys and the deterministic key naming scheme.
//!
//! A [`KeyId`] is a `(role, subject)` pair. The role fixes the key type, the
//! subject is the principal, datatype/owner pair or consent the key belongs
//! to. Rendered IDs look like `sym:alice` or `private:clinic`.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::codec::ledger_key;
use crate::crypto::{EncryptionKey, X25519PublicKey, X25519StaticSecret, KEY_LEN};
use crate::crypto::random_bytes;
use crate::error::{CoreError, Result};
use crate::ids::{ConsentId, DatatypeId, PrincipalId};

/// Cipher family of a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyKind {
    /// ChaCha20-Poly1305 key.
    Symmetric,
    /// X25519 public point.
    Public,
    /// X25519 static secret.
    Private,
}

/// What a key is for. Part of every [`KeyId`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum KeyRole {
    /// Principal's private key.
    Private,
    /// Principal's public key.
    Public,
    /// Principal's data key ("read my data").
    Symmetric,
    /// Key derived from the private key; admins hold a path to it.
    PrivateHash,
    /// Gates audit-log visibility.
    Log,
    /// Per `(datatype, owner)` key.
    Datatype,
    /// Per-consent key.
    Consent,
}

impl KeyRole {
    /// The rendered prefix of IDs with this role.
    pub const fn prefix(self) -> &'static str {
        match self {
            KeyRole::Private => "private",
            KeyRole::Public => "public",
            KeyRole::Symmetric => "sym",
            KeyRole::PrivateHash => "privhash",
            KeyRole::Log => "log",
            KeyRole::Datatype => "datatype",
            KeyRole::Consent => "consent",
        }
    }

    /// The cipher family of keys with this role.
    pub const fn kind(self) -> KeyKind {
        match self {
            KeyRole::Private => KeyKind::Private,
            KeyRole::Public => KeyKind::Public,
            _ => KeyKind::Symmetric,
        }
    }
}

/// Deterministic key identifier.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct KeyId {
    role: KeyRole,
    subject: String,
}

impl KeyId {
    fn principal(role: KeyRole, principal: &PrincipalId) -> Self {
        Self {
            role,
            subject: principal.as_str().to_string(),
        }
    }

    /// `private:{principal}`
    pub fn private(principal: &PrincipalId) -> Self {
        Self::principal(KeyRole::Private, principal)
    }

    /// `public:{principal}`
    pub fn public(principal: &PrincipalId) -> Self {
        Self::principal(KeyRole::Public, principal)
    }

    /// `sym:{principal}`
    pub fn symmetric(principal: &PrincipalId) -> Self {
        Self::principal(KeyRole::Symmetric, principal)
    }

    /// `privhash:{principal}`
    pub fn private_hash(principal: &PrincipalId) -> Self {
        Self::principal(KeyRole::PrivateHash, principal)
    }

    /// `log:{principal}`
    pub fn log(principal: &PrincipalId) -> Self {
        Self::principal(KeyRole::Log, principal)
    }

    /// `datatype:{datatype}/{owner}`
    pub fn datatype(datatype: &DatatypeId, owner: &PrincipalId) -> Self {
        Self {
            role: KeyRole::Datatype,
            subject: ledger_key(&[datatype.as_str(), owner.as_str()]),
        }
    }

    /// `consent:{consent}`
    pub fn consent(consent: &ConsentId) -> Self {
        Self {
            role: KeyRole::Consent,
            subject: consent.as_str().to_string(),
        }
    }

    /// The role of this key.
    pub fn role(&self) -> KeyRole {
        self.role
    }

    /// The cipher family of this key.
    pub fn kind(&self) -> KeyKind {
        self.role.kind()
    }

    /// The subject part of the ID.
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// The ID under which edges sealed to this key are recorded.
    ///
    /// A sealed edge can only be opened with the private half, so edges whose
    /// `from` key is `public:x` are stored as `private:x`. Every other ID maps
    /// to itself.
    pub fn holder(&self) -> KeyId {
        match self.role {
            KeyRole::Public => KeyId {
                role: KeyRole::Private,
                subject: self.subject.clone(),
            },
            _ => self.clone(),
        }
    }
}

impl fmt::Display for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.role.prefix(), self.subject)
    }
}

impl fmt::Debug for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KeyId({})", self)
    }
}

/// Opaque key material. Never persisted in cleartext, never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct KeyBytes(Vec<u8>);

impl KeyBytes {
    /// Get the raw bytes.
    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }

    /// Number of bytes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True when no material is present.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<u8>> for KeyBytes {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl From<[u8; KEY_LEN]> for KeyBytes {
    fn from(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes.to_vec())
    }
}

impl From<&[u8]> for KeyBytes {
    fn from(bytes: &[u8]) -> Self {
        Self(bytes.to_vec())
    }
}

impl fmt::Debug for KeyBytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KeyBytes({} bytes)", self.0.len())
    }
}

/// A key: its ID plus its material.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Key {
    id: KeyId,
    bytes: KeyBytes,
}

impl Key {
    /// Pair an ID with its material.
    pub fn new(id: KeyId, bytes: impl Into<KeyBytes>) -> Self {
        Self {
            id,
            bytes: bytes.into(),
        }
    }

    /// A fresh random symmetric key.
    pub fn generate_symmetric(id: KeyId) -> Self {
        Self::new(id, random_bytes())
    }

    /// The key's ID.
    pub fn id(&self) -> &KeyId {
        &self.id
    }

    /// The key's cipher family, as fixed by its role.
    pub fn kind(&self) -> KeyKind {
        self.id.kind()
    }

    /// The key material.
    pub fn bytes(&self) -> &KeyBytes {
        &self.bytes
    }

    /// Fail with [`CoreError::EmptyKeyMaterial`] when no material is present.
    pub fn require_material(&self) -> Result<()> {
        if self.bytes.is_empty() {
            return Err(CoreError::EmptyKeyMaterial(self.id.to_string()));
        }
        Ok(())
    }

    /// Interpret the material as a ChaCha20-Poly1305 key.
    pub fn to_symmetric(&self) -> Result<EncryptionKey> {
        self.require_material()?;
        EncryptionKey::from_slice(self.bytes.as_slice())
    }

    /// Interpret the material as an X25519 secret.
    pub fn to_secret(&self) -> Result<X25519StaticSecret> {
        self.require_material()?;
        X25519StaticSecret::from_slice(self.bytes.as_slice())
    }

    /// The public point of this key: parsed for public keys, derived for
    /// private keys.
    pub fn to_public(&self) -> Result<X25519PublicKey> {
        self.require_material()?;
        match self.kind() {
            KeyKind::Private => Ok(self.to_secret()?.public_key()),
            _ => X25519PublicKey::from_slice(self.bytes.as_slice()),
        }
    }
}
