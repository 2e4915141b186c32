//! Access edges: one key's bytes wrapped under another key.
//!
//! An edge `from -> to` stores `to`'s bytes encrypted so that only a holder
//! of `from`'s bytes can open it:
//!
//! - **Symmetric** `from`: ChaCha20-Poly1305 under `from` directly.
//! - **Key pair** `from`: sealed to `from`'s public point with an ephemeral
//!   X25519 agreement, and recorded under the private key's ID.
//!
//! The associated data of both variants binds the ciphertext to the
//! `(from, to)` pair, so a payload copied to another edge fails to open.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use keyweave_core::{
    ledger_key, EncryptionKey, EncryptionNonce, EphemeralKeyPair, Key, KeyBytes, KeyId, KeyKind,
    X25519PublicKey, X25519StaticSecret,
};

use crate::error::{AccessError, Result};

/// Optional string metadata attached to an edge (access level, audit tags).
pub type EdgeData = BTreeMap<String, String>;

fn associated_data(from: &KeyId, to: &KeyId) -> Vec<u8> {
    ledger_key(&[&from.to_string(), &to.to_string()]).into_bytes()
}

/// The wrapped key bytes of an edge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EdgeCipher {
    /// Encrypted under a symmetric `from` key.
    Symmetric {
        nonce: EncryptionNonce,
        ciphertext: Vec<u8>,
    },
    /// Sealed to the public half of a key-pair `from` key.
    Sealed {
        ephemeral_public: X25519PublicKey,
        nonce: EncryptionNonce,
        ciphertext: Vec<u8>,
    },
}

impl EdgeCipher {
    /// Wrap `to`'s bytes under `from`.
    pub fn wrap(from: &Key, to: &Key) -> Result<Self> {
        if from.bytes().is_empty() {
            return Err(AccessError::KeyMaterial(format!("no key material for {}", from.id())));
        }
        if to.bytes().is_empty() {
            return Err(AccessError::KeyMaterial(format!("no key material for {}", to.id())));
        }

        let aad = associated_data(&from.id().holder(), to.id());
        let nonce = EncryptionNonce::generate();

        match from.kind() {
            KeyKind::Symmetric => {
                let key = from.to_symmetric()?;
                let ciphertext = key.encrypt(to.bytes().as_slice(), &nonce, &aad)?;
                Ok(EdgeCipher::Symmetric { nonce, ciphertext })
            }
            KeyKind::Public | KeyKind::Private => {
                let recipient = from.to_public()?;
                let ephemeral = EphemeralKeyPair::generate();
                let ephemeral_public = ephemeral.public_key();
                let wrap_key = ephemeral.diffie_hellman(&recipient).derive_encryption_key(&aad);
                let ciphertext = wrap_key.encrypt(to.bytes().as_slice(), &nonce, &aad)?;
                Ok(EdgeCipher::Sealed {
                    ephemeral_public,
                    nonce,
                    ciphertext,
                })
            }
        }
    }

    /// Open the edge `holder -> to` with the holder's bytes.
    pub fn unwrap(&self, holder: &KeyId, to: &KeyId, material: &KeyBytes) -> keyweave_core::Result<KeyBytes> {
        let aad = associated_data(holder, to);
        let plaintext = match self {
            EdgeCipher::Symmetric { nonce, ciphertext } => {
                EncryptionKey::from_slice(material.as_slice())?.decrypt(ciphertext, nonce, &aad)?
            }
            EdgeCipher::Sealed {
                ephemeral_public,
                nonce,
                ciphertext,
            } => {
                let secret = X25519StaticSecret::from_slice(material.as_slice())?;
                let wrap_key = secret
                    .diffie_hellman(ephemeral_public)
                    .derive_encryption_key(&aad);
                wrap_key.decrypt(ciphertext, nonce, &aad)?
            }
        };
        Ok(KeyBytes::from(plaintext))
    }

    /// True for edges sealed to a key pair.
    pub fn is_sealed(&self) -> bool {
        matches!(self, EdgeCipher::Sealed { .. })
    }
}

/// An edge as persisted in the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredEdge {
    /// Holder key ID (private ID for sealed edges).
    pub from: KeyId,
    /// The key this edge yields.
    pub to: KeyId,
    /// The wrapped bytes of `to`.
    pub cipher: EdgeCipher,
    /// Caller-supplied metadata.
    pub data: EdgeData,
}

impl StoredEdge {
    /// Public view of the edge, without the payload.
    pub fn info(&self) -> EdgeInfo {
        EdgeInfo {
            from: self.from.clone(),
            to: self.to.clone(),
            sealed: self.cipher.is_sealed(),
            data: self.data.clone(),
        }
    }
}

/// Edge metadata, safe to hand to any caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeInfo {
    pub from: KeyId,
    pub to: KeyId,
    pub sealed: bool,
    pub data: EdgeData,
}
