//! Error types for the permissions module.

use std::fmt;

use keyweave_core::{CoreError, KeyId};
use keyweave_store::StoreError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Why a consent lookup ended in a denial.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DenialReason {
    /// No consent on the datatype or any ancestor.
    NoConsent,
    /// The applicable consent is a deny.
    DenyLevel,
    /// The consent grants less than was asked for.
    InsufficientAccess,
    /// The consent's expiration date has passed.
    Expired,
    /// The caller holds no key path to the consent key.
    NoKeyPath,
}

impl fmt::Display for DenialReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DenialReason::NoConsent => "no applicable consent",
            DenialReason::DenyLevel => "consent denies access",
            DenialReason::InsufficientAccess => "consent grants insufficient access",
            DenialReason::Expired => "consent has expired",
            DenialReason::NoKeyPath => "no key path to the consent key",
        };
        f.write_str(s)
    }
}

/// A claimed key path could not be walked.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyPathError {
    #[error("empty key path")]
    EmptyPath,

    #[error("missing edge {from} -> {to}")]
    MissingEdge { from: KeyId, to: KeyId },

    #[error("cannot decrypt edge {from} -> {to}")]
    Decryption { from: KeyId, to: KeyId },
}

/// Errors that can occur during access-control operations.
#[derive(Debug, Error)]
pub enum AccessError {
    /// Key bytes missing, empty or malformed.
    #[error("key material error: {0}")]
    KeyMaterial(String),

    /// A key path could not be walked.
    #[error("key path error: {0}")]
    KeyPath(#[from] KeyPathError),

    /// Identity-graph check failed.
    #[error("permission denied: {0}")]
    Permission(String),

    /// Consent resolution completed and the answer is no.
    #[error("consent denied: {0}")]
    ConsentDenied(DenialReason),

    /// No such record, edge or path.
    #[error("not found: {0}")]
    NotFound(String),

    /// The record already exists.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// A tree walk revisited a node or exceeded the depth bound.
    #[error("malformed tree: {0}")]
    MalformedTree(String),

    /// Invalid argument.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Value encoding/decoding error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Cipher failure outside of a key path walk.
    #[error("crypto error: {0}")]
    Crypto(String),

    /// Ledger error.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl From<CoreError> for AccessError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::InvalidKeyLength { .. } | CoreError::EmptyKeyMaterial(_) => {
                AccessError::KeyMaterial(err.to_string())
            }
            CoreError::Encoding(_) | CoreError::Decoding(_) => {
                AccessError::Serialization(err.to_string())
            }
            CoreError::Encryption(_) | CoreError::Decryption(_) => {
                AccessError::Crypto(err.to_string())
            }
        }
    }
}

impl AccessError {
    /// True for "access not granted" outcomes that lower layers may turn
    /// into a negative answer.
    pub fn is_absence(&self) -> bool {
        matches!(self, AccessError::KeyPath(_) | AccessError::NotFound(_))
    }
}

/// Result type for access-control operations.
pub type Result<T> = std::result::Result<T, AccessError>;
