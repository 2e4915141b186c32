//! Error types for Keyweave Core.

use thiserror::Error;

/// Core errors raised by key handling, ciphers and encoding.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid key length: expected {expected}, got {got}")]
    InvalidKeyLength { expected: usize, got: usize },

    #[error("empty key material for {0}")]
    EmptyKeyMaterial(String),

    #[error("encryption error: {0}")]
    Encryption(String),

    #[error("decryption error: {0}")]
    Decryption(String),

    #[error("encoding error: {0}")]
    Encoding(String),

    #[error("decoding error: {0}")]
    Decoding(String),
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
