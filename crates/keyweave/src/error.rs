//! Error types for the Engine.

use keyweave_core::PrincipalId;
use keyweave_perms::{AccessError, DenialReason};
use keyweave_store::StoreError;
use thiserror::Error;

/// Errors that can occur during Engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Access-control error from the key or identity graph.
    #[error("access error: {0}")]
    Access(#[from] AccessError),

    /// Storage error, typically from commit.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    /// The credential's private key does not match the stored public key.
    #[error("invalid credential for {0}")]
    InvalidCredential(PrincipalId),
}

impl EngineError {
    /// "You may not do this": a refused permission, a denied consent or a
    /// credential that does not check out.
    pub fn is_denial(&self) -> bool {
        matches!(
            self,
            EngineError::InvalidCredential(_)
                | EngineError::Access(AccessError::Permission(_))
                | EngineError::Access(AccessError::ConsentDenied(_))
        )
    }

    /// The request itself was wrong: bad input, unknown or duplicate
    /// records, a broken path, or a tree link that is not allowed.
    pub fn is_caller_misuse(&self) -> bool {
        matches!(
            self,
            EngineError::Access(
                AccessError::KeyMaterial(_)
                    | AccessError::KeyPath(_)
                    | AccessError::NotFound(_)
                    | AccessError::AlreadyExists(_)
                    | AccessError::InvalidInput(_)
                    | AccessError::MalformedTree(_)
            )
        )
    }

    /// Storage, encoding or cipher failure.
    pub fn is_system_fault(&self) -> bool {
        matches!(
            self,
            EngineError::Store(_)
                | EngineError::Access(
                    AccessError::Store(_) | AccessError::Serialization(_) | AccessError::Crypto(_)
                )
        )
    }

    /// The denial reason of a refused consent.
    pub fn denial_reason(&self) -> Option<DenialReason> {
        match self {
            EngineError::Access(AccessError::ConsentDenied(reason)) => Some(*reason),
            _ => None,
        }
    }
}

/// Result type for Engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification_is_exclusive() {
        let errors = [
            EngineError::InvalidCredential(PrincipalId::new("eve")),
            EngineError::Access(AccessError::ConsentDenied(DenialReason::Expired)),
            EngineError::Access(AccessError::NotFound("x".into())),
            EngineError::Access(AccessError::Crypto("x".into())),
        ];
        for err in &errors {
            let hits = [err.is_denial(), err.is_caller_misuse(), err.is_system_fault()]
                .iter()
                .filter(|b| **b)
                .count();
            assert_eq!(hits, 1, "{}", err);
        }
        assert_eq!(errors[1].denial_reason(), Some(DenialReason::Expired));
        assert_eq!(errors[0].denial_reason(), None);
    }
}
