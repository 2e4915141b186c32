//! Strong identifier types.
//!
//! All identifiers are newtypes so a datatype ID can never be passed where a
//! principal ID is expected.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::crypto::hash_hex;

/// Domain for deterministic consent identifiers.
const CONSENT_ID_DOMAIN: &str = "keyweave v1 consent id";

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wrap a raw identifier.
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Get the identifier as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// True when the identifier is the empty string.
            pub fn is_empty(&self) -> bool {
                self.0.is_empty()
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_string())
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }
    };
}

string_id!(
    /// Identifier of a user or group.
    PrincipalId
);

string_id!(
    /// Identifier of a node in the datatype classification tree.
    DatatypeId
);

string_id!(
    /// Identifier of a consent record.
    ///
    /// Derived from `(datatype, target, owner)` with [`ConsentId::derive`], so
    /// there is at most one consent per triple.
    ConsentId
);

impl ConsentId {
    /// Compute the deterministic consent ID for a triple.
    pub fn derive(datatype: &DatatypeId, target: &PrincipalId, owner: &PrincipalId) -> Self {
        Self(hash_hex(
            CONSENT_ID_DOMAIN,
            &[
                datatype.as_str().as_bytes(),
                target.as_str().as_bytes(),
                owner.as_str().as_bytes(),
            ],
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_consent_id_deterministic() {
        let dt = DatatypeId::new("labs");
        let owner = PrincipalId::new("alice");
        let target = PrincipalId::new("clinic");

        let id1 = ConsentId::derive(&dt, &target, &owner);
        let id2 = ConsentId::derive(&dt, &target, &owner);
        assert_eq!(id1, id2);
        assert_eq!(id1.as_str().len(), 64);
    }

    #[test]
    fn test_consent_id_depends_on_roles() {
        let dt = DatatypeId::new("labs");
        let a = PrincipalId::new("alice");
        let b = PrincipalId::new("bob");

        // Swapping owner and target yields a different consent
        assert_ne!(ConsentId::derive(&dt, &a, &b), ConsentId::derive(&dt, &b, &a));
    }

    #[test]
    fn test_id_display_and_debug() {
        let id = PrincipalId::new("alice");
        assert_eq!(id.to_string(), "alice");
        assert_eq!(format!("{:?}", id), "PrincipalId(alice)");
    }
}
