//! Ledger key composition and CBOR value encoding.
//!
//! Ledger keys are `/`-joined components. Each component is escaped (`\` and
//! `/` are backslash-prefixed) so a component containing a slash can never
//! be confused with two components, and [`ledger_prefix`] of `[a]` never
//! matches keys that start with component `ab`.

use serde::{de::DeserializeOwned, Serialize};

use crate::error::{CoreError, Result};

fn push_escaped(out: &mut String, part: &str) {
    for ch in part.chars() {
        if ch == '\\' || ch == '/' {
            out.push('\\');
        }
        out.push(ch);
    }
}

/// Join escaped components into a ledger key.
pub fn ledger_key(parts: &[&str]) -> String {
    let mut out = String::new();
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            out.push('/');
        }
        push_escaped(&mut out, part);
    }
    out
}

/// The range-scan prefix matching every key that extends `parts`.
pub fn ledger_prefix(parts: &[&str]) -> String {
    let mut out = ledger_key(parts);
    out.push('/');
    out
}

/// Serialize a value to CBOR bytes.
pub fn to_cbor<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    ciborium::into_writer(value, &mut buf).map_err(|e| CoreError::Encoding(e.to_string()))?;
    Ok(buf)
}

/// Deserialize a value from CBOR bytes.
pub fn from_cbor<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    ciborium::from_reader(bytes).map_err(|e| CoreError::Decoding(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_ledger_key_joins() {
        assert_eq!(ledger_key(&["edge", "a", "b"]), "edge/a/b");
        assert_eq!(ledger_prefix(&["edge", "a"]), "edge/a/");
    }

    #[test]
    fn test_slash_in_component_is_escaped() {
        assert_eq!(ledger_key(&["edge", "a/b"]), "edge/a\\/b");
        assert_ne!(ledger_key(&["a/b", "c"]), ledger_key(&["a", "b/c"]));
    }

    #[test]
    fn test_prefix_does_not_match_longer_component() {
        let prefix = ledger_prefix(&["edge", "a"]);
        assert!(!ledger_key(&["edge", "ab", "c"]).starts_with(&prefix));
        assert!(!ledger_key(&["edge", "a/x", "c"]).starts_with(&prefix));
        assert!(ledger_key(&["edge", "a", "c"]).starts_with(&prefix));
    }

    #[test]
    fn test_cbor_roundtrip() {
        let value = vec!["x".to_string(), "y".to_string()];
        let bytes = to_cbor(&value).unwrap();
        let back: Vec<String> = from_cbor(&bytes).unwrap();
        assert_eq!(value, back);
    }

    #[test]
    fn test_cbor_garbage_is_decoding_error() {
        let res: Result<Vec<String>> = from_cbor(&[0xff, 0x00]);
        assert!(matches!(res, Err(CoreError::Decoding(_))));
    }

    proptest! {
        #[test]
        fn test_distinct_components_give_distinct_keys(
            a in "[a-z/\\\\]{0,6}",
            b in "[a-z/\\\\]{0,6}",
            c in "[a-z/\\\\]{0,6}",
            d in "[a-z/\\\\]{0,6}",
        ) {
            prop_assume!((a.as_str(), b.as_str()) != (c.as_str(), d.as_str()));
            prop_assert_ne!(ledger_key(&[&a, &b]), ledger_key(&[&c, &d]));
        }
    }
}
