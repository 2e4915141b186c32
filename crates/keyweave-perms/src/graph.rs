//! The key graph engine.
//!
//! A directed graph of keys connected by "encrypts" edges. Holding the
//! bytes of an edge's `from` key is enough to recover its `to` key, so a
//! principal has access to every key reachable from a key it holds.
//!
//! Edges whose `from` is a public key are recorded under the matching
//! private key ID (see [`KeyId::holder`]). Only the key a walk starts from
//! is normalised that way: a public key reached along a path is a dead end,
//! since its bytes open nothing.

use std::collections::{HashMap, HashSet, VecDeque};

use keyweave_core::{Key, KeyBytes, KeyId, KeyRole};
use keyweave_store::Transaction;

use crate::edge::{EdgeCipher, EdgeData, EdgeInfo, StoredEdge};
use crate::error::{AccessError, KeyPathError, Result};
use crate::layout;

/// Store the edge `from -> to`, wrapping `to`'s bytes under `from`.
///
/// Re-adding an existing edge re-encrypts and overwrites it.
pub fn add_access(tx: &mut Transaction<'_>, from: &Key, to: &Key, data: EdgeData) -> Result<()> {
    let cipher = EdgeCipher::wrap(from, to)?;
    let edge = StoredEdge {
        from: from.id().holder(),
        to: to.id().clone(),
        cipher,
        data,
    };

    tx.put_value(layout::edge(&edge.from, &edge.to), &edge)?;
    tracing::trace!(from = %edge.from, to = %edge.to, "edge written");
    Ok(())
}

/// Delete exactly the edge `from -> to`. Nothing else is touched.
pub fn revoke_access(tx: &mut Transaction<'_>, from: &KeyId, to: &KeyId) -> Result<()> {
    let key = layout::edge(&from.holder(), to);
    if !tx.contains(&key)? {
        return Err(AccessError::NotFound(format!("edge {} -> {}", from.holder(), to)));
    }

    tx.delete(key);
    tx.memo_mut().invalidate_keys();
    tracing::trace!(%from, %to, "edge revoked");
    Ok(())
}

fn load_edge(tx: &Transaction<'_>, from: &KeyId, to: &KeyId) -> Result<Option<StoredEdge>> {
    Ok(tx.get_value(&layout::edge(&from.holder(), to))?)
}

/// True when the edge `from -> to` exists.
pub fn has_edge(tx: &Transaction<'_>, from: &KeyId, to: &KeyId) -> Result<bool> {
    Ok(tx.contains(&layout::edge(&from.holder(), to))?)
}

/// Metadata of the edge `from -> to`.
pub fn edge(tx: &Transaction<'_>, from: &KeyId, to: &KeyId) -> Result<Option<EdgeInfo>> {
    Ok(load_edge(tx, from, to)?.map(|edge| edge.info()))
}

/// Metadata of every edge leaving `from`, ordered by target ID.
pub fn outgoing(tx: &Transaction<'_>, from: &KeyId) -> Result<Vec<EdgeInfo>> {
    let edges: Vec<StoredEdge> = tx.scan_values(&layout::edges_from(&from.holder()))?;
    Ok(edges.iter().map(StoredEdge::info).collect())
}

/// Walk `path`, decrypting hop by hop, and return the bytes of its last key.
///
/// `start` is trusted to be the material of `path[0]`; nothing checks that
/// claim. Wrong start bytes surface as a [`KeyPathError::Decryption`] at the
/// first hop they fail to open.
pub fn get_key(tx: &Transaction<'_>, path: &[KeyId], start: &KeyBytes) -> Result<KeyBytes> {
    let (first, rest) = path.split_first().ok_or(KeyPathError::EmptyPath)?;

    let mut current = start.clone();
    let mut from = first.holder();
    for to in rest {
        if from.role() == KeyRole::Public {
            return Err(KeyPathError::MissingEdge {
                from: from.clone(),
                to: to.clone(),
            }
            .into());
        }
        let edge = load_edge(tx, &from, to)?.ok_or_else(|| KeyPathError::MissingEdge {
            from: from.clone(),
            to: to.clone(),
        })?;

        current = edge
            .cipher
            .unwrap(&from, to, &current)
            .map_err(|_| KeyPathError::Decryption {
                from: from.clone(),
                to: to.clone(),
            })?;
        from = to.clone();
    }

    Ok(current)
}

/// True when every adjacent pair of `path` is joined by an edge.
///
/// Nothing is decrypted. An empty path is never valid.
pub fn verify_access_path(tx: &Transaction<'_>, path: &[KeyId]) -> Result<bool> {
    if path.is_empty() {
        return Ok(false);
    }
    for (i, hop) in path.windows(2).enumerate() {
        if i > 0 && hop[0].role() == KeyRole::Public {
            return Ok(false);
        }
        if !has_edge(tx, &hop[0], &hop[1])? {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Breadth-first search for a shortest path `from -> to`.
///
/// No index is used: every call pays for a full traversal of the keys
/// reachable from `from`. Callers that already know a path should use
/// [`verify_access_path`].
pub fn slow_find_path(tx: &Transaction<'_>, from: &KeyId, to: &KeyId) -> Result<Option<Vec<KeyId>>> {
    let start = from.holder();
    if start == *to {
        return Ok(Some(vec![start]));
    }

    let mut came_from: HashMap<KeyId, KeyId> = HashMap::new();
    let mut visited: HashSet<KeyId> = HashSet::new();
    let mut queue = VecDeque::new();
    visited.insert(start.clone());
    queue.push_back(start.clone());

    while let Some(node) = queue.pop_front() {
        for edge in outgoing(tx, &node)? {
            let next = edge.to;
            if !visited.insert(next.clone()) {
                continue;
            }
            came_from.insert(next.clone(), node.clone());

            if next == *to {
                let mut path = vec![next];
                while let Some(prev) = path.last().and_then(|k| came_from.get(k)) {
                    path.push(prev.clone());
                }
                path.reverse();
                return Ok(Some(path));
            }
            if next.role() != KeyRole::Public {
                queue.push_back(next);
            }
        }
    }

    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use keyweave_core::{PrincipalId, X25519StaticSecret};
    use keyweave_store::MemoryLedger;
    use proptest::prelude::*;

    fn sym(role: &str) -> Key {
        Key::generate_symmetric(KeyId::symmetric(&PrincipalId::new(role)))
    }

    #[test]
    fn test_chain_recovery() {
        let ledger = MemoryLedger::new();
        let mut tx = Transaction::new(&ledger);
        let (a, b, c) = (sym("a"), sym("b"), sym("c"));

        add_access(&mut tx, &a, &b, EdgeData::new()).unwrap();
        add_access(&mut tx, &b, &c, EdgeData::new()).unwrap();

        let path = vec![a.id().clone(), b.id().clone(), c.id().clone()];
        let recovered = get_key(&tx, &path, a.bytes()).unwrap();
        assert_eq!(&recovered, c.bytes());
        assert!(verify_access_path(&tx, &path).unwrap());
    }

    #[test]
    fn test_single_element_path_returns_start() {
        let ledger = MemoryLedger::new();
        let tx = Transaction::new(&ledger);
        let a = sym("a");

        let recovered = get_key(&tx, &[a.id().clone()], a.bytes()).unwrap();
        assert_eq!(&recovered, a.bytes());
    }

    #[test]
    fn test_empty_path_is_key_path_error() {
        let ledger = MemoryLedger::new();
        let tx = Transaction::new(&ledger);
        let start = KeyBytes::from(vec![0u8; 32]);

        assert!(matches!(
            get_key(&tx, &[], &start),
            Err(AccessError::KeyPath(KeyPathError::EmptyPath))
        ));
        assert!(!verify_access_path(&tx, &[]).unwrap());
    }

    #[test]
    fn test_missing_edge_reported() {
        let ledger = MemoryLedger::new();
        let tx = Transaction::new(&ledger);
        let (a, b) = (sym("a"), sym("b"));

        let err = get_key(&tx, &[a.id().clone(), b.id().clone()], a.bytes()).unwrap_err();
        assert!(matches!(err, AccessError::KeyPath(KeyPathError::MissingEdge { .. })));
    }

    #[test]
    fn test_wrong_start_bytes_fail_at_first_hop() {
        let ledger = MemoryLedger::new();
        let mut tx = Transaction::new(&ledger);
        let (a, b, wrong) = (sym("a"), sym("b"), sym("wrong"));
        add_access(&mut tx, &a, &b, EdgeData::new()).unwrap();

        let err = get_key(&tx, &[a.id().clone(), b.id().clone()], wrong.bytes()).unwrap_err();
        assert!(matches!(err, AccessError::KeyPath(KeyPathError::Decryption { .. })));
    }

    #[test]
    fn test_sealed_edge_recorded_under_private_id() {
        let ledger = MemoryLedger::new();
        let mut tx = Transaction::new(&ledger);
        let alice = PrincipalId::new("alice");
        let secret = X25519StaticSecret::generate();
        let private = Key::new(KeyId::private(&alice), secret.to_bytes());
        let public = Key::new(KeyId::public(&alice), *secret.public_key().as_bytes());
        let target = sym("clinic");

        add_access(&mut tx, &public, &target, EdgeData::new()).unwrap();

        assert!(has_edge(&tx, private.id(), target.id()).unwrap());
        let recovered = get_key(&tx, &[private.id().clone(), target.id().clone()], private.bytes()).unwrap();
        assert_eq!(&recovered, target.bytes());
    }

    #[test]
    fn test_revoke_is_exact_and_missing_is_not_found() {
        let ledger = MemoryLedger::new();
        let mut tx = Transaction::new(&ledger);
        let (a, b, c) = (sym("a"), sym("b"), sym("c"));
        add_access(&mut tx, &a, &b, EdgeData::new()).unwrap();
        add_access(&mut tx, &b, &c, EdgeData::new()).unwrap();

        revoke_access(&mut tx, a.id(), b.id()).unwrap();
        assert!(!has_edge(&tx, a.id(), b.id()).unwrap());
        assert!(has_edge(&tx, b.id(), c.id()).unwrap());

        assert!(matches!(
            revoke_access(&mut tx, a.id(), b.id()),
            Err(AccessError::NotFound(_))
        ));
    }

    #[test]
    fn test_slow_find_path_is_shortest() {
        let ledger = MemoryLedger::new();
        let mut tx = Transaction::new(&ledger);
        let (a, b, c, d) = (sym("a"), sym("b"), sym("c"), sym("d"));

        // a -> b -> c -> d and a shortcut a -> c
        add_access(&mut tx, &a, &b, EdgeData::new()).unwrap();
        add_access(&mut tx, &b, &c, EdgeData::new()).unwrap();
        add_access(&mut tx, &c, &d, EdgeData::new()).unwrap();
        add_access(&mut tx, &a, &c, EdgeData::new()).unwrap();

        let path = slow_find_path(&tx, a.id(), d.id()).unwrap().unwrap();
        assert_eq!(path, vec![a.id().clone(), c.id().clone(), d.id().clone()]);

        assert_eq!(slow_find_path(&tx, d.id(), a.id()).unwrap(), None);
        assert_eq!(slow_find_path(&tx, a.id(), a.id()).unwrap(), Some(vec![a.id().clone()]));
    }

    #[test]
    fn test_slow_find_path_survives_cycles() {
        let ledger = MemoryLedger::new();
        let mut tx = Transaction::new(&ledger);
        let (a, b, c) = (sym("a"), sym("b"), sym("c"));
        add_access(&mut tx, &a, &b, EdgeData::new()).unwrap();
        add_access(&mut tx, &b, &a, EdgeData::new()).unwrap();

        assert_eq!(slow_find_path(&tx, a.id(), c.id()).unwrap(), None);
    }

    #[test]
    fn test_edge_metadata_is_readable() {
        let ledger = MemoryLedger::new();
        let mut tx = Transaction::new(&ledger);
        let (a, b) = (sym("a"), sym("b"));
        let mut data = EdgeData::new();
        data.insert("access".to_string(), "read".to_string());
        add_access(&mut tx, &a, &b, data.clone()).unwrap();

        let info = edge(&tx, a.id(), b.id()).unwrap().unwrap();
        assert_eq!(info.data, data);
        assert!(!info.sealed);
        assert_eq!(outgoing(&tx, a.id()).unwrap().len(), 1);
    }

    #[test]
    fn test_edge_into_public_key_is_a_dead_end() {
        let ledger = MemoryLedger::new();
        let mut tx = Transaction::new(&ledger);
        let alice = PrincipalId::new("alice");
        let secret = X25519StaticSecret::generate();
        let private = Key::new(KeyId::private(&alice), secret.to_bytes());
        let public = Key::new(KeyId::public(&alice), *secret.public_key().as_bytes());
        let alice_sym = Key::generate_symmetric(KeyId::symmetric(&alice));
        let eve = sym("eve");

        add_access(&mut tx, &public, &alice_sym, EdgeData::new()).unwrap();
        add_access(&mut tx, &eve, &public, EdgeData::new()).unwrap();

        // Reaching the public key is real, going through it is not
        let to_public = slow_find_path(&tx, eve.id(), public.id()).unwrap().unwrap();
        assert_eq!(to_public, vec![eve.id().clone(), public.id().clone()]);
        assert!(verify_access_path(&tx, &to_public).unwrap());
        assert_eq!(slow_find_path(&tx, eve.id(), private.id()).unwrap(), None);
        assert_eq!(slow_find_path(&tx, eve.id(), alice_sym.id()).unwrap(), None);

        let forged = vec![eve.id().clone(), public.id().clone(), alice_sym.id().clone()];
        assert!(!verify_access_path(&tx, &forged).unwrap());
        assert!(matches!(
            get_key(&tx, &forged, eve.bytes()),
            Err(AccessError::KeyPath(KeyPathError::MissingEdge { .. }))
        ));

        // The owner still starts from the public ID
        let own = slow_find_path(&tx, public.id(), alice_sym.id()).unwrap().unwrap();
        assert_eq!(own, vec![private.id().clone(), alice_sym.id().clone()]);
    }

    fn reachable(edges: &[(usize, usize)], from: usize, to: usize) -> bool {
        let mut seen = HashSet::from([from]);
        let mut queue = VecDeque::from([from]);
        while let Some(node) = queue.pop_front() {
            for (a, b) in edges {
                if *a == node && seen.insert(*b) {
                    queue.push_back(*b);
                }
            }
        }
        seen.contains(&to)
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn test_found_paths_exist_and_open(
            edges in prop::collection::vec((0..6usize, 0..6usize), 0..14),
            from in 0..6usize,
            to in 0..6usize,
        ) {
            let ledger = MemoryLedger::new();
            let mut tx = Transaction::new(&ledger);
            let keys: Vec<Key> = (0..6).map(|i| sym(&format!("k{}", i))).collect();
            for (a, b) in &edges {
                add_access(&mut tx, &keys[*a], &keys[*b], EdgeData::new()).unwrap();
            }

            match slow_find_path(&tx, keys[from].id(), keys[to].id()).unwrap() {
                Some(path) => {
                    prop_assert!(reachable(&edges, from, to));
                    prop_assert_eq!(path.first(), Some(keys[from].id()));
                    prop_assert_eq!(path.last(), Some(keys[to].id()));
                    prop_assert!(verify_access_path(&tx, &path).unwrap());
                    prop_assert_eq!(&get_key(&tx, &path, keys[from].bytes()).unwrap(), keys[to].bytes());
                }
                None => prop_assert!(!reachable(&edges, from, to)),
            }
        }
    }
}
