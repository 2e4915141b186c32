//! The datatype classification tree and its per-owner keys.
//!
//! Datatypes form a single-rooted tree stored as parent pointers plus a
//! child index. Every `(datatype, owner)` pair has a symmetric key derived
//! from the owner's data key, so anyone holding that key can recompute any
//! datatype key. The key graph still records `parent -> child` edges so a
//! grant on a broad datatype reaches its descendants by path as well.

use std::collections::{HashSet, VecDeque};

use serde::{Deserialize, Serialize};

use keyweave_core::{derive_key, DatatypeId, Key, KeyId, KeyRole, PrincipalId};
use keyweave_store::Transaction;

use crate::edge::EdgeData;
use crate::error::{AccessError, Result};
use crate::graph;
use crate::layout;

/// Derivation context for datatype keys.
const DATATYPE_CONTEXT: &str = "keyweave v1 datatype key";

/// A node in the classification tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Datatype {
    pub id: DatatypeId,
    pub parent: Option<DatatypeId>,
    pub description: String,
    pub active: bool,
}

/// Add a datatype under `parent`, or as the root when `parent` is `None`.
pub fn register_datatype(
    tx: &mut Transaction<'_>,
    id: &DatatypeId,
    parent: Option<&DatatypeId>,
    description: &str,
) -> Result<Datatype> {
    if id.is_empty() {
        return Err(AccessError::InvalidInput("empty datatype id".to_string()));
    }
    if tx.contains(&layout::datatype(id))? {
        return Err(AccessError::AlreadyExists(format!("datatype {}", id)));
    }

    match parent {
        Some(parent) => {
            require_datatype(tx, parent)?;
            tx.put_value(layout::datatype_child(parent, id), id)?;
        }
        None => {
            if let Some(root) = root(tx)? {
                return Err(AccessError::AlreadyExists(format!("datatype root {}", root)));
            }
            tx.put_value(layout::datatype_root(), id)?;
        }
    }

    let datatype = Datatype {
        id: id.clone(),
        parent: parent.cloned(),
        description: description.to_string(),
        active: true,
    };
    tx.put_value(layout::datatype(id), &datatype)?;

    tracing::debug!(datatype = %id, parent = ?parent, "datatype registered");
    Ok(datatype)
}

/// Mark a datatype inactive. New consents may not reference it.
pub fn deactivate_datatype(tx: &mut Transaction<'_>, id: &DatatypeId) -> Result<Datatype> {
    let mut datatype = require_datatype(tx, id)?;
    datatype.active = false;
    tx.put_value(layout::datatype(id), &datatype)?;
    Ok(datatype)
}

/// Look up a datatype.
pub fn get_datatype(tx: &Transaction<'_>, id: &DatatypeId) -> Result<Option<Datatype>> {
    Ok(tx.get_value(&layout::datatype(id))?)
}

/// Look up a datatype, failing with `NotFound`.
pub fn require_datatype(tx: &Transaction<'_>, id: &DatatypeId) -> Result<Datatype> {
    get_datatype(tx, id)?.ok_or_else(|| AccessError::NotFound(format!("datatype {}", id)))
}

/// The root of the tree, once one is registered.
pub fn root(tx: &Transaction<'_>) -> Result<Option<DatatypeId>> {
    Ok(tx.get_value(&layout::datatype_root())?)
}

/// Direct children, ordered by ID.
pub fn children(tx: &Transaction<'_>, id: &DatatypeId) -> Result<Vec<DatatypeId>> {
    Ok(tx.scan_values(&layout::datatype_children(id))?)
}

/// Every descendant of `id` (excluding `id`), breadth first.
pub fn descendants(tx: &Transaction<'_>, id: &DatatypeId, max_depth: usize) -> Result<Vec<DatatypeId>> {
    let mut out = Vec::new();
    let mut seen = HashSet::new();
    seen.insert(id.clone());

    let mut queue = VecDeque::new();
    queue.push_back((id.clone(), 0usize));
    while let Some((node, depth)) = queue.pop_front() {
        for child in children(tx, &node)? {
            if !seen.insert(child.clone()) {
                return Err(AccessError::MalformedTree(format!("datatype {} reached twice", child)));
            }
            if depth + 1 > max_depth {
                return Err(AccessError::MalformedTree(format!(
                    "datatype tree below {} deeper than {}",
                    id, max_depth
                )));
            }
            out.push(child.clone());
            queue.push_back((child, depth + 1));
        }
    }

    Ok(out)
}

/// `id` followed by its ancestors up to the root, nearest first.
pub fn lineage(tx: &Transaction<'_>, id: &DatatypeId, max_depth: usize) -> Result<Vec<DatatypeId>> {
    let mut chain = vec![id.clone()];
    let mut seen = HashSet::new();
    seen.insert(id.clone());

    let mut current = require_datatype(tx, id)?;
    while let Some(parent) = current.parent.take() {
        if !seen.insert(parent.clone()) {
            return Err(AccessError::MalformedTree(format!("datatype cycle through {}", parent)));
        }
        if chain.len() > max_depth {
            return Err(AccessError::MalformedTree(format!(
                "datatype tree above {} deeper than {}",
                id, max_depth
            )));
        }
        current = require_datatype(tx, &parent)?;
        chain.push(parent);
    }

    Ok(chain)
}

/// Ancestors of `id`, nearest first.
pub fn ancestors(tx: &Transaction<'_>, id: &DatatypeId, max_depth: usize) -> Result<Vec<DatatypeId>> {
    let mut chain = lineage(tx, id, max_depth)?;
    chain.remove(0);
    Ok(chain)
}

/// Derive the key of `(datatype, owner)` from the owner's data key.
pub fn derive_datatype_key(owner_symmetric: &Key, owner: &PrincipalId, datatype: &DatatypeId) -> Result<Key> {
    if owner_symmetric.id().role() != KeyRole::Symmetric {
        return Err(AccessError::InvalidInput(format!(
            "{} is not a principal data key",
            owner_symmetric.id()
        )));
    }
    owner_symmetric.require_material()?;

    let bytes = derive_key(
        DATATYPE_CONTEXT,
        &[
            owner_symmetric.bytes().as_slice(),
            owner.as_str().as_bytes(),
            datatype.as_str().as_bytes(),
        ],
    );
    Ok(Key::new(KeyId::datatype(datatype, owner), bytes))
}

/// Materialise the key of `(datatype, owner)` and connect it to the tree.
///
/// Walks from `datatype` toward the root adding `parent -> child` edges,
/// and `owner.symmetric -> root` at the top. Stops at the first node whose
/// incoming edge already exists.
pub fn add_datatype_sym_key(
    tx: &mut Transaction<'_>,
    datatype: &DatatypeId,
    owner: &PrincipalId,
    owner_symmetric: &Key,
    max_depth: usize,
) -> Result<Key> {
    let chain = lineage(tx, datatype, max_depth)?;
    let key = derive_datatype_key(owner_symmetric, owner, datatype)?;

    let mut child_key = key.clone();
    for (i, _) in chain.iter().enumerate() {
        let parent_key = match chain.get(i + 1) {
            Some(parent) => derive_datatype_key(owner_symmetric, owner, parent)?,
            None => owner_symmetric.clone(),
        };

        if graph::has_edge(tx, parent_key.id(), child_key.id())? {
            break;
        }
        graph::add_access(tx, &parent_key, &child_key, EdgeData::new())?;
        child_key = parent_key;
    }

    Ok(key)
}
