//! The identity graph.
//!
//! An unencrypted graph of `member`, `admin` and `subgroup` relationships
//! over principal IDs. It answers yes/no permission questions without any
//! key material; the key graph enforces what a principal can actually
//! decrypt.
//!
//! Each edge is written twice, once under its parent and once under its
//! child, so both directions are a single prefix scan.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use keyweave_core::{KeyId, PrincipalId};
use keyweave_store::Transaction;

use crate::error::{AccessError, Result};
use crate::layout;

/// Label of an identity edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IdentityLabel {
    /// `member(group, user)`
    Member,
    /// `admin(group, user)`
    Admin,
    /// `subgroup(parent, child)`
    Subgroup,
}

impl IdentityLabel {
    pub(crate) const fn as_str(self) -> &'static str {
        match self {
            IdentityLabel::Member => "member",
            IdentityLabel::Admin => "admin",
            IdentityLabel::Subgroup => "subgroup",
        }
    }
}

/// A stored identity edge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityEdge {
    pub parent: PrincipalId,
    pub label: IdentityLabel,
    pub child: PrincipalId,
}

/// Write `label(parent, child)`. Admin-path memo entries are dropped.
pub fn put_edge(tx: &mut Transaction<'_>, parent: &PrincipalId, label: IdentityLabel, child: &PrincipalId) -> Result<()> {
    let edge = IdentityEdge {
        parent: parent.clone(),
        label,
        child: child.clone(),
    };
    tx.put_value(layout::ident_down(parent, label, child), &edge)?;
    tx.put_value(layout::ident_up(child, label, parent), &edge)?;
    tx.memo_mut().invalidate_admin_paths();
    Ok(())
}

/// Remove `label(parent, child)`. Returns whether it existed.
pub fn remove_edge(tx: &mut Transaction<'_>, parent: &PrincipalId, label: IdentityLabel, child: &PrincipalId) -> Result<bool> {
    let down = layout::ident_down(parent, label, child);
    if !tx.contains(&down)? {
        return Ok(false);
    }
    tx.delete(down);
    tx.delete(layout::ident_up(child, label, parent));
    tx.memo_mut().invalidate_admin_paths();
    Ok(true)
}

/// True when `label(parent, child)` exists.
pub fn has_edge(tx: &Transaction<'_>, parent: &PrincipalId, label: IdentityLabel, child: &PrincipalId) -> Result<bool> {
    Ok(tx.contains(&layout::ident_down(parent, label, child))?)
}

fn children_of(tx: &Transaction<'_>, parent: &PrincipalId, label: IdentityLabel) -> Result<Vec<PrincipalId>> {
    let edges: Vec<IdentityEdge> = tx.scan_values(&layout::ident_down_prefix(parent, label))?;
    Ok(edges.into_iter().map(|e| e.child).collect())
}

fn parents_of(tx: &Transaction<'_>, child: &PrincipalId, label: IdentityLabel) -> Result<Vec<PrincipalId>> {
    let edges: Vec<IdentityEdge> = tx.scan_values(&layout::ident_up_prefix(child, label))?;
    Ok(edges.into_iter().map(|e| e.parent).collect())
}

/// Direct members of a group.
pub fn members(tx: &Transaction<'_>, group: &PrincipalId) -> Result<Vec<PrincipalId>> {
    children_of(tx, group, IdentityLabel::Member)
}

/// Direct admins of a group.
pub fn admins(tx: &Transaction<'_>, group: &PrincipalId) -> Result<Vec<PrincipalId>> {
    children_of(tx, group, IdentityLabel::Admin)
}

/// Direct subgroups of a group.
pub fn subgroups(tx: &Transaction<'_>, group: &PrincipalId) -> Result<Vec<PrincipalId>> {
    children_of(tx, group, IdentityLabel::Subgroup)
}

/// The parent group, if any. More than one parent is a malformed tree.
pub fn parent(tx: &Transaction<'_>, group: &PrincipalId) -> Result<Option<PrincipalId>> {
    let mut parents = parents_of(tx, group, IdentityLabel::Subgroup)?;
    if parents.len() > 1 {
        return Err(AccessError::MalformedTree(format!("group {} has {} parents", group, parents.len())));
    }
    Ok(parents.pop())
}

/// `group` followed by its ancestors, nearest first.
///
/// Fails with `MalformedTree` on a cycle or when the chain is longer than
/// `max_depth`.
pub fn lineage(tx: &Transaction<'_>, group: &PrincipalId, max_depth: usize) -> Result<Vec<PrincipalId>> {
    let mut chain = vec![group.clone()];
    let mut seen = HashSet::new();
    seen.insert(group.clone());

    let mut current = group.clone();
    while let Some(next) = parent(tx, &current)? {
        if !seen.insert(next.clone()) {
            return Err(AccessError::MalformedTree(format!("subgroup cycle through {}", next)));
        }
        if chain.len() > max_depth {
            return Err(AccessError::MalformedTree(format!(
                "group tree above {} deeper than {}",
                group, max_depth
            )));
        }
        chain.push(next.clone());
        current = next;
    }

    Ok(chain)
}

/// `admin(group, user)` exists, or `user` is the direct parent of `group`.
pub fn is_direct_admin(tx: &Transaction<'_>, user: &PrincipalId, group: &PrincipalId) -> Result<bool> {
    if has_edge(tx, group, IdentityLabel::Admin, user)? {
        return Ok(true);
    }
    Ok(parent(tx, group)?.as_ref() == Some(user))
}

/// Walk `group` and its ancestors; the first one `user` directly
/// administers proves admin status.
///
/// Returns the admin path `[user, hit, ..., group]`, or `None`. Results,
/// negative ones included, are memoised for the rest of the transaction.
pub fn is_admin_of(
    tx: &mut Transaction<'_>,
    user: &PrincipalId,
    group: &PrincipalId,
    max_depth: usize,
) -> Result<Option<Vec<PrincipalId>>> {
    if let Some(cached) = tx.memo().admin_path(user, group) {
        return Ok(cached.clone());
    }

    let chain = lineage(tx, group, max_depth)?;
    let mut result = None;
    for (i, ancestor) in chain.iter().enumerate() {
        if is_direct_admin(tx, user, ancestor)? {
            let mut path = vec![user.clone()];
            path.extend(chain[..=i].iter().rev().cloned());
            result = Some(path);
            break;
        }
    }

    tx.memo_mut()
        .put_admin_path(user.clone(), group.clone(), result.clone());
    Ok(result)
}

/// `user == group`, a direct `member` edge, or membership or admin status
/// in an ancestor of `group`.
pub fn is_member_of(tx: &Transaction<'_>, user: &PrincipalId, group: &PrincipalId, max_depth: usize) -> Result<bool> {
    for (i, ancestor) in lineage(tx, group, max_depth)?.iter().enumerate() {
        if ancestor == user || has_edge(tx, ancestor, IdentityLabel::Member, user)? {
            return Ok(true);
        }
        if i > 0 && is_direct_admin(tx, user, ancestor)? {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Translate an admin path into the key path that proves it.
///
/// `[u, a1, ..., g]` becomes
/// `[u.private, a1.privhash, a1.private, ..., g.privhash, g.private]`.
pub fn admin_key_path(path: &[PrincipalId]) -> Vec<KeyId> {
    let mut keys = Vec::with_capacity(path.len() * 2);
    if let Some((user, rest)) = path.split_first() {
        keys.push(KeyId::private(user));
        for group in rest {
            keys.push(KeyId::private_hash(group));
            keys.push(KeyId::private(group));
        }
    }
    keys
}
