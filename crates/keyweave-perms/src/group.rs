//! Users, groups and group membership.
//!
//! Every identity mutation is paired with its key-graph edge, so the
//! identity graph and what a principal can decrypt stay in step:
//!
//! | Relationship       | Identity edge              | Key edge                       |
//! |--------------------|----------------------------|--------------------------------|
//! | member             | `member(group, user)`      | `user.public -> group.sym`     |
//! | admin              | `admin(group, user)`       | `user.public -> group.privhash`|
//! | subgroup           | `subgroup(parent, child)`  | `parent.public -> child.privhash`, `parent.log -> child.log`, `parent.sym <-> child.sym` |
//!
//! Only an admin of a group, direct or inherited, may change it.

use keyweave_core::{KeyId, PrincipalId};
use keyweave_store::Transaction;

use crate::bundle::{self, Credential, Principal, PrincipalKind};
use crate::edge::EdgeData;
use crate::error::{AccessError, Result};
use crate::graph;
use crate::identity::{self, IdentityLabel};
use crate::keyring::{self, KeyOptions, PrincipalKeys};

fn relationship(label: IdentityLabel) -> EdgeData {
    let mut data = EdgeData::new();
    data.insert("relationship".to_string(), label.as_str().to_string());
    data
}

/// Register a user. The returned credential is the only copy of its private
/// key.
pub fn register_user(tx: &mut Transaction<'_>, id: &PrincipalId, role: &str) -> Result<Credential> {
    let bundle = bundle::register_principal(tx, id, PrincipalKind::User, role)?;
    Ok(bundle.credential())
}

/// Register a group with `creator` as its first member and admin.
///
/// The group's private key is dropped once the edges are written; from then
/// on only admin paths reach it.
pub fn register_group(tx: &mut Transaction<'_>, creator: &Credential, id: &PrincipalId, role: &str) -> Result<Principal> {
    bundle::require_principal(tx, &creator.principal)?;
    let creator_public = bundle::public_key(tx, &creator.principal)?;

    let group = bundle::register_principal(tx, id, PrincipalKind::Group, role)?;
    graph::add_access(tx, &creator_public, &group.symmetric, relationship(IdentityLabel::Member))?;
    graph::add_access(tx, &creator_public, &group.private_hash, relationship(IdentityLabel::Admin))?;
    identity::put_edge(tx, id, IdentityLabel::Member, &creator.principal)?;
    identity::put_edge(tx, id, IdentityLabel::Admin, &creator.principal)?;

    tracing::debug!(group = %id, creator = %creator.principal, "group registered");
    bundle::require_principal(tx, id)
}

fn require_group(tx: &Transaction<'_>, id: &PrincipalId) -> Result<Principal> {
    let principal = bundle::require_principal(tx, id)?;
    if principal.kind != PrincipalKind::Group {
        return Err(AccessError::InvalidInput(format!("{} is not a group", id)));
    }
    Ok(principal)
}

/// The group's full key set, recovered through the caller's admin path.
fn admin_keys(
    tx: &mut Transaction<'_>,
    caller: &Credential,
    group: &PrincipalId,
    max_depth: usize,
) -> Result<PrincipalKeys> {
    require_group(tx, group)?;
    if identity::is_admin_of(tx, &caller.principal, group, max_depth)?.is_none() {
        return Err(AccessError::Permission(format!(
            "{} is not an admin of {}",
            caller.principal, group
        )));
    }
    keyring::principal_keys(tx, caller, group, &KeyOptions::full(), max_depth)
}

/// Make `user` a member of `group`.
pub fn add_member(
    tx: &mut Transaction<'_>,
    caller: &Credential,
    group: &PrincipalId,
    user: &PrincipalId,
    max_depth: usize,
) -> Result<()> {
    let keys = admin_keys(tx, caller, group, max_depth)?;
    bundle::require_principal(tx, user)?;
    let user_public = bundle::public_key(tx, user)?;

    graph::add_access(tx, &user_public, keys.require_symmetric()?, relationship(IdentityLabel::Member))?;
    identity::put_edge(tx, group, IdentityLabel::Member, user)?;
    tracing::debug!(%group, %user, by = %caller.principal, "member added");
    Ok(())
}

/// Make `user` an admin of `group`, adding membership if missing.
pub fn add_admin(
    tx: &mut Transaction<'_>,
    caller: &Credential,
    group: &PrincipalId,
    user: &PrincipalId,
    max_depth: usize,
) -> Result<()> {
    let keys = admin_keys(tx, caller, group, max_depth)?;
    bundle::require_principal(tx, user)?;
    let user_public = bundle::public_key(tx, user)?;

    if !identity::has_edge(tx, group, IdentityLabel::Member, user)? {
        graph::add_access(tx, &user_public, keys.require_symmetric()?, relationship(IdentityLabel::Member))?;
        identity::put_edge(tx, group, IdentityLabel::Member, user)?;
    }
    graph::add_access(tx, &user_public, keys.require_private_hash()?, relationship(IdentityLabel::Admin))?;
    identity::put_edge(tx, group, IdentityLabel::Admin, user)?;
    tracing::debug!(%group, %user, by = %caller.principal, "admin added");
    Ok(())
}

fn revoke_if_present(tx: &mut Transaction<'_>, from: &KeyId, to: &KeyId) -> Result<()> {
    if graph::has_edge(tx, from, to)? {
        graph::revoke_access(tx, from, to)?;
    }
    Ok(())
}

/// Demote `user`. Membership is kept. Only the admin edge is revoked.
pub fn remove_admin(
    tx: &mut Transaction<'_>,
    caller: &Credential,
    group: &PrincipalId,
    user: &PrincipalId,
    max_depth: usize,
) -> Result<()> {
    admin_keys(tx, caller, group, max_depth)?;
    if !identity::remove_edge(tx, group, IdentityLabel::Admin, user)? {
        return Err(AccessError::NotFound(format!("{} is not an admin of {}", user, group)));
    }
    revoke_if_present(tx, &KeyId::private(user), &KeyId::private_hash(group))?;
    tracing::debug!(%group, %user, by = %caller.principal, "admin removed");
    Ok(())
}

/// Remove `user` from `group`, demoting it first if it is an admin.
pub fn remove_member(
    tx: &mut Transaction<'_>,
    caller: &Credential,
    group: &PrincipalId,
    user: &PrincipalId,
    max_depth: usize,
) -> Result<()> {
    admin_keys(tx, caller, group, max_depth)?;
    let was_member = identity::remove_edge(tx, group, IdentityLabel::Member, user)?;
    let was_admin = identity::remove_edge(tx, group, IdentityLabel::Admin, user)?;
    if !was_member && !was_admin {
        return Err(AccessError::NotFound(format!("{} is not a member of {}", user, group)));
    }

    revoke_if_present(tx, &KeyId::private(user), &KeyId::symmetric(group))?;
    revoke_if_present(tx, &KeyId::private(user), &KeyId::private_hash(group))?;
    tracing::debug!(%group, %user, by = %caller.principal, "member removed");
    Ok(())
}

/// Attach `child` under `parent`.
///
/// The caller must administer both. A child that already has a parent, or
/// a link that would close a cycle, is `MalformedTree`.
pub fn register_subgroup(
    tx: &mut Transaction<'_>,
    caller: &Credential,
    parent: &PrincipalId,
    child: &PrincipalId,
    max_depth: usize,
) -> Result<()> {
    if parent == child {
        return Err(AccessError::MalformedTree(format!("{} cannot be its own subgroup", parent)));
    }
    let parent_keys = admin_keys(tx, caller, parent, max_depth)?;
    let child_keys = admin_keys(tx, caller, child, max_depth)?;

    if let Some(existing) = identity::parent(tx, child)? {
        return Err(AccessError::MalformedTree(format!(
            "{} already has parent {}",
            child, existing
        )));
    }
    if identity::lineage(tx, parent, max_depth)?.contains(child) {
        return Err(AccessError::MalformedTree(format!(
            "{} is an ancestor of {}",
            child, parent
        )));
    }

    let data = relationship(IdentityLabel::Subgroup);
    graph::add_access(tx, &parent_keys.public, child_keys.require_private_hash()?, data.clone())?;
    graph::add_access(tx, parent_keys.require_log()?, child_keys.require_log()?, data.clone())?;
    graph::add_access(tx, parent_keys.require_symmetric()?, child_keys.require_symmetric()?, data.clone())?;
    graph::add_access(tx, child_keys.require_symmetric()?, parent_keys.require_symmetric()?, data)?;
    identity::put_edge(tx, parent, IdentityLabel::Subgroup, child)?;

    tracing::debug!(%parent, %child, by = %caller.principal, "subgroup registered");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use keyweave_store::MemoryLedger;

    fn id(s: &str) -> PrincipalId {
        PrincipalId::new(s)
    }

    #[test]
    fn test_group_creator_is_member_and_admin() {
        let ledger = MemoryLedger::new();
        let mut tx = Transaction::new(&ledger);
        let alice = register_user(&mut tx, &id("alice"), "doctor").unwrap();
        let group = register_group(&mut tx, &alice, &id("clinic"), "org").unwrap();

        assert_eq!(group.kind, PrincipalKind::Group);
        assert!(identity::has_edge(&tx, &id("clinic"), IdentityLabel::Member, &id("alice")).unwrap());
        assert!(identity::is_admin_of(&mut tx, &id("alice"), &id("clinic"), 16).unwrap().is_some());

        let keys = keyring::principal_keys(&mut tx, &alice, &id("clinic"), &KeyOptions::full(), 16).unwrap();
        assert!(keys.private.is_some());
    }

    #[test]
    fn test_promotion_and_demotion() {
        let ledger = MemoryLedger::new();
        let mut tx = Transaction::new(&ledger);
        let alice = register_user(&mut tx, &id("alice"), "").unwrap();
        let bob = register_user(&mut tx, &id("bob"), "").unwrap();
        register_group(&mut tx, &alice, &id("clinic"), "").unwrap();

        add_admin(&mut tx, &alice, &id("clinic"), &id("bob"), 16).unwrap();
        assert!(identity::has_edge(&tx, &id("clinic"), IdentityLabel::Member, &id("bob")).unwrap());
        assert!(keyring::principal_keys(&mut tx, &bob, &id("clinic"), &KeyOptions::full(), 16).is_ok());

        remove_admin(&mut tx, &alice, &id("clinic"), &id("bob"), 16).unwrap();
        assert!(!graph::has_edge(&tx, &KeyId::private(&id("bob")), &KeyId::private_hash(&id("clinic"))).unwrap());
        assert!(graph::has_edge(&tx, &KeyId::private(&id("bob")), &KeyId::symmetric(&id("clinic"))).unwrap());
        assert!(matches!(
            keyring::principal_keys(&mut tx, &bob, &id("clinic"), &KeyOptions::full(), 16),
            Err(AccessError::Permission(_))
        ));
        assert!(keyring::principal_keys(&mut tx, &bob, &id("clinic"), &KeyOptions::data(), 16).is_ok());
    }

    #[test]
    fn test_non_admin_cannot_change_group() {
        let ledger = MemoryLedger::new();
        let mut tx = Transaction::new(&ledger);
        let alice = register_user(&mut tx, &id("alice"), "").unwrap();
        let bob = register_user(&mut tx, &id("bob"), "").unwrap();
        register_user(&mut tx, &id("carol"), "").unwrap();
        register_group(&mut tx, &alice, &id("clinic"), "").unwrap();
        add_member(&mut tx, &alice, &id("clinic"), &id("bob"), 16).unwrap();

        assert!(matches!(
            add_member(&mut tx, &bob, &id("clinic"), &id("carol"), 16),
            Err(AccessError::Permission(_))
        ));
    }

    #[test]
    fn test_remove_member_drops_admin_too() {
        let ledger = MemoryLedger::new();
        let mut tx = Transaction::new(&ledger);
        let alice = register_user(&mut tx, &id("alice"), "").unwrap();
        register_user(&mut tx, &id("bob"), "").unwrap();
        register_group(&mut tx, &alice, &id("clinic"), "").unwrap();
        add_admin(&mut tx, &alice, &id("clinic"), &id("bob"), 16).unwrap();

        remove_member(&mut tx, &alice, &id("clinic"), &id("bob"), 16).unwrap();
        assert_eq!(identity::admins(&tx, &id("clinic")).unwrap(), vec![id("alice")]);
        assert!(!graph::has_edge(&tx, &KeyId::private(&id("bob")), &KeyId::symmetric(&id("clinic"))).unwrap());
        assert!(matches!(
            remove_member(&mut tx, &alice, &id("clinic"), &id("bob"), 16),
            Err(AccessError::NotFound(_))
        ));
    }

    #[test]
    fn test_subgroup_wiring_and_inherited_admin() {
        let ledger = MemoryLedger::new();
        let mut tx = Transaction::new(&ledger);
        let alice = register_user(&mut tx, &id("alice"), "").unwrap();
        register_group(&mut tx, &alice, &id("hospital"), "").unwrap();
        register_group(&mut tx, &alice, &id("ward"), "").unwrap();
        register_subgroup(&mut tx, &alice, &id("hospital"), &id("ward"), 16).unwrap();

        assert_eq!(identity::parent(&tx, &id("ward")).unwrap(), Some(id("hospital")));
        let sym = |g: &str| KeyId::symmetric(&id(g));
        assert!(graph::has_edge(&tx, &sym("hospital"), &sym("ward")).unwrap());
        assert!(graph::has_edge(&tx, &sym("ward"), &sym("hospital")).unwrap());
        assert!(graph::has_edge(&tx, &KeyId::log(&id("hospital")), &KeyId::log(&id("ward"))).unwrap());

        // An admin of only the parent reaches the child through it
        let bob = register_user(&mut tx, &id("bob"), "").unwrap();
        add_admin(&mut tx, &alice, &id("hospital"), &id("bob"), 16).unwrap();
        let path = identity::is_admin_of(&mut tx, &id("bob"), &id("ward"), 16).unwrap().unwrap();
        assert_eq!(path, vec![id("bob"), id("hospital"), id("ward")]);
        let keys = keyring::principal_keys(&mut tx, &bob, &id("ward"), &KeyOptions::full(), 16).unwrap();
        assert!(keys.private.is_some());
    }

    #[test]
    fn test_subgroup_rejects_second_parent_and_cycle() {
        let ledger = MemoryLedger::new();
        let mut tx = Transaction::new(&ledger);
        let alice = register_user(&mut tx, &id("alice"), "").unwrap();
        for g in ["a", "b", "c"] {
            register_group(&mut tx, &alice, &id(g), "").unwrap();
        }
        register_subgroup(&mut tx, &alice, &id("a"), &id("b"), 16).unwrap();

        assert!(matches!(
            register_subgroup(&mut tx, &alice, &id("c"), &id("b"), 16),
            Err(AccessError::MalformedTree(_))
        ));
        assert!(matches!(
            register_subgroup(&mut tx, &alice, &id("b"), &id("a"), 16),
            Err(AccessError::MalformedTree(_))
        ));
        assert!(matches!(
            register_subgroup(&mut tx, &alice, &id("a"), &id("a"), 16),
            Err(AccessError::MalformedTree(_))
        ));
    }

    #[test]
    fn test_users_cannot_have_members() {
        let ledger = MemoryLedger::new();
        let mut tx = Transaction::new(&ledger);
        let alice = register_user(&mut tx, &id("alice"), "").unwrap();
        register_user(&mut tx, &id("bob"), "").unwrap();

        assert!(matches!(
            add_member(&mut tx, &alice, &id("alice"), &id("bob"), 16),
            Err(AccessError::InvalidInput(_))
        ));
    }
}
