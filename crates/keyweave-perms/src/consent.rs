//! Consent records, resolution and validation.
//!
//! A consent lets a target read or write an owner's data under a datatype
//! (and its descendants), or explicitly denies it. There is at most one
//! consent per `(datatype, target, owner)`; updates overwrite.
//!
//! Granting wires three edges:
//!
//! ```text
//! consent      -> datatype key   (the consent reaches the scoped data)
//! owner.public -> consent        (the owner can manage it)
//! target.public -> consent       (the grant itself)
//! ```
//!
//! Denying revokes only `consent -> datatype key`. The target's edge to the
//! consent key stays as a record that the relationship existed.

use serde::{Deserialize, Serialize};

use keyweave_core::{ConsentId, DatatypeId, Key, KeyId, PrincipalId};
use keyweave_store::Transaction;

use crate::bundle::{self, Credential};
use crate::datatype;
use crate::edge::EdgeData;
use crate::error::{AccessError, DenialReason, Result};
use crate::filter::FilterRule;
use crate::graph;
use crate::identity;
use crate::keyring::{self, KeyOptions};
use crate::layout;

/// Access level of a consent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AccessLevel {
    Read,
    Write,
    Deny,
}

impl AccessLevel {
    /// Whether a consent at this level satisfies a request for `desired`.
    /// Write subsumes read; deny satisfies nothing.
    pub fn permits(self, desired: AccessLevel) -> bool {
        match self {
            AccessLevel::Deny => false,
            AccessLevel::Write => desired != AccessLevel::Deny,
            AccessLevel::Read => desired == AccessLevel::Read,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AccessLevel::Read => "read",
            AccessLevel::Write => "write",
            AccessLevel::Deny => "deny",
        }
    }
}

/// A stored consent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Consent {
    pub id: ConsentId,
    pub datatype: DatatypeId,
    pub owner: PrincipalId,
    pub target: PrincipalId,
    /// Who first wrote this consent.
    pub creator: PrincipalId,
    pub access: AccessLevel,
    /// When `access` last changed.
    pub consent_date: u64,
    /// `0` means no expiration.
    pub expiration_date: u64,
}

impl Consent {
    /// The consent's symmetric key ID.
    pub fn key_id(&self) -> KeyId {
        KeyId::consent(&self.id)
    }

    /// Policy checks, in order: deny level, access level, expiration.
    pub fn check(&self, desired: AccessLevel, now: u64) -> std::result::Result<(), DenialReason> {
        if self.access == AccessLevel::Deny {
            return Err(DenialReason::DenyLevel);
        }
        if !self.access.permits(desired) {
            return Err(DenialReason::InsufficientAccess);
        }
        if self.expiration_date != 0 && self.expiration_date <= now {
            return Err(DenialReason::Expired);
        }
        Ok(())
    }
}

/// What a successful validation hands back.
#[derive(Debug, Clone)]
pub struct ConsentGrant {
    pub consent: Consent,
    /// Row filter for the query layer.
    pub filter: FilterRule,
    /// The consent key, recovered from the caller's own key.
    pub consent_key: Key,
}

/// Arguments of [`put_consent`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsentRequest {
    pub datatype: DatatypeId,
    pub owner: PrincipalId,
    pub target: PrincipalId,
    pub access: AccessLevel,
    /// `0` means no expiration.
    pub expiration_date: u64,
}

/// A request to validate: may `target` access `owner`'s data under
/// `datatype` at `desired` level?
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsentQuery {
    pub datatype: DatatypeId,
    pub owner: PrincipalId,
    pub target: PrincipalId,
    pub desired: AccessLevel,
}

/// Create or update the consent for a `(datatype, target, owner)` triple.
///
/// The caller must be the owner or an admin of the owner, and the datatype
/// must be active. `consent_date` moves only when the access level changes;
/// the creator is kept from the first write.
pub fn put_consent(
    tx: &mut Transaction<'_>,
    caller: &Credential,
    request: &ConsentRequest,
    now: u64,
    max_depth: usize,
) -> Result<Consent> {
    let ConsentRequest {
        datatype: datatype_id,
        owner,
        target,
        access,
        expiration_date,
    } = request;

    if &caller.principal != owner && identity::is_admin_of(tx, &caller.principal, owner, max_depth)?.is_none() {
        return Err(AccessError::Permission(format!(
            "{} may not manage consents of {}",
            caller.principal, owner
        )));
    }

    let node = datatype::require_datatype(tx, datatype_id)?;
    if !node.active {
        return Err(AccessError::InvalidInput(format!("datatype {} is inactive", datatype_id)));
    }
    bundle::require_principal(tx, target)?;
    let target_public = bundle::public_key(tx, target)?;

    let owner_keys = keyring::principal_keys(tx, caller, owner, &KeyOptions::full(), max_depth)?;
    let owner_private = owner_keys.require_private()?.clone();
    let owner_symmetric = owner_keys.require_symmetric()?.clone();

    let id = ConsentId::derive(datatype_id, target, owner);
    let key_id = KeyId::consent(&id);
    let existing = get_consent(tx, &id)?;

    let consent_key = match &existing {
        Some(_) => {
            let path = [owner_private.id().clone(), key_id.clone()];
            keyring::recover_along(tx, &caller.principal, &owner_private, &path)?
        }
        None => Key::generate_symmetric(key_id.clone()),
    };
    let datatype_key = datatype::add_datatype_sym_key(tx, datatype_id, owner, &owner_symmetric, max_depth)?;

    let consent = Consent {
        id: id.clone(),
        datatype: datatype_id.clone(),
        owner: owner.clone(),
        target: target.clone(),
        creator: existing
            .as_ref()
            .map(|c| c.creator.clone())
            .unwrap_or_else(|| caller.principal.clone()),
        access: *access,
        consent_date: match &existing {
            Some(c) if c.access == *access => c.consent_date,
            _ => now,
        },
        expiration_date: *expiration_date,
    };

    let mut data = EdgeData::new();
    data.insert("access".to_string(), access.as_str().to_string());

    if *access == AccessLevel::Deny {
        if graph::has_edge(tx, &key_id, datatype_key.id())? {
            graph::revoke_access(tx, &key_id, datatype_key.id())?;
        }
        // A fresh deny still needs a way back to its key for a later grant
        if !graph::has_edge(tx, owner_private.id(), &key_id)? {
            graph::add_access(tx, &owner_keys.public, &consent_key, data)?;
        }
    } else {
        graph::add_access(tx, &consent_key, &datatype_key, data.clone())?;
        graph::add_access(tx, &owner_keys.public, &consent_key, data.clone())?;
        graph::add_access(tx, &target_public, &consent_key, data)?;
    }

    tx.put_value(layout::consent(&id), &consent)?;
    tx.put_value(layout::consent_by_owner(owner, &id), &id)?;
    tx.put_value(layout::consent_by_target(target, &id), &id)?;
    tx.memo_mut().invalidate_consent_ids();

    tracing::debug!(
        consent = %id,
        datatype = %datatype_id,
        owner = %owner,
        target = %target,
        access = access.as_str(),
        "consent written"
    );
    Ok(consent)
}

/// Look up a consent.
pub fn get_consent(tx: &Transaction<'_>, id: &ConsentId) -> Result<Option<Consent>> {
    Ok(tx.get_value(&layout::consent(id))?)
}

fn load_all(tx: &Transaction<'_>, ids: Vec<ConsentId>) -> Result<Vec<Consent>> {
    let mut out = Vec::with_capacity(ids.len());
    for id in ids {
        if let Some(consent) = get_consent(tx, &id)? {
            out.push(consent);
        }
    }
    Ok(out)
}

/// Every consent an owner has written.
pub fn consents_for_owner(tx: &Transaction<'_>, owner: &PrincipalId) -> Result<Vec<Consent>> {
    let ids = tx.scan_values(&layout::consents_by_owner(owner))?;
    load_all(tx, ids)
}

/// Every consent naming a target.
pub fn consents_for_target(tx: &Transaction<'_>, target: &PrincipalId) -> Result<Vec<Consent>> {
    let ids = tx.scan_values(&layout::consents_by_target(target))?;
    load_all(tx, ids)
}

/// Find the most specific consent for the triple: `datatype` itself first,
/// then each ancestor up to the root. Memoised, the miss included.
pub fn resolve_consent_id(
    tx: &mut Transaction<'_>,
    owner: &PrincipalId,
    target: &PrincipalId,
    datatype_id: &DatatypeId,
    max_depth: usize,
) -> Result<Option<ConsentId>> {
    if let Some(cached) = tx.memo().consent_id(owner, target, datatype_id) {
        return Ok(cached.clone());
    }

    let mut found = None;
    for node in datatype::lineage(tx, datatype_id, max_depth)? {
        let id = ConsentId::derive(&node, target, owner);
        if tx.contains(&layout::consent(&id))? {
            found = Some(id);
            break;
        }
    }

    tx.memo_mut()
        .put_consent_id(owner.clone(), target.clone(), datatype_id.clone(), found.clone());
    Ok(found)
}

/// Answer a [`ConsentQuery`] as of `now`.
///
/// The caller must be the target or a member of it. A negative answer is
/// `ConsentDenied` with the reason; the consent key is recovered from the
/// caller's own key, and no path to it is also a denial.
pub fn validate_consent(
    tx: &mut Transaction<'_>,
    caller: &Credential,
    query: &ConsentQuery,
    now: u64,
    max_depth: usize,
) -> Result<ConsentGrant> {
    let ConsentQuery {
        datatype: datatype_id,
        owner,
        target,
        desired,
    } = query;
    let desired = *desired;
    if desired == AccessLevel::Deny {
        return Err(AccessError::InvalidInput("cannot request deny access".to_string()));
    }
    datatype::require_datatype(tx, datatype_id)?;
    if &caller.principal != target && !identity::is_member_of(tx, &caller.principal, target, max_depth)? {
        return Err(AccessError::Permission(format!(
            "{} may not act for {}",
            caller.principal, target
        )));
    }

    let id = resolve_consent_id(tx, owner, target, datatype_id, max_depth)?
        .ok_or(AccessError::ConsentDenied(DenialReason::NoConsent))?;
    let consent = get_consent(tx, &id)?.ok_or_else(|| AccessError::NotFound(format!("consent {}", id)))?;
    consent.check(desired, now).map_err(AccessError::ConsentDenied)?;

    let mut scope = vec![datatype_id.clone()];
    scope.extend(datatype::descendants(tx, datatype_id, max_depth)?);
    let filter = FilterRule::for_consent(scope, consent.owner.clone());

    let consent_key = recover_consent_key(tx, caller, &consent)?;
    Ok(ConsentGrant {
        consent,
        filter,
        consent_key,
    })
}

fn recover_consent_key(tx: &mut Transaction<'_>, caller: &Credential, consent: &Consent) -> Result<Key> {
    let start = caller.key();
    let key_id = consent.key_id();
    let direct = [start.id().clone(), key_id.clone()];

    let path = if graph::verify_access_path(tx, &direct)? {
        Some(direct.to_vec())
    } else {
        graph::slow_find_path(tx, start.id(), &key_id)?
    };
    let path = path.ok_or(AccessError::ConsentDenied(DenialReason::NoKeyPath))?;

    keyring::recover_along(tx, &caller.principal, &start, &path).map_err(|err| {
        if err.is_absence() {
            AccessError::ConsentDenied(DenialReason::NoKeyPath)
        } else {
            err
        }
    })
}
