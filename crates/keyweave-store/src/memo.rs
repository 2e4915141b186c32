//! Typed per-transaction memo table.
//!
//! Each cache is keyed by a tuple of identifier newtypes rather than a
//! concatenated string. The memo lives inside a [`Transaction`] and is
//! dropped with it, so nothing cached here can outlive the snapshot it was
//! computed against.
//!
//! [`Transaction`]: crate::Transaction

use std::collections::HashMap;

use keyweave_core::{ConsentId, DatatypeId, Key, KeyId, PrincipalId};

/// Cache key for admin-path lookups: `(user, group)`.
pub type AdminPathKey = (PrincipalId, PrincipalId);

/// Cache key for consent resolution: `(owner, target, datatype)`.
pub type ConsentLookupKey = (PrincipalId, PrincipalId, DatatypeId);

/// Cache key for recovered keys: `(caller, key)`.
pub type RecoveredKey = (PrincipalId, KeyId);

/// Request-scoped memo table.
///
/// Negative results are cached explicitly (`None`), so a repeated negative
/// check in one transaction costs a hash lookup.
#[derive(Debug)]
pub struct Memo {
    enabled: bool,
    admin_paths: HashMap<AdminPathKey, Option<Vec<PrincipalId>>>,
    consent_ids: HashMap<ConsentLookupKey, Option<ConsentId>>,
    keys: HashMap<RecoveredKey, Key>,
}

impl Memo {
    /// Create an empty memo. With `enabled == false` the lookup caches
    /// never store anything; recovered keys are still kept.
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            admin_paths: HashMap::new(),
            consent_ids: HashMap::new(),
            keys: HashMap::new(),
        }
    }

    /// Whether lookup memoization is on.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Cached admin path for `(user, group)`. `Some(None)` is a cached "no".
    pub fn admin_path(&self, user: &PrincipalId, group: &PrincipalId) -> Option<&Option<Vec<PrincipalId>>> {
        self.admin_paths.get(&(user.clone(), group.clone()))
    }

    /// Record an admin-path result.
    pub fn put_admin_path(&mut self, user: PrincipalId, group: PrincipalId, path: Option<Vec<PrincipalId>>) {
        if self.enabled {
            self.admin_paths.insert((user, group), path);
        }
    }

    /// Forget every admin-path result. Called on identity-graph mutation.
    pub fn invalidate_admin_paths(&mut self) {
        self.admin_paths.clear();
    }

    /// Cached consent resolution. `Some(None)` is a cached "no consent".
    pub fn consent_id(
        &self,
        owner: &PrincipalId,
        target: &PrincipalId,
        datatype: &DatatypeId,
    ) -> Option<&Option<ConsentId>> {
        self.consent_ids
            .get(&(owner.clone(), target.clone(), datatype.clone()))
    }

    /// Record a consent-resolution result.
    pub fn put_consent_id(
        &mut self,
        owner: PrincipalId,
        target: PrincipalId,
        datatype: DatatypeId,
        consent: Option<ConsentId>,
    ) {
        if self.enabled {
            self.consent_ids.insert((owner, target, datatype), consent);
        }
    }

    /// Forget every consent-resolution result. Called when consents change.
    pub fn invalidate_consent_ids(&mut self) {
        self.consent_ids.clear();
    }

    /// A key `caller` recovered earlier in this transaction.
    pub fn key(&self, caller: &PrincipalId, id: &KeyId) -> Option<&Key> {
        self.keys.get(&(caller.clone(), id.clone()))
    }

    /// Remember key material `caller` recovered, for the rest of the
    /// transaction.
    pub fn put_key(&mut self, caller: PrincipalId, key: Key) {
        self.keys.insert((caller, key.id().clone()), key);
    }

    /// Forget recovered keys. Called when an edge is revoked.
    pub fn invalidate_keys(&mut self) {
        self.keys.clear();
    }

    /// Drop everything.
    pub fn clear(&mut self) {
        self.admin_paths.clear();
        self.consent_ids.clear();
        self.keys.clear();
    }
}

impl Default for Memo {
    fn default() -> Self {
        Self::new(true)
    }
}
