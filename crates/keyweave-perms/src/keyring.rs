//! Recovering a principal's keys on behalf of a caller.
//!
//! The caller proves nothing beyond holding its own private key; every other
//! key is reached by decrypting along the key graph. Recovered keys are
//! cached in the transaction memo and never written back.

use keyweave_core::{ConsentId, Key, KeyId, KeyRole, PrincipalId};
use keyweave_store::Transaction;

use crate::bundle::{self, private_hash_key, Credential};
use crate::error::{AccessError, KeyPathError, Result};
use crate::graph;
use crate::identity;
use crate::layout;

/// Which keys to recover, and optional known paths to them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyOptions {
    /// Recover the private and private-hash keys. Needs admin status.
    pub include_private: bool,
    /// Recover the symmetric data key and the log key.
    pub include_private_data: bool,
    /// Known path from the caller's private key to the subject's data key.
    pub sym_key_path: Option<Vec<KeyId>>,
    /// Known path from the caller's private key to the subject's private key.
    pub priv_key_path: Option<Vec<KeyId>>,
}

impl KeyOptions {
    /// Data keys only.
    pub fn data() -> Self {
        Self {
            include_private_data: true,
            ..Self::default()
        }
    }

    /// Every key of the bundle.
    pub fn full() -> Self {
        Self {
            include_private: true,
            include_private_data: true,
            ..Self::default()
        }
    }

    /// Use a known path to the data key.
    pub fn with_sym_key_path(mut self, path: Vec<KeyId>) -> Self {
        self.sym_key_path = Some(path);
        self
    }

    /// Use a known path to the private key.
    pub fn with_priv_key_path(mut self, path: Vec<KeyId>) -> Self {
        self.priv_key_path = Some(path);
        self
    }
}

/// Keys of one principal as seen by one caller.
#[derive(Debug, Clone)]
pub struct PrincipalKeys {
    pub principal: PrincipalId,
    pub public: Key,
    pub private: Option<Key>,
    pub private_hash: Option<Key>,
    pub symmetric: Option<Key>,
    pub log: Option<Key>,
}

fn missing(principal: &PrincipalId, what: &str) -> AccessError {
    AccessError::KeyMaterial(format!("{} key of {} was not recovered", what, principal))
}

impl PrincipalKeys {
    pub fn require_private(&self) -> Result<&Key> {
        self.private.as_ref().ok_or_else(|| missing(&self.principal, "private"))
    }

    pub fn require_private_hash(&self) -> Result<&Key> {
        self.private_hash
            .as_ref()
            .ok_or_else(|| missing(&self.principal, "private-hash"))
    }

    pub fn require_symmetric(&self) -> Result<&Key> {
        self.symmetric.as_ref().ok_or_else(|| missing(&self.principal, "symmetric"))
    }

    pub fn require_log(&self) -> Result<&Key> {
        self.log.as_ref().ok_or_else(|| missing(&self.principal, "log"))
    }
}

/// Recover the key at the end of `path` for `caller`, starting from
/// `start`, a key the caller already holds.
///
/// `path` must begin at `start`. Keys this caller recovered earlier in the
/// transaction short-circuit the walk.
pub fn recover_along(tx: &mut Transaction<'_>, caller: &PrincipalId, start: &Key, path: &[KeyId]) -> Result<Key> {
    let target = path.last().ok_or(KeyPathError::EmptyPath)?.clone();
    if let Some(key) = tx.memo().key(caller, &target) {
        return Ok(key.clone());
    }
    if path.first().map(KeyId::holder) != Some(start.id().holder()) {
        return Err(AccessError::InvalidInput(format!("key path must start at {}", start.id())));
    }

    let bytes = graph::get_key(tx, path, start.bytes())?;
    let key = Key::new(target, bytes);
    tx.memo_mut().put_key(caller.clone(), key.clone());
    Ok(key)
}

/// Recover `target` for `caller` along a discovered path.
///
/// `Permission` when no path exists.
pub fn recover_key(tx: &mut Transaction<'_>, caller: &Credential, target: &KeyId) -> Result<Key> {
    if let Some(key) = tx.memo().key(&caller.principal, target) {
        return Ok(key.clone());
    }

    let start = caller.key();
    let path = graph::slow_find_path(tx, start.id(), target)?.ok_or_else(|| {
        AccessError::Permission(format!("{} holds no key path to {}", caller.principal, target))
    })?;
    recover_along(tx, &caller.principal, &start, &path)
}

/// Recover `subject`'s keys for `caller`, as selected by `options`.
///
/// - Private keys need `subject == caller`, a `priv_key_path`, or an admin
///   path from the caller to the subject.
/// - Data keys come through the private key when it is available, else
///   through `sym_key_path` or any discovered key path.
pub fn principal_keys(
    tx: &mut Transaction<'_>,
    caller: &Credential,
    subject: &PrincipalId,
    options: &KeyOptions,
    max_depth: usize,
) -> Result<PrincipalKeys> {
    bundle::require_principal(tx, subject)?;
    let public = bundle::public_key(tx, subject)?;
    let start = caller.key();

    let private = if subject == &caller.principal {
        Some(start.clone())
    } else if options.include_private {
        let path = match &options.priv_key_path {
            Some(path) => path.clone(),
            None => {
                let admin_path = identity::is_admin_of(tx, &caller.principal, subject, max_depth)?
                    .ok_or_else(|| {
                        AccessError::Permission(format!("{} is not an admin of {}", caller.principal, subject))
                    })?;
                identity::admin_key_path(&admin_path)
            }
        };
        if path.last() != Some(&KeyId::private(subject)) {
            return Err(AccessError::InvalidInput(format!("key path must end at private:{}", subject)));
        }
        Some(recover_along(tx, &caller.principal, &start, &path)?)
    } else {
        None
    };

    let mut keys = PrincipalKeys {
        principal: subject.clone(),
        public,
        private: None,
        private_hash: None,
        symmetric: None,
        log: None,
    };

    if options.include_private_data {
        let symmetric_id = KeyId::symmetric(subject);
        let symmetric = match (&private, &options.sym_key_path) {
            (Some(private), _) => {
                let path = [private.id().clone(), symmetric_id.clone()];
                recover_along(tx, &caller.principal, private, &path)?
            }
            (None, Some(path)) => {
                if path.last() != Some(&symmetric_id) {
                    return Err(AccessError::InvalidInput(format!("key path must end at {}", symmetric_id)));
                }
                recover_along(tx, &caller.principal, &start, path)?
            }
            (None, None) => recover_key(tx, caller, &symmetric_id)?,
        };
        let log = recover_along(tx, &caller.principal, &symmetric, &[symmetric_id, KeyId::log(subject)])?;

        keys.symmetric = Some(symmetric);
        keys.log = Some(log);
    }

    if options.include_private {
        if let Some(private) = private {
            keys.private_hash = Some(private_hash_key(subject, private.bytes()));
            keys.private = Some(private);
        }
    }

    Ok(keys)
}

/// The log key of `subject` for `caller`: its own, an admin's, or one
/// reached through a parent group's log key.
pub fn log_key(tx: &mut Transaction<'_>, caller: &Credential, subject: &PrincipalId) -> Result<Key> {
    let log_id = KeyId::log(subject);
    if subject == &caller.principal {
        let start = caller.key();
        let path = [start.id().clone(), KeyId::symmetric(subject), log_id];
        return recover_along(tx, &caller.principal, &start, &path);
    }
    recover_key(tx, caller, &log_id)
}

/// True when `id` names a key something already depends on: a bundle key
/// of a registered principal, a consent key, a datatype key, or any key
/// with edges leaving it.
fn is_established(tx: &Transaction<'_>, id: &KeyId) -> Result<bool> {
    match id.role() {
        KeyRole::Datatype | KeyRole::Public => Ok(true),
        KeyRole::Consent => Ok(tx.contains(&layout::consent(&ConsentId::new(id.subject())))?),
        _ => {
            let owned = bundle::get_principal(tx, &PrincipalId::new(id.subject()))?.is_some();
            Ok(owned || !graph::outgoing(tx, id)?.is_empty())
        }
    }
}

/// `Permission` unless `key`'s bytes are the real material of its ID.
///
/// Public keys are checked against the stored public key. Every other key
/// must be recoverable by the caller.
fn check_genuine(tx: &mut Transaction<'_>, caller: &Credential, key: &Key) -> Result<()> {
    let genuine = if key.id().role() == KeyRole::Public {
        bundle::public_key(tx, &PrincipalId::new(key.id().subject()))?
    } else {
        recover_key(tx, caller, key.id())?
    };
    if genuine.bytes() != key.bytes() {
        return Err(AccessError::Permission(format!(
            "{} supplied bytes that are not {}",
            caller.principal,
            key.id()
        )));
    }
    Ok(())
}

/// Check that `caller` may store the edge `from -> to` with these bytes.
///
/// Established keys must be genuine and held by the caller. A key no one
/// depends on yet is the caller's to introduce, unless it already is the
/// target of `from -> to`, which is never rewritten with other bytes.
pub fn authorize_link(tx: &mut Transaction<'_>, caller: &Credential, from: &Key, to: &Key) -> Result<()> {
    if is_established(tx, from.id())? {
        check_genuine(tx, caller, from)?;
    }
    if is_established(tx, to.id())? || graph::has_edge(tx, from.id(), to.id())? {
        check_genuine(tx, caller, to)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundle::{register_principal, PrincipalKind};
    use crate::edge::EdgeData;
    use crate::identity::IdentityLabel;
    use keyweave_store::MemoryLedger;

    #[test]
    fn test_own_keys() {
        let ledger = MemoryLedger::new();
        let mut tx = Transaction::new(&ledger);
        let alice = PrincipalId::new("alice");
        let bundle = register_principal(&mut tx, &alice, PrincipalKind::User, "").unwrap();

        let keys = principal_keys(&mut tx, &bundle.credential(), &alice, &KeyOptions::full(), 16).unwrap();
        assert_eq!(keys.require_private().unwrap(), &bundle.private);
        assert_eq!(keys.require_private_hash().unwrap(), &bundle.private_hash);
        assert_eq!(keys.require_symmetric().unwrap(), &bundle.symmetric);
        assert_eq!(keys.require_log().unwrap(), &bundle.log);
    }

    #[test]
    fn test_admin_recovers_private_and_member_does_not() {
        let ledger = MemoryLedger::new();
        let mut tx = Transaction::new(&ledger);
        let group = PrincipalId::new("clinic");
        let admin = PrincipalId::new("admin");
        let member = PrincipalId::new("member");

        let g = register_principal(&mut tx, &group, PrincipalKind::Group, "").unwrap();
        let a = register_principal(&mut tx, &admin, PrincipalKind::User, "").unwrap();
        let m = register_principal(&mut tx, &member, PrincipalKind::User, "").unwrap();

        graph::add_access(&mut tx, &a.public, &g.private_hash, EdgeData::new()).unwrap();
        identity::put_edge(&mut tx, &group, IdentityLabel::Admin, &admin).unwrap();
        graph::add_access(&mut tx, &m.public, &g.symmetric, EdgeData::new()).unwrap();
        identity::put_edge(&mut tx, &group, IdentityLabel::Member, &member).unwrap();

        let keys = principal_keys(&mut tx, &a.credential(), &group, &KeyOptions::full(), 16).unwrap();
        assert_eq!(keys.require_private().unwrap(), &g.private);
        assert_eq!(keys.require_log().unwrap(), &g.log);

        // The admin's recovered keys are not handed to the member
        assert!(matches!(
            principal_keys(&mut tx, &m.credential(), &group, &KeyOptions::full(), 16),
            Err(AccessError::Permission(_))
        ));
    }

    #[test]
    fn test_member_recovers_data_keys_only() {
        let ledger = MemoryLedger::new();
        let mut tx = Transaction::new(&ledger);
        let group = PrincipalId::new("clinic");
        let member = PrincipalId::new("member");

        let g = register_principal(&mut tx, &group, PrincipalKind::Group, "").unwrap();
        let m = register_principal(&mut tx, &member, PrincipalKind::User, "").unwrap();
        graph::add_access(&mut tx, &m.public, &g.symmetric, EdgeData::new()).unwrap();
        identity::put_edge(&mut tx, &group, IdentityLabel::Member, &member).unwrap();

        let keys = principal_keys(&mut tx, &m.credential(), &group, &KeyOptions::data(), 16).unwrap();
        assert_eq!(keys.require_symmetric().unwrap(), &g.symmetric);
        assert!(keys.private.is_none());

        assert!(matches!(
            principal_keys(&mut tx, &m.credential(), &group, &KeyOptions::full(), 16),
            Err(AccessError::Permission(_))
        ));

        // A known path works the same as a discovered one
        let options = KeyOptions::data().with_sym_key_path(vec![m.private.id().clone(), g.symmetric.id().clone()]);
        let keys = principal_keys(&mut tx, &m.credential(), &group, &options, 16).unwrap();
        assert_eq!(keys.require_log().unwrap(), &g.log);
    }

    #[test]
    fn test_stranger_is_refused() {
        let ledger = MemoryLedger::new();
        let mut tx = Transaction::new(&ledger);
        let alice = PrincipalId::new("alice");
        let eve = PrincipalId::new("eve");
        register_principal(&mut tx, &alice, PrincipalKind::User, "").unwrap();
        let e = register_principal(&mut tx, &eve, PrincipalKind::User, "").unwrap();

        assert!(matches!(
            principal_keys(&mut tx, &e.credential(), &alice, &KeyOptions::data(), 16),
            Err(AccessError::Permission(_))
        ));
        assert!(matches!(log_key(&mut tx, &e.credential(), &alice), Err(AccessError::Permission(_))));
    }

    #[test]
    fn test_forged_link_into_a_bundle_is_refused() {
        let ledger = MemoryLedger::new();
        let mut tx = Transaction::new(&ledger);
        let alice = register_principal(&mut tx, &PrincipalId::new("alice"), PrincipalKind::User, "").unwrap();
        let eve = register_principal(&mut tx, &PrincipalId::new("eve"), PrincipalKind::User, "").unwrap();
        let eve_cred = eve.credential();

        // Fake bytes under alice's data key ID
        let fake = Key::generate_symmetric(alice.symmetric.id().clone());
        assert!(matches!(
            authorize_link(&mut tx, &eve_cred, &alice.public, &fake),
            Err(AccessError::Permission(_))
        ));
        // A public key that is not the stored one
        let fake_public = Key::new(alice.public.id().clone(), *eve.public.to_public().unwrap().as_bytes());
        assert!(matches!(
            authorize_link(&mut tx, &eve_cred, &fake_public, &eve.symmetric),
            Err(AccessError::Permission(_))
        ));

        // Sharing her own data key with alice is fine
        authorize_link(&mut tx, &eve_cred, &alice.public, &eve.symmetric).unwrap();
    }

    #[test]
    fn test_fresh_keys_may_be_introduced_but_not_rewritten() {
        let ledger = MemoryLedger::new();
        let mut tx = Transaction::new(&ledger);
        let alice = register_principal(&mut tx, &PrincipalId::new("alice"), PrincipalKind::User, "").unwrap();
        let eve = register_principal(&mut tx, &PrincipalId::new("eve"), PrincipalKind::User, "").unwrap();
        let project = Key::generate_symmetric(KeyId::symmetric(&PrincipalId::new("project")));

        authorize_link(&mut tx, &alice.credential(), &alice.public, &project).unwrap();
        graph::add_access(&mut tx, &alice.public, &project, EdgeData::new()).unwrap();

        // The same edge with other bytes
        let other = Key::generate_symmetric(project.id().clone());
        assert!(matches!(
            authorize_link(&mut tx, &alice.credential(), &alice.public, &other),
            Err(AccessError::Permission(_))
        ));
        // Re-adding the genuine bytes is allowed
        authorize_link(&mut tx, &alice.credential(), &alice.public, &project).unwrap();

        // Once project has edges of its own, eve has to hold it to link from it
        graph::add_access(&mut tx, &project, &alice.log, EdgeData::new()).unwrap();
        let guess = Key::generate_symmetric(project.id().clone());
        assert!(matches!(
            authorize_link(&mut tx, &eve.credential(), &guess, &eve.symmetric),
            Err(AccessError::Permission(_))
        ));
    }
}
