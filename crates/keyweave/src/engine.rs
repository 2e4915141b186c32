//! The Engine: unified API for Keyweave.
//!
//! The Engine puts the ledger, the key graph, the identity graph and consent
//! resolution behind one interface. Every operation runs in its own
//! transaction: the caller's credential is checked, permission checks run
//! before any graph mutation, and the staged writes commit together or not
//! at all.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use keyweave_core::{ConsentId, DatatypeId, Key, KeyBytes, KeyId, PrincipalId};
use keyweave_perms::{
    audit, bundle, consent, datatype, graph, group, identity, keyring, AccessError, AuditEntry, Consent,
    ConsentGrant, ConsentQuery, ConsentRequest, Credential, Datatype, EdgeData, EdgeInfo, KeyOptions, Principal,
    PrincipalKeys,
};
use keyweave_store::{Ledger, Memo, Transaction};

use crate::error::{EngineError, Result};
use crate::observer::{AccessEvent, AccessObserver, TracingObserver};

/// Configuration for the Engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Check every credential against the stored public key.
    pub verify_credentials: bool,
    /// Memoise admin-path and consent lookups within a transaction.
    pub memoize: bool,
    /// Longest group or datatype chain a walk will follow.
    pub max_tree_depth: usize,
    /// Append an audit entry for every mutation.
    pub audit: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            verify_credentials: true,
            memoize: true,
            max_tree_depth: 64,
            audit: true,
        }
    }
}

/// The main Engine struct.
///
/// Provides a unified API for:
/// - Registering users and groups
/// - Managing membership, admins and subgroups
/// - Adding, revoking and walking key-graph edges
/// - Managing the datatype tree
/// - Writing and validating consents
/// - Reading audit logs
pub struct Engine<L: Ledger> {
    /// The storage backend.
    ledger: Arc<L>,
    /// Configuration.
    config: EngineConfig,
    /// Receives access decisions and mutations.
    observer: Arc<dyn AccessObserver>,
}

impl<L: Ledger> Engine<L> {
    /// Create a new engine over a ledger.
    pub fn new(ledger: L, config: EngineConfig) -> Self {
        Self {
            ledger: Arc::new(ledger),
            config,
            observer: Arc::new(TracingObserver),
        }
    }

    /// Replace the observer.
    pub fn with_observer(mut self, observer: Arc<dyn AccessObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Get the ledger reference.
    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    /// Get the configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Transactions
    // ─────────────────────────────────────────────────────────────────────────

    /// Begin a transaction with this engine's memo settings.
    pub fn begin(&self) -> Transaction<'_> {
        Transaction::with_memo(&*self.ledger, Memo::new(self.config.memoize))
    }

    /// Run `f` in a fresh transaction. Commits on `Ok`, discards on `Err`.
    pub fn execute<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Transaction<'_>) -> Result<T>,
    {
        let mut tx = self.begin();
        match f(&mut tx) {
            Ok(value) => {
                tx.commit()?;
                Ok(value)
            }
            Err(err) => {
                let discarded = tx.rollback();
                tracing::debug!(discarded, error = %err, "transaction discarded");
                Err(err)
            }
        }
    }

    fn authenticate(&self, tx: &Transaction<'_>, caller: &Credential) -> Result<()> {
        if !self.config.verify_credentials {
            return Ok(());
        }
        match bundle::verify_credential(tx, caller) {
            Ok(true) => Ok(()),
            Ok(false) => Err(EngineError::InvalidCredential(caller.principal.clone())),
            Err(err) if err.is_absence() => Err(EngineError::InvalidCredential(caller.principal.clone())),
            Err(err) => Err(err.into()),
        }
    }

    /// Append to `subject`'s audit log through the caller's key path.
    fn record(
        &self,
        tx: &mut Transaction<'_>,
        caller: &Credential,
        subject: &PrincipalId,
        action: &str,
        detail: String,
    ) -> Result<()> {
        self.record_with(tx, caller, subject, None, action, detail)
    }

    /// Recover `subject`'s log key ahead of a mutation that may cut the
    /// caller's own path to it. A failure here is retried, and reported,
    /// when the entry is written.
    fn prefetch_log_key(&self, tx: &mut Transaction<'_>, caller: &Credential, subject: &PrincipalId) -> Option<Key> {
        if !self.config.audit {
            return None;
        }
        keyring::log_key(tx, caller, subject).ok()
    }

    fn record_with(
        &self,
        tx: &mut Transaction<'_>,
        caller: &Credential,
        subject: &PrincipalId,
        log_key: Option<Key>,
        action: &str,
        detail: String,
    ) -> Result<()> {
        if !self.config.audit {
            return Ok(());
        }
        let log_key = match log_key {
            Some(key) => key,
            None => keyring::log_key(tx, caller, subject)?,
        };
        audit::append(tx, subject, &log_key, &caller.principal, action, detail, now_millis())?;
        Ok(())
    }

    fn report<T>(&self, caller: &PrincipalId, operation: &'static str, subject: &str, result: &Result<T>) {
        match result {
            Ok(_) => self.observer.on_event(&AccessEvent::Committed {
                caller: caller.clone(),
                operation,
                subject: subject.to_string(),
            }),
            Err(err) if err.is_denial() => self.observer.on_event(&AccessEvent::Refused {
                caller: caller.clone(),
                operation,
                reason: err.to_string(),
            }),
            Err(_) => {}
        }
    }

    /// Authenticate, run a mutation, commit and report it.
    fn mutate<T, F>(&self, caller: &Credential, operation: &'static str, subject: &str, f: F) -> Result<T>
    where
        F: FnOnce(&mut Transaction<'_>) -> Result<T>,
    {
        let result = self.execute(|tx| {
            self.authenticate(tx, caller)?;
            f(tx)
        });
        self.report(&caller.principal, operation, subject, &result);
        result
    }

    /// Authenticate and run a read. Memoised results die with the
    /// transaction; nothing is written.
    fn read<T, F>(&self, caller: &Credential, operation: &'static str, f: F) -> Result<T>
    where
        F: FnOnce(&mut Transaction<'_>) -> Result<T>,
    {
        let mut tx = self.begin();
        let result = self.authenticate(&tx, caller).and_then(|_| f(&mut tx));
        tx.rollback();
        if let Err(err) = &result {
            if err.is_denial() {
                self.observer.on_event(&AccessEvent::Refused {
                    caller: caller.principal.clone(),
                    operation,
                    reason: err.to_string(),
                });
            }
        }
        result
    }

    /// Run an unauthenticated read.
    fn inspect<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Transaction<'_>) -> std::result::Result<T, AccessError>,
    {
        let mut tx = self.begin();
        let result = f(&mut tx);
        tx.rollback();
        Ok(result?)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Principal Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Register a user.
    ///
    /// The returned credential holds the only copy of the private key.
    pub fn register_user(&self, id: &PrincipalId, role: &str) -> Result<Credential> {
        let result = self.execute(|tx| {
            let credential = group::register_user(tx, id, role)?;
            self.record(tx, &credential, id, "register_user", format!("role={}", role))?;
            Ok(credential)
        });
        self.report(id, "register_user", id.as_str(), &result);
        result
    }

    /// Register a group with `creator` as its first member and admin.
    pub fn register_group(&self, creator: &Credential, id: &PrincipalId, role: &str) -> Result<Principal> {
        self.mutate(creator, "register_group", id.as_str(), |tx| {
            let principal = group::register_group(tx, creator, id, role)?;
            self.record(tx, creator, id, "register_group", format!("role={}", role))?;
            Ok(principal)
        })
    }

    /// Look up a principal record.
    pub fn principal(&self, id: &PrincipalId) -> Result<Option<Principal>> {
        self.inspect(|tx| bundle::get_principal(tx, id))
    }

    /// True when the credential matches its principal's stored public key.
    pub fn verify_credential(&self, credential: &Credential) -> Result<bool> {
        self.inspect(|tx| match bundle::verify_credential(tx, credential) {
            Err(err) if err.is_absence() => Ok(false),
            other => other,
        })
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Identity Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Make `user` a member of `group`. The caller must administer `group`.
    pub fn add_member(&self, caller: &Credential, group_id: &PrincipalId, user: &PrincipalId) -> Result<()> {
        self.mutate(caller, "add_member", group_id.as_str(), |tx| {
            group::add_member(tx, caller, group_id, user, self.config.max_tree_depth)?;
            self.record(tx, caller, group_id, "add_member", user.to_string())
        })
    }

    /// Make `user` an admin of `group`, adding membership if missing.
    pub fn add_admin(&self, caller: &Credential, group_id: &PrincipalId, user: &PrincipalId) -> Result<()> {
        self.mutate(caller, "add_admin", group_id.as_str(), |tx| {
            group::add_admin(tx, caller, group_id, user, self.config.max_tree_depth)?;
            self.record(tx, caller, group_id, "add_admin", user.to_string())
        })
    }

    /// Remove `user` from `group`, demoting it first if needed.
    pub fn remove_member(&self, caller: &Credential, group_id: &PrincipalId, user: &PrincipalId) -> Result<()> {
        self.mutate(caller, "remove_member", group_id.as_str(), |tx| {
            let log_key = self.prefetch_log_key(tx, caller, group_id);
            group::remove_member(tx, caller, group_id, user, self.config.max_tree_depth)?;
            self.record_with(tx, caller, group_id, log_key, "remove_member", user.to_string())
        })
    }

    /// Demote `user`; membership is kept.
    pub fn remove_admin(&self, caller: &Credential, group_id: &PrincipalId, user: &PrincipalId) -> Result<()> {
        self.mutate(caller, "remove_admin", group_id.as_str(), |tx| {
            let log_key = self.prefetch_log_key(tx, caller, group_id);
            group::remove_admin(tx, caller, group_id, user, self.config.max_tree_depth)?;
            self.record_with(tx, caller, group_id, log_key, "remove_admin", user.to_string())
        })
    }

    /// Attach `child` under `parent`. The caller must administer both.
    pub fn register_subgroup(&self, caller: &Credential, parent: &PrincipalId, child: &PrincipalId) -> Result<()> {
        self.mutate(caller, "register_subgroup", child.as_str(), |tx| {
            group::register_subgroup(tx, caller, parent, child, self.config.max_tree_depth)?;
            self.record(tx, caller, parent, "register_subgroup", format!("child={}", child))?;
            self.record(tx, caller, child, "register_subgroup", format!("parent={}", parent))
        })
    }

    /// The admin path `[user, hit, ..., group]`, if `user` administers
    /// `group` directly or through an ancestor.
    pub fn is_admin_of(&self, user: &PrincipalId, group_id: &PrincipalId) -> Result<Option<Vec<PrincipalId>>> {
        self.inspect(|tx| identity::is_admin_of(tx, user, group_id, self.config.max_tree_depth))
    }

    /// True when `user` is `group`, a member, or a member or admin of an
    /// ancestor.
    pub fn is_member_of(&self, user: &PrincipalId, group_id: &PrincipalId) -> Result<bool> {
        self.inspect(|tx| identity::is_member_of(tx, user, group_id, self.config.max_tree_depth))
    }

    /// Direct members of a group.
    pub fn members(&self, group_id: &PrincipalId) -> Result<Vec<PrincipalId>> {
        self.inspect(|tx| identity::members(tx, group_id))
    }

    /// Direct admins of a group.
    pub fn admins(&self, group_id: &PrincipalId) -> Result<Vec<PrincipalId>> {
        self.inspect(|tx| identity::admins(tx, group_id))
    }

    /// Direct subgroups of a group.
    pub fn subgroups(&self, group_id: &PrincipalId) -> Result<Vec<PrincipalId>> {
        self.inspect(|tx| identity::subgroups(tx, group_id))
    }

    /// The parent group, if any.
    pub fn parent(&self, group_id: &PrincipalId) -> Result<Option<PrincipalId>> {
        self.inspect(|tx| identity::parent(tx, group_id))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Key Graph Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Wrap `to` under `from` and store the edge, replacing any existing one.
    ///
    /// Holding both keys' bytes is the authority to link them: established
    /// keys must be ones the caller can recover (or, for public keys, the
    /// stored ones), and an existing edge is never rewritten with other bytes.
    pub fn add_access(&self, caller: &Credential, from: &Key, to: &Key, data: EdgeData) -> Result<()> {
        let subject = format!("{} -> {}", from.id(), to.id());
        self.mutate(caller, "add_access", &subject, |tx| {
            keyring::authorize_link(tx, caller, from, to)?;
            graph::add_access(tx, from, to, data)?;
            self.record(tx, caller, &caller.principal, "add_access", subject.clone())
        })
    }

    /// Delete exactly the edge `from -> to`. The caller must hold `from`.
    ///
    /// The four bundle edges of a principal are never revoked this way.
    pub fn revoke_access(&self, caller: &Credential, from: &KeyId, to: &KeyId) -> Result<()> {
        let subject = format!("{} -> {}", from, to);
        self.mutate(caller, "revoke_access", &subject, |tx| {
            if bundle::is_invariant_edge(from, to) {
                return Err(AccessError::Permission(format!("{} -> {} is a bundle edge", from.holder(), to)).into());
            }
            let holder = from.holder();
            if &holder != caller.key().id() {
                keyring::recover_key(tx, caller, &holder)?;
            }
            graph::revoke_access(tx, from, to)?;
            self.record(tx, caller, &caller.principal, "revoke_access", subject.clone())
        })
    }

    /// Decrypt along `path` starting from `start`, the bytes of `path[0]`.
    pub fn get_key(&self, path: &[KeyId], start: &KeyBytes) -> Result<KeyBytes> {
        self.inspect(|tx| graph::get_key(tx, path, start))
    }

    /// True when every adjacent edge of `path` exists.
    pub fn verify_access_path(&self, path: &[KeyId]) -> Result<bool> {
        self.inspect(|tx| graph::verify_access_path(tx, path))
    }

    /// Shortest key path from `from` to `to`.
    pub fn slow_find_path(&self, from: &KeyId, to: &KeyId) -> Result<Option<Vec<KeyId>>> {
        self.inspect(|tx| graph::slow_find_path(tx, from, to))
    }

    /// Metadata of the edge `from -> to`.
    pub fn edge(&self, from: &KeyId, to: &KeyId) -> Result<Option<EdgeInfo>> {
        self.inspect(|tx| graph::edge(tx, from, to))
    }

    /// Metadata of every edge leaving `from`.
    pub fn outgoing(&self, from: &KeyId) -> Result<Vec<EdgeInfo>> {
        self.inspect(|tx| graph::outgoing(tx, from))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Key Recovery
    // ─────────────────────────────────────────────────────────────────────────

    /// Recover `subject`'s keys for the caller.
    pub fn principal_keys(
        &self,
        caller: &Credential,
        subject: &PrincipalId,
        options: &KeyOptions,
    ) -> Result<PrincipalKeys> {
        self.read(caller, "principal_keys", |tx| {
            Ok(keyring::principal_keys(tx, caller, subject, options, self.config.max_tree_depth)?)
        })
    }

    /// Recover any key the caller has a path to.
    pub fn recover_key(&self, caller: &Credential, target: &KeyId) -> Result<Key> {
        self.read(caller, "recover_key", |tx| Ok(keyring::recover_key(tx, caller, target)?))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Datatype Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Add a datatype under `parent`, or as the root.
    pub fn register_datatype(
        &self,
        caller: &Credential,
        id: &DatatypeId,
        parent: Option<&DatatypeId>,
        description: &str,
    ) -> Result<Datatype> {
        self.mutate(caller, "register_datatype", id.as_str(), |tx| {
            let node = datatype::register_datatype(tx, id, parent, description)?;
            self.record(tx, caller, &caller.principal, "register_datatype", id.to_string())?;
            Ok(node)
        })
    }

    /// Mark a datatype inactive.
    pub fn deactivate_datatype(&self, caller: &Credential, id: &DatatypeId) -> Result<Datatype> {
        self.mutate(caller, "deactivate_datatype", id.as_str(), |tx| {
            let node = datatype::deactivate_datatype(tx, id)?;
            self.record(tx, caller, &caller.principal, "deactivate_datatype", id.to_string())?;
            Ok(node)
        })
    }

    /// Look up a datatype.
    pub fn datatype(&self, id: &DatatypeId) -> Result<Option<Datatype>> {
        self.inspect(|tx| datatype::get_datatype(tx, id))
    }

    /// The root of the datatype tree.
    pub fn datatype_root(&self) -> Result<Option<DatatypeId>> {
        self.inspect(|tx| datatype::root(tx))
    }

    /// Direct children of a datatype.
    pub fn datatype_children(&self, id: &DatatypeId) -> Result<Vec<DatatypeId>> {
        self.inspect(|tx| datatype::children(tx, id))
    }

    /// Every descendant of a datatype, breadth first.
    pub fn datatype_descendants(&self, id: &DatatypeId) -> Result<Vec<DatatypeId>> {
        self.inspect(|tx| datatype::descendants(tx, id, self.config.max_tree_depth))
    }

    /// Ancestors of a datatype, nearest first.
    pub fn datatype_ancestors(&self, id: &DatatypeId) -> Result<Vec<DatatypeId>> {
        self.inspect(|tx| datatype::ancestors(tx, id, self.config.max_tree_depth))
    }

    /// Materialise `owner`'s key for `datatype` and the edges down to it.
    ///
    /// The caller must be able to recover `owner`'s data key.
    pub fn add_datatype_sym_key(&self, caller: &Credential, id: &DatatypeId, owner: &PrincipalId) -> Result<Key> {
        self.mutate(caller, "add_datatype_sym_key", id.as_str(), |tx| {
            let depth = self.config.max_tree_depth;
            let keys = keyring::principal_keys(tx, caller, owner, &KeyOptions::data(), depth)?;
            let key = datatype::add_datatype_sym_key(tx, id, owner, keys.require_symmetric()?, depth)?;
            self.record(tx, caller, owner, "add_datatype_sym_key", id.to_string())?;
            Ok(key)
        })
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Consent Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Create or update a consent. The caller must be the owner or an admin
    /// of the owner.
    pub fn put_consent(&self, caller: &Credential, request: &ConsentRequest, now: u64) -> Result<Consent> {
        self.mutate(caller, "put_consent", request.owner.as_str(), |tx| {
            let written = consent::put_consent(tx, caller, request, now, self.config.max_tree_depth)?;
            let detail = format!(
                "{} {} on {} for {}",
                written.id,
                written.access.as_str(),
                written.datatype,
                written.target
            );
            self.record(tx, caller, &request.owner, "put_consent", detail)?;
            Ok(written)
        })
    }

    /// Look up a consent.
    pub fn consent(&self, id: &ConsentId) -> Result<Option<Consent>> {
        self.inspect(|tx| consent::get_consent(tx, id))
    }

    /// Every consent an owner has written.
    pub fn consents_for_owner(&self, owner: &PrincipalId) -> Result<Vec<Consent>> {
        self.inspect(|tx| consent::consents_for_owner(tx, owner))
    }

    /// Every consent naming a target.
    pub fn consents_for_target(&self, target: &PrincipalId) -> Result<Vec<Consent>> {
        self.inspect(|tx| consent::consents_for_target(tx, target))
    }

    /// The most specific consent for the triple, if any.
    pub fn resolve_consent_id(
        &self,
        owner: &PrincipalId,
        target: &PrincipalId,
        id: &DatatypeId,
    ) -> Result<Option<ConsentId>> {
        self.inspect(|tx| consent::resolve_consent_id(tx, owner, target, id, self.config.max_tree_depth))
    }

    /// Decide a [`ConsentQuery`] as of `now`. A refusal is
    /// `AccessError::ConsentDenied` with its reason.
    pub fn validate_consent(&self, caller: &Credential, query: &ConsentQuery, now: u64) -> Result<ConsentGrant> {
        let result = self.read(caller, "validate_consent", |tx| {
            Ok(consent::validate_consent(tx, caller, query, now, self.config.max_tree_depth)?)
        });

        match &result {
            Ok(grant) => self.observer.on_event(&AccessEvent::ConsentGranted {
                caller: caller.principal.clone(),
                datatype: query.datatype.clone(),
                owner: query.owner.clone(),
                target: query.target.clone(),
                consent: grant.consent.id.clone(),
            }),
            Err(err) => {
                if let Some(reason) = err.denial_reason() {
                    self.observer.on_event(&AccessEvent::ConsentDenied {
                        caller: caller.principal.clone(),
                        datatype: query.datatype.clone(),
                        owner: query.owner.clone(),
                        target: query.target.clone(),
                        reason,
                    });
                }
            }
        }
        result
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Audit Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Decrypt `principal`'s audit log. The caller needs a key path to its
    /// log key.
    pub fn read_audit_log(&self, caller: &Credential, principal: &PrincipalId) -> Result<Vec<AuditEntry>> {
        self.read(caller, "read_audit_log", |tx| {
            let log_key = keyring::log_key(tx, caller, principal)?;
            Ok(audit::read_log(tx, principal, &log_key)?)
        })
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
