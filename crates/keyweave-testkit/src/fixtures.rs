//! Test fixtures and helpers.
//!
//! Common setup code for integration tests.

use keyweave::{
    AccessLevel, Consent, ConsentQuery, ConsentRequest, Credential, DatatypeId, Engine, EngineConfig, PrincipalId,
};
use keyweave_store::MemoryLedger;

/// Consent timestamps used by fixtures unless a test passes its own.
pub const FIXTURE_NOW: u64 = 1_700_000_000;

/// An engine over an in-memory ledger.
pub struct TestFixture {
    pub engine: Engine<MemoryLedger>,
}

impl TestFixture {
    /// Create a fixture with the default configuration.
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    /// Create a fixture with a custom configuration.
    pub fn with_config(config: EngineConfig) -> Self {
        Self {
            engine: Engine::new(MemoryLedger::new(), config),
        }
    }

    /// Register a user.
    pub fn user(&self, name: &str) -> Credential {
        self.engine
            .register_user(&PrincipalId::new(name), "user")
            .unwrap_or_else(|e| panic!("register user {}: {}", name, e))
    }

    /// Register a group created by `creator`.
    pub fn group(&self, creator: &Credential, name: &str) -> PrincipalId {
        let id = PrincipalId::new(name);
        self.engine
            .register_group(creator, &id, "group")
            .unwrap_or_else(|e| panic!("register group {}: {}", name, e));
        id
    }

    /// Register datatypes in order; each parent must come before its
    /// children.
    pub fn datatypes(&self, caller: &Credential, nodes: &[(&str, Option<&str>)]) {
        for (id, parent) in nodes {
            let parent = parent.map(DatatypeId::new);
            self.engine
                .register_datatype(caller, &DatatypeId::new(*id), parent.as_ref(), "")
                .unwrap_or_else(|e| panic!("register datatype {}: {}", id, e));
        }
    }

    /// The usual small tree:
    ///
    /// ```text
    /// root
    /// ├── health
    /// │   ├── labs
    /// │   └── imaging
    /// └── finance
    /// ```
    pub fn health_tree(&self, caller: &Credential) {
        self.datatypes(
            caller,
            &[
                ("root", None),
                ("health", Some("root")),
                ("labs", Some("health")),
                ("imaging", Some("health")),
                ("finance", Some("root")),
            ],
        );
    }

    /// Write a consent from `owner` to `target`, with no expiration.
    pub fn consent(&self, owner: &Credential, target: &PrincipalId, datatype: &str, access: AccessLevel) -> Consent {
        let request = ConsentRequest {
            datatype: DatatypeId::new(datatype),
            owner: owner.principal.clone(),
            target: target.clone(),
            access,
            expiration_date: 0,
        };
        self.engine
            .put_consent(owner, &request, FIXTURE_NOW)
            .unwrap_or_else(|e| panic!("put consent on {}: {}", datatype, e))
    }
}

impl Default for TestFixture {
    fn default() -> Self {
        Self::new()
    }
}

/// A read or write query for `target` on `owner`'s data.
pub fn query(owner: &PrincipalId, target: &PrincipalId, datatype: &str, desired: AccessLevel) -> ConsentQuery {
    ConsentQuery {
        datatype: DatatypeId::new(datatype),
        owner: owner.clone(),
        target: target.clone(),
        desired,
    }
}

/// A fixture with `count` users named `party-0`, `party-1`, ...
pub fn multi_party_fixture(count: usize) -> (TestFixture, Vec<Credential>) {
    let fixture = TestFixture::new();
    let parties = (0..count).map(|i| fixture.user(&format!("party-{}", i))).collect();
    (fixture, parties)
}

#[cfg(test)]
mod tests {
    use super::*;
    use keyweave::DenialReason;

    #[test]
    fn test_fixture_tree() {
        let fixture = TestFixture::new();
        let alice = fixture.user("alice");
        fixture.health_tree(&alice);

        let root = DatatypeId::new("root");
        assert_eq!(fixture.engine.datatype_root().unwrap(), Some(root.clone()));
        assert_eq!(fixture.engine.datatype_descendants(&root).unwrap().len(), 4);
        assert_eq!(
            fixture.engine.datatype_ancestors(&DatatypeId::new("labs")).unwrap(),
            vec![DatatypeId::new("health"), root]
        );
    }

    #[test]
    fn test_fixture_consent() {
        let (fixture, parties) = multi_party_fixture(2);
        let (owner, target) = (&parties[0], &parties[1]);
        fixture.health_tree(owner);
        fixture.consent(owner, &target.principal, "health", AccessLevel::Read);

        let q = query(&owner.principal, &target.principal, "labs", AccessLevel::Read);
        assert!(fixture.engine.validate_consent(target, &q, FIXTURE_NOW).is_ok());

        let q = query(&owner.principal, &target.principal, "finance", AccessLevel::Read);
        let err = fixture.engine.validate_consent(target, &q, FIXTURE_NOW).unwrap_err();
        assert_eq!(err.denial_reason(), Some(DenialReason::NoConsent));
    }

    #[test]
    fn test_multi_party() {
        let (_fixture, parties) = multi_party_fixture(3);

        // Each party has its own key
        assert_ne!(parties[0].private_key, parties[1].private_key);
        assert_ne!(parties[1].private_key, parties[2].private_key);
        assert_ne!(parties[0].private_key, parties[2].private_key);
    }
}
