//! Transaction boundaries, memo lifetime and the SQLite ledger.

use keyweave::perms::group;
use keyweave::store::{Ledger, MemoryLedger, SqliteLedger};
use keyweave::{
    AccessError, AccessLevel, ConsentQuery, ConsentRequest, DatatypeId, Engine, EngineConfig, EngineError,
    PrincipalId,
};

fn id(s: &str) -> PrincipalId {
    PrincipalId::new(s)
}

#[test]
fn abandoned_registration_leaves_nothing() {
    let engine = Engine::new(MemoryLedger::new(), EngineConfig::default());

    let result: keyweave::Result<()> = engine.execute(|tx| {
        group::register_user(tx, &id("alice"), "")?;
        Err(EngineError::Access(AccessError::InvalidInput("abort".to_string())))
    });
    assert!(result.is_err());

    assert!(engine.principal(&id("alice")).unwrap().is_none());
    assert!(engine.ledger().range_scan("").unwrap().is_empty());
}

#[test]
fn failed_operation_rolls_back_partial_writes() {
    let engine = Engine::new(MemoryLedger::new(), EngineConfig::default());
    let alice = engine.register_user(&id("alice"), "").unwrap();
    let before = engine.ledger().range_scan("").unwrap();

    // The first registration is fully staged when the second one fails
    let result = engine.execute(|tx| {
        group::register_group(tx, &alice, &id("clinic"), "")?;
        group::register_group(tx, &alice, &id("clinic"), "")?;
        Ok(())
    });
    assert!(matches!(result, Err(EngineError::Access(AccessError::AlreadyExists(_)))));
    assert_eq!(engine.ledger().range_scan("").unwrap(), before);
}

#[test]
fn memo_does_not_outlive_its_transaction() {
    let engine = Engine::new(MemoryLedger::new(), EngineConfig::default());
    let alice = engine.register_user(&id("alice"), "").unwrap();
    let bob = engine.register_user(&id("bob"), "").unwrap();
    let clinic = id("clinic");
    engine.register_group(&alice, &clinic, "").unwrap();

    // A cached "no" in one transaction
    assert_eq!(engine.is_admin_of(&bob.principal, &clinic).unwrap(), None);
    engine.add_admin(&alice, &clinic, &bob.principal).unwrap();
    // is not seen by the next
    assert!(engine.is_admin_of(&bob.principal, &clinic).unwrap().is_some());

    // Within one transaction, an identity mutation drops cached paths
    engine
        .execute(|tx| {
            assert!(keyweave::perms::identity::is_admin_of(tx, &bob.principal, &clinic, 8)?.is_some());
            group::remove_admin(tx, &alice, &clinic, &bob.principal, 8)?;
            assert!(keyweave::perms::identity::is_admin_of(tx, &bob.principal, &clinic, 8)?.is_none());
            Ok(())
        })
        .unwrap();
}

#[test]
fn unmemoised_engine_gives_the_same_answers() {
    let config = EngineConfig {
        memoize: false,
        ..EngineConfig::default()
    };
    let engine = Engine::new(MemoryLedger::new(), config);
    let alice = engine.register_user(&id("alice"), "").unwrap();
    let clinic = id("clinic");
    engine.register_group(&alice, &clinic, "").unwrap();

    assert_eq!(
        engine.is_admin_of(&alice.principal, &clinic).unwrap(),
        Some(vec![alice.principal.clone(), clinic])
    );
}

#[test]
fn sqlite_ledger_persists_across_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("keyweave.db");
    let health = DatatypeId::new("health");

    let (alice, clinic) = {
        let engine = Engine::new(SqliteLedger::open(&path).unwrap(), EngineConfig::default());
        let alice = engine.register_user(&id("alice"), "patient").unwrap();
        let clinic = engine.register_user(&id("clinic"), "provider").unwrap();
        engine.register_datatype(&alice, &health, None, "").unwrap();
        let request = ConsentRequest {
            datatype: health.clone(),
            owner: alice.principal.clone(),
            target: clinic.principal.clone(),
            access: AccessLevel::Read,
            expiration_date: 0,
        };
        engine.put_consent(&alice, &request, 10).unwrap();
        (alice, clinic)
    };

    let engine = Engine::new(SqliteLedger::open(&path).unwrap(), EngineConfig::default());
    assert!(engine.verify_credential(&alice).unwrap());
    let query = ConsentQuery {
        datatype: health,
        owner: alice.principal.clone(),
        target: clinic.principal.clone(),
        desired: AccessLevel::Read,
    };
    let grant = engine.validate_consent(&clinic, &query, 11).unwrap();
    assert_eq!(grant.consent.owner, alice.principal);
    assert_eq!(grant.consent.consent_date, 10);
}
