//! Per-principal audit log, encrypted under the principal's log key.
//!
//! Entries are appended under `audit/{principal}/{seq}`; `audit-head` holds
//! the last sequence number written. Anyone with a key path to the log key
//! (the principal, its admins, parent-group auditors) can read the log.

use serde::{Deserialize, Serialize};

use keyweave_core::{from_cbor, to_cbor, EncryptionNonce, Key, KeyId, PrincipalId};
use keyweave_store::Transaction;

use crate::error::{AccessError, Result};
use crate::layout;

/// One decrypted audit entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub seq: u64,
    /// Milliseconds since the Unix epoch.
    pub timestamp: u64,
    pub actor: PrincipalId,
    pub action: String,
    pub detail: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SealedEntry {
    nonce: EncryptionNonce,
    ciphertext: Vec<u8>,
}

fn check_log_key(principal: &PrincipalId, log_key: &Key) -> Result<()> {
    if log_key.id() != &KeyId::log(principal) {
        return Err(AccessError::InvalidInput(format!(
            "{} is not the log key of {}",
            log_key.id(),
            principal
        )));
    }
    Ok(())
}

/// Append an entry to `principal`'s log and return its sequence number.
pub fn append(
    tx: &mut Transaction<'_>,
    principal: &PrincipalId,
    log_key: &Key,
    actor: &PrincipalId,
    action: &str,
    detail: String,
    timestamp: u64,
) -> Result<u64> {
    check_log_key(principal, log_key)?;

    let head: Option<u64> = tx.get_value(&layout::audit_head(principal))?;
    let seq = head.map_or(0, |h| h + 1);
    let entry = AuditEntry {
        seq,
        timestamp,
        actor: actor.clone(),
        action: action.to_string(),
        detail,
    };

    let key = layout::audit_entry(principal, seq);
    let nonce = EncryptionNonce::generate();
    let ciphertext = log_key
        .to_symmetric()?
        .encrypt(&to_cbor(&entry)?, &nonce, key.as_bytes())?;

    tx.put_value(key, &SealedEntry { nonce, ciphertext })?;
    tx.put_value(layout::audit_head(principal), &seq)?;
    tracing::trace!(%principal, seq, action, "audit entry appended");
    Ok(seq)
}

/// Decrypt `principal`'s log, oldest first.
pub fn read_log(tx: &Transaction<'_>, principal: &PrincipalId, log_key: &Key) -> Result<Vec<AuditEntry>> {
    check_log_key(principal, log_key)?;
    let cipher = log_key.to_symmetric()?;

    let mut entries = Vec::new();
    for (key, bytes) in tx.range_scan(&layout::audit_entries(principal))? {
        let sealed: SealedEntry = from_cbor(&bytes)?;
        let plaintext = cipher.decrypt(&sealed.ciphertext, &sealed.nonce, key.as_bytes())?;
        entries.push(from_cbor(&plaintext)?);
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundle::{register_principal, PrincipalKind};
    use keyweave_store::MemoryLedger;

    #[test]
    fn test_append_and_read_in_order() {
        let ledger = MemoryLedger::new();
        let mut tx = Transaction::new(&ledger);
        let alice = PrincipalId::new("alice");
        let bundle = register_principal(&mut tx, &alice, PrincipalKind::User, "").unwrap();

        for (i, action) in ["grant", "deny", "grant"].iter().enumerate() {
            let seq = append(&mut tx, &alice, &bundle.log, &alice, action, format!("step {}", i), 100 + i as u64).unwrap();
            assert_eq!(seq, i as u64);
        }

        let entries = read_log(&tx, &alice, &bundle.log).unwrap();
        let actions: Vec<_> = entries.iter().map(|e| e.action.as_str()).collect();
        assert_eq!(actions, vec!["grant", "deny", "grant"]);
        assert_eq!(entries[2].timestamp, 102);
    }

    #[test]
    fn test_wrong_key_is_rejected() {
        let ledger = MemoryLedger::new();
        let mut tx = Transaction::new(&ledger);
        let alice = PrincipalId::new("alice");
        let a = register_principal(&mut tx, &alice, PrincipalKind::User, "").unwrap();
        append(&mut tx, &alice, &a.log, &alice, "grant", String::new(), 1).unwrap();

        assert!(matches!(
            read_log(&tx, &alice, &a.symmetric),
            Err(AccessError::InvalidInput(_))
        ));

        // Right ID, wrong bytes
        let forged = Key::generate_symmetric(KeyId::log(&alice));
        assert!(matches!(read_log(&tx, &alice, &forged), Err(AccessError::Crypto(_))));
    }

    #[test]
    fn test_logs_are_per_principal() {
        let ledger = MemoryLedger::new();
        let mut tx = Transaction::new(&ledger);
        let alice = PrincipalId::new("alice");
        let bob = PrincipalId::new("bob");
        let a = register_principal(&mut tx, &alice, PrincipalKind::User, "").unwrap();
        let b = register_principal(&mut tx, &bob, PrincipalKind::User, "").unwrap();

        append(&mut tx, &alice, &a.log, &alice, "grant", String::new(), 1).unwrap();
        assert!(read_log(&tx, &bob, &b.log).unwrap().is_empty());
        assert_eq!(read_log(&tx, &alice, &a.log).unwrap().len(), 1);
    }
}
