//! Ledger key layout.
//!
//! Every record the engine writes lives under one of these keys. Components
//! are escaped by [`ledger_key`], so identifiers may contain `/`.

use keyweave_core::{ledger_key, ledger_prefix, ConsentId, DatatypeId, KeyId, PrincipalId};

use crate::identity::IdentityLabel;

pub(crate) fn principal(id: &PrincipalId) -> String {
    ledger_key(&["principal", id.as_str()])
}

pub(crate) fn public_key(id: &PrincipalId) -> String {
    ledger_key(&["pubkey", id.as_str()])
}

pub(crate) fn edge(from: &KeyId, to: &KeyId) -> String {
    ledger_key(&["edge", &from.to_string(), &to.to_string()])
}

pub(crate) fn edges_from(from: &KeyId) -> String {
    ledger_prefix(&["edge", &from.to_string()])
}

pub(crate) fn ident_down(parent: &PrincipalId, label: IdentityLabel, child: &PrincipalId) -> String {
    ledger_key(&["ident", "down", parent.as_str(), label.as_str(), child.as_str()])
}

pub(crate) fn ident_down_prefix(parent: &PrincipalId, label: IdentityLabel) -> String {
    ledger_prefix(&["ident", "down", parent.as_str(), label.as_str()])
}

pub(crate) fn ident_up(child: &PrincipalId, label: IdentityLabel, parent: &PrincipalId) -> String {
    ledger_key(&["ident", "up", child.as_str(), label.as_str(), parent.as_str()])
}

pub(crate) fn ident_up_prefix(child: &PrincipalId, label: IdentityLabel) -> String {
    ledger_prefix(&["ident", "up", child.as_str(), label.as_str()])
}

pub(crate) fn datatype(id: &DatatypeId) -> String {
    ledger_key(&["datatype", id.as_str()])
}

pub(crate) fn datatype_root() -> String {
    ledger_key(&["datatype-root"])
}

pub(crate) fn datatype_child(parent: &DatatypeId, child: &DatatypeId) -> String {
    ledger_key(&["datatype-child", parent.as_str(), child.as_str()])
}

pub(crate) fn datatype_children(parent: &DatatypeId) -> String {
    ledger_prefix(&["datatype-child", parent.as_str()])
}

pub(crate) fn consent(id: &ConsentId) -> String {
    ledger_key(&["consent", id.as_str()])
}

pub(crate) fn consent_by_owner(owner: &PrincipalId, id: &ConsentId) -> String {
    ledger_key(&["consent-owner", owner.as_str(), id.as_str()])
}

pub(crate) fn consents_by_owner(owner: &PrincipalId) -> String {
    ledger_prefix(&["consent-owner", owner.as_str()])
}

pub(crate) fn consent_by_target(target: &PrincipalId, id: &ConsentId) -> String {
    ledger_key(&["consent-target", target.as_str(), id.as_str()])
}

pub(crate) fn consents_by_target(target: &PrincipalId) -> String {
    ledger_prefix(&["consent-target", target.as_str()])
}

pub(crate) fn audit_entry(principal: &PrincipalId, seq: u64) -> String {
    ledger_key(&["audit", principal.as_str(), &format!("{:020}", seq)])
}

pub(crate) fn audit_entries(principal: &PrincipalId) -> String {
    ledger_prefix(&["audit", principal.as_str()])
}

pub(crate) fn audit_head(principal: &PrincipalId) -> String {
    ledger_key(&["audit-head", principal.as_str()])
}
