//! Declarative row filters produced by consent resolution.
//!
//! A [`FilterRule`] is handed to the query layer, which applies it to
//! stored records. It serialises to JSON for that purpose and can also be
//! evaluated in process with [`FilterRule::matches`].

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use keyweave_core::{DatatypeId, PrincipalId};

use crate::error::{AccessError, Result};

/// The attributes of a stored record a filter looks at.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordTags {
    pub datatypes: Vec<DatatypeId>,
    pub owners: Vec<PrincipalId>,
}

impl RecordTags {
    pub fn new(
        datatypes: impl IntoIterator<Item = DatatypeId>,
        owners: impl IntoIterator<Item = PrincipalId>,
    ) -> Self {
        Self {
            datatypes: datatypes.into_iter().collect(),
            owners: owners.into_iter().collect(),
        }
    }
}

/// A predicate over [`RecordTags`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum FilterRule {
    /// Every rule holds.
    And { rules: Vec<FilterRule> },
    /// The record carries at least one of these datatypes.
    DatatypesIntersect { datatypes: BTreeSet<DatatypeId> },
    /// The record lists this owner.
    OwnersContain { owner: PrincipalId },
}

impl FilterRule {
    /// `(record.datatypes ∩ scope ≠ ∅) AND (owner ∈ record.owners)`.
    pub fn for_consent(scope: impl IntoIterator<Item = DatatypeId>, owner: PrincipalId) -> Self {
        FilterRule::And {
            rules: vec![
                FilterRule::DatatypesIntersect {
                    datatypes: scope.into_iter().collect(),
                },
                FilterRule::OwnersContain { owner },
            ],
        }
    }

    /// Evaluate against a record.
    pub fn matches(&self, record: &RecordTags) -> bool {
        match self {
            FilterRule::And { rules } => rules.iter().all(|rule| rule.matches(record)),
            FilterRule::DatatypesIntersect { datatypes } => {
                record.datatypes.iter().any(|d| datatypes.contains(d))
            }
            FilterRule::OwnersContain { owner } => record.owners.contains(owner),
        }
    }

    /// JSON form for the query layer.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| AccessError::Serialization(e.to_string()))
    }

    /// Parse the JSON form.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| AccessError::Serialization(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule() -> FilterRule {
        FilterRule::for_consent(
            vec![DatatypeId::new("health"), DatatypeId::new("labs")],
            PrincipalId::new("alice"),
        )
    }

    #[test]
    fn test_matches_requires_both_clauses() {
        let rule = rule();
        let alice = PrincipalId::new("alice");
        let bob = PrincipalId::new("bob");

        assert!(rule.matches(&RecordTags::new([DatatypeId::new("labs")], [alice.clone()])));
        assert!(rule.matches(&RecordTags::new(
            [DatatypeId::new("finance"), DatatypeId::new("health")],
            [bob.clone(), alice.clone()]
        )));
        assert!(!rule.matches(&RecordTags::new([DatatypeId::new("finance")], [alice])));
        assert!(!rule.matches(&RecordTags::new([DatatypeId::new("labs")], [bob])));
        assert!(!rule.matches(&RecordTags::default()));
    }

    #[test]
    fn test_json_shape() {
        let json = rule().to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value["op"], "and");
        assert_eq!(value["rules"][0]["op"], "datatypes_intersect");
        assert_eq!(value["rules"][0]["datatypes"], serde_json::json!(["health", "labs"]));
        assert_eq!(value["rules"][1]["owner"], "alice");

        assert_eq!(FilterRule::from_json(&json).unwrap(), rule());
    }
}
