//! Proptest generators for property-based testing.

use proptest::prelude::*;

use keyweave::{AccessLevel, Credential, DatatypeId, PrincipalId};

use crate::fixtures::TestFixture;

/// Generate a principal ID.
pub fn principal_id() -> impl Strategy<Value = PrincipalId> {
    "[a-z][a-z0-9_-]{0,15}".prop_map(PrincipalId::new)
}

/// Generate an opaque principal ID from random bytes.
pub fn opaque_principal_id() -> impl Strategy<Value = PrincipalId> {
    any::<[u8; 8]>().prop_map(|bytes| PrincipalId::new(hex::encode(bytes)))
}

/// Generate a datatype ID.
pub fn datatype_id() -> impl Strategy<Value = DatatypeId> {
    "[a-z][a-z0-9.]{0,15}".prop_map(DatatypeId::new)
}

/// Generate any access level.
pub fn access_level() -> impl Strategy<Value = AccessLevel> {
    prop_oneof![Just(AccessLevel::Read), Just(AccessLevel::Write), Just(AccessLevel::Deny)]
}

/// Generate a level a validation may ask for.
pub fn desired_level() -> impl Strategy<Value = AccessLevel> {
    prop_oneof![Just(AccessLevel::Read), Just(AccessLevel::Write)]
}

/// A random single-rooted datatype tree.
///
/// Node `0` is the root; every other node's parent has a smaller index, so
/// registering in index order always finds the parent in place.
#[derive(Debug, Clone)]
pub struct DatatypeTree {
    parents: Vec<Option<usize>>,
}

impl DatatypeTree {
    /// Strategy for trees of `1..=max_nodes` nodes.
    pub fn strategy(max_nodes: usize) -> BoxedStrategy<Self> {
        prop::collection::vec(any::<prop::sample::Index>(), 0..max_nodes.max(1))
            .prop_map(|picks| {
                let mut parents = vec![None];
                for (i, pick) in picks.iter().enumerate() {
                    parents.push(Some(pick.index(i + 1)));
                }
                DatatypeTree { parents }
            })
            .boxed()
    }

    /// Number of nodes.
    pub fn len(&self) -> usize {
        self.parents.len()
    }

    /// Always false; a tree has at least its root.
    pub fn is_empty(&self) -> bool {
        self.parents.is_empty()
    }

    /// ID of node `i`.
    pub fn id(&self, i: usize) -> DatatypeId {
        DatatypeId::new(format!("dt{}", i))
    }

    /// Parent index of node `i`.
    pub fn parent(&self, i: usize) -> Option<usize> {
        self.parents[i]
    }

    /// `i` followed by its ancestors up to the root.
    pub fn lineage(&self, i: usize) -> Vec<usize> {
        let mut chain = vec![i];
        let mut current = i;
        while let Some(parent) = self.parents[current] {
            chain.push(parent);
            current = parent;
        }
        chain
    }

    /// Register every node through `fixture`'s engine.
    pub fn register(&self, fixture: &TestFixture, caller: &Credential) {
        for i in 0..self.len() {
            let parent = self.parent(i).map(|p| self.id(p));
            fixture
                .engine
                .register_datatype(caller, &self.id(i), parent.as_ref(), "")
                .unwrap_or_else(|e| panic!("register dt{}: {}", i, e));
        }
    }
}

impl Arbitrary for DatatypeTree {
    type Parameters = ();
    type Strategy = BoxedStrategy<Self>;

    fn arbitrary_with(_: Self::Parameters) -> Self::Strategy {
        DatatypeTree::strategy(12)
    }
}

/// A tree plus consents on some of its nodes and a node to query.
#[derive(Debug, Clone)]
pub struct ConsentScenario {
    pub tree: DatatypeTree,
    /// `(node, level)` pairs; later entries for the same node overwrite.
    pub consents: Vec<(usize, AccessLevel)>,
    pub query_node: usize,
    pub desired: AccessLevel,
}

impl ConsentScenario {
    /// The node whose consent should decide the query: the nearest
    /// consented node on the query node's lineage.
    pub fn expected_node(&self) -> Option<usize> {
        self.tree
            .lineage(self.query_node)
            .into_iter()
            .find(|node| self.consents.iter().any(|(n, _)| n == node))
    }

    /// The effective level at `node` after every overwrite.
    pub fn level_at(&self, node: usize) -> Option<AccessLevel> {
        self.consents
            .iter()
            .rev()
            .find(|(n, _)| *n == node)
            .map(|(_, level)| *level)
    }
}

impl Arbitrary for ConsentScenario {
    type Parameters = ();
    type Strategy = BoxedStrategy<Self>;

    fn arbitrary_with(_: Self::Parameters) -> Self::Strategy {
        any::<DatatypeTree>()
            .prop_flat_map(|tree| {
                let n = tree.len();
                (
                    Just(tree),
                    prop::collection::vec((0..n, access_level()), 0..6),
                    0..n,
                    desired_level(),
                )
            })
            .prop_map(|(tree, consents, query_node, desired)| ConsentScenario {
                tree,
                consents,
                query_node,
                desired,
            })
            .boxed()
    }
}
