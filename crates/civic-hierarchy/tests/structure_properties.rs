//! Property tests over generated forests mixing all three hierarchy kinds.

use std::collections::BTreeSet;

use civic_core::{DenialReason, HierarchyKind, NodeClass, NodeCode, NodeId, SectorType, Tier};
use civic_hierarchy::{can_deactivate, HierarchyStore, NewNode};
use proptest::prelude::*;
use proptest::sample::Index;

/// Pick the class and parent of the next node. A step starts a geographic
/// or expatriate region, anchors a sector root under a geographic or
/// expatriate node, or attaches a child under a non-leaf node. Steps with
/// nowhere to go start a geographic region.
fn plan(
    store: &HierarchyStore,
    ids: &[NodeId],
    shape: u8,
    at: &Index,
) -> (NodeClass, Option<NodeId>) {
    let region = (NodeClass::Geographic { tier: Tier::Region }, None);
    match shape % 5 {
        0 => region,
        1 => (NodeClass::ExpatriateRegion, None),
        2 => {
            let anchors: Vec<NodeId> = ids
                .iter()
                .copied()
                .filter(|id| store.get(*id).unwrap().kind() != HierarchyKind::Sector)
                .collect();
            if anchors.is_empty() {
                return region;
            }
            let anchor = *at.get(&anchors);
            match SectorType::all()
                .iter()
                .copied()
                .find(|st| store.sector_root(anchor, *st).is_none())
            {
                Some(sector_type) => (
                    NodeClass::Sector {
                        tier: Tier::National,
                        sector_type,
                    },
                    Some(anchor),
                ),
                None => region,
            }
        }
        _ => {
            let parents: Vec<NodeId> = ids
                .iter()
                .copied()
                .filter(|id| !store.get(*id).unwrap().class.is_deepest())
                .collect();
            if parents.is_empty() {
                return region;
            }
            let parent = *at.get(&parents);
            let child = match store.get(parent).unwrap().class {
                NodeClass::Geographic { tier } => NodeClass::Geographic {
                    tier: tier.child().unwrap(),
                },
                NodeClass::Sector { tier, sector_type } => NodeClass::Sector {
                    tier: tier.child().unwrap(),
                    sector_type,
                },
                NodeClass::ExpatriateRegion => unreachable!("expatriate regions are leaves"),
            };
            (child, Some(parent))
        }
    }
}

fn build(steps: &[(u8, Index)]) -> (HierarchyStore, Vec<NodeId>) {
    let mut store = HierarchyStore::new();
    let mut ids: Vec<NodeId> = Vec::new();
    for (i, (shape, at)) in steps.iter().enumerate() {
        let (class, parent_id) = plan(&store, &ids, *shape, at);
        let id = store
            .create_node(NewNode {
                code: NodeCode::new(format!("N{i}")).unwrap(),
                name: format!("Node {i}"),
                class,
                parent_id,
            })
            .unwrap();
        ids.push(id);
    }
    (store, ids)
}

fn forest() -> impl Strategy<Value = Vec<(u8, Index)>> {
    prop::collection::vec((any::<u8>(), any::<Index>()), 1..30)
}

proptest! {
    #[test]
    fn closure_is_exactly_self_and_descendants(picks in forest()) {
        let (store, ids) = build(&picks);
        for &n in &ids {
            let closure = store.closure(n);
            let expected: BTreeSet<NodeId> = ids
                .iter()
                .copied()
                .filter(|m| store.is_ancestor_or_self(n, *m))
                .collect();
            prop_assert_eq!(closure, expected);
        }
    }

    #[test]
    fn closure_never_crosses_kinds(picks in forest()) {
        let (store, ids) = build(&picks);
        for &n in &ids {
            let kind = store.get(n).unwrap().kind();
            for m in store.closure(n) {
                prop_assert_eq!(store.get(m).unwrap().kind(), kind);
            }
            // Sector roots anchored here belong to another kind.
            for child in store.children(n) {
                if child.kind() != kind {
                    prop_assert!(!store.closure(n).contains(&child.id));
                }
            }
        }
    }

    #[test]
    fn nodes_with_active_children_never_deactivate(picks in forest()) {
        let (store, ids) = build(&picks);
        let none = |_: NodeId| 0usize;
        for &n in &ids {
            let decision = can_deactivate(&store, &none, n);
            if store.children(n).is_empty() {
                prop_assert!(decision.is_ok());
            } else {
                prop_assert_eq!(decision.unwrap_err().reason, DenialReason::HasActiveChildren);
            }
        }
    }

    #[test]
    fn nodes_with_bound_users_never_deactivate(
        picks in forest(),
        bound in prop::collection::vec(any::<Index>(), 1..5),
    ) {
        let (mut store, ids) = build(&picks);
        let bound: BTreeSet<NodeId> = bound.iter().map(|i| *i.get(&ids)).collect();
        let users = |n: NodeId| usize::from(bound.contains(&n));
        for &n in &bound {
            let denial = store.deactivate(n, &users).unwrap_err();
            prop_assert!(matches!(
                denial.reason,
                DenialReason::HasActiveChildren | DenialReason::HasBoundUsers
            ));
            prop_assert!(store.get(n).unwrap().is_active());
        }
    }
}
