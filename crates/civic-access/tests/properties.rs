//! Property tests relating the resolver, the point check, and the
//! visibility filter over generated forests mixing geographic, expatriate,
//! and anchored sector subtrees.

use civic_access::{
    can_create_admin, is_in_jurisdiction, is_visible, resolve, Actor, AdmissionRequest, Creator,
    JurisdictionScope, TargetColumns,
};
use civic_core::{
    AdminLevel, DenialReason, HierarchyKind, NodeClass, NodeCode, NodeId, SectorType, Tier,
};
use civic_hierarchy::{HierarchyStore, NewNode};
use proptest::prelude::*;
use proptest::sample::Index;

/// Class and parent of the next generated node: a geographic or expatriate
/// region, a sector root anchored under a geographic or expatriate node, or
/// a child of a non-leaf node.
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
                code: NodeCode::new(format!("G{i}")).unwrap(),
                name: format!("Node {i}"),
                class,
                parent_id,
            })
            .unwrap();
        ids.push(id);
    }
    (store, ids)
}

fn admin_at(store: &HierarchyStore, node: NodeId) -> Actor {
    let class = store.get(node).unwrap().class;
    let level = match class {
        NodeClass::ExpatriateRegion => AdminLevel::ExpatriateRegion,
        _ => AdminLevel::all()
            .iter()
            .copied()
            .find(|l| l.tier() == class.tier())
            .unwrap(),
    };
    Actor::bound(level, node, class)
}

fn expatriate_general() -> Actor {
    Actor {
        admin_level: AdminLevel::ExpatriateGeneral,
        active_hierarchy: HierarchyKind::Expatriate,
        ..Actor::root_admin()
    }
}

fn targeted_at(store: &HierarchyStore, node: NodeId) -> TargetColumns {
    let slot = store.get(node).unwrap().class.slot();
    TargetColumns::single(slot, node)
}

fn forest() -> impl Strategy<Value = Vec<(u8, Index)>> {
    prop::collection::vec((any::<u8>(), any::<Index>()), 1..25)
}

proptest! {
    #[test]
    fn resolver_agrees_with_point_check(picks in forest()) {
        let (store, ids) = build(&picks);
        let mut actors: Vec<Actor> = ids.iter().map(|&n| admin_at(&store, n)).collect();
        actors.push(expatriate_general());
        actors.push(Actor::root_admin());
        for actor in &actors {
            let scope = resolve(&store, actor);
            for &node in &ids {
                prop_assert_eq!(
                    scope.contains_node(&store, node),
                    is_in_jurisdiction(&store, actor, node)
                );
            }
        }
    }

    #[test]
    fn scopes_stay_within_the_bound_kind(picks in forest()) {
        let (store, ids) = build(&picks);
        for &bound in &ids {
            let kind = store.get(bound).unwrap().kind();
            let scope = resolve(&store, &admin_at(&store, bound));
            for &node in &ids {
                if scope.contains_node(&store, node) {
                    prop_assert_eq!(store.get(node).unwrap().kind(), kind);
                }
            }
        }

        let scope = resolve(&store, &expatriate_general());
        prop_assert_eq!(&scope, &JurisdictionScope::WholeKind(HierarchyKind::Expatriate));
        for &node in &ids {
            let expatriate = store.get(node).unwrap().kind() == HierarchyKind::Expatriate;
            prop_assert_eq!(scope.contains_node(&store, node), expatriate);
        }
    }

    #[test]
    fn targeted_content_reaches_exactly_the_subtree(picks in forest()) {
        let (store, ids) = build(&picks);
        for &target in &ids {
            let content = targeted_at(&store, target);
            for &viewer in &ids {
                let class = store.get(viewer).unwrap().class;
                let visible = is_visible(&store, &Actor::member_at(viewer, class), &content);
                prop_assert_eq!(visible, store.is_ancestor_or_self(target, viewer));
            }
        }
    }

    #[test]
    fn visibility_is_inherited_by_descendants(picks in forest()) {
        let (store, ids) = build(&picks);
        for &target in &ids {
            let content = targeted_at(&store, target);
            for &viewer in &ids {
                let class = store.get(viewer).unwrap().class;
                if !is_visible(&store, &Actor::member_at(viewer, class), &content) {
                    continue;
                }
                for below in store.descendants(viewer) {
                    let class = store.get(below).unwrap().class;
                    prop_assert!(is_visible(&store, &Actor::member_at(below, class), &content));
                }
            }
        }
    }

    #[test]
    fn untargeted_content_is_visible_to_everyone(picks in forest()) {
        let (store, ids) = build(&picks);
        let content = TargetColumns::default();
        prop_assert!(is_visible(&store, &Actor::root_admin(), &content));
        for &viewer in &ids {
            let class = store.get(viewer).unwrap().class;
            prop_assert!(is_visible(&store, &Actor::member_at(viewer, class), &content));
            prop_assert!(is_visible(&store, &admin_at(&store, viewer), &content));
        }
    }

    #[test]
    fn creators_only_create_narrower_levels(
        creator in prop::sample::select(AdminLevel::all()),
        requested in prop::sample::select(AdminLevel::all()),
    ) {
        let store = HierarchyStore::new();
        let actor = Actor {
            admin_level: creator,
            ..Actor::root_admin()
        };
        let decision = can_create_admin(
            &store,
            Creator::Actor(&actor),
            AdmissionRequest { level: requested, node_id: None },
        );
        if !requested.is_narrower_than(creator) {
            prop_assert_eq!(decision.unwrap_err().reason, DenialReason::InsufficientLevel);
        }
    }
}
