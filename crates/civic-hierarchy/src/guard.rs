//! # Hierarchy Mutation Guard
//!
//! Structural checks run before every write to the [`HierarchyStore`].
//! Each check is a pure function of the current store state (and, for
//! deactivation, a count of bound users) returning a [`Decision`].
//!
//! | Check | Denials, in evaluation order |
//! |-------|------------------------------|
//! | [`can_create_child`] | NODE_NOT_FOUND, INVALID_PARENT / HIERARCHY_KIND_MISMATCH, DUPLICATE_CODE |
//! | [`can_reparent`] | NODE_NOT_FOUND, CYCLE_DETECTED, HIERARCHY_KIND_MISMATCH, INVALID_PARENT, DUPLICATE_CODE |
//! | [`can_deactivate`] | NODE_NOT_FOUND, HAS_ACTIVE_CHILDREN, HAS_BOUND_USERS |
//!
//! Callers that persist the mutation must hold the structural write lock
//! across the check and the write so a child or binding cannot appear in
//! between.

use civic_core::{Decision, Denial, DenialReason, NodeClass, NodeCode, NodeId, Tier};

use crate::store::HierarchyStore;

/// Counts users bound to a node, in any hierarchy kind.
pub trait BoundUsers {
    /// Number of users whose bindings reference `node`.
    fn users_bound_to(&self, node: NodeId) -> usize;
}

impl<F> BoundUsers for F
where
    F: Fn(NodeId) -> usize,
{
    fn users_bound_to(&self, node: NodeId) -> usize {
        self(node)
    }
}

fn denied(reason: DenialReason, detail: String) -> Denial {
    tracing::debug!(reason = %reason, %detail, "hierarchy guard denied mutation");
    Denial::new(reason, detail)
}

fn describe(parent: Option<&NodeClass>) -> String {
    parent.map_or_else(|| "the root".to_string(), |c| c.to_string())
}

/// Whether a node of `class` with `code` may be created under `parent`.
pub fn can_create_child(
    store: &HierarchyStore,
    parent: Option<NodeId>,
    class: &NodeClass,
    code: &NodeCode,
) -> Decision {
    let parent_class = match parent {
        Some(pid) => {
            let node = store.get_active(pid).ok_or_else(|| {
                denied(
                    DenialReason::NodeNotFound,
                    format!("parent {pid} does not exist or is inactive"),
                )
            })?;
            Some(node.class)
        }
        None => None,
    };

    class.check_parent(parent_class.as_ref()).map_err(|reason| {
        denied(
            reason,
            format!("{class} cannot be placed under {}", describe(parent_class.as_ref())),
        )
    })?;

    if let Some(existing) = store.get_by_code(class, code) {
        return Err(denied(
            DenialReason::DuplicateCode,
            format!("{class} code {code} is already used by node {}", existing.id),
        ));
    }

    check_sector_root_free(store, parent, class)
}

/// Whether `node` may move under `new_parent`.
///
/// The new parent must belong to the same kind as the current parent (or,
/// for a root, the node's own kind), accept the node's class, and not be
/// the node itself or one of its descendants.
pub fn can_reparent(store: &HierarchyStore, node: NodeId, new_parent: NodeId) -> Decision {
    let current = store.get_active(node).ok_or_else(|| {
        denied(
            DenialReason::NodeNotFound,
            format!("node {node} does not exist or is inactive"),
        )
    })?;
    let target = store.get_active(new_parent).ok_or_else(|| {
        denied(
            DenialReason::NodeNotFound,
            format!("new parent {new_parent} does not exist or is inactive"),
        )
    })?;

    if store
        .ancestors(new_parent)
        .iter()
        .map(|n| n.id)
        .chain(std::iter::once(new_parent))
        .any(|id| id == node)
    {
        return Err(denied(
            DenialReason::CycleDetected,
            format!("node {node} cannot be placed under itself or its descendant {new_parent}"),
        ));
    }

    let expected_kind = current
        .parent_id
        .and_then(|pid| store.get(pid))
        .map_or_else(|| current.kind(), |p| p.kind());
    if target.kind() != expected_kind {
        return Err(denied(
            DenialReason::HierarchyKindMismatch,
            format!(
                "node {node} is anchored in {expected_kind} and cannot move under a {} node",
                target.kind()
            ),
        ));
    }

    current
        .class
        .check_parent(Some(&target.class))
        .map_err(|reason| {
            denied(
                reason,
                format!("{} cannot be placed under {}", current.class, target.class),
            )
        })?;

    if current.parent_id == Some(new_parent) {
        return Ok(());
    }
    check_sector_root_free(store, Some(new_parent), &current.class)
}

/// Whether `node` may be soft-deactivated.
pub fn can_deactivate(store: &HierarchyStore, users: &impl BoundUsers, node: NodeId) -> Decision {
    store.get_active(node).ok_or_else(|| {
        denied(
            DenialReason::NodeNotFound,
            format!("node {node} does not exist or is inactive"),
        )
    })?;

    let active_children = store
        .children(node)
        .iter()
        .filter(|c| c.is_active())
        .count();
    if active_children > 0 {
        return Err(denied(
            DenialReason::HasActiveChildren,
            format!("node {node} has {active_children} active child node(s)"),
        ));
    }

    let bound = users.users_bound_to(node);
    if bound > 0 {
        return Err(denied(
            DenialReason::HasBoundUsers,
            format!("node {node} has {bound} bound user(s)"),
        ));
    }
    Ok(())
}

fn check_sector_root_free(
    store: &HierarchyStore,
    anchor: Option<NodeId>,
    class: &NodeClass,
) -> Decision {
    if let (
        NodeClass::Sector {
            tier: Tier::National,
            sector_type,
        },
        Some(anchor),
    ) = (class, anchor)
    {
        if let Some(existing) = store.sector_root(anchor, *sector_type) {
            return Err(denied(
                DenialReason::DuplicateCode,
                format!(
                    "node {anchor} already anchors {sector_type} sector root {}",
                    existing.code
                ),
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::NewNode;
    use civic_core::SectorType;

    fn add(
        store: &mut HierarchyStore,
        code: &str,
        class: NodeClass,
        parent: Option<NodeId>,
    ) -> NodeId {
        store
            .create_node(NewNode {
                code: NodeCode::new(code).unwrap(),
                name: code.into(),
                class,
                parent_id: parent,
            })
            .unwrap()
    }

    fn geo(tier: Tier) -> NodeClass {
        NodeClass::Geographic { tier }
    }

    fn sector(tier: Tier, sector_type: SectorType) -> NodeClass {
        NodeClass::Sector { tier, sector_type }
    }

    fn code(s: &str) -> NodeCode {
        NodeCode::new(s).unwrap()
    }

    #[test]
    fn create_requires_active_parent() {
        let mut store = HierarchyStore::new();
        let region = add(&mut store, "R", geo(Tier::Region), None);
        let missing = NodeId::new();
        let err =
            can_create_child(&store, Some(missing), &geo(Tier::Locality), &code("L")).unwrap_err();
        assert_eq!(err.reason, DenialReason::NodeNotFound);

        store.deactivate(region, &|_: NodeId| 0usize).unwrap();
        let err =
            can_create_child(&store, Some(region), &geo(Tier::Locality), &code("L")).unwrap_err();
        assert_eq!(err.reason, DenialReason::NodeNotFound);
    }

    #[test]
    fn create_rejects_wrong_tier_and_kind() {
        let mut store = HierarchyStore::new();
        let region = add(&mut store, "R", geo(Tier::Region), None);
        let err =
            can_create_child(&store, Some(region), &geo(Tier::District), &code("D")).unwrap_err();
        assert_eq!(err.reason, DenialReason::InvalidParent);

        let social = add(
            &mut store,
            "SOC",
            sector(Tier::National, SectorType::Social),
            Some(region),
        );
        let err = can_create_child(
            &store,
            Some(social),
            &sector(Tier::Region, SectorType::Economic),
            &code("ECO-R"),
        )
        .unwrap_err();
        assert_eq!(err.reason, DenialReason::HierarchyKindMismatch);
        assert!(can_create_child(
            &store,
            Some(social),
            &sector(Tier::Region, SectorType::Social),
            &code("SOC-R"),
        )
        .is_ok());
    }

    #[test]
    fn create_rejects_duplicate_code_within_class_only() {
        let mut store = HierarchyStore::new();
        let region = add(&mut store, "KRT", geo(Tier::Region), None);
        let err = can_create_child(&store, None, &geo(Tier::Region), &code("KRT")).unwrap_err();
        assert_eq!(err.reason, DenialReason::DuplicateCode);
        assert!(can_create_child(&store, Some(region), &geo(Tier::Locality), &code("KRT")).is_ok());
    }

    #[test]
    fn one_sector_root_per_type_per_anchor() {
        let mut store = HierarchyStore::new();
        let expat = add(&mut store, "GULF", NodeClass::ExpatriateRegion, None);
        add(&mut store, "GULF-POL", sector(Tier::National, SectorType::Political), Some(expat));
        let err = can_create_child(
            &store,
            Some(expat),
            &sector(Tier::National, SectorType::Political),
            &code("GULF-POL-2"),
        )
        .unwrap_err();
        assert_eq!(err.reason, DenialReason::DuplicateCode);
        assert!(can_create_child(
            &store,
            Some(expat),
            &sector(Tier::National, SectorType::Social),
            &code("GULF-SOC"),
        )
        .is_ok());
    }

    #[test]
    fn reparent_rejects_cycles() {
        let mut store = HierarchyStore::new();
        let region = add(&mut store, "R", geo(Tier::Region), None);
        let err = can_reparent(&store, region, region).unwrap_err();
        assert_eq!(err.reason, DenialReason::CycleDetected);

        let national = add(&mut store, "SD", geo(Tier::National), None);
        store.reparent(region, national).unwrap();
        let err = can_reparent(&store, national, region).unwrap_err();
        assert_eq!(err.reason, DenialReason::CycleDetected);
    }

    #[test]
    fn reparent_rejects_kind_crossing() {
        let mut store = HierarchyStore::new();
        let region = add(&mut store, "R", geo(Tier::Region), None);
        let other = add(&mut store, "R2", geo(Tier::Region), None);
        let expat = add(&mut store, "GULF", NodeClass::ExpatriateRegion, None);
        let root = add(
            &mut store,
            "R-SOC",
            sector(Tier::National, SectorType::Social),
            Some(region),
        );
        let sreg = add(&mut store, "R-SOC-1", sector(Tier::Region, SectorType::Social), Some(root));

        // Sector roots may move between geographic anchors, not to expatriate ones.
        assert!(can_reparent(&store, root, other).is_ok());
        let err = can_reparent(&store, root, expat).unwrap_err();
        assert_eq!(err.reason, DenialReason::HierarchyKindMismatch);

        let err = can_reparent(&store, sreg, region).unwrap_err();
        assert_eq!(err.reason, DenialReason::HierarchyKindMismatch);
    }

    #[test]
    fn reparent_rejects_tier_misfit() {
        let mut store = HierarchyStore::new();
        let region = add(&mut store, "R", geo(Tier::Region), None);
        let loc = add(&mut store, "L", geo(Tier::Locality), Some(region));
        let unit = add(&mut store, "U", geo(Tier::AdminUnit), Some(loc));
        let err = can_reparent(&store, unit, region).unwrap_err();
        assert_eq!(err.reason, DenialReason::InvalidParent);
    }

    #[test]
    fn deactivate_counts_children_of_any_kind() {
        let mut store = HierarchyStore::new();
        let region = add(&mut store, "R", geo(Tier::Region), None);
        add(&mut store, "R-ECO", sector(Tier::National, SectorType::Economic), Some(region));
        let err = can_deactivate(&store, &|_: NodeId| 0usize, region).unwrap_err();
        assert_eq!(err.reason, DenialReason::HasActiveChildren);
    }
}
