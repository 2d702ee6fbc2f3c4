//! # Jurisdiction Resolver
//!
//! Computes the set of hierarchy nodes an actor controls: its bound node
//! and every descendant of that node within the same hierarchy kind.
//!
//! ## Rules
//!
//! | Actor | Scope |
//! |-------|-------|
//! | `ADMIN`, `GENERAL_SECRETARIAT` | [`JurisdictionScope::Unrestricted`] |
//! | `EXPATRIATE_GENERAL` without a region | [`JurisdictionScope::WholeKind`]`(EXPATRIATE)` |
//! | bound administrator | [`JurisdictionScope::Subtree`] of the bound node |
//! | `USER`, unbound, or bound to a missing/inactive node | [`JurisdictionScope::Empty`] |
//!
//! Scopes never compose across kinds: a geographic region administrator
//! does not control the sector subtrees anchored under the region.
//!
//! ## Two forms
//!
//! [`resolve`] materialises the scope (usable as a SQL predicate via
//! [`JurisdictionScope::to_sql`]); [`is_in_jurisdiction`] answers a single
//! node by walking up from it. The two are computed independently and must
//! agree for every actor and node.

use std::collections::BTreeSet;

use civic_core::{AdminLevel, Decision, Denial, DenialReason, HierarchyKind, NodeId};
use civic_hierarchy::HierarchyStore;
use uuid::Uuid;

use crate::actor::Actor;
use crate::audit::{AuditExt, Operation};

/// The nodes an actor controls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JurisdictionScope {
    /// Every node of every kind.
    Unrestricted,
    /// Every node of one kind.
    WholeKind(HierarchyKind),
    /// A node and its same-kind descendants.
    Subtree {
        /// Kind of every node in the set.
        kind: HierarchyKind,
        /// The bound node.
        root: NodeId,
        /// `root` plus its descendants, any status.
        nodes: BTreeSet<NodeId>,
    },
    /// Nothing.
    Empty,
}

/// A parameter for a [`SqlPredicate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqlBind {
    /// A hierarchy kind code, bound as text.
    Kind(&'static str),
    /// A node id set, bound as `uuid[]`.
    Nodes(Vec<Uuid>),
}

/// A SQL boolean expression with positional parameters `$n`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlPredicate {
    /// Expression text.
    pub clause: String,
    /// Parameters, in placeholder order.
    pub binds: Vec<SqlBind>,
}

impl JurisdictionScope {
    /// Whether a node of `kind` with id `node` is in scope.
    pub fn contains(&self, node: NodeId, kind: HierarchyKind) -> bool {
        match self {
            Self::Unrestricted => true,
            Self::WholeKind(k) => *k == kind,
            Self::Subtree { kind: k, nodes, .. } => *k == kind && nodes.contains(&node),
            Self::Empty => false,
        }
    }

    /// Whether an existing node is in scope. Unknown ids are never in scope.
    pub fn contains_node(&self, store: &HierarchyStore, node: NodeId) -> bool {
        store
            .get(node)
            .is_some_and(|n| self.contains(node, n.kind()))
    }

    /// The part of this scope that lies in `kind`.
    pub fn restrict_to(&self, kind: HierarchyKind) -> Self {
        match self {
            Self::Unrestricted => Self::WholeKind(kind),
            Self::WholeKind(k) if *k == kind => self.clone(),
            Self::Subtree { kind: k, .. } if *k == kind => self.clone(),
            _ => Self::Empty,
        }
    }

    /// The kind this scope is confined to, if it is confined to one.
    pub fn kind(&self) -> Option<HierarchyKind> {
        match self {
            Self::WholeKind(k) | Self::Subtree { kind: k, .. } => Some(*k),
            Self::Unrestricted | Self::Empty => None,
        }
    }

    /// Whether this scope matches nothing.
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    /// Render the scope as a predicate over a node-id column and its kind
    /// column, numbering placeholders from `first_bind`.
    pub fn to_sql(&self, node_column: &str, kind_column: &str, first_bind: usize) -> SqlPredicate {
        match self {
            Self::Unrestricted => SqlPredicate {
                clause: "TRUE".to_string(),
                binds: Vec::new(),
            },
            Self::Empty => SqlPredicate {
                clause: "FALSE".to_string(),
                binds: Vec::new(),
            },
            Self::WholeKind(kind) => SqlPredicate {
                clause: format!("{kind_column} = ${first_bind}"),
                binds: vec![SqlBind::Kind(kind.as_str())],
            },
            Self::Subtree { kind, nodes, .. } => SqlPredicate {
                clause: format!(
                    "({kind_column} = ${first_bind} AND {node_column} = ANY(${}))",
                    first_bind + 1
                ),
                binds: vec![
                    SqlBind::Kind(kind.as_str()),
                    SqlBind::Nodes(nodes.iter().map(|n| *n.as_uuid()).collect()),
                ],
            },
        }
    }
}

/// Compute the actor's scope.
pub fn resolve(store: &HierarchyStore, actor: &Actor) -> JurisdictionScope {
    if actor.admin_level.is_unscoped() {
        return JurisdictionScope::Unrestricted;
    }
    if actor.admin_level == AdminLevel::User {
        return JurisdictionScope::Empty;
    }
    match actor.binding {
        None if actor.admin_level == AdminLevel::ExpatriateGeneral => {
            JurisdictionScope::WholeKind(HierarchyKind::Expatriate)
        }
        None => JurisdictionScope::Empty,
        Some(binding) => match store.get_active(binding.node_id()) {
            Some(root) if root.kind() == binding.kind() => JurisdictionScope::Subtree {
                kind: root.kind(),
                root: root.id,
                nodes: store.closure(root.id),
            },
            _ => JurisdictionScope::Empty,
        },
    }
}

/// The actor's scope confined to one kind.
pub fn resolve_for_kind(
    store: &HierarchyStore,
    actor: &Actor,
    kind: HierarchyKind,
) -> JurisdictionScope {
    resolve(store, actor).restrict_to(kind)
}

/// Whether `node` is in the actor's scope, decided by walking up from the
/// node rather than by materialising the scope.
pub fn is_in_jurisdiction(store: &HierarchyStore, actor: &Actor, node: NodeId) -> bool {
    let Some(target) = store.get(node) else {
        return false;
    };
    if actor.admin_level.is_unscoped() {
        return true;
    }
    if actor.admin_level == AdminLevel::User {
        return false;
    }
    match actor.binding {
        None => {
            actor.admin_level == AdminLevel::ExpatriateGeneral
                && target.kind() == HierarchyKind::Expatriate
        }
        Some(binding) => match store.get_active(binding.node_id()) {
            Some(root) if root.kind() == binding.kind() => {
                store.is_ancestor_or_self(root.id, node)
            }
            _ => false,
        },
    }
}

/// Whether `actor` may change the hierarchy at `node`: create beneath it,
/// rename it, move it, or deactivate it. `None` stands for a new root.
///
/// Members are refused with `INSUFFICIENT_LEVEL`. Roots belong to unscoped
/// administrators. A node outside the actor's kind is
/// `HIERARCHY_KIND_MISMATCH`; inside the kind but outside the subtree it is
/// `OUT_OF_JURISDICTION`.
pub fn can_administer(
    store: &HierarchyStore,
    actor: &Actor,
    node: Option<NodeId>,
    operation: Operation,
) -> Decision {
    check_administer(store, actor, node).audited(actor, operation, node)
}

fn check_administer(store: &HierarchyStore, actor: &Actor, node: Option<NodeId>) -> Decision {
    if actor.admin_level == AdminLevel::User {
        return Err(Denial::new(
            DenialReason::InsufficientLevel,
            "members cannot change the hierarchy",
        ));
    }
    let scope = resolve(store, actor);
    let Some(id) = node else {
        return if scope == JurisdictionScope::Unrestricted {
            Ok(())
        } else {
            Err(Denial::new(
                DenialReason::OutOfJurisdiction,
                "only unscoped administrators may create root nodes",
            ))
        };
    };
    let target = store.get(id).ok_or_else(|| Denial::node_not_found(id))?;
    if scope.contains(id, target.kind()) {
        return Ok(());
    }
    match scope.kind() {
        Some(kind) if kind != target.kind() => Err(Denial::new(
            DenialReason::HierarchyKindMismatch,
            format!("node {} is in {}, actor administers {kind}", target.code, target.kind()),
        )),
        _ => Err(Denial::new(
            DenialReason::OutOfJurisdiction,
            format!("node {} is outside the actor's jurisdiction", target.code),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use civic_core::{NodeClass, NodeCode, SectorType, Tier};
    use civic_hierarchy::NewNode;

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

    #[test]
    fn unscoped_levels_are_unrestricted() {
        let store = HierarchyStore::new();
        for level in [AdminLevel::Admin, AdminLevel::GeneralSecretariat] {
            let actor = Actor {
                admin_level: level,
                ..Actor::root_admin()
            };
            assert_eq!(resolve(&store, &actor), JurisdictionScope::Unrestricted);
        }
    }

    #[test]
    fn region_admin_gets_own_subtree_only() {
        let mut store = HierarchyStore::new();
        let krt = add(&mut store, "KRT", geo(Tier::Region), None);
        let loc = add(&mut store, "KRT-L", geo(Tier::Locality), Some(krt));
        let nk = add(&mut store, "NK", geo(Tier::Region), None);
        let sector = add(
            &mut store,
            "KRT-SOC",
            NodeClass::Sector {
                tier: Tier::National,
                sector_type: SectorType::Social,
            },
            Some(krt),
        );
        let actor = Actor::bound(AdminLevel::Region, krt, geo(Tier::Region));
        let scope = resolve(&store, &actor);
        assert!(scope.contains_node(&store, krt));
        assert!(scope.contains_node(&store, loc));
        assert!(!scope.contains_node(&store, nk));
        assert!(!scope.contains_node(&store, sector));
        assert!(is_in_jurisdiction(&store, &actor, loc));
        assert!(!is_in_jurisdiction(&store, &actor, sector));
    }

    #[test]
    fn cross_kind_restriction_is_empty() {
        let mut store = HierarchyStore::new();
        let krt = add(&mut store, "KRT", geo(Tier::Region), None);
        let actor = Actor::bound(AdminLevel::Region, krt, geo(Tier::Region));
        assert!(resolve_for_kind(&store, &actor, HierarchyKind::Sector).is_empty());
        assert!(!resolve_for_kind(&store, &actor, HierarchyKind::Geographic).is_empty());
    }

    #[test]
    fn unbound_expatriate_general_covers_expatriate_kind() {
        let mut store = HierarchyStore::new();
        let gulf = add(&mut store, "GULF", NodeClass::ExpatriateRegion, None);
        let krt = add(&mut store, "KRT", geo(Tier::Region), None);
        let actor = Actor {
            admin_level: AdminLevel::ExpatriateGeneral,
            active_hierarchy: HierarchyKind::Expatriate,
            ..Actor::root_admin()
        };
        let scope = resolve(&store, &actor);
        assert_eq!(scope, JurisdictionScope::WholeKind(HierarchyKind::Expatriate));
        assert!(scope.contains_node(&store, gulf));
        assert!(!scope.contains_node(&store, krt));
        assert!(is_in_jurisdiction(&store, &actor, gulf));
        assert!(!is_in_jurisdiction(&store, &actor, krt));
    }

    #[test]
    fn inactive_binding_resolves_empty() {
        let mut store = HierarchyStore::new();
        let krt = add(&mut store, "KRT", geo(Tier::Region), None);
        store.deactivate(krt, &|_: NodeId| 0usize).unwrap();
        let actor = Actor::bound(AdminLevel::Region, krt, geo(Tier::Region));
        assert!(resolve(&store, &actor).is_empty());
        assert!(!is_in_jurisdiction(&store, &actor, krt));
    }

    #[test]
    fn members_control_nothing() {
        let mut store = HierarchyStore::new();
        let krt = add(&mut store, "KRT", geo(Tier::Region), None);
        let actor = Actor::member_at(krt, geo(Tier::Region));
        assert!(resolve(&store, &actor).is_empty());
        assert!(!is_in_jurisdiction(&store, &actor, krt));
    }

    #[test]
    fn sql_rendering() {
        let root = NodeId::new();
        let scope = JurisdictionScope::Subtree {
            kind: HierarchyKind::Geographic,
            root,
            nodes: BTreeSet::from([root]),
        };
        let sql = scope.to_sql("b.node_id", "b.kind", 3);
        assert_eq!(sql.clause, "(b.kind = $3 AND b.node_id = ANY($4))");
        assert_eq!(
            sql.binds,
            vec![
                SqlBind::Kind("GEOGRAPHIC"),
                SqlBind::Nodes(vec![*root.as_uuid()])
            ]
        );
        assert_eq!(JurisdictionScope::Unrestricted.to_sql("n", "k", 1).clause, "TRUE");
        assert_eq!(JurisdictionScope::Empty.to_sql("n", "k", 1).clause, "FALSE");
        let whole = JurisdictionScope::WholeKind(HierarchyKind::Expatriate).to_sql("n", "k", 2);
        assert_eq!(whole.clause, "k = $2");
    }

    #[test]
    fn restrict_to_narrows() {
        assert_eq!(
            JurisdictionScope::Unrestricted.restrict_to(HierarchyKind::Sector),
            JurisdictionScope::WholeKind(HierarchyKind::Sector)
        );
        assert!(JurisdictionScope::WholeKind(HierarchyKind::Sector)
            .restrict_to(HierarchyKind::Geographic)
            .is_empty());
    }

    #[test]
    fn structural_changes_follow_jurisdiction() {
        let mut store = HierarchyStore::new();
        let krt = add(&mut store, "KRT", geo(Tier::Region), None);
        let loc = add(&mut store, "KRT-L", geo(Tier::Locality), Some(krt));
        let nk = add(&mut store, "NK", geo(Tier::Region), None);
        let gulf = add(&mut store, "GULF", NodeClass::ExpatriateRegion, None);
        let actor = Actor::bound(AdminLevel::Region, krt, geo(Tier::Region));

        assert!(can_administer(&store, &actor, Some(loc), Operation::CreateNode).is_ok());
        let err = can_administer(&store, &actor, Some(nk), Operation::CreateNode).unwrap_err();
        assert_eq!(err.reason, DenialReason::OutOfJurisdiction);
        let err = can_administer(&store, &actor, Some(gulf), Operation::UpdateNode).unwrap_err();
        assert_eq!(err.reason, DenialReason::HierarchyKindMismatch);
        let err = can_administer(&store, &actor, None, Operation::CreateNode).unwrap_err();
        assert_eq!(err.reason, DenialReason::OutOfJurisdiction);
        assert!(can_administer(&store, &Actor::root_admin(), None, Operation::CreateNode).is_ok());

        let member = Actor::member_at(loc, geo(Tier::Locality));
        let err =
            can_administer(&store, &member, Some(loc), Operation::DeactivateNode).unwrap_err();
        assert_eq!(err.reason, DenialReason::InsufficientLevel);
    }
}
