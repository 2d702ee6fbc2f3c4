//! # Admin Creation Validator
//!
//! Decides whether a new administrator or member may be created at a given
//! level and node, and what the created record must look like.
//!
//! ## Rule order (administrator creator)
//!
//! 1. requested level strictly narrower than the creator's: `INSUFFICIENT_LEVEL`
//! 2. expatriate levels only from `ADMIN`, `GENERAL_SECRETARIAT`, or
//!    `EXPATRIATE_GENERAL`: `HIERARCHY_KIND_MISMATCH`
//! 3. node exists and is active: `NODE_NOT_FOUND`
//! 4. node class fits the level: `LEVEL_NODE_MISMATCH`
//! 5. node in the creator's kind: `HIERARCHY_KIND_MISMATCH`
//! 6. node in the creator's jurisdiction: `OUT_OF_JURISDICTION`
//!
//! ## Public signup
//!
//! Level must be `USER` and the node must be the deepest of its branch
//! (a district, a sector district, or an expatriate region):
//! `MUST_BIND_DEEPEST_LEVEL`.

use serde::{Deserialize, Serialize};

use civic_core::{
    AdminLevel, Decision, Denial, DenialReason, HierarchyBinding, HierarchyKind, Lineage,
    NodeClass, NodeId, Role, User,
};
use civic_hierarchy::{HierarchyNode, HierarchyStore};

use crate::actor::Actor;
use crate::audit::{record_denial, AuditExt, Operation};
use crate::jurisdiction::{self, JurisdictionScope};

/// Who is creating the account.
#[derive(Debug, Clone, Copy)]
pub enum Creator<'a> {
    /// Unauthenticated self-signup.
    PublicSignup,
    /// An authenticated administrator.
    Actor(&'a Actor),
}

/// The requested level and node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdmissionRequest {
    /// Level of the new account.
    pub level: AdminLevel,
    /// Node to bind. Absent for unscoped levels.
    pub node_id: Option<NodeId>,
}

/// What an allowed creation must persist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Admission {
    /// Level of the new account.
    pub admin_level: AdminLevel,
    /// Role derived from the level.
    pub role: Role,
    /// Validated binding, if the level binds a node.
    pub binding: Option<HierarchyBinding>,
    /// Kind that governs the new account.
    pub active_hierarchy: HierarchyKind,
    /// Ancestor ids of the bound node.
    pub lineage: Lineage,
}

/// Validate an account creation.
pub fn can_create_admin(
    store: &HierarchyStore,
    creator: Creator<'_>,
    request: AdmissionRequest,
) -> Decision<Admission> {
    match creator {
        Creator::PublicSignup => {
            let decision = check_signup(store, request);
            if let Err(denial) = &decision {
                tracing::warn!(
                    target: crate::audit::AUDIT_TARGET,
                    actor = "public",
                    operation = %Operation::PublicSignup,
                    node = %request.node_id.map(|n| n.to_string()).unwrap_or_default(),
                    reason = %denial.reason,
                    detail = %denial.detail,
                    "access denied"
                );
            }
            decision
        }
        Creator::Actor(actor) => check_admin(store, actor, request).audited(
            actor,
            Operation::CreateAdmin,
            request.node_id,
        ),
    }
}

fn check_signup(store: &HierarchyStore, request: AdmissionRequest) -> Decision<Admission> {
    if request.level != AdminLevel::User {
        return Err(Denial::new(
            DenialReason::InsufficientLevel,
            format!("public signup cannot request {}", request.level),
        ));
    }
    let Some(node_id) = request.node_id else {
        return Err(Denial::new(
            DenialReason::MustBindDeepestLevel,
            "public signup must choose a node",
        ));
    };
    let node = active_node(store, node_id)?;
    if !node.class.is_deepest() {
        return Err(Denial::new(
            DenialReason::MustBindDeepestLevel,
            format!("{} is a {}; choose the deepest level of the branch", node.code, node.class),
        ));
    }
    Ok(admitted(store, AdminLevel::User, Some(node)))
}

fn check_admin(
    store: &HierarchyStore,
    actor: &Actor,
    request: AdmissionRequest,
) -> Decision<Admission> {
    let level = request.level;

    // 1
    if !level.is_narrower_than(actor.admin_level) {
        return Err(Denial::new(
            DenialReason::InsufficientLevel,
            format!("{} cannot create {level}", actor.admin_level),
        ));
    }

    // 2
    if level.is_expatriate()
        && !(actor.admin_level.is_unscoped() || actor.admin_level == AdminLevel::ExpatriateGeneral)
    {
        return Err(Denial::new(
            DenialReason::HierarchyKindMismatch,
            format!("{} cannot create expatriate level {level}", actor.admin_level),
        ));
    }

    // 3
    let node = request.node_id.map(|id| active_node(store, id)).transpose()?;

    // 4
    check_level_fits(level, node.map(|n| &n.class))?;

    // 5, 6
    let scope = jurisdiction::resolve(store, actor);
    check_containment(&scope, node)?;

    Ok(admitted(store, level, node))
}

/// Whether `actor` may move `user`'s binding to `new_node`.
///
/// The user must be strictly narrower than the actor; the new node must fit
/// the user's level; and both the user's current binding in that kind (or
/// their active binding, if they have none there) and the new node must lie
/// in the actor's jurisdiction.
pub fn can_rebind_user(
    store: &HierarchyStore,
    actor: &Actor,
    user: &User,
    new_node: NodeId,
) -> Decision<Admission> {
    let decision = check_rebind(store, actor, user, new_node);
    if let Err(denial) = &decision {
        record_denial(actor, Operation::RebindUser, Some(new_node), denial);
    }
    decision
}

fn check_rebind(
    store: &HierarchyStore,
    actor: &Actor,
    user: &User,
    new_node: NodeId,
) -> Decision<Admission> {
    if !user.admin_level.is_narrower_than(actor.admin_level) {
        return Err(Denial::new(
            DenialReason::InsufficientLevel,
            format!("{} cannot reassign a {}", actor.admin_level, user.admin_level),
        ));
    }
    let node = active_node(store, new_node)?;
    check_level_fits(user.admin_level, Some(&node.class))?;

    let scope = jurisdiction::resolve(store, actor);
    check_containment(&scope, Some(node))?;

    let current = user
        .bindings
        .get(node.kind())
        .or_else(|| user.active_binding())
        .map(|b| b.node_id());
    if let Some(current) = current {
        if !scope.contains_node(store, current) {
            return Err(Denial::new(
                DenialReason::OutOfJurisdiction,
                format!("user {} is currently bound outside the actor's jurisdiction", user.id),
            ));
        }
    }
    Ok(admitted(store, user.admin_level, Some(node)))
}

fn active_node(store: &HierarchyStore, id: NodeId) -> Decision<&HierarchyNode> {
    store.get_active(id).ok_or_else(|| Denial::node_not_found(id))
}

/// Which node classes each level binds to.
fn check_level_fits(level: AdminLevel, class: Option<&NodeClass>) -> Decision {
    let fits = match (level, class) {
        (AdminLevel::Admin | AdminLevel::GeneralSecretariat, None) => true,
        (AdminLevel::ExpatriateGeneral, None) => true,
        (
            AdminLevel::ExpatriateGeneral | AdminLevel::ExpatriateRegion,
            Some(NodeClass::ExpatriateRegion),
        ) => true,
        (AdminLevel::User, Some(_)) => true,
        (_, Some(NodeClass::Geographic { tier } | NodeClass::Sector { tier, .. })) => {
            level.tier() == Some(*tier)
        }
        _ => false,
    };
    if fits {
        return Ok(());
    }
    Err(Denial::new(
        DenialReason::LevelNodeMismatch,
        match class {
            Some(class) => format!("{level} cannot be bound to a {class} node"),
            None => format!("{level} requires a node"),
        },
    ))
}

fn check_containment(scope: &JurisdictionScope, node: Option<&HierarchyNode>) -> Decision {
    match node {
        None if *scope == JurisdictionScope::Unrestricted => Ok(()),
        None => Err(Denial::new(
            DenialReason::OutOfJurisdiction,
            "only unscoped administrators may create unbound accounts",
        )),
        Some(node) => {
            if let Some(kind) = scope.kind() {
                if kind != node.kind() {
                    return Err(Denial::new(
                        DenialReason::HierarchyKindMismatch,
                        format!(
                            "node {} is in {}, creator administers {kind}",
                            node.code,
                            node.kind()
                        ),
                    ));
                }
            }
            if scope.contains(node.id, node.kind()) {
                Ok(())
            } else {
                Err(Denial::new(
                    DenialReason::OutOfJurisdiction,
                    format!("node {} is outside the creator's jurisdiction", node.code),
                ))
            }
        }
    }
}

fn admitted(store: &HierarchyStore, level: AdminLevel, node: Option<&HierarchyNode>) -> Admission {
    let active_hierarchy = match node {
        Some(n) => n.kind(),
        None if level == AdminLevel::ExpatriateGeneral => HierarchyKind::Expatriate,
        None => HierarchyKind::Geographic,
    };
    Admission {
        admin_level: level,
        role: level.derived_role(),
        binding: node.map(|n| HierarchyBinding::for_node(n.id, n.class)),
        active_hierarchy,
        lineage: node.map(|n| store.lineage(n.id)).unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use civic_core::{NodeCode, SectorType, Tier};
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

    fn request(level: AdminLevel, node_id: Option<NodeId>) -> AdmissionRequest {
        AdmissionRequest { level, node_id }
    }

    #[test]
    fn root_admin_creates_general_secretariat_unbound() {
        let store = HierarchyStore::new();
        let root = Actor::root_admin();
        let admission = can_create_admin(
            &store,
            Creator::Actor(&root),
            request(AdminLevel::GeneralSecretariat, None),
        )
        .unwrap();
        assert_eq!(admission.role, Role::Admin);
        assert!(admission.binding.is_none());
    }

    #[test]
    fn equal_level_is_insufficient() {
        let store = HierarchyStore::new();
        let root = Actor::root_admin();
        let err = can_create_admin(&store, Creator::Actor(&root), request(AdminLevel::Admin, None))
            .unwrap_err();
        assert_eq!(err.reason, DenialReason::InsufficientLevel);
    }

    #[test]
    fn tiered_level_needs_matching_tier() {
        let mut store = HierarchyStore::new();
        let region = add(&mut store, "R", geo(Tier::Region), None);
        let root = Actor::root_admin();
        let err = can_create_admin(
            &store,
            Creator::Actor(&root),
            request(AdminLevel::Locality, Some(region)),
        )
        .unwrap_err();
        assert_eq!(err.reason, DenialReason::LevelNodeMismatch);
        let err = can_create_admin(&store, Creator::Actor(&root), request(AdminLevel::Region, None))
            .unwrap_err();
        assert_eq!(err.reason, DenialReason::LevelNodeMismatch);
        assert!(can_create_admin(
            &store,
            Creator::Actor(&root),
            request(AdminLevel::Region, Some(region))
        )
        .is_ok());
    }

    #[test]
    fn sector_tiers_bind_sector_admins() {
        let mut store = HierarchyStore::new();
        let root_node = add(
            &mut store,
            "SOC",
            NodeClass::Sector {
                tier: Tier::National,
                sector_type: SectorType::Social,
            },
            None,
        );
        let sreg = add(
            &mut store,
            "SOC-R",
            NodeClass::Sector {
                tier: Tier::Region,
                sector_type: SectorType::Social,
            },
            Some(root_node),
        );
        let national = Actor::bound(
            AdminLevel::NationalLevel,
            root_node,
            store.get(root_node).unwrap().class,
        );
        let admission = can_create_admin(
            &store,
            Creator::Actor(&national),
            request(AdminLevel::Region, Some(sreg)),
        )
        .unwrap();
        assert_eq!(admission.active_hierarchy, HierarchyKind::Sector);
    }

    #[test]
    fn geographic_admin_cannot_create_expatriate_levels() {
        let mut store = HierarchyStore::new();
        let gulf = add(&mut store, "GULF", NodeClass::ExpatriateRegion, None);
        let national = add(&mut store, "SD", geo(Tier::National), None);
        let actor = Actor::bound(AdminLevel::NationalLevel, national, geo(Tier::National));
        let err = can_create_admin(
            &store,
            Creator::Actor(&actor),
            request(AdminLevel::ExpatriateRegion, Some(gulf)),
        )
        .unwrap_err();
        assert_eq!(err.reason, DenialReason::HierarchyKindMismatch);
    }

    #[test]
    fn expatriate_general_creates_in_own_region_only() {
        let mut store = HierarchyStore::new();
        let gulf = add(&mut store, "GULF", NodeClass::ExpatriateRegion, None);
        let eur = add(&mut store, "EUR", NodeClass::ExpatriateRegion, None);
        let general =
            Actor::bound(AdminLevel::ExpatriateGeneral, gulf, NodeClass::ExpatriateRegion);
        assert!(can_create_admin(
            &store,
            Creator::Actor(&general),
            request(AdminLevel::ExpatriateRegion, Some(gulf))
        )
        .is_ok());
        let err = can_create_admin(
            &store,
            Creator::Actor(&general),
            request(AdminLevel::ExpatriateRegion, Some(eur)),
        )
        .unwrap_err();
        assert_eq!(err.reason, DenialReason::OutOfJurisdiction);
    }

    #[test]
    fn cross_kind_member_is_kind_mismatch() {
        let mut store = HierarchyStore::new();
        let region = add(&mut store, "R", geo(Tier::Region), None);
        let gulf = add(&mut store, "GULF", NodeClass::ExpatriateRegion, None);
        let actor = Actor::bound(AdminLevel::Region, region, geo(Tier::Region));
        let err = can_create_admin(
            &store,
            Creator::Actor(&actor),
            request(AdminLevel::User, Some(gulf)),
        )
        .unwrap_err();
        assert_eq!(err.reason, DenialReason::HierarchyKindMismatch);
    }

    #[test]
    fn public_signup_binds_expatriate_region() {
        let mut store = HierarchyStore::new();
        let gulf = add(&mut store, "GULF", NodeClass::ExpatriateRegion, None);
        let admission = can_create_admin(
            &store,
            Creator::PublicSignup,
            request(AdminLevel::User, Some(gulf)),
        )
        .unwrap();
        assert_eq!(admission.active_hierarchy, HierarchyKind::Expatriate);
        assert_eq!(admission.role, Role::User);
    }

    #[test]
    fn public_signup_cannot_elevate() {
        let mut store = HierarchyStore::new();
        let gulf = add(&mut store, "GULF", NodeClass::ExpatriateRegion, None);
        let err = can_create_admin(
            &store,
            Creator::PublicSignup,
            request(AdminLevel::ExpatriateRegion, Some(gulf)),
        )
        .unwrap_err();
        assert_eq!(err.reason, DenialReason::InsufficientLevel);
        let err = can_create_admin(&store, Creator::PublicSignup, request(AdminLevel::User, None))
            .unwrap_err();
        assert_eq!(err.reason, DenialReason::MustBindDeepestLevel);
    }
}
