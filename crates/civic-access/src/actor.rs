//! # Actors
//!
//! The point-in-time snapshot of an authenticated caller that every access
//! decision takes explicitly. There is no ambient "current user".

use serde::{Deserialize, Serialize};

use civic_core::{
    AdminLevel, HierarchyBinding, HierarchyKind, NodeClass, NodeId, Role, User, UserId,
};

/// Who is asking, as resolved at authentication time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    /// The backing user, or `None` for the service identity.
    pub id: Option<UserId>,
    /// Administrative level.
    pub admin_level: AdminLevel,
    /// Which hierarchy kind governs this actor's view.
    pub active_hierarchy: HierarchyKind,
    /// Binding in `active_hierarchy`, if any.
    pub binding: Option<HierarchyBinding>,
    /// Coarse role.
    pub role: Role,
}

impl Actor {
    /// The unscoped root administrator used for service tokens and when
    /// authentication is disabled.
    pub fn root_admin() -> Self {
        Self {
            id: None,
            admin_level: AdminLevel::Admin,
            active_hierarchy: HierarchyKind::Geographic,
            binding: None,
            role: Role::Admin,
        }
    }

    /// Snapshot a stored user.
    pub fn from_user(user: &User) -> Self {
        Self {
            id: Some(user.id),
            admin_level: user.admin_level,
            active_hierarchy: user.active_hierarchy,
            binding: user.active_binding().copied(),
            role: user.role,
        }
    }

    /// An actor of `level` bound at `node`, whose class is `class`.
    pub fn bound(level: AdminLevel, node: NodeId, class: NodeClass) -> Self {
        Self {
            id: None,
            admin_level: level,
            active_hierarchy: class.kind(),
            binding: Some(HierarchyBinding::for_node(node, class)),
            role: level.derived_role(),
        }
    }

    /// A member bound at `node`.
    pub fn member_at(node: NodeId, class: NodeClass) -> Self {
        Self::bound(AdminLevel::User, node, class)
    }

    /// The bound node, if any.
    pub fn node_id(&self) -> Option<NodeId> {
        self.binding.map(|b| b.node_id())
    }

    /// Identifier for logs.
    pub fn label(&self) -> String {
        self.id.map_or_else(|| "service".to_string(), |id| id.to_string())
    }
}
