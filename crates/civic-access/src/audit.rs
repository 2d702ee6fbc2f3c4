//! # Denial Audit Log
//!
//! Every denial that reaches a caller is logged at `warn` under the
//! `civic::audit` target with the actor, the operation, the node involved,
//! and the reason code. Jurisdiction correctness is a security property,
//! so a refusal is never silent.
//!
//! Decisions produced in this crate log themselves. Callers that run the
//! structural guard from `civic-hierarchy` wrap the result with
//! [`AuditExt::audited`].

use civic_core::{Decision, Denial, NodeId};

use crate::actor::Actor;

/// Log target for denial records.
pub const AUDIT_TARGET: &str = "civic::audit";

/// What the actor was attempting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// Create an administrator or member.
    CreateAdmin,
    /// Public self-signup.
    PublicSignup,
    /// Reassign a user's binding.
    RebindUser,
    /// Switch the caller's own active hierarchy.
    SwitchHierarchy,
    /// Create a hierarchy node.
    CreateNode,
    /// Move a hierarchy node.
    ReparentNode,
    /// Rename a node or change its administrator.
    UpdateNode,
    /// Soft-deactivate a hierarchy node.
    DeactivateNode,
    /// Stamp a target on new content.
    TargetContent,
    /// Edit or archive content.
    ManageContent,
}

impl Operation {
    /// Stable name for logs and audit rows.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CreateAdmin => "create_admin",
            Self::PublicSignup => "public_signup",
            Self::RebindUser => "rebind_user",
            Self::SwitchHierarchy => "switch_hierarchy",
            Self::CreateNode => "create_node",
            Self::ReparentNode => "reparent_node",
            Self::UpdateNode => "update_node",
            Self::DeactivateNode => "deactivate_node",
            Self::TargetContent => "target_content",
            Self::ManageContent => "manage_content",
        }
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Emit the audit record for a denial.
pub fn record_denial(actor: &Actor, operation: Operation, node: Option<NodeId>, denial: &Denial) {
    tracing::warn!(
        target: AUDIT_TARGET,
        actor = %actor.label(),
        level = %actor.admin_level,
        operation = %operation,
        node = %node.map(|n| n.to_string()).unwrap_or_default(),
        reason = %denial.reason,
        detail = %denial.detail,
        "access denied"
    );
}

/// Log the denial, if any, carried by a decision.
pub trait AuditExt<T> {
    /// Record a denial for `actor` and pass the decision through unchanged.
    fn audited(self, actor: &Actor, operation: Operation, node: Option<NodeId>) -> Decision<T>;
}

impl<T> AuditExt<T> for Decision<T> {
    fn audited(self, actor: &Actor, operation: Operation, node: Option<NodeId>) -> Decision<T> {
        if let Err(denial) = &self {
            record_denial(actor, operation, node, denial);
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use civic_core::DenialReason;

    #[test]
    fn audited_passes_decisions_through() {
        let actor = Actor::root_admin();
        let ok: Decision<u8> = Ok(7);
        assert_eq!(ok.audited(&actor, Operation::CreateNode, None), Ok(7));

        let denial = Denial::new(DenialReason::HasBoundUsers, "1 user");
        let err: Decision<u8> = Err(denial.clone());
        assert_eq!(
            err.audited(&actor, Operation::DeactivateNode, Some(NodeId::new())),
            Err(denial)
        );
    }

    #[test]
    fn operation_names_are_snake_case() {
        assert_eq!(Operation::CreateAdmin.to_string(), "create_admin");
        assert_eq!(Operation::DeactivateNode.as_str(), "deactivate_node");
    }
}
