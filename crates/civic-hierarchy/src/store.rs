//! # Hierarchy Store
//!
//! An arena of hierarchy nodes keyed by [`NodeId`], with a child index and
//! a per-class code index. All three hierarchy kinds live in one arena;
//! kind boundaries are respected by the traversal methods, not by separate
//! storage.
//!
//! ## Lifecycle
//!
//! ```text
//! ACTIVE ──deactivate──▶ INACTIVE (terminal)
//! ```
//!
//! Nodes are never removed. Inactive nodes stay in the arena so content
//! targeted at them remains queryable by history.
//!
//! ## Mutation
//!
//! Every structural write (`create_node`, `reparent`, `deactivate`) runs
//! the matching check from [`crate::guard`] first and leaves the store
//! untouched on denial.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::str::FromStr;

use civic_core::{
    Decision, Denial, DenialReason, HierarchyKind, Lineage, NodeClass, NodeCode, NodeId,
    SectorType, Tier, UserId, ValidationError,
};

use crate::guard::{self, BoundUsers};

// ─── Node Status ─────────────────────────────────────────────────────

/// Lifecycle status of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeStatus {
    /// In use.
    Active,
    /// Soft-deactivated. Terminal.
    Inactive,
}

impl NodeStatus {
    /// Wire code.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "ACTIVE",
            Self::Inactive => "INACTIVE",
        }
    }
}

impl std::fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NodeStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ACTIVE" => Ok(Self::Active),
            "INACTIVE" => Ok(Self::Inactive),
            other => Err(ValidationError::UnknownCode {
                kind: "node status",
                value: other.to_string(),
            }),
        }
    }
}

// ─── Node Records ────────────────────────────────────────────────────

/// A node in one of the three hierarchies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HierarchyNode {
    /// Surrogate id.
    pub id: NodeId,
    /// Human-readable code, unique within `class`.
    pub code: NodeCode,
    /// Display name.
    pub name: String,
    /// Kind, tier, and sector type.
    pub class: NodeClass,
    /// Parent node. `None` for roots. A SectorNational node's parent
    /// belongs to another kind.
    pub parent_id: Option<NodeId>,
    /// Lifecycle status.
    pub status: NodeStatus,
    /// Administrator responsible for the node.
    pub admin_id: Option<UserId>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last modification time.
    pub updated_at: DateTime<Utc>,
}

impl HierarchyNode {
    /// Whether the node is active.
    pub fn is_active(&self) -> bool {
        self.status == NodeStatus::Active
    }

    /// The node's hierarchy kind.
    pub fn kind(&self) -> HierarchyKind {
        self.class.kind()
    }
}

/// Request to create a node.
#[derive(Debug, Clone)]
pub struct NewNode {
    /// Code, unique within `class`.
    pub code: NodeCode,
    /// Display name.
    pub name: String,
    /// Node class.
    pub class: NodeClass,
    /// Parent, or `None` for a root.
    pub parent_id: Option<NodeId>,
}

// ─── Store ───────────────────────────────────────────────────────────

/// Arena of hierarchy nodes.
#[derive(Debug, Clone, Default)]
pub struct HierarchyStore {
    nodes: HashMap<NodeId, HierarchyNode>,
    children: HashMap<NodeId, BTreeSet<NodeId>>,
    roots: BTreeSet<NodeId>,
    codes: HashMap<(NodeClass, NodeCode), NodeId>,
}

impl HierarchyStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of nodes, active or not.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the store holds no nodes.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Look up a node.
    pub fn get(&self, id: NodeId) -> Option<&HierarchyNode> {
        self.nodes.get(&id)
    }

    /// Look up an active node.
    pub fn get_active(&self, id: NodeId) -> Option<&HierarchyNode> {
        self.nodes.get(&id).filter(|n| n.is_active())
    }

    /// Look up a node by class and code.
    pub fn get_by_code(&self, class: &NodeClass, code: &NodeCode) -> Option<&HierarchyNode> {
        self.codes
            .get(&(*class, code.clone()))
            .and_then(|id| self.nodes.get(id))
    }

    /// All nodes, unordered.
    pub fn iter(&self) -> impl Iterator<Item = &HierarchyNode> {
        self.nodes.values()
    }

    /// Root nodes (no parent), ordered by id.
    pub fn roots(&self) -> Vec<&HierarchyNode> {
        self.roots.iter().filter_map(|id| self.nodes.get(id)).collect()
    }

    /// Direct children of any kind and status, ordered by id.
    pub fn children(&self, id: NodeId) -> Vec<&HierarchyNode> {
        self.children
            .get(&id)
            .map(|set| set.iter().filter_map(|c| self.nodes.get(c)).collect())
            .unwrap_or_default()
    }

    /// Strict ancestors across kinds, nearest first.
    pub fn ancestors(&self, id: NodeId) -> Vec<&HierarchyNode> {
        let mut out = Vec::new();
        let mut cursor = self.nodes.get(&id).and_then(|n| n.parent_id);
        while let Some(pid) = cursor {
            match self.nodes.get(&pid) {
                Some(parent) => {
                    out.push(parent);
                    cursor = parent.parent_id;
                }
                None => break,
            }
        }
        out
    }

    /// The node followed by its ancestors within the same kind, nearest
    /// first. Empty when the node does not exist.
    pub fn chain(&self, id: NodeId) -> Vec<&HierarchyNode> {
        let Some(start) = self.nodes.get(&id) else {
            return Vec::new();
        };
        let kind = start.kind();
        let mut out = vec![start];
        out.extend(self.ancestors(id).into_iter().take_while(|n| n.kind() == kind));
        out
    }

    /// Whether `ancestor` is `node` or one of its same-kind ancestors.
    pub fn is_ancestor_or_self(&self, ancestor: NodeId, node: NodeId) -> bool {
        self.chain(node).iter().any(|n| n.id == ancestor)
    }

    /// Strict descendants within the node's own kind, any status.
    /// Breadth-first; does not descend into sector subtrees anchored
    /// under a geographic or expatriate node.
    pub fn descendants(&self, id: NodeId) -> BTreeSet<NodeId> {
        let mut out = self.closure(id);
        out.remove(&id);
        out
    }

    /// The node plus its same-kind descendants. Empty when the node does
    /// not exist.
    pub fn closure(&self, id: NodeId) -> BTreeSet<NodeId> {
        let mut out = BTreeSet::new();
        let Some(root) = self.nodes.get(&id) else {
            return out;
        };
        let kind = root.kind();
        let mut queue = VecDeque::from([id]);
        while let Some(current) = queue.pop_front() {
            if !out.insert(current) {
                continue;
            }
            for child in self.children(current) {
                if child.kind() == kind {
                    queue.push_back(child.id);
                }
            }
        }
        out
    }

    /// Slot → node map along the node's same-kind chain.
    pub fn lineage(&self, id: NodeId) -> Lineage {
        self.chain(id)
            .into_iter()
            .map(|n| (n.class.slot(), n.id))
            .collect()
    }

    /// Nodes of one kind, ordered by class then code.
    pub fn nodes_of_kind(&self, kind: HierarchyKind) -> Vec<&HierarchyNode> {
        let mut out: Vec<_> = self.nodes.values().filter(|n| n.kind() == kind).collect();
        out.sort_by(|a, b| (a.class, &a.code).cmp(&(b.class, &b.code)));
        out
    }

    /// The active SectorNational root of `sector_type` anchored at `anchor`.
    pub fn sector_root(&self, anchor: NodeId, sector_type: SectorType) -> Option<&HierarchyNode> {
        self.children(anchor).into_iter().find(|n| {
            n.is_active()
                && n.class
                    == NodeClass::Sector {
                        tier: Tier::National,
                        sector_type,
                    }
        })
    }

    // ── Mutation ─────────────────────────────────────────────────────

    /// Validate a creation request and build the record it would insert,
    /// without touching the store.
    pub fn plan_node(&self, new: NewNode) -> Decision<HierarchyNode> {
        guard::can_create_child(self, new.parent_id, &new.class, &new.code)?;
        let now = Utc::now();
        Ok(HierarchyNode {
            id: NodeId::new(),
            code: new.code,
            name: new.name,
            class: new.class,
            parent_id: new.parent_id,
            status: NodeStatus::Active,
            admin_id: None,
            created_at: now,
            updated_at: now,
        })
    }

    /// Insert a planned node, re-running the creation check against the
    /// current state.
    pub fn commit_node(&mut self, node: HierarchyNode) -> Decision<NodeId> {
        guard::can_create_child(self, node.parent_id, &node.class, &node.code)?;
        let id = node.id;
        self.index(node);
        Ok(id)
    }

    /// Create a node through the guard.
    pub fn create_node(&mut self, new: NewNode) -> Decision<NodeId> {
        let node = self.plan_node(new)?;
        self.commit_node(node)
    }

    /// Move `id` under `new_parent` within the same kind.
    pub fn reparent(&mut self, id: NodeId, new_parent: NodeId) -> Decision {
        guard::can_reparent(self, id, new_parent)?;
        let old_parent = self.nodes.get(&id).and_then(|n| n.parent_id);
        match old_parent {
            Some(old) => {
                if let Some(set) = self.children.get_mut(&old) {
                    set.remove(&id);
                }
            }
            None => {
                self.roots.remove(&id);
            }
        }
        self.children.entry(new_parent).or_default().insert(id);
        if let Some(node) = self.nodes.get_mut(&id) {
            node.parent_id = Some(new_parent);
            node.updated_at = Utc::now();
        }
        Ok(())
    }

    /// Change a node's display name.
    pub fn rename(&mut self, id: NodeId, name: String) -> Decision {
        let node = self
            .nodes
            .get_mut(&id)
            .filter(|n| n.is_active())
            .ok_or_else(|| Denial::node_not_found(id))?;
        node.name = name;
        node.updated_at = Utc::now();
        Ok(())
    }

    /// Point the node at a new administrator (or none). Last writer wins.
    pub fn assign_admin(&mut self, id: NodeId, admin: Option<UserId>) -> Decision {
        let node = self
            .nodes
            .get_mut(&id)
            .filter(|n| n.is_active())
            .ok_or_else(|| Denial::node_not_found(id))?;
        node.admin_id = admin;
        node.updated_at = Utc::now();
        Ok(())
    }

    /// Soft-deactivate a node through the guard.
    pub fn deactivate(&mut self, id: NodeId, users: &impl BoundUsers) -> Decision {
        guard::can_deactivate(self, users, id)?;
        if let Some(node) = self.nodes.get_mut(&id) {
            node.status = NodeStatus::Inactive;
            node.updated_at = Utc::now();
        }
        Ok(())
    }

    /// Load persisted nodes without running the guard. Parents are placed
    /// before children regardless of input order.
    ///
    /// Returns the number of nodes loaded, or a [`DenialReason::NodeNotFound`]
    /// denial naming an orphan whose parent is absent.
    pub fn restore(&mut self, nodes: Vec<HierarchyNode>) -> Decision<usize> {
        let mut pending = nodes;
        let mut loaded = 0;
        while !pending.is_empty() {
            let before = pending.len();
            let (ready, waiting): (Vec<_>, Vec<_>) = pending.into_iter().partition(|n| {
                n.parent_id
                    .map_or(true, |pid| self.nodes.contains_key(&pid))
            });
            for node in ready {
                self.index(node);
                loaded += 1;
            }
            pending = waiting;
            if pending.len() == before {
                let orphan = &pending[0];
                return Err(Denial::new(
                    DenialReason::NodeNotFound,
                    format!(
                        "node {} ({}) references missing parent {}",
                        orphan.code,
                        orphan.id,
                        orphan
                            .parent_id
                            .map(|p| p.to_string())
                            .unwrap_or_default()
                    ),
                ));
            }
        }
        Ok(loaded)
    }

    fn index(&mut self, node: HierarchyNode) {
        match node.parent_id {
            Some(pid) => {
                self.children.entry(pid).or_default().insert(node.id);
            }
            None => {
                self.roots.insert(node.id);
            }
        }
        self.codes.insert((node.class, node.code.clone()), node.id);
        self.nodes.insert(node.id, node);
    }
}
