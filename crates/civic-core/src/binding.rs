//! # Hierarchy Bindings
//!
//! A user's place in a hierarchy is one tagged value rather than a bundle
//! of nullable foreign keys. A user holds at most one binding per
//! [`HierarchyKind`]; the `active_hierarchy` on the user selects which
//! one governs jurisdiction and visibility.

use serde::{Deserialize, Serialize};

use crate::hierarchy::{HierarchyKind, NodeClass, SectorType, Tier};
use crate::identity::NodeId;

/// Association of a user with one node of one hierarchy kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HierarchyBinding {
    /// Bound to a geographic node.
    Geographic {
        /// The bound node.
        node_id: NodeId,
        /// The node's tier.
        tier: Tier,
    },
    /// Bound to an expatriate region.
    Expatriate {
        /// The bound region.
        region_id: NodeId,
    },
    /// Bound to a sector node.
    Sector {
        /// The bound node.
        node_id: NodeId,
        /// The node's tier.
        tier: Tier,
        /// The node's sector tree.
        sector_type: SectorType,
    },
}

impl HierarchyBinding {
    /// Build the binding for `node_id`, whose class is `class`.
    pub fn for_node(node_id: NodeId, class: NodeClass) -> Self {
        match class {
            NodeClass::Geographic { tier } => Self::Geographic { node_id, tier },
            NodeClass::ExpatriateRegion => Self::Expatriate { region_id: node_id },
            NodeClass::Sector { tier, sector_type } => Self::Sector {
                node_id,
                tier,
                sector_type,
            },
        }
    }

    /// The hierarchy kind of the bound node.
    pub fn kind(&self) -> HierarchyKind {
        match self {
            Self::Geographic { .. } => HierarchyKind::Geographic,
            Self::Expatriate { .. } => HierarchyKind::Expatriate,
            Self::Sector { .. } => HierarchyKind::Sector,
        }
    }

    /// The bound node.
    pub fn node_id(&self) -> NodeId {
        match self {
            Self::Geographic { node_id, .. } | Self::Sector { node_id, .. } => *node_id,
            Self::Expatriate { region_id } => *region_id,
        }
    }

    /// The class of the bound node, as recorded at binding time.
    pub fn class(&self) -> NodeClass {
        match self {
            Self::Geographic { tier, .. } => NodeClass::Geographic { tier: *tier },
            Self::Expatriate { .. } => NodeClass::ExpatriateRegion,
            Self::Sector {
                tier, sector_type, ..
            } => NodeClass::Sector {
                tier: *tier,
                sector_type: *sector_type,
            },
        }
    }
}

/// At most one binding per hierarchy kind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bindings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    geographic: Option<HierarchyBinding>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    expatriate: Option<HierarchyBinding>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    sector: Option<HierarchyBinding>,
}

impl Bindings {
    /// No bindings.
    pub fn new() -> Self {
        Self::default()
    }

    /// A single binding.
    pub fn single(binding: HierarchyBinding) -> Self {
        let mut out = Self::new();
        out.set(binding);
        out
    }

    fn slot_mut(&mut self, kind: HierarchyKind) -> &mut Option<HierarchyBinding> {
        match kind {
            HierarchyKind::Geographic => &mut self.geographic,
            HierarchyKind::Expatriate => &mut self.expatriate,
            HierarchyKind::Sector => &mut self.sector,
        }
    }

    /// The binding for `kind`, if any.
    pub fn get(&self, kind: HierarchyKind) -> Option<&HierarchyBinding> {
        match kind {
            HierarchyKind::Geographic => self.geographic.as_ref(),
            HierarchyKind::Expatriate => self.expatriate.as_ref(),
            HierarchyKind::Sector => self.sector.as_ref(),
        }
    }

    /// Replace the binding of the same kind, returning the previous one.
    pub fn set(&mut self, binding: HierarchyBinding) -> Option<HierarchyBinding> {
        self.slot_mut(binding.kind()).replace(binding)
    }

    /// Remove the binding for `kind`.
    pub fn clear(&mut self, kind: HierarchyKind) -> Option<HierarchyBinding> {
        self.slot_mut(kind).take()
    }

    /// All present bindings.
    pub fn iter(&self) -> impl Iterator<Item = &HierarchyBinding> {
        [&self.geographic, &self.expatriate, &self.sector]
            .into_iter()
            .flatten()
    }

    /// Whether any binding refers to `node`.
    pub fn binds(&self, node: NodeId) -> bool {
        self.iter().any(|b| b.node_id() == node)
    }

    /// Whether no binding is present.
    pub fn is_empty(&self) -> bool {
        self.iter().next().is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn for_node_roundtrips_class() {
        for class in NodeClass::all() {
            let b = HierarchyBinding::for_node(NodeId::new(), class);
            assert_eq!(b.class(), class);
            assert_eq!(b.kind(), class.kind());
        }
    }

    #[test]
    fn set_replaces_same_kind_only() {
        let first = NodeId::new();
        let second = NodeId::new();
        let expat = NodeId::new();
        let mut bindings = Bindings::single(HierarchyBinding::Geographic {
            node_id: first,
            tier: Tier::District,
        });
        bindings.set(HierarchyBinding::Expatriate { region_id: expat });
        let previous = bindings.set(HierarchyBinding::Geographic {
            node_id: second,
            tier: Tier::Region,
        });
        assert_eq!(previous.map(|b| b.node_id()), Some(first));
        assert!(bindings.binds(second));
        assert!(bindings.binds(expat));
        assert!(!bindings.binds(first));
        assert_eq!(bindings.iter().count(), 2);
    }

    #[test]
    fn clear_empties() {
        let mut bindings = Bindings::single(HierarchyBinding::Expatriate {
            region_id: NodeId::new(),
        });
        assert!(bindings.clear(HierarchyKind::Expatriate).is_some());
        assert!(bindings.is_empty());
    }

    #[test]
    fn binding_serde_is_tagged() {
        let b = HierarchyBinding::Sector {
            node_id: NodeId::new(),
            tier: Tier::National,
            sector_type: SectorType::Social,
        };
        let json = serde_json::to_value(b).unwrap();
        assert_eq!(json["kind"], "SECTOR");
        assert_eq!(json["sector_type"], "SOCIAL");
    }
}
