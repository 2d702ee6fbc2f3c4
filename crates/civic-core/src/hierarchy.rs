//! # Hierarchy Vocabulary
//!
//! The three parallel hierarchies and the classes of node they contain.
//!
//! ## Shape
//!
//! | Kind | Classes | Depth |
//! |------|---------|-------|
//! | Geographic | National → Region → Locality → AdminUnit → District | 5 |
//! | Expatriate | ExpatriateRegion (flat set) | 1 |
//! | Sector | SectorNational → … → SectorDistrict, per [`SectorType`] | 5 |
//!
//! Sector subtrees are anchored either at the root (the independent sector
//! hierarchy) or under a Geographic node or an ExpatriateRegion. The anchor
//! belongs to a different kind, so a sector chain always stops at its
//! SectorNational node.
//!
//! ## Slots
//!
//! Every class has a [`NodeSlot`], which names the targeting column that
//! refers to nodes of that class and the key under which the node appears
//! in a [`Lineage`].

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

use crate::decision::DenialReason;
use crate::error::ValidationError;
use crate::identity::NodeId;

// ---------------------------------------------------------------------------
// HierarchyKind
// ---------------------------------------------------------------------------

/// One of the three mutually exclusive addressing spaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HierarchyKind {
    /// National → Region → Locality → AdminUnit → District.
    Geographic,
    /// Flat set of expatriate regions.
    Expatriate,
    /// Four typed trees mirroring the geographic tiers.
    Sector,
}

impl HierarchyKind {
    /// All kinds.
    pub fn all() -> &'static [HierarchyKind] {
        &[Self::Geographic, Self::Expatriate, Self::Sector]
    }

    /// Wire code.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Geographic => "GEOGRAPHIC",
            Self::Expatriate => "EXPATRIATE",
            Self::Sector => "SECTOR",
        }
    }
}

impl std::fmt::Display for HierarchyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HierarchyKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::all()
            .iter()
            .copied()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| ValidationError::UnknownCode {
                kind: "hierarchy kind",
                value: s.to_string(),
            })
    }
}

// ---------------------------------------------------------------------------
// Tier
// ---------------------------------------------------------------------------

/// Depth within a Geographic or Sector tree. Ordered shallow to deep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Tier {
    /// Depth 0.
    National,
    /// Depth 1.
    Region,
    /// Depth 2.
    Locality,
    /// Depth 3.
    AdminUnit,
    /// Depth 4, the leaf tier.
    District,
}

impl Tier {
    /// All tiers, shallow to deep.
    pub fn all() -> &'static [Tier] {
        &[
            Self::National,
            Self::Region,
            Self::Locality,
            Self::AdminUnit,
            Self::District,
        ]
    }

    /// Zero-based depth.
    pub fn depth(&self) -> u8 {
        match self {
            Self::National => 0,
            Self::Region => 1,
            Self::Locality => 2,
            Self::AdminUnit => 3,
            Self::District => 4,
        }
    }

    /// The tier directly above, if any.
    pub fn parent(&self) -> Option<Tier> {
        match self {
            Self::National => None,
            Self::Region => Some(Self::National),
            Self::Locality => Some(Self::Region),
            Self::AdminUnit => Some(Self::Locality),
            Self::District => Some(Self::AdminUnit),
        }
    }

    /// The tier directly below, if any.
    pub fn child(&self) -> Option<Tier> {
        match self {
            Self::National => Some(Self::Region),
            Self::Region => Some(Self::Locality),
            Self::Locality => Some(Self::AdminUnit),
            Self::AdminUnit => Some(Self::District),
            Self::District => None,
        }
    }

    /// Whether this is the leaf tier.
    pub fn is_deepest(&self) -> bool {
        matches!(self, Self::District)
    }

    /// Wire code.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::National => "NATIONAL",
            Self::Region => "REGION",
            Self::Locality => "LOCALITY",
            Self::AdminUnit => "ADMIN_UNIT",
            Self::District => "DISTRICT",
        }
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tier {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::all()
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| ValidationError::UnknownCode {
                kind: "tier",
                value: s.to_string(),
            })
    }
}

// ---------------------------------------------------------------------------
// SectorType
// ---------------------------------------------------------------------------

/// The four sector trees. Sectors of different types never share a subtree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SectorType {
    /// Social sector.
    Social,
    /// Economic sector.
    Economic,
    /// Organizational sector.
    Organizational,
    /// Political sector.
    Political,
}

impl SectorType {
    /// All sector types.
    pub fn all() -> &'static [SectorType] {
        &[
            Self::Social,
            Self::Economic,
            Self::Organizational,
            Self::Political,
        ]
    }

    /// Wire code.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Social => "SOCIAL",
            Self::Economic => "ECONOMIC",
            Self::Organizational => "ORGANIZATIONAL",
            Self::Political => "POLITICAL",
        }
    }
}

impl std::fmt::Display for SectorType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SectorType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::all()
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| ValidationError::UnknownCode {
                kind: "sector type",
                value: s.to_string(),
            })
    }
}

// ---------------------------------------------------------------------------
// NodeClass
// ---------------------------------------------------------------------------

/// What a node is: its kind, tier, and (for sectors) type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeClass {
    /// A node of the geographic tree.
    Geographic {
        /// Depth in the tree.
        tier: Tier,
    },
    /// A member of the flat expatriate set.
    ExpatriateRegion,
    /// A node of one of the four sector trees.
    Sector {
        /// Depth in the tree.
        tier: Tier,
        /// Which sector tree.
        sector_type: SectorType,
    },
}

impl NodeClass {
    /// The hierarchy kind this class belongs to.
    pub fn kind(&self) -> HierarchyKind {
        match self {
            Self::Geographic { .. } => HierarchyKind::Geographic,
            Self::ExpatriateRegion => HierarchyKind::Expatriate,
            Self::Sector { .. } => HierarchyKind::Sector,
        }
    }

    /// Tier, for tiered classes.
    pub fn tier(&self) -> Option<Tier> {
        match self {
            Self::Geographic { tier } | Self::Sector { tier, .. } => Some(*tier),
            Self::ExpatriateRegion => None,
        }
    }

    /// Sector type, for sector classes.
    pub fn sector_type(&self) -> Option<SectorType> {
        match self {
            Self::Sector { sector_type, .. } => Some(*sector_type),
            _ => None,
        }
    }

    /// Whether nodes of this class are the leaves of their branch.
    ///
    /// Expatriate regions are leaves of the expatriate kind.
    pub fn is_deepest(&self) -> bool {
        match self {
            Self::Geographic { tier } | Self::Sector { tier, .. } => tier.is_deepest(),
            Self::ExpatriateRegion => true,
        }
    }

    /// Check whether a node of this class may sit under `parent`
    /// (`None` meaning a root node).
    ///
    /// Returns [`DenialReason::HierarchyKindMismatch`] when the parent is
    /// of the wrong kind or sector type, and [`DenialReason::InvalidParent`]
    /// for any other misfit.
    pub fn check_parent(&self, parent: Option<&NodeClass>) -> Result<(), DenialReason> {
        use NodeClass::*;
        match (self, parent) {
            (Geographic { tier: Tier::National }, None) | (ExpatriateRegion, None) => Ok(()),
            (Geographic { tier: Tier::National }, Some(_)) | (ExpatriateRegion, Some(_)) => {
                Err(DenialReason::InvalidParent)
            }

            (Geographic { tier: Tier::Region }, None) => Ok(()),
            (Geographic { tier }, Some(Geographic { tier: parent_tier })) => {
                if tier.parent() == Some(*parent_tier) {
                    Ok(())
                } else {
                    Err(DenialReason::InvalidParent)
                }
            }
            (Geographic { .. }, None) => Err(DenialReason::InvalidParent),
            (Geographic { .. }, Some(_)) => Err(DenialReason::HierarchyKindMismatch),

            (Sector { tier: Tier::National, .. }, None)
            | (Sector { tier: Tier::National, .. }, Some(Geographic { .. }))
            | (Sector { tier: Tier::National, .. }, Some(ExpatriateRegion)) => Ok(()),
            (Sector { tier: Tier::National, .. }, Some(Sector { .. })) => {
                Err(DenialReason::InvalidParent)
            }
            (
                Sector { tier, sector_type },
                Some(Sector {
                    tier: parent_tier,
                    sector_type: parent_type,
                }),
            ) => {
                if sector_type != parent_type {
                    Err(DenialReason::HierarchyKindMismatch)
                } else if tier.parent() == Some(*parent_tier) {
                    Ok(())
                } else {
                    Err(DenialReason::InvalidParent)
                }
            }
            (Sector { .. }, None) => Err(DenialReason::InvalidParent),
            (Sector { .. }, Some(_)) => Err(DenialReason::HierarchyKindMismatch),
        }
    }

    /// The targeting slot for this class.
    pub fn slot(&self) -> NodeSlot {
        match self {
            Self::Geographic { tier } => match tier {
                Tier::National => NodeSlot::National,
                Tier::Region => NodeSlot::Region,
                Tier::Locality => NodeSlot::Locality,
                Tier::AdminUnit => NodeSlot::AdminUnit,
                Tier::District => NodeSlot::District,
            },
            Self::ExpatriateRegion => NodeSlot::ExpatriateRegion,
            Self::Sector { tier, .. } => match tier {
                Tier::National => NodeSlot::SectorNational,
                Tier::Region => NodeSlot::SectorRegion,
                Tier::Locality => NodeSlot::SectorLocality,
                Tier::AdminUnit => NodeSlot::SectorAdminUnit,
                Tier::District => NodeSlot::SectorDistrict,
            },
        }
    }

    /// Every class, in a stable order.
    pub fn all() -> Vec<NodeClass> {
        let mut out: Vec<NodeClass> = Tier::all()
            .iter()
            .map(|&tier| Self::Geographic { tier })
            .collect();
        out.push(Self::ExpatriateRegion);
        for &sector_type in SectorType::all() {
            for &tier in Tier::all() {
                out.push(Self::Sector { tier, sector_type });
            }
        }
        out
    }
}

impl std::fmt::Display for NodeClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Geographic { tier } => write!(f, "GEOGRAPHIC/{tier}"),
            Self::ExpatriateRegion => f.write_str("EXPATRIATE_REGION"),
            Self::Sector { tier, sector_type } => write!(f, "SECTOR/{sector_type}/{tier}"),
        }
    }
}

impl FromStr for NodeClass {
    type Err = ValidationError;

    /// Parses the [`Display`](std::fmt::Display) form, e.g.
    /// `GEOGRAPHIC/DISTRICT` or `SECTOR/SOCIAL/REGION`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let unknown = || ValidationError::UnknownCode {
            kind: "node class",
            value: s.to_string(),
        };
        let parts: Vec<&str> = s.split('/').collect();
        match parts.as_slice() {
            ["GEOGRAPHIC", tier] => Ok(Self::Geographic {
                tier: tier.parse().map_err(|_| unknown())?,
            }),
            ["EXPATRIATE_REGION"] => Ok(Self::ExpatriateRegion),
            ["SECTOR", sector_type, tier] => Ok(Self::Sector {
                tier: tier.parse().map_err(|_| unknown())?,
                sector_type: sector_type.parse().map_err(|_| unknown())?,
            }),
            _ => Err(unknown()),
        }
    }
}

// ---------------------------------------------------------------------------
// NodeSlot & Lineage
// ---------------------------------------------------------------------------

/// A targetable class position, one per persisted targeting column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeSlot {
    /// Geographic national level.
    National,
    /// Geographic region.
    Region,
    /// Geographic locality.
    Locality,
    /// Geographic administrative unit.
    AdminUnit,
    /// Geographic district.
    District,
    /// Expatriate region.
    ExpatriateRegion,
    /// Sector national level.
    SectorNational,
    /// Sector region.
    SectorRegion,
    /// Sector locality.
    SectorLocality,
    /// Sector administrative unit.
    SectorAdminUnit,
    /// Sector district.
    SectorDistrict,
}

impl NodeSlot {
    /// All slots.
    pub fn all() -> &'static [NodeSlot] {
        &[
            Self::National,
            Self::Region,
            Self::Locality,
            Self::AdminUnit,
            Self::District,
            Self::ExpatriateRegion,
            Self::SectorNational,
            Self::SectorRegion,
            Self::SectorLocality,
            Self::SectorAdminUnit,
            Self::SectorDistrict,
        ]
    }

    /// Kind of the nodes this slot refers to.
    pub fn kind(&self) -> HierarchyKind {
        match self {
            Self::National
            | Self::Region
            | Self::Locality
            | Self::AdminUnit
            | Self::District => HierarchyKind::Geographic,
            Self::ExpatriateRegion => HierarchyKind::Expatriate,
            _ => HierarchyKind::Sector,
        }
    }

    /// Specificity within the kind; larger is deeper.
    pub fn depth(&self) -> u8 {
        match self {
            Self::National | Self::ExpatriateRegion | Self::SectorNational => 0,
            Self::Region | Self::SectorRegion => 1,
            Self::Locality | Self::SectorLocality => 2,
            Self::AdminUnit | Self::SectorAdminUnit => 3,
            Self::District | Self::SectorDistrict => 4,
        }
    }

    /// Whether a node of `class` may be referenced through this slot.
    pub fn accepts(&self, class: &NodeClass) -> bool {
        class.slot() == *self
    }

    /// Persisted targeting column name.
    pub fn column(&self) -> &'static str {
        match self {
            Self::National => "target_national_id",
            Self::Region => "target_region_id",
            Self::Locality => "target_locality_id",
            Self::AdminUnit => "target_admin_unit_id",
            Self::District => "target_district_id",
            Self::ExpatriateRegion => "target_expatriate_region_id",
            Self::SectorNational => "target_sector_national_id",
            Self::SectorRegion => "target_sector_region_id",
            Self::SectorLocality => "target_sector_locality_id",
            Self::SectorAdminUnit => "target_sector_admin_unit_id",
            Self::SectorDistrict => "target_sector_district_id",
        }
    }

    /// Wire code.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::National => "NATIONAL",
            Self::Region => "REGION",
            Self::Locality => "LOCALITY",
            Self::AdminUnit => "ADMIN_UNIT",
            Self::District => "DISTRICT",
            Self::ExpatriateRegion => "EXPATRIATE_REGION",
            Self::SectorNational => "SECTOR_NATIONAL",
            Self::SectorRegion => "SECTOR_REGION",
            Self::SectorLocality => "SECTOR_LOCALITY",
            Self::SectorAdminUnit => "SECTOR_ADMIN_UNIT",
            Self::SectorDistrict => "SECTOR_DISTRICT",
        }
    }
}

impl std::fmt::Display for NodeSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Denormalised ancestor ids of a node within its own kind, keyed by slot.
///
/// For a user bound at a district this holds the district, admin unit,
/// locality, and region ids.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Lineage(BTreeMap<NodeSlot, NodeId>);

impl Lineage {
    /// Empty lineage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `node` at `slot`.
    pub fn insert(&mut self, slot: NodeSlot, node: NodeId) {
        self.0.insert(slot, node);
    }

    /// The node at `slot`, if any.
    pub fn get(&self, slot: NodeSlot) -> Option<NodeId> {
        self.0.get(&slot).copied()
    }

    /// Whether `node` appears anywhere in the lineage.
    pub fn contains(&self, node: NodeId) -> bool {
        self.0.values().any(|n| *n == node)
    }

    /// Iterate slots and nodes, shallow slots first within a kind.
    pub fn iter(&self) -> impl Iterator<Item = (NodeSlot, NodeId)> + '_ {
        self.0.iter().map(|(s, n)| (*s, *n))
    }

    /// Number of recorded slots.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether no slot is recorded.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(NodeSlot, NodeId)> for Lineage {
    fn from_iter<I: IntoIterator<Item = (NodeSlot, NodeId)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
