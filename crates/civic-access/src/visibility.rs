//! # Content Visibility Filter
//!
//! Decides which targeted content a member may read, and which content an
//! administrator may manage.
//!
//! ## Targeting
//!
//! Content carries one optional node reference per [`NodeSlot`]
//! ([`TargetColumns`]). With every column empty the content is global.
//! Otherwise, within a given hierarchy kind the *governing* target is the
//! most specific column that is set; shallower columns of the same kind
//! are ignored on read.
//!
//! ## Read rule
//!
//! A viewer active in kind K and bound at node V sees content C when C is
//! untargeted, or when C's governing K-target N is active and N is V or an
//! ancestor of V. Viewers bound to a missing or inactive node see only
//! untargeted content.
//!
//! ## Write rule
//!
//! New content is normalised to a single target ([`normalize_targeting`]):
//! several levels of one branch collapse to the deepest; several kinds or
//! diverging branches are rejected as `AMBIGUOUS_TARGET`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use civic_core::{
    AdminLevel, Decision, Denial, DenialReason, HierarchyKind, NodeId, NodeSlot,
};
use civic_hierarchy::HierarchyStore;
use uuid::Uuid;

use crate::actor::Actor;
use crate::audit::{AuditExt, Operation};
use crate::jurisdiction::{self, JurisdictionScope, SqlBind, SqlPredicate};

// ─── Targeting columns ───────────────────────────────────────────────

/// The eleven optional targeting references persisted on content rows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetColumns {
    /// `target_national_id`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub national: Option<NodeId>,
    /// `target_region_id`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<NodeId>,
    /// `target_locality_id`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locality: Option<NodeId>,
    /// `target_admin_unit_id`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub admin_unit: Option<NodeId>,
    /// `target_district_id`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub district: Option<NodeId>,
    /// `target_expatriate_region_id`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expatriate_region: Option<NodeId>,
    /// `target_sector_national_id`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sector_national: Option<NodeId>,
    /// `target_sector_region_id`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sector_region: Option<NodeId>,
    /// `target_sector_locality_id`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sector_locality: Option<NodeId>,
    /// `target_sector_admin_unit_id`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sector_admin_unit: Option<NodeId>,
    /// `target_sector_district_id`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sector_district: Option<NodeId>,
}

impl TargetColumns {
    /// Columns with only `slot` set.
    pub fn single(slot: NodeSlot, node: NodeId) -> Self {
        let mut out = Self::default();
        out.set(slot, Some(node));
        out
    }

    fn field(&mut self, slot: NodeSlot) -> &mut Option<NodeId> {
        match slot {
            NodeSlot::National => &mut self.national,
            NodeSlot::Region => &mut self.region,
            NodeSlot::Locality => &mut self.locality,
            NodeSlot::AdminUnit => &mut self.admin_unit,
            NodeSlot::District => &mut self.district,
            NodeSlot::ExpatriateRegion => &mut self.expatriate_region,
            NodeSlot::SectorNational => &mut self.sector_national,
            NodeSlot::SectorRegion => &mut self.sector_region,
            NodeSlot::SectorLocality => &mut self.sector_locality,
            NodeSlot::SectorAdminUnit => &mut self.sector_admin_unit,
            NodeSlot::SectorDistrict => &mut self.sector_district,
        }
    }

    /// The reference in `slot`.
    pub fn get(&self, slot: NodeSlot) -> Option<NodeId> {
        match slot {
            NodeSlot::National => self.national,
            NodeSlot::Region => self.region,
            NodeSlot::Locality => self.locality,
            NodeSlot::AdminUnit => self.admin_unit,
            NodeSlot::District => self.district,
            NodeSlot::ExpatriateRegion => self.expatriate_region,
            NodeSlot::SectorNational => self.sector_national,
            NodeSlot::SectorRegion => self.sector_region,
            NodeSlot::SectorLocality => self.sector_locality,
            NodeSlot::SectorAdminUnit => self.sector_admin_unit,
            NodeSlot::SectorDistrict => self.sector_district,
        }
    }

    /// Set or clear `slot`.
    pub fn set(&mut self, slot: NodeSlot, node: Option<NodeId>) {
        *self.field(slot) = node;
    }

    /// Every set column.
    pub fn entries(&self) -> Vec<(NodeSlot, NodeId)> {
        NodeSlot::all()
            .iter()
            .filter_map(|s| self.get(*s).map(|n| (*s, n)))
            .collect()
    }

    /// Whether no column is set.
    pub fn is_untargeted(&self) -> bool {
        self.entries().is_empty()
    }

    /// Kinds with at least one column set.
    pub fn kinds(&self) -> BTreeSet<HierarchyKind> {
        self.entries().iter().map(|(s, _)| s.kind()).collect()
    }

    /// The most specific set column of `kind`.
    pub fn governing(&self, kind: HierarchyKind) -> Option<(NodeSlot, NodeId)> {
        self.entries()
            .into_iter()
            .filter(|(s, _)| s.kind() == kind)
            .max_by_key(|(s, _)| s.depth())
    }
}

/// Where a content item is aimed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "scope", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ContentTarget {
    /// Everyone.
    Global,
    /// A node and the viewers bound beneath it.
    Node {
        /// Kind of the node.
        kind: HierarchyKind,
        /// Column holding the reference.
        slot: NodeSlot,
        /// The target node.
        node_id: NodeId,
    },
}

impl ContentTarget {
    /// The persisted column form.
    pub fn to_columns(&self) -> TargetColumns {
        match self {
            Self::Global => TargetColumns::default(),
            Self::Node { slot, node_id, .. } => TargetColumns::single(*slot, *node_id),
        }
    }

    /// The target node, if not global.
    pub fn node_id(&self) -> Option<NodeId> {
        match self {
            Self::Global => None,
            Self::Node { node_id, .. } => Some(*node_id),
        }
    }
}

// ─── Read path ───────────────────────────────────────────────────────

/// The viewer's active node, if it exists, is active, and matches the
/// binding's kind.
fn viewer_node(store: &HierarchyStore, viewer: &Actor) -> Option<(HierarchyKind, NodeId)> {
    let binding = viewer.binding?;
    let node = store.get_active(binding.node_id())?;
    (node.kind() == binding.kind()).then_some((node.kind(), node.id))
}

/// Whether `viewer` may read content with `targets`.
pub fn is_visible(store: &HierarchyStore, viewer: &Actor, targets: &TargetColumns) -> bool {
    if targets.is_untargeted() {
        return true;
    }
    let Some((kind, node)) = viewer_node(store, viewer) else {
        return false;
    };
    let Some((_, target)) = targets.governing(kind) else {
        return false;
    };
    store.get_active(target).is_some() && store.is_ancestor_or_self(target, node)
}

/// A bulk form of [`is_visible`] for one viewer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VisibilityPredicate {
    /// The viewer's active kind, or `None` if the viewer has no usable
    /// binding.
    pub kind: Option<HierarchyKind>,
    /// Active nodes on the viewer's same-kind chain, the viewer's node
    /// included.
    pub chain: BTreeSet<NodeId>,
}

/// Build the bulk predicate for `viewer`.
pub fn build_predicate(store: &HierarchyStore, viewer: &Actor) -> VisibilityPredicate {
    match viewer_node(store, viewer) {
        Some((kind, node)) => VisibilityPredicate {
            kind: Some(kind),
            chain: store
                .chain(node)
                .into_iter()
                .filter(|n| n.is_active())
                .map(|n| n.id)
                .collect(),
        },
        None => VisibilityPredicate {
            kind: None,
            chain: BTreeSet::new(),
        },
    }
}

impl VisibilityPredicate {
    /// Evaluate the predicate against one row.
    pub fn matches(&self, targets: &TargetColumns) -> bool {
        if targets.is_untargeted() {
            return true;
        }
        self.kind
            .and_then(|k| targets.governing(k))
            .is_some_and(|(_, n)| self.chain.contains(&n))
    }

    /// Render as SQL over the eleven `target_*` columns, numbering the
    /// placeholder from `first_bind`.
    ///
    /// The most-specific-wins rule becomes a `COALESCE` from the deepest
    /// column of the kind to the shallowest.
    pub fn to_sql(&self, first_bind: usize) -> SqlPredicate {
        let untargeted = NodeSlot::all()
            .iter()
            .map(|s| format!("{} IS NULL", s.column()))
            .collect::<Vec<_>>()
            .join(" AND ");
        let Some(kind) = self.kind else {
            return SqlPredicate {
                clause: format!("({untargeted})"),
                binds: Vec::new(),
            };
        };
        let mut columns: Vec<NodeSlot> = NodeSlot::all()
            .iter()
            .copied()
            .filter(|s| s.kind() == kind)
            .collect();
        columns.sort_by_key(|s| std::cmp::Reverse(s.depth()));
        let governing = columns
            .iter()
            .map(|s| s.column())
            .collect::<Vec<_>>()
            .join(", ");
        SqlPredicate {
            clause: format!("(({untargeted}) OR COALESCE({governing}) = ANY(${first_bind}))"),
            binds: vec![SqlBind::Nodes(
                self.chain.iter().map(|n| *n.as_uuid()).collect::<Vec<Uuid>>(),
            )],
        }
    }
}

// ─── Write path ──────────────────────────────────────────────────────

/// Validate requested targeting and collapse it to one target.
///
/// Checks, in order: one kind only (`AMBIGUOUS_TARGET`); each referenced
/// node exists and is active (`NODE_NOT_FOUND`); each node's class fits
/// its column (`LEVEL_NODE_MISMATCH`); every shallower reference is an
/// ancestor of the deepest (`AMBIGUOUS_TARGET`).
pub fn normalize_targeting(
    store: &HierarchyStore,
    targets: &TargetColumns,
) -> Decision<ContentTarget> {
    let entries = targets.entries();
    if entries.is_empty() {
        return Ok(ContentTarget::Global);
    }
    let kinds = targets.kinds();
    if kinds.len() > 1 {
        return Err(Denial::new(
            DenialReason::AmbiguousTarget,
            format!(
                "targeting spans {} hierarchy kinds",
                kinds.iter().map(|k| k.as_str()).collect::<Vec<_>>().join(", ")
            ),
        ));
    }

    for (slot, node_id) in &entries {
        let node = store
            .get_active(*node_id)
            .ok_or_else(|| Denial::node_not_found(node_id))?;
        if !slot.accepts(&node.class) {
            return Err(Denial::new(
                DenialReason::LevelNodeMismatch,
                format!("{} cannot hold {} node {}", slot.column(), node.class, node.code),
            ));
        }
    }

    let Some(&(slot, deepest)) = entries.iter().max_by_key(|(s, _)| s.depth()) else {
        return Ok(ContentTarget::Global);
    };
    for (other_slot, other) in &entries {
        if *other != deepest && !store.is_ancestor_or_self(*other, deepest) {
            return Err(Denial::new(
                DenialReason::AmbiguousTarget,
                format!(
                    "{} and {} reference different branches",
                    other_slot.column(),
                    slot.column()
                ),
            ));
        }
    }
    Ok(ContentTarget::Node {
        kind: slot.kind(),
        slot,
        node_id: deepest,
    })
}

/// Decide the target of content an administrator is creating.
///
/// With no (or empty) requested targeting, the creator's own bound node is
/// used; unscoped creators publish globally. An explicit target must normalise cleanly and lie within the
/// creator's jurisdiction.
pub fn resolve_target(
    store: &HierarchyStore,
    creator: &Actor,
    requested: Option<&TargetColumns>,
) -> Decision<ContentTarget> {
    let node_hint = requested
        .and_then(|t| t.entries().into_iter().max_by_key(|(s, _)| s.depth()))
        .map(|(_, n)| n)
        .or(creator.node_id());
    decide_target(store, creator, requested).audited(creator, Operation::TargetContent, node_hint)
}

fn decide_target(
    store: &HierarchyStore,
    creator: &Actor,
    requested: Option<&TargetColumns>,
) -> Decision<ContentTarget> {
    if creator.admin_level == AdminLevel::User {
        return Err(Denial::new(
            DenialReason::InsufficientLevel,
            "members cannot publish targeted content",
        ));
    }
    let scope = jurisdiction::resolve(store, creator);

    match requested.filter(|t| !t.is_untargeted()) {
        None => default_target(store, creator, &scope),
        Some(targets) => {
            let target = normalize_targeting(store, targets)?;
            match target {
                ContentTarget::Global if scope == JurisdictionScope::Unrestricted => Ok(target),
                ContentTarget::Global => Err(Denial::new(
                    DenialReason::OutOfJurisdiction,
                    "only unscoped administrators may publish globally",
                )),
                ContentTarget::Node { kind, node_id, .. } => {
                    if scope.contains(node_id, kind) {
                        Ok(target)
                    } else if scope.kind().is_some_and(|k| k != kind) {
                        Err(Denial::new(
                            DenialReason::HierarchyKindMismatch,
                            format!(
                                "target {node_id} is in {kind}, creator administers {}",
                                creator.active_hierarchy
                            ),
                        ))
                    } else {
                        Err(Denial::new(
                            DenialReason::OutOfJurisdiction,
                            format!("target {node_id} is outside the creator's jurisdiction"),
                        ))
                    }
                }
            }
        }
    }
}

fn default_target(
    store: &HierarchyStore,
    creator: &Actor,
    scope: &JurisdictionScope,
) -> Decision<ContentTarget> {
    match creator.binding {
        None if *scope == JurisdictionScope::Unrestricted => Ok(ContentTarget::Global),
        None => Err(Denial::new(
            DenialReason::AmbiguousTarget,
            "creator has no bound node; an explicit target is required",
        )),
        Some(binding) => {
            let node = store
                .get_active(binding.node_id())
                .ok_or_else(|| Denial::node_not_found(binding.node_id()))?;
            Ok(ContentTarget::Node {
                kind: node.kind(),
                slot: node.class.slot(),
                node_id: node.id,
            })
        }
    }
}

/// Whether `actor` may edit or archive content with `targets`.
///
/// Every kind the content targets must have its governing node inside the
/// actor's jurisdiction. Inactive targets still count, so history stays
/// manageable. Untargeted content is manageable by unscoped actors only.
pub fn can_manage(store: &HierarchyStore, actor: &Actor, targets: &TargetColumns) -> Decision {
    let node_hint = targets.entries().first().map(|(_, n)| *n);
    decide_manage(store, actor, targets).audited(actor, Operation::ManageContent, node_hint)
}

fn decide_manage(store: &HierarchyStore, actor: &Actor, targets: &TargetColumns) -> Decision {
    if actor.admin_level == AdminLevel::User {
        return Err(Denial::new(
            DenialReason::InsufficientLevel,
            "members cannot manage content",
        ));
    }
    let scope = jurisdiction::resolve(store, actor);
    if scope == JurisdictionScope::Unrestricted {
        return Ok(());
    }
    if targets.is_untargeted() {
        return Err(Denial::new(
            DenialReason::OutOfJurisdiction,
            "global content is managed by unscoped administrators only",
        ));
    }
    for kind in targets.kinds() {
        if let Some((_, node)) = targets.governing(kind) {
            if !scope.contains(node, kind) {
                return Err(Denial::new(
                    DenialReason::OutOfJurisdiction,
                    format!("target {node} is outside the actor's jurisdiction"),
                ));
            }
        }
    }
    Ok(())
}

/// Whether `actor` may manage content, without logging. Used to filter
/// listings, where a miss is not a refused request.
pub fn is_manageable(store: &HierarchyStore, actor: &Actor, targets: &TargetColumns) -> bool {
    decide_manage(store, actor, targets).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use civic_core::{NodeClass, NodeCode, Tier};
    use civic_hierarchy::NewNode;

    struct Fixture {
        store: HierarchyStore,
        region: NodeId,
        locality: NodeId,
        district: NodeId,
        other_district: NodeId,
        other_region: NodeId,
    }

    fn add(store: &mut HierarchyStore, code: &str, tier: Tier, parent: Option<NodeId>) -> NodeId {
        store
            .create_node(NewNode {
                code: NodeCode::new(code).unwrap(),
                name: code.into(),
                class: NodeClass::Geographic { tier },
                parent_id: parent,
            })
            .unwrap()
    }

    fn fixture() -> Fixture {
        let mut store = HierarchyStore::new();
        let region = add(&mut store, "R", Tier::Region, None);
        let locality = add(&mut store, "L", Tier::Locality, Some(region));
        let unit = add(&mut store, "U", Tier::AdminUnit, Some(locality));
        let district = add(&mut store, "D", Tier::District, Some(unit));
        let other_unit = add(&mut store, "U2", Tier::AdminUnit, Some(locality));
        let other_district = add(&mut store, "D2", Tier::District, Some(other_unit));
        let other_region = add(&mut store, "R2", Tier::Region, None);
        Fixture {
            store,
            region,
            locality,
            district,
            other_district,
            other_region,
        }
    }

    fn member(f: &Fixture, node: NodeId) -> Actor {
        let class = f.store.get(node).unwrap().class;
        Actor::member_at(node, class)
    }

    #[test]
    fn governing_prefers_deepest_of_kind() {
        let region = NodeId::new();
        let district = NodeId::new();
        let mut t = TargetColumns::single(NodeSlot::Region, region);
        t.set(NodeSlot::District, Some(district));
        assert_eq!(
            t.governing(HierarchyKind::Geographic),
            Some((NodeSlot::District, district))
        );
        assert_eq!(t.governing(HierarchyKind::Sector), None);
    }

    #[test]
    fn stale_shallow_field_does_not_widen() {
        let f = fixture();
        let mut t = TargetColumns::single(NodeSlot::Region, f.region);
        t.set(NodeSlot::District, Some(f.district));
        assert!(is_visible(&f.store, &member(&f, f.district), &t));
        assert!(!is_visible(&f.store, &member(&f, f.other_district), &t));
    }

    #[test]
    fn predicate_agrees_with_point_check() {
        let f = fixture();
        let targets = [
            TargetColumns::default(),
            TargetColumns::single(NodeSlot::Region, f.region),
            TargetColumns::single(NodeSlot::Locality, f.locality),
            TargetColumns::single(NodeSlot::District, f.district),
            TargetColumns::single(NodeSlot::Region, f.other_region),
        ];
        for viewer_node in [f.region, f.district, f.other_district, f.other_region] {
            let viewer = member(&f, viewer_node);
            let predicate = build_predicate(&f.store, &viewer);
            for t in &targets {
                assert_eq!(predicate.matches(t), is_visible(&f.store, &viewer, t));
            }
        }
    }

    #[test]
    fn inactive_target_is_hidden() {
        let mut f = fixture();
        let t = TargetColumns::single(NodeSlot::District, f.other_district);
        let viewer = member(&f, f.other_district);
        assert!(is_visible(&f.store, &viewer, &t));
        f.store
            .deactivate(f.other_district, &|_: NodeId| 0usize)
            .unwrap();
        assert!(!is_visible(&f.store, &viewer, &t));
        // The viewer's own node is inactive now: only global content remains.
        assert!(is_visible(&f.store, &viewer, &TargetColumns::default()));
    }

    #[test]
    fn normalize_collapses_one_branch() {
        let f = fixture();
        let mut t = TargetColumns::single(NodeSlot::Region, f.region);
        t.set(NodeSlot::District, Some(f.district));
        assert_eq!(
            normalize_targeting(&f.store, &t).unwrap(),
            ContentTarget::Node {
                kind: HierarchyKind::Geographic,
                slot: NodeSlot::District,
                node_id: f.district,
            }
        );
    }

    #[test]
    fn normalize_rejects_diverging_branches() {
        let f = fixture();
        let mut t = TargetColumns::single(NodeSlot::Region, f.other_region);
        t.set(NodeSlot::District, Some(f.district));
        assert_eq!(
            normalize_targeting(&f.store, &t).unwrap_err().reason,
            DenialReason::AmbiguousTarget
        );
    }

    #[test]
    fn normalize_rejects_slot_misuse() {
        let f = fixture();
        let t = TargetColumns::single(NodeSlot::Region, f.district);
        assert_eq!(
            normalize_targeting(&f.store, &t).unwrap_err().reason,
            DenialReason::LevelNodeMismatch
        );
        let t = TargetColumns::single(NodeSlot::Region, NodeId::new());
        assert_eq!(
            normalize_targeting(&f.store, &t).unwrap_err().reason,
            DenialReason::NodeNotFound
        );
    }

    #[test]
    fn default_target_is_creator_node() {
        let f = fixture();
        let admin = Actor::bound(
            AdminLevel::Locality,
            f.locality,
            NodeClass::Geographic {
                tier: Tier::Locality,
            },
        );
        assert_eq!(
            resolve_target(&f.store, &admin, None).unwrap(),
            ContentTarget::Node {
                kind: HierarchyKind::Geographic,
                slot: NodeSlot::Locality,
                node_id: f.locality,
            }
        );
        assert_eq!(
            resolve_target(&f.store, &Actor::root_admin(), None).unwrap(),
            ContentTarget::Global
        );
    }

    #[test]
    fn national_default_target_stays_geographic() {
        let mut store = HierarchyStore::new();
        let national = store
            .create_node(NewNode {
                code: NodeCode::new("SD").unwrap(),
                name: "SD".into(),
                class: NodeClass::Geographic {
                    tier: Tier::National,
                },
                parent_id: None,
            })
            .unwrap();
        let region = add(&mut store, "KRT", Tier::Region, Some(national));
        let gulf = store
            .create_node(NewNode {
                code: NodeCode::new("GULF").unwrap(),
                name: "GULF".into(),
                class: NodeClass::ExpatriateRegion,
                parent_id: None,
            })
            .unwrap();
        let author = Actor::bound(
            AdminLevel::NationalLevel,
            national,
            NodeClass::Geographic {
                tier: Tier::National,
            },
        );

        let target = resolve_target(&store, &author, None).unwrap();
        assert_eq!(
            target,
            ContentTarget::Node {
                kind: HierarchyKind::Geographic,
                slot: NodeSlot::National,
                node_id: national,
            }
        );
        let columns = target.to_columns();
        let expatriate = Actor::member_at(gulf, NodeClass::ExpatriateRegion);
        assert!(!is_visible(&store, &expatriate, &columns));
        let local = Actor::member_at(region, NodeClass::Geographic { tier: Tier::Region });
        assert!(is_visible(&store, &local, &columns));
        assert!(can_manage(&store, &author, &columns).is_ok());
    }

    #[test]
    fn explicit_target_must_be_in_jurisdiction() {
        let f = fixture();
        let admin = Actor::bound(
            AdminLevel::Locality,
            f.locality,
            NodeClass::Geographic {
                tier: Tier::Locality,
            },
        );
        let inside = TargetColumns::single(NodeSlot::District, f.district);
        assert!(resolve_target(&f.store, &admin, Some(&inside)).is_ok());
        let outside = TargetColumns::single(NodeSlot::Region, f.other_region);
        assert_eq!(
            resolve_target(&f.store, &admin, Some(&outside)).unwrap_err().reason,
            DenialReason::OutOfJurisdiction
        );
        let upward = TargetColumns::single(NodeSlot::Region, f.region);
        assert_eq!(
            resolve_target(&f.store, &admin, Some(&upward)).unwrap_err().reason,
            DenialReason::OutOfJurisdiction
        );
    }

    #[test]
    fn manage_requires_jurisdiction() {
        let f = fixture();
        let admin = Actor::bound(
            AdminLevel::Region,
            f.region,
            NodeClass::Geographic { tier: Tier::Region },
        );
        let own = TargetColumns::single(NodeSlot::District, f.district);
        assert!(can_manage(&f.store, &admin, &own).is_ok());
        let foreign = TargetColumns::single(NodeSlot::Region, f.other_region);
        assert_eq!(
            can_manage(&f.store, &admin, &foreign).unwrap_err().reason,
            DenialReason::OutOfJurisdiction
        );
        assert!(can_manage(&f.store, &admin, &TargetColumns::default()).is_err());
        assert!(can_manage(&f.store, &Actor::root_admin(), &TargetColumns::default()).is_ok());
        assert!(!is_manageable(&f.store, &member(&f, f.district), &own));
    }

    #[test]
    fn predicate_sql_uses_coalesce() {
        let f = fixture();
        let viewer = member(&f, f.district);
        let sql = build_predicate(&f.store, &viewer).to_sql(1);
        assert!(sql.clause.contains(
            "COALESCE(target_district_id, target_admin_unit_id, target_locality_id, \
             target_region_id, target_national_id) = ANY($1)"
        ));
        match &sql.binds[0] {
            SqlBind::Nodes(ids) => assert_eq!(ids.len(), 4),
            other => panic!("unexpected bind {other:?}"),
        }
        let unbound = build_predicate(&f.store, &Actor::root_admin()).to_sql(1);
        assert!(unbound.binds.is_empty());
        assert!(unbound.clause.starts_with("(target_national_id IS NULL"));
    }
}
