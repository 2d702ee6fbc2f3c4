//! # Seed Import
//!
//! Loads a hierarchy from YAML. Nodes are created through the mutation
//! guard in file order, so a seed file is subject to exactly the same
//! structural rules as live writes.
//!
//! ```yaml
//! nodes:
//!   - code: KRT
//!     name: الخرطوم
//!     class: GEOGRAPHIC/REGION
//!   - code: KRT-L
//!     name: محلية الخرطوم
//!     class: GEOGRAPHIC/LOCALITY
//!     parent: KRT
//! ```
//!
//! `parent` is a code, resolved among the classes that may legally parent
//! the node. When two such classes share the code, `parent_class` picks
//! one.

use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

use civic_core::error::validate_name;
use civic_core::{Denial, NodeClass, NodeCode, NodeId, ValidationError};

use crate::store::{HierarchyStore, NewNode};

/// A parsed seed file.
#[derive(Debug, Clone, Deserialize)]
pub struct SeedDocument {
    /// Nodes in creation order.
    pub nodes: Vec<SeedNode>,
}

/// One node entry.
#[derive(Debug, Clone, Deserialize)]
pub struct SeedNode {
    /// Node code.
    pub code: NodeCode,
    /// Display name.
    pub name: String,
    /// Class in `KIND/…` form, e.g. `SECTOR/SOCIAL/REGION`.
    pub class: String,
    /// Parent code.
    #[serde(default)]
    pub parent: Option<NodeCode>,
    /// Disambiguates `parent` when several parent classes share the code.
    #[serde(default)]
    pub parent_class: Option<String>,
}

/// Errors from seed import.
#[derive(Error, Debug)]
pub enum SeedError {
    /// The file could not be read.
    #[error("failed to read seed file: {0}")]
    Io(#[from] std::io::Error),

    /// The document is not valid YAML for the seed schema.
    #[error("failed to parse seed document: {0}")]
    Parse(#[from] serde_yaml::Error),

    /// A field of a node entry is invalid.
    #[error("node {code}: {source}")]
    Invalid {
        /// Offending node code.
        code: NodeCode,
        /// What was wrong.
        #[source]
        source: ValidationError,
    },

    /// No node with the parent code exists in any allowed parent class.
    #[error("node {code}: unknown parent {parent}")]
    UnknownParent {
        /// Offending node code.
        code: NodeCode,
        /// Parent code as written.
        parent: NodeCode,
    },

    /// The parent code matches nodes in several allowed parent classes.
    #[error("node {code}: parent {parent} matches {matches} nodes, set parent_class")]
    AmbiguousParent {
        /// Offending node code.
        code: NodeCode,
        /// Parent code as written.
        parent: NodeCode,
        /// Number of candidates.
        matches: usize,
    },

    /// The mutation guard refused the node.
    #[error("node {code}: {denial}")]
    Denied {
        /// Offending node code.
        code: NodeCode,
        /// The guard's denial.
        denial: Denial,
    },
}

impl SeedDocument {
    /// Parse a seed document from YAML text.
    pub fn from_yaml(text: &str) -> Result<Self, SeedError> {
        Ok(serde_yaml::from_str(text)?)
    }

    /// Create every node in `store`, in order. Returns the created ids.
    ///
    /// Stops at the first failing entry; nodes created before it remain.
    pub fn apply(&self, store: &mut HierarchyStore) -> Result<Vec<NodeId>, SeedError> {
        let mut created = Vec::with_capacity(self.nodes.len());
        for entry in &self.nodes {
            created.push(apply_entry(store, entry)?);
        }
        tracing::info!(nodes = created.len(), "hierarchy seed applied");
        Ok(created)
    }
}

/// Parse `text` and build a fresh store from it.
pub fn load_seed(text: &str) -> Result<HierarchyStore, SeedError> {
    let doc = SeedDocument::from_yaml(text)?;
    let mut store = HierarchyStore::new();
    doc.apply(&mut store)?;
    Ok(store)
}

/// Read a seed file and build a fresh store from it.
pub fn load_seed_file(path: &Path) -> Result<HierarchyStore, SeedError> {
    let text = std::fs::read_to_string(path)?;
    load_seed(&text)
}

fn apply_entry(store: &mut HierarchyStore, entry: &SeedNode) -> Result<NodeId, SeedError> {
    let invalid = |source| SeedError::Invalid {
        code: entry.code.clone(),
        source,
    };
    let class: NodeClass = entry.class.parse().map_err(invalid)?;
    let name = validate_name(&entry.name).map_err(invalid)?;

    let parent_id = match &entry.parent {
        None => None,
        Some(parent) => Some(resolve_parent(store, entry, &class, parent)?),
    };

    store
        .create_node(NewNode {
            code: entry.code.clone(),
            name,
            class,
            parent_id,
        })
        .map_err(|denial| SeedError::Denied {
            code: entry.code.clone(),
            denial,
        })
}

fn resolve_parent(
    store: &HierarchyStore,
    entry: &SeedNode,
    class: &NodeClass,
    parent: &NodeCode,
) -> Result<NodeId, SeedError> {
    let pinned: Option<NodeClass> = entry
        .parent_class
        .as_deref()
        .map(str::parse::<NodeClass>)
        .transpose()
        .map_err(|source| SeedError::Invalid {
            code: entry.code.clone(),
            source,
        })?;

    let candidates: Vec<NodeId> = NodeClass::all()
        .into_iter()
        .filter(|pc| pinned.map_or(true, |p| p == *pc))
        .filter(|pc| class.check_parent(Some(pc)).is_ok())
        .filter_map(|pc| store.get_by_code(&pc, parent).map(|n| n.id))
        .collect();

    match candidates.as_slice() {
        [id] => Ok(*id),
        [] => Err(SeedError::UnknownParent {
            code: entry.code.clone(),
            parent: parent.clone(),
        }),
        many => Err(SeedError::AmbiguousParent {
            code: entry.code.clone(),
            parent: parent.clone(),
            matches: many.len(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use civic_core::{DenialReason, HierarchyKind, Tier};

    const SAMPLE: &str = include_str!("../fixtures/sudan.yaml");

    #[test]
    fn sample_seed_loads() {
        let store = load_seed(SAMPLE).unwrap();
        assert!(!store.nodes_of_kind(HierarchyKind::Geographic).is_empty());
        assert!(!store.nodes_of_kind(HierarchyKind::Expatriate).is_empty());
        assert!(!store.nodes_of_kind(HierarchyKind::Sector).is_empty());
        let district = store
            .get_by_code(
                &NodeClass::Geographic {
                    tier: Tier::District,
                },
                &NodeCode::new("KRT-KRT-E-JS").unwrap(),
            )
            .unwrap();
        assert_eq!(district.name, "الجريف شرق");
        assert_eq!(store.lineage(district.id).len(), 5);
    }

    #[test]
    fn unknown_parent_is_reported() {
        let yaml = r#"
nodes:
  - code: L1
    name: Orphan
    class: GEOGRAPHIC/LOCALITY
    parent: NOPE
"#;
        let err = load_seed(yaml).unwrap_err();
        assert!(matches!(err, SeedError::UnknownParent { .. }), "{err}");
    }

    #[test]
    fn ambiguous_parent_needs_parent_class() {
        let yaml = r#"
nodes:
  - code: X
    name: Region X
    class: GEOGRAPHIC/REGION
  - code: X
    name: Gulf X
    class: EXPATRIATE_REGION
  - code: X-SOC
    name: Social
    class: SECTOR/SOCIAL/NATIONAL
    parent: X
"#;
        let err = load_seed(yaml).unwrap_err();
        assert!(matches!(err, SeedError::AmbiguousParent { matches: 2, .. }), "{err}");

        let pinned = yaml.replace(
            "parent: X\n",
            "parent: X\n    parent_class: EXPATRIATE_REGION\n",
        );
        let store = load_seed(&pinned).unwrap();
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn guard_denials_carry_the_code() {
        let yaml = r#"
nodes:
  - code: R
    name: Region
    class: GEOGRAPHIC/REGION
  - code: R
    name: Again
    class: GEOGRAPHIC/REGION
"#;
        match load_seed(yaml).unwrap_err() {
            SeedError::Denied { code, denial } => {
                assert_eq!(code.as_str(), "R");
                assert_eq!(denial.reason, DenialReason::DuplicateCode);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn bad_class_is_invalid() {
        let yaml = "nodes:\n  - code: R\n    name: R\n    class: GEOGRAPHIC/CITY\n";
        assert!(matches!(
            load_seed(yaml).unwrap_err(),
            SeedError::Invalid { .. }
        ));
    }
}
