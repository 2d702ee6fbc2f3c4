//! # civic-cli: Offline Hierarchy Tooling
//!
//! Provides the `civic` command-line interface for working with hierarchy
//! seed files without a running service.
//!
//! ## Subcommands
//!
//! - `civic validate`: load a seed through the mutation guard and print
//!   node counts per class.
//! - `civic closure`: print the jurisdiction closure of a node.
//! - `civic visible`: answer whether content aimed at one node reaches a
//!   member bound at another.
//!
//! ```bash
//! civic validate crates/civic-hierarchy/fixtures/sudan.yaml
//! civic closure crates/civic-hierarchy/fixtures/sudan.yaml --code KRT
//! civic visible crates/civic-hierarchy/fixtures/sudan.yaml --viewer KRT-KRT-E-JS --target KRT
//! ```
//!
//! Handlers write to a caller-supplied sink and return the process exit
//! code: 0 on success, 1 on a negative answer or validation failure.

pub mod closure;
pub mod validate;
pub mod visible;

use std::path::Path;

use anyhow::{bail, Context, Result};
use civic_core::NodeClass;
use civic_hierarchy::{HierarchyNode, HierarchyStore};

/// Load a seed file through the guard.
pub fn load_store(seed: &Path) -> Result<HierarchyStore> {
    civic_hierarchy::load_seed_file(seed)
        .with_context(|| format!("failed to load seed {}", seed.display()))
}

/// Look a node up by code, narrowed by class when codes repeat across
/// classes.
pub fn find_node<'a>(
    store: &'a HierarchyStore,
    code: &str,
    class: Option<&NodeClass>,
) -> Result<&'a HierarchyNode> {
    let mut matches: Vec<&HierarchyNode> = store
        .iter()
        .filter(|n| n.code.as_str() == code)
        .filter(|n| class.map_or(true, |c| &n.class == c))
        .collect();
    match matches.len() {
        0 => bail!("no node with code {code}"),
        1 => Ok(matches.remove(0)),
        n => bail!("{n} nodes share code {code}; pass --class to choose one"),
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::io::Write;

    use tempfile::NamedTempFile;

    pub const SEED: &str = include_str!("../../civic-hierarchy/fixtures/sudan.yaml");

    /// Write `text` to a temporary seed file.
    pub fn seed_file(text: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(text.as_bytes()).unwrap();
        file
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn find_node_by_code() {
        let store = civic_hierarchy::load_seed(testing::SEED).unwrap();
        let node = find_node(&store, "KRT", None).unwrap();
        assert_eq!(node.name, "الخرطوم");
        assert!(find_node(&store, "NOPE", None).is_err());
    }

    #[test]
    fn find_node_narrows_by_class() {
        let store = civic_hierarchy::load_seed(testing::SEED).unwrap();
        let region: NodeClass = "GEOGRAPHIC/REGION".parse().unwrap();
        assert!(find_node(&store, "KRT", Some(&region)).is_ok());
        let district: NodeClass = "GEOGRAPHIC/DISTRICT".parse().unwrap();
        assert!(find_node(&store, "KRT", Some(&district)).is_err());
    }
}
