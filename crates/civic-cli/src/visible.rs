//! # Visible Subcommand
//!
//! Answers whether content targeted at one node reaches a member bound at
//! another, using the same filter the API applies to content listings.

use std::io::Write;
use std::path::PathBuf;

use anyhow::Result;
use civic_access::{is_visible, Actor, TargetColumns};
use clap::Args;

/// Arguments for the `civic visible` subcommand.
#[derive(Args, Debug)]
pub struct VisibleArgs {
    /// Hierarchy seed file (YAML).
    #[arg(value_name = "SEED")]
    pub seed: PathBuf,

    /// Code of the node the viewing member is bound to.
    #[arg(long)]
    pub viewer: String,

    /// Code of the node the content targets.
    #[arg(long)]
    pub target: String,
}

/// Execute the visible subcommand. Exits 0 when visible, 1 when not.
pub fn run_visible(args: &VisibleArgs, out: &mut impl Write) -> Result<u8> {
    let store = crate::load_store(&args.seed)?;
    let viewer = crate::find_node(&store, &args.viewer, None)?;
    let target = crate::find_node(&store, &args.target, None)?;
    let slot = target.class.slot();

    let member = Actor::member_at(viewer.id, viewer.class);
    let visible = is_visible(&store, &member, &TargetColumns::single(slot, target.id));
    tracing::debug!(viewer = %viewer.id, target = %target.id, visible, "visibility evaluated");

    let verdict = if visible { "VISIBLE" } else { "HIDDEN" };
    writeln!(
        out,
        "{verdict}: {} content for a member at {}",
        target.code.as_str(),
        viewer.code.as_str()
    )?;
    Ok(if visible { 0 } else { 1 })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{seed_file, SEED};

    fn run(viewer: &str, target: &str) -> u8 {
        let file = seed_file(SEED);
        let args = VisibleArgs {
            seed: file.path().to_path_buf(),
            viewer: viewer.into(),
            target: target.into(),
        };
        run_visible(&args, &mut Vec::<u8>::new()).unwrap()
    }

    #[test]
    fn ancestor_targets_reach_the_member() {
        assert_eq!(run("KRT-KRT-E-JS", "KRT"), 0);
        assert_eq!(run("KRT-KRT-E-JS", "KRT-KRT-E-JS"), 0);
    }

    #[test]
    fn other_branches_stay_hidden() {
        assert_eq!(run("KRT-KRT-E-JS", "NK"), 1);
        assert_eq!(run("KRT-KRT-E-JS", "KRT-KRT-E-BR"), 1);
        assert_eq!(run("KRT-KRT-E-JS", "SOC-KRT"), 1);
    }
}
