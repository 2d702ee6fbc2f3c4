//! # Closure Subcommand
//!
//! Prints the jurisdiction closure of a node: the node itself and every
//! descendant of the same kind, as an administrator bound there would see
//! it.

use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use civic_core::NodeClass;

/// Arguments for the `civic closure` subcommand.
#[derive(Args, Debug)]
pub struct ClosureArgs {
    /// Hierarchy seed file (YAML).
    #[arg(value_name = "SEED")]
    pub seed: PathBuf,

    /// Code of the node whose closure to print.
    #[arg(long)]
    pub code: String,

    /// Class of the node, e.g. `GEOGRAPHIC/REGION`, when the code is shared.
    #[arg(long)]
    pub class: Option<String>,
}

/// Execute the closure subcommand.
pub fn run_closure(args: &ClosureArgs, out: &mut impl Write) -> Result<u8> {
    let store = crate::load_store(&args.seed)?;
    let class = args
        .class
        .as_deref()
        .map(str::parse::<NodeClass>)
        .transpose()
        .context("invalid --class")?;
    let root = crate::find_node(&store, &args.code, class.as_ref())?;

    let closure = store.closure(root.id);
    let mut nodes: Vec<_> = closure.iter().filter_map(|id| store.get(*id)).collect();
    nodes.sort_by_key(|n| (store.ancestors(n.id).len(), n.code.as_str().to_string()));

    writeln!(out, "{} ({}): {} nodes", root.code.as_str(), root.class, nodes.len())?;
    for node in nodes {
        let depth = store.ancestors(node.id).len().saturating_sub(store.ancestors(root.id).len());
        writeln!(
            out,
            "{}{} {} [{}]",
            "  ".repeat(depth),
            node.code.as_str(),
            node.name,
            node.class
        )?;
    }
    Ok(0)
}
