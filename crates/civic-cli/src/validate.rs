//! # Validate Subcommand
//!
//! Loads a seed file through the mutation guard, so a file that validates
//! here is one the API will accept at boot.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::PathBuf;

use anyhow::Result;
use clap::Args;

/// Arguments for the `civic validate` subcommand.
#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// Hierarchy seed file (YAML).
    #[arg(value_name = "SEED")]
    pub seed: PathBuf,
}

/// Execute the validate subcommand.
///
/// Prints one line per class with its node count. A seed that violates a
/// structural rule is reported and exits 1.
pub fn run_validate(args: &ValidateArgs, out: &mut impl Write) -> Result<u8> {
    let store = match civic_hierarchy::load_seed_file(&args.seed) {
        Ok(store) => store,
        Err(e) => {
            writeln!(out, "FAIL: {}: {e}", args.seed.display())?;
            return Ok(1);
        }
    };

    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    for node in store.iter() {
        *counts.entry(node.class.to_string()).or_default() += 1;
    }
    tracing::info!(seed = %args.seed.display(), nodes = store.len(), "seed validated");

    writeln!(out, "OK: {} nodes", store.len())?;
    for (class, count) in &counts {
        writeln!(out, "  {class:<32} {count}")?;
    }
    Ok(0)
}
