//! # civic CLI entry point
//!
//! Parses command-line arguments and dispatches to subcommand handlers.

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use civic_cli::closure::{run_closure, ClosureArgs};
use civic_cli::validate::{run_validate, ValidateArgs};
use civic_cli::visible::{run_visible, VisibleArgs};

/// Offline tooling for civic hierarchy seed files.
#[derive(Parser, Debug)]
#[command(name = "civic", version, about, long_about = None)]
struct Cli {
    /// Enable verbose output. Repeat for more verbosity (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Load a seed through the structural guard and summarise it.
    Validate(ValidateArgs),

    /// Print the jurisdiction closure of a node.
    Closure(ClosureArgs),

    /// Check whether content aimed at one node reaches a member at another.
    Visible(VisibleArgs),
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => EnvFilter::new("warn"),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let mut stdout = std::io::stdout().lock();
    let result = match cli.command {
        Commands::Validate(args) => run_validate(&args, &mut stdout),
        Commands::Closure(args) => run_closure(&args, &mut stdout),
        Commands::Visible(args) => run_visible(&args, &mut stdout),
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            tracing::error!("{e:#}");
            eprintln!("error: {e:#}");
            ExitCode::from(2)
        }
    }
}
