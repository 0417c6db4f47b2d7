//! TreePages CLI.
//!
//! Provides commands for:
//! - `serve`: Start the HTTP server
//! - `tree`: Print the page tree as an outline
//! - `check`: Verify the nested-set invariants of the stored trees
//! - `move`: Move a page relative to another, or by an arrow action

mod commands;
mod error;
mod output;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use commands::{CheckArgs, MoveArgs, ServeArgs, TreeArgs};
use output::Output;

/// Application version from Cargo.toml.
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// TreePages - nested-set page tree.
#[derive(Parser)]
#[command(name = "tp", version, about)]
struct Cli {
    /// Enable verbose output (info-level logs).
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server.
    Serve(ServeArgs),
    /// Print the page tree.
    Tree(TreeArgs),
    /// Verify tree invariants.
    Check(CheckArgs),
    /// Move a page.
    Move(MoveArgs),
}

fn main() {
    let cli = Cli::parse();
    let output = Output::new();

    // --verbose enables INFO level, otherwise use RUST_LOG or default to WARN
    let filter = if cli.verbose {
        EnvFilter::new("info")
    } else {
        EnvFilter::from_default_env()
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(err) => {
            output.error(&format!("Error: failed to create tokio runtime: {err}"));
            std::process::exit(1);
        }
    };

    let result = rt.block_on(async {
        match cli.command {
            Commands::Serve(args) => args.execute(VERSION).await,
            Commands::Tree(args) => args.execute().await,
            Commands::Check(args) => args.execute().await,
            Commands::Move(args) => args.execute().await,
        }
    });

    if let Err(err) = result {
        output.error(&format!("Error: {err}"));
        std::process::exit(1);
    }
}
