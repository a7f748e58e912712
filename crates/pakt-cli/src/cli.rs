//! CLI argument definitions for pakt.
//!
//! Uses `clap` derive macros to define the command surface. Each command
//! corresponds to a handler in the [`super::commands`] module.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "pakt",
    version,
    about = "A deterministic dependency resolver and installer core",
    long_about = "pakt resolves a package manifest's dependency ranges into a concrete, \
                  deduplicated graph and hoists it into a node_modules layout compatible \
                  with ancestor-walking module resolution."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Resolve dependencies and compute the install layout
    Install {
        /// Fail instead of resolving anything not pinned by the lockfile
        #[arg(long)]
        frozen: bool,
        /// Install every module into this one shared folder
        #[arg(long)]
        modules_folder: Option<PathBuf>,
        /// Prompt to pick a version when no published version satisfies
        /// a range
        #[arg(short, long)]
        interactive: bool,
        /// Print the computed layout without writing the lockfile
        #[arg(long)]
        dry_run: bool,
    },

    /// Print the resolved dependency tree
    Tree {
        /// Limit the printed depth
        #[arg(short, long)]
        depth: Option<usize>,
    },

    /// Explain why a package is installed
    Why {
        /// Package name or name@version
        package: String,
    },
}

pub fn parse() -> Cli {
    Cli::parse()
}
