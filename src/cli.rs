// src/cli.rs
//! CLI definitions for arbor
//!
//! This module contains all command-line interface definitions using clap.
//! The actual command implementations are in the `commands` module.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "arbor")]
#[command(author = "Arbor Contributors")]
#[command(version)]
#[command(about = "Dependency solving and reproducible build planning for package trees", long_about = None)]
pub struct Cli {
    /// Path to the catalog file
    #[arg(short, long, global = true, default_value = "arbor.toml")]
    pub catalog: PathBuf,

    /// Path to the configuration file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Resolve packages on top of the installed set
    Install {
        /// Package selectors, e.g. "app/a" or "lib/b >= 2.0"
        #[arg(required = true)]
        packages: Vec<String>,
    },

    /// Compute the packages removed by an uninstall
    Uninstall {
        /// Installed package selectors
        #[arg(required = true)]
        packages: Vec<String>,

        /// Fail if a package that stays installed still needs a candidate
        #[arg(long)]
        check: bool,

        /// Also remove dependencies nothing else needs
        #[arg(long)]
        full: bool,
    },

    /// Upgrade installed packages to their newest definitions
    Upgrade {
        /// Keep the remaining installed packages asserted
        #[arg(long)]
        check: bool,

        /// Also remove dependencies of upgraded packages nothing else needs
        #[arg(long)]
        full: bool,

        /// Recompute the whole installed universe in one pass
        #[arg(long)]
        universe: bool,

        /// With --universe, remove packages that vanished from the catalog
        #[arg(long, requires = "universe")]
        drop_removed: bool,
    },

    /// Resolve a package and print its solution in install order
    Order {
        /// Package selector
        package: String,
    },

    /// Print the build levels of every spec in the catalog
    Levels,

    /// Print the image hash tree of a spec
    HashTree {
        /// Package selector of the target spec
        package: String,
    },
}
