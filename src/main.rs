// src/main.rs

mod cli;
mod commands;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands};
use commands::Workspace;
use tracing::info;

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = commands::load_config(cli.config.as_deref())?;

    // RUST_LOG wins over the configured filter; logs go to stderr so stdout stays JSON
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    let catalog = commands::load_catalog(&cli.catalog)?;
    let workspace = Workspace::new(catalog, config);
    info!("Loaded catalog {}", cli.catalog.display());

    let output = match cli.command {
        Commands::Install { packages } => commands::cmd_install(&workspace, &packages)?,
        Commands::Uninstall {
            packages,
            check,
            full,
        } => commands::cmd_uninstall(&workspace, &packages, check, full)?,
        Commands::Upgrade {
            check,
            full,
            universe,
            drop_removed,
        } => commands::cmd_upgrade(&workspace, check, full, universe, drop_removed)?,
        Commands::Order { package } => commands::cmd_order(&workspace, &package)?,
        Commands::Levels => commands::cmd_levels(&workspace)?,
        Commands::HashTree { package } => commands::cmd_hash_tree(&workspace, &package)?,
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
