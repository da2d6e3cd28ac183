//! Rolegate CLI - Offline tool for inspecting and checking role catalogs.
//!
//! Provides role listing, catalog validation, permission checks,
//! impersonation checks, and configuration management.

mod commands;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use rolegate_core::telemetry::{init_telemetry, LogFormat, LoggingConfig};
use std::path::PathBuf;

use commands::{catalog, check, config, roles};
use output::OutputFormat;

/// Rolegate - Authorization policy engine CLI
#[derive(Parser)]
#[command(
    name = "rolegate",
    author = "Aezi <aezi.zhu@icloud.com>",
    version = "0.1.0",
    about = "Rolegate - Authorization policy engine",
    long_about = "Inspect role catalogs and evaluate permission checks before deploying them.",
    propagate_version = true
)]
pub struct Cli {
    /// Output format
    #[arg(short, long, global = true, default_value = "table")]
    output: OutputFormat,

    /// Role catalog file (TOML or JSON); the predefined roles when unset
    #[arg(long, global = true, env = "ROLEGATE_CATALOG")]
    catalog: Option<PathBuf>,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    /// Log catalog loading and evaluation steps
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Role inspection
    #[command(subcommand)]
    Roles(roles::RolesCommands),

    /// Catalog validation and export
    #[command(subcommand)]
    Catalog(catalog::CatalogCommands),

    /// Evaluate a single permission check
    Check(check::CheckArgs),

    /// Evaluate whether one role may impersonate another
    Impersonate(check::ImpersonateArgs),

    /// Configuration management
    #[command(subcommand)]
    Config(config::ConfigCommands),
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    if cli.no_color {
        colored::control::set_override(false);
    }

    if cli.verbose {
        let logging = LoggingConfig {
            level: "rolegate_core=debug".to_string(),
            format: LogFormat::Compact,
            include_location: false,
            ..Default::default()
        };
        init_telemetry(&logging, "development")?;
    }

    let catalog = cli.catalog.clone().or_else(config::load_catalog_path);
    let format = cli.output;

    let result = match cli.command {
        Commands::Roles(cmd) => roles::execute(cmd, catalog.as_deref(), format).await,
        Commands::Catalog(cmd) => catalog::execute(cmd, format).await,
        Commands::Check(args) => check::execute(args, catalog.as_deref(), format).await,
        Commands::Impersonate(args) => {
            check::impersonate(args, catalog.as_deref(), format).await
        }
        Commands::Config(cmd) => config::execute(cmd, format).await,
    };

    if let Err(e) = result {
        output::print_error(&format!("{:#}", e));
        std::process::exit(1);
    }

    Ok(())
}
