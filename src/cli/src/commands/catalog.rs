//! Catalog validation and export commands.

use anyhow::{Context, Result};
use clap::{Subcommand, ValueEnum};
use std::path::PathBuf;

use rolegate_core::rbac::{CatalogFormat, DuplicatePolicy, RoleCatalog, VIEWER_ROLE_ID};

use crate::output::{self, OutputFormat};

#[derive(Subcommand)]
pub enum CatalogCommands {
    /// Validate a catalog file exactly as the service would at startup
    Validate {
        /// Catalog file (.toml or .json)
        path: PathBuf,

        /// Tolerate duplicate permission entries (first entry wins)
        #[arg(long)]
        allow_duplicates: bool,

        /// Role assigned to unknown role ids
        #[arg(long, default_value = VIEWER_ROLE_ID)]
        fallback_role: String,
    },

    /// Print the built-in catalog
    Defaults {
        /// Encoding of the printed catalog
        #[arg(short, long, default_value = "toml")]
        format: CatalogEncoding,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum CatalogEncoding {
    Toml,
    Json,
}

impl From<CatalogEncoding> for CatalogFormat {
    fn from(encoding: CatalogEncoding) -> Self {
        match encoding {
            CatalogEncoding::Toml => CatalogFormat::Toml,
            CatalogEncoding::Json => CatalogFormat::Json,
        }
    }
}

pub async fn execute(cmd: CatalogCommands, format: OutputFormat) -> Result<()> {
    match cmd {
        CatalogCommands::Validate {
            path,
            allow_duplicates,
            fallback_role,
        } => {
            let catalog = RoleCatalog::from_path(&path)
                .with_context(|| format!("Failed to load {}", path.display()))?;

            let unrecognized: Vec<String> = catalog
                .roles
                .iter()
                .flat_map(|role| {
                    role.permissions.iter().flat_map(move |perm| {
                        perm.conditions
                            .iter()
                            .filter(|c| !c.is_recognized())
                            .map(move |c| format!("{} on {}: {}", role.id, perm.resource, c.tag()))
                    })
                })
                .collect();

            let policy = if allow_duplicates {
                DuplicatePolicy::Warn
            } else {
                DuplicatePolicy::Reject
            };
            let registry = catalog
                .into_registry(policy, &fallback_role)
                .with_context(|| format!("Invalid catalog {}", path.display()))?;

            match format {
                OutputFormat::Table => {
                    output::print_success(&format!(
                        "{} is valid: {} roles, fallback '{}'",
                        path.display(),
                        registry.len(),
                        registry.fallback_role().id
                    ));
                    for entry in &unrecognized {
                        output::print_warning(&format!(
                            "Unrecognized condition always denies ({entry})"
                        ));
                    }
                }
                _ => output::print_item(
                    &serde_json::json!({
                        "path": path,
                        "valid": true,
                        "roles": registry.len(),
                        "fallbackRole": registry.fallback_role().id,
                        "unrecognizedConditions": unrecognized,
                    }),
                    format,
                )?,
            }
        }

        CatalogCommands::Defaults { format: encoding } => {
            let rendered = RoleCatalog::defaults()
                .render(encoding.into())
                .context("Failed to render built-in catalog")?;
            println!("{}", rendered.trim_end());
        }
    }

    Ok(())
}
