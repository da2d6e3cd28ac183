//! CLI subcommands.

pub mod catalog;
pub mod check;
pub mod config;
pub mod roles;

use anyhow::{Context, Result};
use std::path::Path;

use rolegate_core::config::CatalogSettings;
use rolegate_core::rbac::{load_registry, RoleRegistry};

/// Build the registry the way the service would: the catalog at `path`, or
/// the predefined roles.
pub fn registry(path: Option<&Path>) -> Result<RoleRegistry> {
    let settings = CatalogSettings {
        path: path.map(Path::to_path_buf),
        ..Default::default()
    };
    load_registry(&settings).with_context(|| match path {
        Some(p) => format!("Failed to load role catalog {}", p.display()),
        None => "Failed to build predefined roles".to_string(),
    })
}
