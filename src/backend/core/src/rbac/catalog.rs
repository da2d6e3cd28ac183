//! Role catalog files.
//!
//! A catalog is a list of role definitions in TOML or JSON, picked by file
//! extension. Loading always goes through [`RoleRegistryBuilder`] validation.
//!
//! [`RoleRegistryBuilder`]: super::registry::RoleRegistryBuilder

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

use super::models::Role;
use super::registry::{DuplicatePolicy, RegistryError, RoleRegistry};
use super::roles::PredefinedRole;
use crate::config::CatalogSettings;

/// Supported on-disk encodings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatalogFormat {
    Toml,
    Json,
}

impl CatalogFormat {
    pub fn from_path(path: &Path) -> Result<Self, CatalogError> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());
        match ext.as_deref() {
            Some("toml") => Ok(Self::Toml),
            Some("json") => Ok(Self::Json),
            other => Err(CatalogError::UnsupportedFormat(
                other.unwrap_or("<none>").to_string(),
            )),
        }
    }
}

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to read catalog {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("unsupported catalog format: {0}")]
    UnsupportedFormat(String),

    #[error("invalid TOML catalog: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("invalid JSON catalog: {0}")]
    Json(#[from] serde_json::Error),

    #[error("failed to render catalog: {0}")]
    Render(String),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Deserialized catalog document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleCatalog {
    #[serde(default)]
    pub roles: Vec<Role>,
}

impl RoleCatalog {
    /// The predefined roles as a catalog.
    pub fn defaults() -> Self {
        Self {
            roles: PredefinedRole::all_defaults(),
        }
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let path = path.as_ref();
        let format = CatalogFormat::from_path(path)?;
        let content = std::fs::read_to_string(path).map_err(|source| CatalogError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content, format)
    }

    pub fn parse(content: &str, format: CatalogFormat) -> Result<Self, CatalogError> {
        let catalog = match format {
            CatalogFormat::Toml => toml::from_str(content)?,
            CatalogFormat::Json => serde_json::from_str(content)?,
        };
        Ok(catalog)
    }

    pub fn render(&self, format: CatalogFormat) -> Result<String, CatalogError> {
        match format {
            CatalogFormat::Toml => {
                toml::to_string_pretty(self).map_err(|e| CatalogError::Render(e.to_string()))
            }
            CatalogFormat::Json => {
                serde_json::to_string_pretty(self).map_err(|e| CatalogError::Render(e.to_string()))
            }
        }
    }

    pub fn into_registry(
        self,
        duplicate_policy: DuplicatePolicy,
        fallback_role: &str,
    ) -> Result<RoleRegistry, CatalogError> {
        let registry = RoleRegistry::builder()
            .roles(self.roles)
            .duplicate_policy(duplicate_policy)
            .fallback_role(fallback_role)
            .build()?;
        Ok(registry)
    }
}

/// Build the process registry from configuration: the configured catalog
/// file, or the predefined roles when none is set.
pub fn load_registry(settings: &CatalogSettings) -> Result<RoleRegistry, CatalogError> {
    let catalog = match &settings.path {
        Some(path) => {
            info!(path = %path.display(), "Loading role catalog");
            RoleCatalog::from_path(path)?
        }
        None => RoleCatalog::defaults(),
    };
    catalog.into_registry(settings.duplicate_policy, &settings.fallback_role)
}
