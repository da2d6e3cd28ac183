//! Role inspection commands.

use anyhow::{bail, Result};
use clap::Subcommand;
use serde::Serialize;
use std::path::Path;
use tabled::Tabled;

use rolegate_core::rbac::{Permission, Role};

use crate::output::{self, OutputFormat};

#[derive(Subcommand)]
pub enum RolesCommands {
    /// List roles, most privileged first
    List,

    /// Show a role and its permissions
    Show {
        /// Role ID (e.g., campaign_manager)
        role_id: String,
    },
}

#[derive(Debug, Serialize, Tabled)]
struct RoleRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Level")]
    level: u32,
    #[tabled(rename = "Permissions")]
    permissions: usize,
    #[tabled(rename = "Description")]
    description: String,
}

impl From<&Role> for RoleRow {
    fn from(role: &Role) -> Self {
        Self {
            id: role.id.to_string(),
            name: role.name.clone(),
            level: role.level,
            permissions: role.permissions.len(),
            description: role.description.clone(),
        }
    }
}

#[derive(Debug, Serialize, Tabled)]
struct PermissionRow {
    #[tabled(rename = "Resource")]
    resource: String,
    #[tabled(rename = "Actions")]
    actions: String,
    #[tabled(rename = "Conditions")]
    conditions: String,
}

impl From<&Permission> for PermissionRow {
    fn from(permission: &Permission) -> Self {
        let actions: Vec<&str> = permission.actions.iter().map(|a| a.as_str()).collect();
        let conditions: Vec<String> = permission.conditions.iter().map(|c| c.to_string()).collect();
        Self {
            resource: permission.resource.to_string(),
            actions: actions.join(", "),
            conditions: if conditions.is_empty() {
                "-".to_string()
            } else {
                conditions.join(" & ")
            },
        }
    }
}

pub async fn execute(
    cmd: RolesCommands,
    catalog: Option<&Path>,
    format: OutputFormat,
) -> Result<()> {
    let registry = super::registry(catalog)?;

    match cmd {
        RolesCommands::List => {
            let rows: Vec<RoleRow> = registry
                .roles()
                .iter()
                .map(|r| RoleRow::from(r.as_ref()))
                .collect();
            output::print_list(&rows, format)?;
        }

        RolesCommands::Show { role_id } => {
            let Some(role) = registry.get(&role_id) else {
                bail!("Role '{}' is not defined in the catalog", role_id);
            };

            match format {
                OutputFormat::Table => {
                    output::print_header(&format!("Role: {}", role.name));
                    output::print_detail("ID", role.id.as_str());
                    output::print_detail("Level", &role.level.to_string());
                    if !role.description.is_empty() {
                        output::print_detail("Description", &role.description);
                    }
                    if role.is_super_admin() {
                        output::print_info(
                            "Super admin: every check is allowed without evaluation",
                        );
                    }
                    if registry.fallback_role().id == role.id {
                        output::print_info("Fallback role for unknown role ids");
                    }
                    println!();
                    let rows: Vec<PermissionRow> =
                        role.permissions.iter().map(PermissionRow::from).collect();
                    output::print_list(&rows, format)?;
                }
                _ => output::print_item(role.as_ref(), format)?,
            }
        }
    }

    Ok(())
}
