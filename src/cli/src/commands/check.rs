//! Permission and impersonation checks against a catalog.
//!
//! The check builds the same per-request user the service would from
//! verified claims, so unknown roles resolve to the fallback role here too.

use anyhow::{bail, Result};
use clap::Args;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

use rolegate_core::rbac::{
    can_impersonate, ActionType, DenyReason, PermissionContext, PolicyDecision, PolicyEngine,
    ResourceData, ResourceType, VerifiedClaims,
};

use crate::output::{self, OutputFormat};

#[derive(Args)]
pub struct CheckArgs {
    /// Role ID of the caller
    #[arg(long)]
    role: String,

    /// User ID of the caller
    #[arg(long, default_value = "cli-user")]
    user_id: String,

    /// Organization of the caller
    #[arg(long)]
    organization_id: String,

    /// Team of the caller
    #[arg(long)]
    team_id: Option<String>,

    /// Resource type (e.g., campaigns)
    #[arg(long)]
    resource: ResourceType,

    /// Action (e.g., approve)
    #[arg(long)]
    action: ActionType,

    /// Record attribute as key=value; repeatable
    #[arg(long = "data", value_parser = parse_attribute)]
    data: Vec<(String, String)>,

    /// Organization the record belongs to
    #[arg(long)]
    context_org: Option<String>,

    /// ID of the record being checked
    #[arg(long)]
    resource_id: Option<String>,
}

#[derive(Args)]
pub struct ImpersonateArgs {
    /// Role ID of the acting user
    #[arg(long)]
    current: String,

    /// Role ID of the user to impersonate
    #[arg(long)]
    target: String,
}

#[derive(Debug, Error, PartialEq, Eq)]
enum AttributeError {
    #[error("expected key=value, got '{0}'")]
    MissingSeparator(String),

    #[error("attribute key must not be empty")]
    EmptyKey,
}

fn parse_attribute(raw: &str) -> Result<(String, String), AttributeError> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| AttributeError::MissingSeparator(raw.to_string()))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(AttributeError::EmptyKey);
    }
    Ok((key.to_string(), value.to_string()))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CheckReport {
    role: String,
    resolved_role: String,
    resource: ResourceType,
    action: ActionType,
    allowed: bool,
    outcome: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<String>,
}

impl CheckReport {
    fn new(
        role: &str,
        resolved_role: &str,
        resource: ResourceType,
        action: ActionType,
        decision: &PolicyDecision,
    ) -> Self {
        let reason = match decision {
            PolicyDecision::Deny(reason) => Some(reason.to_string()),
            PolicyDecision::Bypass => Some("super admin bypass".to_string()),
            PolicyDecision::Allow => None,
        };
        Self {
            role: role.to_string(),
            resolved_role: resolved_role.to_string(),
            resource,
            action,
            allowed: decision.is_allowed(),
            outcome: decision.outcome(),
            reason,
        }
    }
}

fn context_from(args: &CheckArgs) -> Option<PermissionContext> {
    if args.data.is_empty() && args.context_org.is_none() && args.resource_id.is_none() {
        return None;
    }

    let data: ResourceData = args
        .data
        .iter()
        .map(|(k, v)| (k.clone(), serde_json::Value::String(v.clone())))
        .collect();
    let mut context = PermissionContext::new().with_resource_data(data);
    if let Some(org) = &args.context_org {
        context = context.with_organization(org.clone());
    }
    if let Some(id) = &args.resource_id {
        context = context.with_resource_id(id.clone());
    }
    Some(context)
}

pub async fn execute(args: CheckArgs, catalog: Option<&Path>, format: OutputFormat) -> Result<()> {
    let engine = PolicyEngine::new(Arc::new(super::registry(catalog)?));

    let mut claims = VerifiedClaims::new(
        args.user_id.clone(),
        format!("{}@cli.local", args.user_id),
        args.role.clone(),
        args.organization_id.clone(),
    );
    claims.team_id = args.team_id.clone();
    let user = engine.registry().resolve_user(&claims);

    let context = context_from(&args);
    let decision = engine.evaluate(&user, args.resource, args.action, context.as_ref());
    let report = CheckReport::new(
        &args.role,
        user.role.id.as_str(),
        args.resource,
        args.action,
        &decision,
    );

    match format {
        OutputFormat::Table => {
            println!("{} {}:{}", output::verdict(report.allowed), report.resource, report.action);
            output::print_detail("Role", &report.role);
            if report.resolved_role != report.role {
                output::print_warning(&format!(
                    "Unknown role '{}', evaluated as fallback '{}'",
                    report.role, report.resolved_role
                ));
            }
            if let Some(reason) = &report.reason {
                output::print_detail("Reason", reason);
            }
            if let PolicyDecision::Deny(DenyReason::ConditionFailed { .. }) = decision {
                if context.is_none() {
                    output::print_info("No record context given; pass --data or --context-org");
                }
            }
        }
        _ => output::print_item(&report, format)?,
    }

    Ok(())
}

pub async fn impersonate(
    args: ImpersonateArgs,
    catalog: Option<&Path>,
    format: OutputFormat,
) -> Result<()> {
    let registry = super::registry(catalog)?;

    for role in [&args.current, &args.target] {
        if !registry.contains(role) {
            bail!("Role '{}' is not defined in the catalog", role);
        }
    }

    let current = registry.resolve_user(&VerifiedClaims::new(
        "current",
        "current@cli.local",
        args.current.clone(),
        "cli",
    ));
    let target = registry.resolve_user(&VerifiedClaims::new(
        "target",
        "target@cli.local",
        args.target.clone(),
        "cli",
    ));
    let allowed = can_impersonate(&current, &target);

    match format {
        OutputFormat::Table => {
            println!("{} {} -> {}", output::verdict(allowed), current.role.id, target.role.id);
            if !allowed && !current.role.is_super_admin() {
                output::print_detail("Reason", "only super admins may impersonate");
            } else if !allowed {
                output::print_detail("Reason", "super admins cannot be impersonated");
            }
        }
        _ => output::print_item(
            &serde_json::json!({
                "current": args.current,
                "target": args.target,
                "allowed": allowed,
            }),
            format,
        )?,
    }

    Ok(())
}
