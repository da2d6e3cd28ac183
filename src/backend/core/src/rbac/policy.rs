//! Permission evaluation.
//!
//! The [`PolicyEngine`] combines role lookup, action matching and condition
//! evaluation into a decision. Ordinary denials are values, not errors, and
//! internal faults collapse to a denial so nothing escapes the evaluator.
//!
//! Evaluation order:
//!
//! 1. Super admin bypass.
//! 2. First permission entry for the resource.
//! 3. Exact action membership.
//! 4. Every condition holds (short-circuit on the first failure).

use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, warn};

use super::condition::first_failing;
use super::models::{
    ActionType, Permission, PermissionContext, ResourceType, RoleId, UserWithRole,
};
use super::registry::RoleRegistry;
use crate::telemetry::metrics::DecisionCounter;

/// Why a check was denied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DenyReason {
    NoPermissionForResource,
    ActionNotPermitted,
    ConditionFailed { condition: String },
    InternalFault(String),
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoPermissionForResource => f.write_str("no permission for resource"),
            Self::ActionNotPermitted => f.write_str("action not permitted"),
            Self::ConditionFailed { condition } => write!(f, "condition failed: {condition}"),
            Self::InternalFault(msg) => write!(f, "internal fault: {msg}"),
        }
    }
}

/// Result of a permission check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyDecision {
    Allow,
    /// Super admin short-circuit. Allowed, but never audited.
    Bypass,
    Deny(DenyReason),
}

impl PolicyDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow | Self::Bypass)
    }

    pub fn outcome(&self) -> &'static str {
        match self {
            Self::Allow => "allow",
            Self::Bypass => "bypass",
            Self::Deny(DenyReason::InternalFault(_)) => "fault",
            Self::Deny(_) => "deny",
        }
    }
}

/// Malformed role data that slipped past registry validation.
#[derive(Debug, Error)]
enum EvaluationFault {
    #[error("role id is empty")]
    EmptyRoleId,

    #[error("role {role} grants an empty action set on {resource}")]
    EmptyActions { role: RoleId, resource: ResourceType },
}

/// Stateless evaluator over a shared registry.
#[derive(Debug, Clone)]
pub struct PolicyEngine {
    registry: Arc<RoleRegistry>,
}

impl PolicyEngine {
    pub fn new(registry: Arc<RoleRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<RoleRegistry> {
        &self.registry
    }

    /// Boolean form of [`evaluate`](Self::evaluate).
    pub fn check_permission(
        &self,
        user: &UserWithRole,
        resource: ResourceType,
        action: ActionType,
        context: Option<&PermissionContext>,
    ) -> bool {
        self.evaluate(user, resource, action, context).is_allowed()
    }

    pub fn evaluate(
        &self,
        user: &UserWithRole,
        resource: ResourceType,
        action: ActionType,
        context: Option<&PermissionContext>,
    ) -> PolicyDecision {
        let decision = match try_evaluate(user, resource, action, context) {
            Ok(decision) => decision,
            Err(fault) => {
                error!(
                    user_id = %user.id,
                    role = %user.role.id,
                    resource = %resource,
                    action = %action,
                    error = %fault,
                    "Permission evaluation fault, denying"
                );
                PolicyDecision::Deny(DenyReason::InternalFault(fault.to_string()))
            }
        };

        DecisionCounter::increment(resource, action, decision.outcome());
        decision
    }

    /// Permissions of a role; empty for unknown ids.
    pub fn get_role_permissions(&self, role_id: &str) -> Vec<Permission> {
        self.registry.list_permissions(role_id)
    }
}

fn try_evaluate(
    user: &UserWithRole,
    resource: ResourceType,
    action: ActionType,
    context: Option<&PermissionContext>,
) -> Result<PolicyDecision, EvaluationFault> {
    let role = &user.role;
    if role.id.as_str().is_empty() {
        return Err(EvaluationFault::EmptyRoleId);
    }

    if role.is_super_admin() {
        debug!(user_id = %user.id, resource = %resource, action = %action, "Super admin bypass");
        return Ok(PolicyDecision::Bypass);
    }

    let Some(permission) = role.permission_for(resource) else {
        warn!(
            user_id = %user.id,
            role = %role.id,
            resource = %resource,
            action = %action,
            "Permission denied: no permission for resource"
        );
        return Ok(PolicyDecision::Deny(DenyReason::NoPermissionForResource));
    };

    if permission.actions.is_empty() {
        return Err(EvaluationFault::EmptyActions {
            role: role.id.clone(),
            resource,
        });
    }

    if !permission.allows(action) {
        warn!(
            user_id = %user.id,
            role = %role.id,
            resource = %resource,
            action = %action,
            "Permission denied: action not permitted"
        );
        return Ok(PolicyDecision::Deny(DenyReason::ActionNotPermitted));
    }

    if permission.is_conditional() {
        let empty = PermissionContext::default();
        let context = context.unwrap_or(&empty);
        if let Some(failed) = first_failing(user, &permission.conditions, context) {
            debug!(
                user_id = %user.id,
                role = %role.id,
                resource = %resource,
                action = %action,
                condition = %failed,
                "Permission denied: condition failed"
            );
            return Ok(PolicyDecision::Deny(DenyReason::ConditionFailed {
                condition: failed.tag().to_string(),
            }));
        }
    }

    debug!(
        user_id = %user.id,
        role = %role.id,
        resource = %resource,
        action = %action,
        "Permission granted"
    );
    Ok(PolicyDecision::Allow)
}

/// Whether `current` may act as `target`. Only a super admin may, and never
/// as another super admin.
pub fn can_impersonate(current: &UserWithRole, target: &UserWithRole) -> bool {
    current.role.is_super_admin() && !target.role.is_super_admin()
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════
