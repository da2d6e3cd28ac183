//! Immutable role registry.
//!
//! Built once at process start from the predefined roles or a catalog file,
//! validated, and shared as `Arc<RoleRegistry>`. Lookups never fail: unknown
//! role ids resolve to the fallback role (viewer by default).

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

use super::models::{Permission, ResourceType, Role, RoleId, UserWithRole, VIEWER_ROLE_ID};
use super::roles::PredefinedRole;
use super::verifier::VerifiedClaims;

/// How registry construction treats two permission entries for the same
/// resource within one role.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DuplicatePolicy {
    /// Fail construction.
    #[default]
    Reject,
    /// Log a warning and keep the role as-is; the first entry wins at lookup.
    Warn,
}

/// Errors raised while validating a role catalog.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("role id must not be empty")]
    EmptyRoleId,

    #[error("duplicate role id: {0}")]
    DuplicateRole(RoleId),

    #[error("role {role} has more than one permission entry for {resource}")]
    DuplicatePermission { role: RoleId, resource: ResourceType },

    #[error("role {role} grants no actions on {resource}")]
    EmptyActions { role: RoleId, resource: ResourceType },

    #[error("fallback role {0} is not defined in the catalog")]
    MissingFallbackRole(RoleId),

    #[error("fallback role {0} bypasses every check and cannot catch unknown role ids")]
    SuperAdminFallback(RoleId),

    #[error("fallback role {role} must be the least privileged role, {lower} ranks below it")]
    ElevatedFallbackRole { role: RoleId, lower: RoleId },
}

// ═══════════════════════════════════════════════════════════════════════════════
// Builder
// ═══════════════════════════════════════════════════════════════════════════════

/// Validating builder for [`RoleRegistry`].
#[derive(Debug, Clone)]
pub struct RoleRegistryBuilder {
    roles: Vec<Role>,
    duplicate_policy: DuplicatePolicy,
    fallback_role: RoleId,
}

impl Default for RoleRegistryBuilder {
    fn default() -> Self {
        Self {
            roles: Vec::new(),
            duplicate_policy: DuplicatePolicy::default(),
            fallback_role: RoleId::new(VIEWER_ROLE_ID),
        }
    }
}

impl RoleRegistryBuilder {
    pub fn role(mut self, role: Role) -> Self {
        self.roles.push(role);
        self
    }

    pub fn roles(mut self, roles: impl IntoIterator<Item = Role>) -> Self {
        self.roles.extend(roles);
        self
    }

    pub fn duplicate_policy(mut self, policy: DuplicatePolicy) -> Self {
        self.duplicate_policy = policy;
        self
    }

    pub fn fallback_role(mut self, role_id: impl Into<String>) -> Self {
        self.fallback_role = RoleId::new(role_id);
        self
    }

    pub fn build(self) -> Result<RoleRegistry, RegistryError> {
        let mut roles: HashMap<RoleId, Arc<Role>> = HashMap::with_capacity(self.roles.len());

        for role in self.roles {
            validate_role(&role, self.duplicate_policy)?;
            if roles.contains_key(&role.id) {
                return Err(RegistryError::DuplicateRole(role.id));
            }
            roles.insert(role.id.clone(), Arc::new(role));
        }

        let fallback = roles
            .get(&self.fallback_role)
            .cloned()
            .ok_or(RegistryError::MissingFallbackRole(self.fallback_role))?;
        check_fallback(&fallback, &roles)?;

        debug!(
            roles = roles.len(),
            fallback = %fallback.id,
            "Role registry built"
        );

        Ok(RoleRegistry { roles, fallback })
    }
}

/// Unknown identities must never resolve to an elevated role: the fallback
/// may not be the super admin and no other role may rank below it.
fn check_fallback(
    fallback: &Role,
    roles: &HashMap<RoleId, Arc<Role>>,
) -> Result<(), RegistryError> {
    if fallback.is_super_admin() {
        return Err(RegistryError::SuperAdminFallback(fallback.id.clone()));
    }

    let lowest = roles
        .values()
        .filter(|r| r.level < fallback.level)
        .min_by(|a, b| a.level.cmp(&b.level).then_with(|| a.id.cmp(&b.id)));
    match lowest {
        Some(lower) => Err(RegistryError::ElevatedFallbackRole {
            role: fallback.id.clone(),
            lower: lower.id.clone(),
        }),
        None => Ok(()),
    }
}

fn validate_role(role: &Role, policy: DuplicatePolicy) -> Result<(), RegistryError> {
    if role.id.as_str().trim().is_empty() {
        return Err(RegistryError::EmptyRoleId);
    }

    let mut seen = HashSet::new();
    for perm in &role.permissions {
        if perm.actions.is_empty() {
            return Err(RegistryError::EmptyActions {
                role: role.id.clone(),
                resource: perm.resource,
            });
        }

        if !seen.insert(perm.resource) {
            match policy {
                DuplicatePolicy::Reject => {
                    return Err(RegistryError::DuplicatePermission {
                        role: role.id.clone(),
                        resource: perm.resource,
                    });
                }
                DuplicatePolicy::Warn => warn!(
                    role = %role.id,
                    resource = %perm.resource,
                    "Duplicate permission entry ignored, first entry wins"
                ),
            }
        }

        for condition in perm.conditions.iter().filter(|c| !c.is_recognized()) {
            warn!(
                role = %role.id,
                resource = %perm.resource,
                condition = condition.tag(),
                "Unrecognized condition tag, permission will always deny"
            );
        }
    }

    Ok(())
}

// ═══════════════════════════════════════════════════════════════════════════════
// Registry
// ═══════════════════════════════════════════════════════════════════════════════

/// Read-only role catalog.
#[derive(Debug, Clone)]
pub struct RoleRegistry {
    roles: HashMap<RoleId, Arc<Role>>,
    fallback: Arc<Role>,
}

impl RoleRegistry {
    pub fn builder() -> RoleRegistryBuilder {
        RoleRegistryBuilder::default()
    }

    /// Registry over the predefined roles.
    pub fn with_defaults() -> Self {
        let roles: HashMap<RoleId, Arc<Role>> = PredefinedRole::all_defaults()
            .into_iter()
            .map(|r| (r.id.clone(), Arc::new(r)))
            .collect();
        let fallback = Arc::new(PredefinedRole::Viewer.to_role());
        Self { roles, fallback }
    }

    /// Build from custom roles with the default validation settings.
    pub fn from_roles(roles: impl IntoIterator<Item = Role>) -> Result<Self, RegistryError> {
        Self::builder().roles(roles).build()
    }

    /// Resolve a role id. Unknown ids yield the fallback role.
    pub fn lookup_role(&self, role_id: &str) -> Arc<Role> {
        match self.roles.get(role_id) {
            Some(role) => role.clone(),
            None => {
                warn!(
                    role = role_id,
                    fallback = %self.fallback.id,
                    "Unknown role id, using fallback role"
                );
                self.fallback.clone()
            }
        }
    }

    pub fn get(&self, role_id: &str) -> Option<Arc<Role>> {
        self.roles.get(role_id).cloned()
    }

    /// Permissions of a role; empty for unknown ids.
    pub fn list_permissions(&self, role_id: &str) -> Vec<Permission> {
        self.roles
            .get(role_id)
            .map(|r| r.permissions.clone())
            .unwrap_or_default()
    }

    pub fn contains(&self, role_id: &str) -> bool {
        self.roles.contains_key(role_id)
    }

    /// All roles, most privileged first.
    pub fn roles(&self) -> Vec<Arc<Role>> {
        let mut roles: Vec<Arc<Role>> = self.roles.values().cloned().collect();
        roles.sort_by(|a, b| b.level.cmp(&a.level).then_with(|| a.id.cmp(&b.id)));
        roles
    }

    pub fn fallback_role(&self) -> &Arc<Role> {
        &self.fallback
    }

    pub fn len(&self) -> usize {
        self.roles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
    }

    /// Build the per-request user from verified claims.
    pub fn resolve_user(&self, claims: &VerifiedClaims) -> UserWithRole {
        let user = UserWithRole::new(
            claims.user_id.clone(),
            claims.email.clone(),
            self.lookup_role(&claims.role),
            claims.organization_id.clone(),
        );
        match &claims.team_id {
            Some(team) => user.with_team(team.clone()),
            None => user,
        }
    }
}

impl Default for RoleRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rbac::models::{ActionType, Condition, SUPER_ADMIN_ROLE_ID};

    fn role(id: &str, level: u32) -> Role {
        Role::new(id, id, level, "")
    }

    fn viewer() -> Role {
        role(VIEWER_ROLE_ID, 10)
            .with_permission(Permission::new(ResourceType::Campaigns, [ActionType::Read]))
    }

    #[test]
    fn test_defaults_cover_predefined_roles() {
        let registry = RoleRegistry::with_defaults();
        assert_eq!(registry.len(), 6);
        assert!(registry.contains("campaign_manager"));
        assert_eq!(registry.fallback_role().id.as_str(), "viewer");
    }

    #[test]
    fn test_defaults_pass_validation() {
        let registry = RoleRegistry::from_roles(PredefinedRole::all_defaults());
        assert!(registry.is_ok());
    }

    #[test]
    fn test_unknown_role_falls_back_to_viewer() {
        let registry = RoleRegistry::with_defaults();
        let role = registry.lookup_role("galactic_overlord");
        assert_eq!(role.id.as_str(), "viewer");
        assert!(registry.get("galactic_overlord").is_none());
    }

    #[test]
    fn test_list_permissions_unknown_is_empty() {
        let registry = RoleRegistry::with_defaults();
        assert!(registry.list_permissions("does-not-exist").is_empty());
        assert!(!registry.list_permissions("analyst").is_empty());
    }

    #[test]
    fn test_roles_sorted_by_level() {
        let registry = RoleRegistry::with_defaults();
        let ids: Vec<String> = registry.roles().iter().map(|r| r.id.to_string()).collect();
        assert_eq!(ids.first().map(String::as_str), Some("super_admin"));
        assert_eq!(ids.last().map(String::as_str), Some("viewer"));
    }

    #[test]
    fn test_rejects_duplicate_role() {
        let err = RoleRegistry::from_roles([viewer(), viewer()]).unwrap_err();
        assert_eq!(err, RegistryError::DuplicateRole(RoleId::new("viewer")));
    }

    #[test]
    fn test_duplicate_permission_policy() {
        let editor = role("editor", 50)
            .with_permission(Permission::new(ResourceType::Content, [ActionType::Read]))
            .with_permission(Permission::new(ResourceType::Content, [ActionType::Delete]));

        let err = RoleRegistry::from_roles([viewer(), editor.clone()]).unwrap_err();
        assert!(matches!(err, RegistryError::DuplicatePermission { .. }));

        let registry = RoleRegistry::builder()
            .roles([viewer(), editor])
            .duplicate_policy(DuplicatePolicy::Warn)
            .build()
            .unwrap();
        let kept = registry.lookup_role("editor");
        let perm = kept.permission_for(ResourceType::Content).unwrap();
        assert!(perm.allows(ActionType::Read));
        assert!(!perm.allows(ActionType::Delete));
    }

    #[test]
    fn test_rejects_empty_actions() {
        let broken = role("broken", 1)
            .with_permission(Permission::new(ResourceType::Billing, Vec::<ActionType>::new()));
        let err = RoleRegistry::from_roles([viewer(), broken]).unwrap_err();
        assert_eq!(
            err,
            RegistryError::EmptyActions {
                role: RoleId::new("broken"),
                resource: ResourceType::Billing,
            }
        );
    }

    #[test]
    fn test_missing_fallback_role() {
        let err = RoleRegistry::from_roles([role("admin", 90)]).unwrap_err();
        assert_eq!(err, RegistryError::MissingFallbackRole(RoleId::new("viewer")));

        let registry = RoleRegistry::builder()
            .role(role("guest", 0))
            .fallback_role("guest")
            .build()
            .unwrap();
        assert_eq!(registry.lookup_role("nobody").id.as_str(), "guest");
    }

    #[test]
    fn test_rejects_super_admin_fallback() {
        let root = role(SUPER_ADMIN_ROLE_ID, 100);
        let err = RoleRegistry::builder()
            .roles([viewer(), root])
            .fallback_role(SUPER_ADMIN_ROLE_ID)
            .build()
            .unwrap_err();
        assert_eq!(err, RegistryError::SuperAdminFallback(RoleId::new(SUPER_ADMIN_ROLE_ID)));

        // Even as the only role, super admin cannot catch unknown ids.
        let err = RoleRegistry::builder()
            .role(role(SUPER_ADMIN_ROLE_ID, 100))
            .fallback_role(SUPER_ADMIN_ROLE_ID)
            .build()
            .unwrap_err();
        assert_eq!(err, RegistryError::SuperAdminFallback(RoleId::new(SUPER_ADMIN_ROLE_ID)));
    }

    #[test]
    fn test_rejects_fallback_above_lowest_role() {
        let err = RoleRegistry::builder()
            .roles(PredefinedRole::all_defaults())
            .fallback_role("admin")
            .build()
            .unwrap_err();
        assert_eq!(
            err,
            RegistryError::ElevatedFallbackRole {
                role: RoleId::new("admin"),
                lower: RoleId::new("viewer"),
            }
        );

        let guest = role("guest", 1);
        let err = RoleRegistry::from_roles([viewer(), guest]).unwrap_err();
        assert!(matches!(err, RegistryError::ElevatedFallbackRole { .. }));
    }

    #[test]
    fn test_unknown_role_never_bypasses() {
        let registry = RoleRegistry::from_roles(PredefinedRole::all_defaults()).unwrap();
        let claims = VerifiedClaims::new("u-1", "u1@example.com", "typo_role", "org-1");
        let user = registry.resolve_user(&claims);
        assert_eq!(user.role_id().as_str(), VIEWER_ROLE_ID);
        assert!(!user.role.is_super_admin());
    }

    #[test]
    fn test_accepts_unrecognized_conditions() {
        let odd = role("odd", 15).with_permission(
            Permission::new(ResourceType::Kols, [ActionType::Read]).with_condition(
                Condition::Unrecognized {
                    tag: "region".into(),
                    field: None,
                },
            ),
        );
        assert!(RoleRegistry::from_roles([viewer(), odd]).is_ok());
    }

    #[test]
    fn test_resolve_user_from_claims() {
        let registry = RoleRegistry::with_defaults();
        let claims = VerifiedClaims {
            user_id: "u-1".into(),
            email: "u1@example.com".into(),
            role: "analyst".into(),
            organization_id: "org-1".into(),
            team_id: Some("team-a".into()),
        };
        let user = registry.resolve_user(&claims);
        assert_eq!(user.id.as_str(), "u-1");
        assert_eq!(user.role_id().as_str(), "analyst");
        assert_eq!(user.team_id.as_ref().map(|t| t.as_str()), Some("team-a"));
    }
}
