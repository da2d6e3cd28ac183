//! RBAC data models: identifiers, resources, actions, conditions, permissions,
//! roles, and the per-request user and check context.

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Role id that bypasses every permission check.
pub const SUPER_ADMIN_ROLE_ID: &str = "super_admin";

/// Least-privileged role, used when a role id cannot be resolved.
pub const VIEWER_ROLE_ID: &str = "viewer";

// ═══════════════════════════════════════════════════════════════════════════════
// Identifiers
// ═══════════════════════════════════════════════════════════════════════════════

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }
    };
}

string_id!(
    /// Strongly-typed user identifier.
    UserId
);
string_id!(
    /// Strongly-typed role identifier.
    RoleId
);
string_id!(
    /// Strongly-typed organization (tenant) identifier.
    OrganizationId
);
string_id!(
    /// Strongly-typed team identifier.
    TeamId
);

// ═══════════════════════════════════════════════════════════════════════════════
// Resources & Actions
// ═══════════════════════════════════════════════════════════════════════════════

/// Error returned when parsing an unknown resource or action name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind}: {value}")]
pub struct ParseKindError {
    pub kind: &'static str,
    pub value: String,
}

/// Protected resource categories of the dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceType {
    Kols,
    Campaigns,
    Content,
    Communications,
    Analytics,
    Settings,
    Users,
    Billing,
    Integrations,
    Reports,
}

impl ResourceType {
    pub const ALL: [ResourceType; 10] = [
        Self::Kols,
        Self::Campaigns,
        Self::Content,
        Self::Communications,
        Self::Analytics,
        Self::Settings,
        Self::Users,
        Self::Billing,
        Self::Integrations,
        Self::Reports,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Kols => "kols",
            Self::Campaigns => "campaigns",
            Self::Content => "content",
            Self::Communications => "communications",
            Self::Analytics => "analytics",
            Self::Settings => "settings",
            Self::Users => "users",
            Self::Billing => "billing",
            Self::Integrations => "integrations",
            Self::Reports => "reports",
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceType {
    type Err = ParseKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|r| r.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ParseKindError {
                kind: "resource",
                value: s.to_string(),
            })
    }
}

/// Operations that can be performed on a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionType {
    Read,
    Write,
    Delete,
    Approve,
    Manage,
    Export,
}

impl ActionType {
    pub const ALL: [ActionType; 6] = [
        Self::Read,
        Self::Write,
        Self::Delete,
        Self::Approve,
        Self::Manage,
        Self::Export,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Write => "write",
            Self::Delete => "delete",
            Self::Approve => "approve",
            Self::Manage => "manage",
            Self::Export => "export",
        }
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionType {
    type Err = ParseKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|a| a.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ParseKindError {
                kind: "action",
                value: s.to_string(),
            })
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Condition
// ═══════════════════════════════════════════════════════════════════════════════

/// A record-level predicate that must hold, in addition to the role/action
/// match, for a permission to apply.
///
/// Each variant may override the attribute it reads from the resource data.
/// `Unrecognized` only arises from deserialized catalogs carrying a tag this
/// crate does not know; it never passes evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "ConditionSpec", into = "ConditionSpec")]
pub enum Condition {
    /// The resource was created by the user.
    Own { field: Option<String> },
    /// The resource belongs to the user's team.
    Team { field: Option<String> },
    /// The resource belongs to the user's organization.
    Organization { field: Option<String> },
    /// The resource is assigned to the user.
    Assigned { field: Option<String> },
    /// A tag outside the closed set.
    Unrecognized { tag: String, field: Option<String> },
}

impl Condition {
    pub fn own() -> Self {
        Self::Own { field: None }
    }

    pub fn team() -> Self {
        Self::Team { field: None }
    }

    pub fn organization() -> Self {
        Self::Organization { field: None }
    }

    pub fn assigned() -> Self {
        Self::Assigned { field: None }
    }

    /// Override the resource attribute this condition reads.
    pub fn with_field(mut self, name: impl Into<String>) -> Self {
        match &mut self {
            Self::Own { field }
            | Self::Team { field }
            | Self::Organization { field }
            | Self::Assigned { field }
            | Self::Unrecognized { field, .. } => *field = Some(name.into()),
        }
        self
    }

    /// The serialized tag of this condition.
    pub fn tag(&self) -> &str {
        match self {
            Self::Own { .. } => "own",
            Self::Team { .. } => "team",
            Self::Organization { .. } => "organization",
            Self::Assigned { .. } => "assigned",
            Self::Unrecognized { tag, .. } => tag,
        }
    }

    /// The field name override, if one was configured.
    pub fn field_override(&self) -> Option<&str> {
        match self {
            Self::Own { field }
            | Self::Team { field }
            | Self::Organization { field }
            | Self::Assigned { field }
            | Self::Unrecognized { field, .. } => field.as_deref(),
        }
    }

    /// The attribute read from the resource data: the override, or the
    /// variant's default. `None` for unrecognized conditions.
    pub fn field(&self) -> Option<&str> {
        let default = match self {
            Self::Own { .. } => "createdBy",
            Self::Team { .. } => "teamId",
            Self::Organization { .. } => "organizationId",
            Self::Assigned { .. } => "assignedTo",
            Self::Unrecognized { .. } => return None,
        };
        Some(self.field_override().unwrap_or(default))
    }

    pub fn is_recognized(&self) -> bool {
        !matches!(self, Self::Unrecognized { .. })
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.field_override() {
            Some(field) => write!(f, "{}({})", self.tag(), field),
            None => f.write_str(self.tag()),
        }
    }
}

/// Wire shape of a condition: `{ "type": "own", "field": "createdBy" }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ConditionSpec {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    field: Option<String>,
}

impl From<ConditionSpec> for Condition {
    fn from(spec: ConditionSpec) -> Self {
        let field = spec.field;
        match spec.kind.as_str() {
            "own" => Self::Own { field },
            "team" => Self::Team { field },
            "organization" => Self::Organization { field },
            "assigned" => Self::Assigned { field },
            _ => Self::Unrecognized {
                tag: spec.kind,
                field,
            },
        }
    }
}

impl From<Condition> for ConditionSpec {
    fn from(condition: Condition) -> Self {
        let kind = condition.tag().to_string();
        let field = condition.field_override().map(str::to_string);
        Self { kind, field }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Permission
// ═══════════════════════════════════════════════════════════════════════════════

/// Grant of a set of actions on one resource, optionally qualified by
/// conditions that must all hold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permission {
    pub resource: ResourceType,
    pub actions: BTreeSet<ActionType>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}

impl Permission {
    pub fn new(resource: ResourceType, actions: impl IntoIterator<Item = ActionType>) -> Self {
        Self {
            resource,
            actions: actions.into_iter().collect(),
            conditions: Vec::new(),
        }
    }

    /// Grant every action on the resource.
    pub fn all_actions(resource: ResourceType) -> Self {
        Self::new(resource, ActionType::ALL)
    }

    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn allows(&self, action: ActionType) -> bool {
        self.actions.contains(&action)
    }

    pub fn is_conditional(&self) -> bool {
        !self.conditions.is_empty()
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let actions: Vec<&str> = self.actions.iter().map(|a| a.as_str()).collect();
        write!(f, "{}:{}", self.resource, actions.join(","))?;
        if !self.conditions.is_empty() {
            let conditions: Vec<String> = self.conditions.iter().map(|c| c.to_string()).collect();
            write!(f, " if {}", conditions.join(" & "))?;
        }
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Role
// ═══════════════════════════════════════════════════════════════════════════════

/// A named bundle of permissions. `level` ranks privilege for display only
/// and takes no part in decisions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub id: RoleId,
    pub name: String,
    #[serde(default)]
    pub level: u32,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub permissions: Vec<Permission>,
}

impl Role {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        level: u32,
        description: impl Into<String>,
    ) -> Self {
        Self {
            id: RoleId::new(id),
            name: name.into(),
            level,
            description: description.into(),
            permissions: Vec::new(),
        }
    }

    pub fn with_permission(mut self, permission: Permission) -> Self {
        self.permissions.push(permission);
        self
    }

    /// First permission entry for `resource`, if any.
    pub fn permission_for(&self, resource: ResourceType) -> Option<&Permission> {
        self.permissions.iter().find(|p| p.resource == resource)
    }

    pub fn is_super_admin(&self) -> bool {
        self.id.as_str() == SUPER_ADMIN_ROLE_ID
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// User & Check Context
// ═══════════════════════════════════════════════════════════════════════════════

/// An authenticated identity with its resolved role. Built per request from
/// verified claims and never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserWithRole {
    pub id: UserId,
    pub email: String,
    pub role: Arc<Role>,
    pub organization_id: OrganizationId,
    pub team_id: Option<TeamId>,
}

impl UserWithRole {
    pub fn new(
        id: impl Into<String>,
        email: impl Into<String>,
        role: Arc<Role>,
        organization_id: impl Into<String>,
    ) -> Self {
        Self {
            id: UserId::new(id),
            email: email.into(),
            role,
            organization_id: OrganizationId::new(organization_id),
            team_id: None,
        }
    }

    pub fn with_team(mut self, team_id: impl Into<String>) -> Self {
        self.team_id = Some(TeamId::new(team_id));
        self
    }

    pub fn role_id(&self) -> &RoleId {
        &self.role.id
    }
}

/// Attribute values of the record being checked.
///
/// Lookups return the value only when it is a JSON string: identities are
/// strings, so a numeric or structured value never matches one.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceData {
    fields: HashMap<String, serde_json::Value>,
}

impl ResourceData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, field: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.insert(field, value);
        self
    }

    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<serde_json::Value>) {
        self.fields.insert(field.into(), value.into());
    }

    /// Typed accessor used by condition evaluation.
    pub fn attribute(&self, field: &str) -> Option<&str> {
        self.fields.get(field).and_then(|v| v.as_str())
    }

    pub fn raw(&self, field: &str) -> Option<&serde_json::Value> {
        self.fields.get(field)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl From<serde_json::Map<String, serde_json::Value>> for ResourceData {
    fn from(map: serde_json::Map<String, serde_json::Value>) -> Self {
        Self {
            fields: map.into_iter().collect(),
        }
    }
}

impl<K, V> FromIterator<(K, V)> for ResourceData
where
    K: Into<String>,
    V: Into<serde_json::Value>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            fields: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// Per-check input supplied by the caller. Never stored.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PermissionContext {
    pub resource_id: Option<String>,
    pub resource_data: Option<ResourceData>,
    pub organization_id: Option<OrganizationId>,
}

impl PermissionContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_resource_id(mut self, id: impl Into<String>) -> Self {
        self.resource_id = Some(id.into());
        self
    }

    pub fn with_resource_data(mut self, data: ResourceData) -> Self {
        self.resource_data = Some(data);
        self
    }

    pub fn with_organization(mut self, organization_id: impl Into<String>) -> Self {
        self.organization_id = Some(OrganizationId::new(organization_id));
        self
    }

    /// Attribute lookup through the resource data, if any.
    pub fn attribute(&self, field: &str) -> Option<&str> {
        self.resource_data.as_ref().and_then(|d| d.attribute(field))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════
