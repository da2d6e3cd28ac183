//! Role-based authorization for campaign and KOL management APIs.
//!
//! This module provides:
//! - **Models**: resource and action kinds, conditional permissions, roles
//! - **Registry**: immutable role lookup with an explicit fallback role
//! - **Catalog**: TOML/JSON role definitions loaded at startup
//! - **Conditions**: ownership, team, organization and assignment checks
//! - **Policy Engine**: decides whether a user may perform an action
//! - **Verifier**: JWT and static credential verification
//! - **Audit**: fire-and-forget records of denials (and optionally grants)
//! - **Middleware**: request gate and Tower layer for axum routes
//!
//! # Usage
//!
//! ```rust,ignore
//! use rolegate_core::rbac::{
//!     ActionType, Authorizer, RequirePermissionLayer, ResourceType,
//! };
//!
//! let authorizer = Arc::new(Authorizer::from_config(&config)?);
//!
//! let app = Router::new()
//!     .route("/api/campaigns", get(list_campaigns))
//!     .layer(RequirePermissionLayer::new(
//!         authorizer,
//!         ResourceType::Campaigns,
//!         ActionType::Read,
//!     ));
//! ```

pub mod audit;
pub mod catalog;
pub mod condition;
pub mod middleware;
pub mod models;
pub mod policy;
pub mod registry;
pub mod roles;
pub mod verifier;

pub use audit::{
    sink_from_settings, AuditEvent, AuditSink, ChannelAuditSink, NoopAuditSink, TracingAuditSink,
};
pub use catalog::{load_registry, CatalogError, CatalogFormat, RoleCatalog};
pub use condition::{evaluate_all, evaluate_condition, first_failing};
pub use middleware::{
    AuthorizeError, Authorizer, IdentityContext, RequirePermissionLayer, RequirePermissionService,
    ORGANIZATION_ID_HEADER, REQUEST_ID_HEADER, TEAM_ID_HEADER, USER_ID_HEADER, USER_ROLE_HEADER,
};
pub use models::{
    ActionType, Condition, OrganizationId, ParseKindError, Permission, PermissionContext,
    ResourceData, ResourceType, Role, RoleId, TeamId, UserId, UserWithRole, SUPER_ADMIN_ROLE_ID,
    VIEWER_ROLE_ID,
};
pub use policy::{can_impersonate, DenyReason, PolicyDecision, PolicyEngine};
pub use registry::{DuplicatePolicy, RegistryError, RoleRegistry, RoleRegistryBuilder};
pub use roles::PredefinedRole;
pub use verifier::{
    hash_credential, JwtClaims, JwtVerifier, StaticTokenVerifier, TokenVerifier, VerifiedClaims,
    VerifyError,
};
