#![allow(clippy::result_large_err)]
//! # Rolegate Core
//!
//! Authorization policy engine for multi-tenant campaign management APIs.
//!
//! ## Architecture
//!
//! - **Registry**: Immutable role catalog built at startup, TOML/JSON or predefined
//! - **Policy Engine**: Resource/action checks with ownership and scope conditions
//! - **Verifier**: JWT and hashed static credential verification with revocation
//! - **Middleware**: Request gate and Tower layer enforcing permissions on routes
//! - **Audit**: Non-blocking audit trail of denied and granted requests
//! - **Telemetry**: Structured logging with redaction, and decision metrics

pub mod config;
pub mod error;
pub mod rbac;
pub mod telemetry;

pub use error::{ErrorCode, ErrorSeverity, Result, RolegateError};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::{AuditSettings, AuthSettings, CatalogSettings, Config, VerifierKind};
    pub use crate::error::{ErrorCode, ErrorSeverity, Result, RolegateError};
    pub use crate::rbac::{
        ActionType, AuditEvent, AuditSink, AuthorizeError, Authorizer, Condition, DenyReason,
        IdentityContext, Permission, PermissionContext, PolicyDecision, PolicyEngine,
        PredefinedRole, RequirePermissionLayer, RequirePermissionService, ResourceData,
        ResourceType, Role, RoleCatalog, RoleId, RoleRegistry, TokenVerifier, UserWithRole,
        VerifiedClaims,
    };
    pub use crate::telemetry::{init_telemetry, LoggingConfig};
}
