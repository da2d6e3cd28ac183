//! Request authorization: credential extraction, verification, permission
//! enforcement and audit.
//!
//! [`Authorizer::authorize`] gates an arbitrary handler future and is the
//! framework-independent entry point. [`RequirePermissionLayer`] applies the
//! same contract to axum routes and inserts the [`IdentityContext`] into the
//! request extensions.
//!
//! Outcomes:
//!
//! | Situation                                  | Result |
//! |--------------------------------------------|--------|
//! | No usable bearer credential                | 401    |
//! | Verifier rejects the credential            | 401 (500 if misconfigured) |
//! | Policy denies                              | 403, one audit event |
//! | Policy allows                              | handler runs once |
//! | Panic while verifying or in the handler    | 500    |

use axum::{
    body::Body,
    extract::{FromRequestParts, Request},
    http::{header::AUTHORIZATION, request::Parts, HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use futures::future::{BoxFuture, FutureExt};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::task::{Context, Poll};
use thiserror::Error;
use tower::{Layer, Service};
use tracing::{debug, error};

use super::audit::{sink_from_settings, AuditEvent, AuditSink};
use super::catalog::load_registry;
use super::models::{
    ActionType, Permission, PermissionContext, ResourceType, UserWithRole,
};
use super::policy::{self, PolicyDecision, PolicyEngine};
use super::registry::RoleRegistry;
use super::verifier::{JwtVerifier, StaticTokenVerifier, TokenVerifier, VerifyError};
use crate::config::{Config, VerifierKind};
use crate::error::{ErrorCode, RolegateError};
use crate::telemetry::metrics::AuthFailureCounter;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";
pub const ORGANIZATION_ID_HEADER: &str = "x-organization-id";
pub const TEAM_ID_HEADER: &str = "x-team-id";
pub const REQUEST_ID_HEADER: &str = "x-request-id";

const IDENTITY_HEADERS: [&str; 4] = [
    USER_ID_HEADER,
    USER_ROLE_HEADER,
    ORGANIZATION_ID_HEADER,
    TEAM_ID_HEADER,
];

// ═══════════════════════════════════════════════════════════════════════════════
// Identity Context
// ═══════════════════════════════════════════════════════════════════════════════

/// Identity handed to the handler once a request is allowed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityContext {
    pub user_id: String,
    pub email: String,
    pub role_id: String,
    pub organization_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team_id: Option<String>,
}

impl IdentityContext {
    pub fn from_user(user: &UserWithRole) -> Self {
        Self {
            user_id: user.id.to_string(),
            email: user.email.clone(),
            role_id: user.role.id.to_string(),
            organization_id: user.organization_id.to_string(),
            team_id: user.team_id.as_ref().map(|t| t.to_string()),
        }
    }

    /// Identity headers for forwarding downstream. Values that are not valid
    /// header text are left out.
    pub fn to_headers(&self) -> HeaderMap {
        let pairs = [
            (USER_ID_HEADER, Some(&self.user_id)),
            (USER_ROLE_HEADER, Some(&self.role_id)),
            (ORGANIZATION_ID_HEADER, Some(&self.organization_id)),
            (TEAM_ID_HEADER, self.team_id.as_ref()),
        ];

        let mut headers = HeaderMap::new();
        for (name, value) in pairs {
            if let Some(value) = value.and_then(|v| HeaderValue::from_str(v).ok()) {
                headers.insert(HeaderName::from_static(name), value);
            }
        }
        headers
    }
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for IdentityContext
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<IdentityContext>()
            .cloned()
            .ok_or_else(|| {
                RolegateError::internal(
                    "identity context missing, RequirePermissionLayer is not applied",
                )
                .into_response()
            })
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Errors
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Error)]
pub enum AuthorizeError {
    #[error("authentication required")]
    MissingCredentials,

    #[error(transparent)]
    Verification(#[from] VerifyError),

    #[error("{action} on {resource} is not permitted")]
    Forbidden {
        resource: ResourceType,
        action: ActionType,
    },

    #[error("internal error: {0}")]
    Internal(String),
}

impl AuthorizeError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::MissingCredentials => StatusCode::UNAUTHORIZED,
            Self::Verification(e) => e.status(),
            Self::Forbidden { .. } => StatusCode::FORBIDDEN,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            Self::MissingCredentials => ErrorCode::MissingCredentials,
            Self::Verification(e) => e.code(),
            Self::Forbidden { .. } => ErrorCode::Forbidden,
            Self::Internal(_) => ErrorCode::InternalError,
        }
    }
}

impl IntoResponse for AuthorizeError {
    fn into_response(self) -> Response {
        RolegateError::from(self).into_response()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Authorizer
// ═══════════════════════════════════════════════════════════════════════════════

/// Request gate combining a verifier, the policy engine and an audit sink.
pub struct Authorizer {
    engine: PolicyEngine,
    verifier: Arc<dyn TokenVerifier>,
    jwt: Option<Arc<JwtVerifier>>,
    audit: Arc<dyn AuditSink>,
    header: HeaderName,
    record_grants: bool,
}

impl Authorizer {
    pub fn new(
        registry: Arc<RoleRegistry>,
        verifier: Arc<dyn TokenVerifier>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            engine: PolicyEngine::new(registry),
            verifier,
            jwt: None,
            audit,
            header: AUTHORIZATION,
            record_grants: false,
        }
    }

    /// Gate verified by `jwt`, keeping the handle for revocations.
    pub fn with_jwt(
        registry: Arc<RoleRegistry>,
        jwt: Arc<JwtVerifier>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        let mut authorizer = Self::new(registry, jwt.clone(), audit);
        authorizer.jwt = Some(jwt);
        authorizer
    }

    /// Read the bearer credential from `header` instead of `authorization`.
    pub fn with_header(mut self, header: HeaderName) -> Self {
        self.header = header;
        self
    }

    /// Audit allowed requests as well as denials.
    pub fn with_grant_auditing(mut self, enabled: bool) -> Self {
        self.record_grants = enabled;
        self
    }

    /// Wire registry, verifier and audit sink from configuration. Spawns the
    /// audit writer, so it must run inside a Tokio runtime.
    pub fn from_config(config: &Config) -> Result<Self, RolegateError> {
        let registry = Arc::new(load_registry(&config.catalog)?);

        let header = HeaderName::from_bytes(config.auth.header.as_bytes()).map_err(|e| {
            RolegateError::configuration(format!(
                "invalid auth header name {:?}: {e}",
                config.auth.header
            ))
        })?;

        let jwt = match config.auth.verifier {
            VerifierKind::Jwt => Some(Arc::new(JwtVerifier::new(&config.auth)?)),
            VerifierKind::Static => None,
        };

        let audit = sink_from_settings(&config.audit);
        let authorizer = match jwt {
            Some(jwt) => Self::with_jwt(registry, jwt, audit),
            None => {
                let verifier = StaticTokenVerifier::from_settings(&config.auth.static_credentials);
                Self::new(registry, Arc::new(verifier), audit)
            }
        };

        Ok(authorizer
            .with_header(header)
            .with_grant_auditing(config.audit.record_grants))
    }

    pub fn engine(&self) -> &PolicyEngine {
        &self.engine
    }

    pub fn registry(&self) -> &Arc<RoleRegistry> {
        self.engine.registry()
    }

    /// The JWT verifier, when the gate verifies JWTs. Revoke tokens here.
    pub fn jwt_verifier(&self) -> Option<&Arc<JwtVerifier>> {
        self.jwt.as_ref()
    }

    /// Gate `handler` on `action` over `resource` without record context, so
    /// condition-bearing permissions deny here.
    pub async fn authorize<F, Fut, T>(
        &self,
        headers: &HeaderMap,
        resource: ResourceType,
        action: ActionType,
        handler: F,
    ) -> Result<T, AuthorizeError>
    where
        F: FnOnce(IdentityContext) -> Fut,
        Fut: Future<Output = T>,
    {
        self.authorize_with_context(headers, resource, action, None, handler)
            .await
    }

    pub async fn authorize_with_context<F, Fut, T>(
        &self,
        headers: &HeaderMap,
        resource: ResourceType,
        action: ActionType,
        context: Option<&PermissionContext>,
        handler: F,
    ) -> Result<T, AuthorizeError>
    where
        F: FnOnce(IdentityContext) -> Fut,
        Fut: Future<Output = T>,
    {
        let request_id = headers
            .get(REQUEST_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let gated = AssertUnwindSafe(async {
            let user = self.authenticate(headers).await?;
            self.enforce(&user, resource, action, context, request_id.as_deref())?;
            Ok::<T, AuthorizeError>(handler(IdentityContext::from_user(&user)).await)
        })
        .catch_unwind()
        .await;

        let result = match gated {
            Ok(result) => result,
            Err(panic) => {
                let detail = panic_message(panic.as_ref());
                error!(
                    resource = %resource,
                    action = %action,
                    panic = %detail,
                    "Panic during authorization"
                );
                Err(AuthorizeError::Internal(detail))
            }
        };

        if let Err(e) = &result {
            if e.status() == StatusCode::UNAUTHORIZED {
                debug!(resource = %resource, action = %action, error = %e, "Authentication failed");
                AuthFailureCounter::increment(&e.code().to_string());
            }
        }
        result
    }

    /// Resolve the caller from the bearer credential in `headers`.
    pub async fn authenticate(&self, headers: &HeaderMap) -> Result<UserWithRole, AuthorizeError> {
        let credential = self
            .bearer_credential(headers)
            .ok_or(AuthorizeError::MissingCredentials)?;
        let claims = self.verifier.verify(credential).await?;
        Ok(self.registry().resolve_user(&claims))
    }

    fn bearer_credential<'a>(&self, headers: &'a HeaderMap) -> Option<&'a str> {
        headers
            .get(&self.header)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.strip_prefix("Bearer ").or_else(|| s.strip_prefix("bearer ")))
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    fn enforce(
        &self,
        user: &UserWithRole,
        resource: ResourceType,
        action: ActionType,
        context: Option<&PermissionContext>,
        request_id: Option<&str>,
    ) -> Result<(), AuthorizeError> {
        let with_request = |event: AuditEvent| match request_id {
            Some(id) => event.with_metadata("request_id", id),
            None => event,
        };

        match self.engine.evaluate(user, resource, action, context) {
            PolicyDecision::Bypass => Ok(()),
            PolicyDecision::Allow => {
                if self.record_grants {
                    self.audit
                        .record(with_request(AuditEvent::for_user(user, resource, action, true)));
                }
                Ok(())
            }
            PolicyDecision::Deny(reason) => {
                let event = AuditEvent::for_user(user, resource, action, false)
                    .with_metadata("reason", reason.to_string());
                self.audit.record(with_request(event));
                Err(AuthorizeError::Forbidden { resource, action })
            }
        }
    }

    /// Permissions of a role; empty for unknown ids.
    pub fn get_role_permissions(&self, role_id: &str) -> Vec<Permission> {
        self.engine.get_role_permissions(role_id)
    }

    pub fn can_impersonate(&self, current: &UserWithRole, target: &UserWithRole) -> bool {
        policy::can_impersonate(current, target)
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "handler panicked".to_string()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tower Layer
// ═══════════════════════════════════════════════════════════════════════════════

/// Layer requiring `action` on `resource` for every request.
///
/// ```rust,ignore
/// let app = Router::new()
///     .route("/api/campaigns", get(list_campaigns))
///     .layer(RequirePermissionLayer::new(
///         authorizer.clone(),
///         ResourceType::Campaigns,
///         ActionType::Read,
///     ));
/// ```
#[derive(Clone)]
pub struct RequirePermissionLayer {
    authorizer: Arc<Authorizer>,
    resource: ResourceType,
    action: ActionType,
}

impl RequirePermissionLayer {
    pub fn new(authorizer: Arc<Authorizer>, resource: ResourceType, action: ActionType) -> Self {
        Self {
            authorizer,
            resource,
            action,
        }
    }
}

impl<S> Layer<S> for RequirePermissionLayer {
    type Service = RequirePermissionService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RequirePermissionService {
            inner,
            authorizer: self.authorizer.clone(),
            resource: self.resource,
            action: self.action,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tower Service
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Clone)]
pub struct RequirePermissionService<S> {
    inner: S,
    authorizer: Arc<Authorizer>,
    resource: ResourceType,
    action: ActionType,
}

impl<S> Service<Request<Body>> for RequirePermissionService<S>
where
    S: Service<Request<Body>, Response = Response> + Clone + Send + 'static,
    S::Future: Send,
    S::Error: Send,
{
    type Response = Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request<Body>) -> Self::Future {
        let authorizer = self.authorizer.clone();
        let (resource, action) = (self.resource, self.action);
        let inner = self.inner.clone();

        Box::pin(async move {
            let headers = request.headers().clone();
            let outcome = authorizer
                .authorize(&headers, resource, action, move |identity| async move {
                    let (mut request, mut inner) = (request, inner);
                    let forwarded = request.headers_mut();
                    for name in IDENTITY_HEADERS {
                        forwarded.remove(name);
                    }
                    forwarded.extend(identity.to_headers());
                    request.extensions_mut().insert(identity);
                    inner.call(request).await
                })
                .await;

            match outcome {
                Ok(response) => response,
                Err(e) => Ok(e.into_response()),
            }
        })
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════
