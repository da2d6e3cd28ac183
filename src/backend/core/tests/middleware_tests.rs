//! Integration tests for the authorization layer on axum routes.
//!
//! Tests cover:
//! - 401 for missing, malformed, unknown, inactive, expired and revoked credentials
//! - 403 with a single audit event on denial
//! - Identity extraction and forwarded identity headers
//! - Panicking handlers mapped to 500
//! - Error response body shape

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::{to_bytes, Body},
    http::{HeaderMap, Request, StatusCode},
    routing::get,
    Json, Router,
};
use jsonwebtoken::{encode, EncodingKey, Header};
use rolegate_core::config::AuthSettings;
use rolegate_core::rbac::{
    hash_credential, ActionType, AuditEvent, Authorizer, ChannelAuditSink, IdentityContext,
    JwtClaims, JwtVerifier, RequirePermissionLayer, ResourceType, RoleRegistry,
    StaticTokenVerifier, VerifiedClaims, USER_ID_HEADER,
};
use serde_json::Value;
use tokio::sync::mpsc;
use tower::ServiceExt;

const SECRET: &str = "integration-secret-with-enough-entropy";

fn static_verifier() -> StaticTokenVerifier {
    StaticTokenVerifier::new()
        .with_credential(
            "viewer-key",
            VerifiedClaims::new("u-view", "view@example.com", "viewer", "org-1"),
        )
        .with_credential(
            "admin-key",
            VerifiedClaims::new("u-admin", "admin@example.com", "admin", "org-1"),
        )
        .with_hashed(
            hash_credential("retired-key"),
            VerifiedClaims::new("u-old", "old@example.com", "admin", "org-1"),
            false,
        )
}

fn authorizer_with(
    verifier: Arc<dyn rolegate_core::rbac::TokenVerifier>,
) -> (Arc<Authorizer>, mpsc::Receiver<AuditEvent>) {
    let (sink, rx) = ChannelAuditSink::with_receiver(16);
    let registry = Arc::new(RoleRegistry::with_defaults());
    let authorizer = Authorizer::new(registry, verifier, Arc::new(sink));
    (Arc::new(authorizer), rx)
}

fn app(
    authorizer: Arc<Authorizer>,
    resource: ResourceType,
    action: ActionType,
    calls: Arc<AtomicUsize>,
) -> Router {
    Router::new()
        .route(
            "/resource",
            get(move |identity: IdentityContext, headers: HeaderMap| {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    let forwarded = headers
                        .get(USER_ID_HEADER)
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or_default()
                        .to_string();
                    Json(serde_json::json!({
                        "userId": identity.user_id,
                        "role": identity.role_id,
                        "forwarded": forwarded,
                    }))
                }
            }),
        )
        .route(
            "/panic",
            get(|| async {
                if true {
                    panic!("handler exploded");
                }
                "unreachable"
            }),
        )
        .layer(RequirePermissionLayer::new(authorizer, resource, action))
}

fn request(path: &str, authorization: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().uri(path);
    if let Some(value) = authorization {
        builder = builder.header("authorization", value);
    }
    builder.body(Body::empty()).unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

// ============================================================================
// Authentication failures
// ============================================================================

#[tokio::test]
async fn test_missing_credentials_never_reach_handler() {
    let (authorizer, mut rx) = authorizer_with(Arc::new(static_verifier()));
    let calls = Arc::new(AtomicUsize::new(0));
    let app = app(authorizer, ResourceType::Campaigns, ActionType::Read, calls.clone());

    for header in [None, Some("viewer-key"), Some("Basic dmlld2VyOmtleQ=="), Some("Bearer   ")] {
        let response = app.clone().oneshot(request("/resource", header)).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{header:?}");
    }

    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn test_unknown_and_inactive_credentials() {
    let (authorizer, _rx) = authorizer_with(Arc::new(static_verifier()));
    let calls = Arc::new(AtomicUsize::new(0));
    let app = app(authorizer, ResourceType::Campaigns, ActionType::Read, calls.clone());

    let unknown = app.clone().oneshot(request("/resource", Some("Bearer nope"))).await.unwrap();
    assert_eq!(unknown.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(unknown).await["error"]["code"], "INVALID_TOKEN");

    let retired = app.oneshot(request("/resource", Some("Bearer retired-key"))).await.unwrap();
    assert_eq!(retired.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(retired).await["error"]["code"], "CREDENTIAL_INACTIVE");

    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_jwt_expired_and_revoked() {
    let settings = AuthSettings {
        jwt_secret: Some(SECRET.to_string()),
        leeway: Duration::ZERO,
        ..Default::default()
    };
    let verifier = Arc::new(JwtVerifier::new(&settings).unwrap());
    let (authorizer, _rx) = authorizer_with(verifier.clone());
    let calls = Arc::new(AtomicUsize::new(0));
    let app = app(authorizer, ResourceType::Campaigns, ActionType::Read, calls.clone());

    let identity = VerifiedClaims::new("u-jwt", "jwt@example.com", "viewer", "org-1");
    let key = EncodingKey::from_secret(SECRET.as_bytes());

    let valid = JwtClaims::new(identity.clone(), chrono::Duration::minutes(5));
    let token = encode(&Header::default(), &valid, &key).unwrap();
    let bearer = format!("Bearer {token}");
    let ok = app.clone().oneshot(request("/resource", Some(&bearer))).await.unwrap();
    assert_eq!(ok.status(), StatusCode::OK);
    assert_eq!(body_json(ok).await["userId"], "u-jwt");

    let expired = JwtClaims::new(identity, chrono::Duration::minutes(-5));
    let stale = encode(&Header::default(), &expired, &key).unwrap();
    let stale_bearer = format!("Bearer {stale}");
    let response = app
        .clone()
        .oneshot(request("/resource", Some(&stale_bearer)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(response).await["error"]["code"], "TOKEN_EXPIRED");

    verifier.revoke(valid.jti.clone().unwrap(), chrono::Utc::now() + chrono::Duration::minutes(5));
    let response = app.oneshot(request("/resource", Some(&bearer))).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(response).await["error"]["code"], "TOKEN_REVOKED");

    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

// ============================================================================
// Authorization
// ============================================================================

#[tokio::test]
async fn test_allowed_request_sees_identity() {
    let (authorizer, mut rx) = authorizer_with(Arc::new(static_verifier()));
    let calls = Arc::new(AtomicUsize::new(0));
    let app = app(authorizer, ResourceType::Campaigns, ActionType::Read, calls.clone());

    let request = Request::builder()
        .uri("/resource")
        .header("authorization", "Bearer viewer-key")
        .header(USER_ID_HEADER, "spoofed")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["userId"], "u-view");
    assert_eq!(body["role"], "viewer");
    assert_eq!(body["forwarded"], "u-view");
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn test_denied_request_is_forbidden_and_audited_once() {
    let (authorizer, mut rx) = authorizer_with(Arc::new(static_verifier()));
    let calls = Arc::new(AtomicUsize::new(0));
    let app = app(authorizer, ResourceType::Campaigns, ActionType::Delete, calls.clone());

    let response = app.oneshot(request("/resource", Some("Bearer viewer-key"))).await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let body = body_json(response).await;
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["code"], "FORBIDDEN");
    assert_eq!(body["error"]["numeric_code"], 1100);
    assert_eq!(
        body["error"]["message"],
        "Insufficient permissions: delete on campaigns"
    );
    assert_eq!(body["error"]["details"]["resource"], "campaigns");

    let event = rx.recv().await.unwrap();
    assert_eq!(event.user_id, "u-view");
    assert_eq!(event.resource, ResourceType::Campaigns);
    assert_eq!(event.action, ActionType::Delete);
    assert!(!event.granted);
    assert_eq!(event.metadata["reason"], "action not permitted");
    assert!(rx.try_recv().is_err());

    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_conditional_permission_without_record_is_forbidden() {
    let (authorizer, mut rx) = authorizer_with(Arc::new(static_verifier()));
    let calls = Arc::new(AtomicUsize::new(0));
    let app = app(authorizer, ResourceType::Billing, ActionType::Read, calls.clone());

    let response = app.oneshot(request("/resource", Some("Bearer admin-key"))).await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let event = rx.recv().await.unwrap();
    assert_eq!(event.metadata["reason"], "condition failed: organization");
}

// ============================================================================
// Failures inside the gate
// ============================================================================

#[tokio::test]
async fn test_handler_panic_is_internal_error() {
    let (authorizer, _rx) = authorizer_with(Arc::new(static_verifier()));
    let app = app(
        authorizer,
        ResourceType::Campaigns,
        ActionType::Read,
        Arc::new(AtomicUsize::new(0)),
    );

    let response = app.oneshot(request("/panic", Some("Bearer viewer-key"))).await.unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], "INTERNAL_ERROR");
    assert_eq!(body["error"]["message"], "An internal error occurred");
}

#[tokio::test]
async fn test_identity_extractor_without_layer() {
    let app = Router::new().route(
        "/open",
        get(|identity: IdentityContext| async move { identity.user_id }),
    );
    let response = app
        .oneshot(Request::builder().uri("/open").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}
