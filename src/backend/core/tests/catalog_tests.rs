//! Integration tests for loading role catalogs and wiring from configuration.
//!
//! Tests cover:
//! - Loading TOML and JSON catalogs from disk
//! - Duplicate permission handling under reject and warn policies
//! - Missing files, unknown extensions and malformed documents
//! - Error code mapping for catalog failures
//! - Rejecting elevated fallback roles
//! - Building an authorizer from a configuration file
//! - Revoking JWTs on a configured authorizer

use std::io::Write;
use std::path::PathBuf;

use rolegate_core::config::{CatalogSettings, Config, VerifierKind};
use rolegate_core::error::{ErrorCode, RolegateError};
use axum::http::{header::AUTHORIZATION, HeaderMap, HeaderValue, StatusCode};
use jsonwebtoken::{encode, EncodingKey, Header};
use rolegate_core::rbac::{
    load_registry, ActionType, AuthorizeError, Authorizer, CatalogError, Condition,
    DuplicatePolicy, JwtClaims, RegistryError, ResourceType, RoleCatalog, RoleId,
    VerifiedClaims, VerifyError,
};
use tempfile::NamedTempFile;

fn write_catalog(suffix: &str, content: &str) -> NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

fn settings(path: PathBuf) -> CatalogSettings {
    CatalogSettings {
        path: Some(path),
        ..Default::default()
    }
}

const TOML_CATALOG: &str = r#"
[[roles]]
id = "viewer"
name = "Viewer"
level = 10

[[roles.permissions]]
resource = "campaigns"
actions = ["read"]

[[roles]]
id = "partner"
name = "Partner"
level = 20
description = "External agency partner"

[[roles.permissions]]
resource = "communications"
actions = ["read", "write"]
conditions = [{ type = "assigned" }]
"#;

const DUPLICATE_CATALOG: &str = r#"{
  "roles": [
    {
      "id": "viewer",
      "name": "Viewer",
      "level": 10,
      "permissions": [
        { "resource": "kols", "actions": ["read"] },
        { "resource": "kols", "actions": ["read", "write"] }
      ]
    }
  ]
}"#;

// ============================================================================
// Loading
// ============================================================================

#[test]
fn test_load_toml_catalog() {
    let file = write_catalog(".toml", TOML_CATALOG);
    let registry = load_registry(&settings(file.path().to_path_buf())).unwrap();

    assert_eq!(registry.len(), 2);
    let partner = registry.get("partner").unwrap();
    let perm = partner.permission_for(ResourceType::Communications).unwrap();
    assert!(perm.allows(ActionType::Write));
    assert_eq!(perm.conditions, vec![Condition::assigned()]);

    let roles = registry.roles();
    assert_eq!(roles[0].id.as_str(), "partner");
    assert_eq!(roles[1].id.as_str(), "viewer");
}

#[test]
fn test_load_json_catalog_matches_rendered_defaults() {
    let rendered = RoleCatalog::defaults()
        .render(rolegate_core::rbac::CatalogFormat::Json)
        .unwrap();
    let file = write_catalog(".json", &rendered);

    let registry = load_registry(&settings(file.path().to_path_buf())).unwrap();
    assert_eq!(registry.len(), 6);
    assert!(registry.get("super_admin").unwrap().is_super_admin());
}

#[test]
fn test_no_path_uses_predefined_roles() {
    let registry = load_registry(&CatalogSettings::default()).unwrap();
    assert_eq!(registry.len(), 6);
    assert_eq!(registry.fallback_role().id.as_str(), "viewer");
}

// ============================================================================
// Validation
// ============================================================================

#[test]
fn test_duplicate_permission_rejected_by_default() {
    let file = write_catalog(".json", DUPLICATE_CATALOG);
    let err = load_registry(&settings(file.path().to_path_buf())).unwrap_err();

    assert!(matches!(
        err,
        CatalogError::Registry(RegistryError::DuplicatePermission {
            resource: ResourceType::Kols,
            ..
        })
    ));
    assert_eq!(RolegateError::from(err).code(), ErrorCode::DuplicatePermission);
}

#[test]
fn test_duplicate_permission_warn_keeps_first() {
    let file = write_catalog(".json", DUPLICATE_CATALOG);
    let registry = load_registry(&CatalogSettings {
        duplicate_policy: DuplicatePolicy::Warn,
        ..settings(file.path().to_path_buf())
    })
    .unwrap();

    let viewer = registry.get("viewer").unwrap();
    let perm = viewer.permission_for(ResourceType::Kols).unwrap();
    assert!(perm.allows(ActionType::Read));
    assert!(!perm.allows(ActionType::Write));
}

#[test]
fn test_missing_fallback_role() {
    let file = write_catalog(".toml", TOML_CATALOG);
    let err = load_registry(&CatalogSettings {
        fallback_role: "guest".to_string(),
        ..settings(file.path().to_path_buf())
    })
    .unwrap_err();

    assert_eq!(RolegateError::from(err).code(), ErrorCode::MissingFallbackRole);
}

#[test]
fn test_super_admin_fallback_rejected() {
    let err = load_registry(&CatalogSettings {
        fallback_role: "super_admin".to_string(),
        ..Default::default()
    })
    .unwrap_err();

    assert!(matches!(
        err,
        CatalogError::Registry(RegistryError::SuperAdminFallback(_))
    ));
    assert_eq!(RolegateError::from(err).code(), ErrorCode::ElevatedFallbackRole);
}

#[test]
fn test_fallback_must_be_lowest_role() {
    let file = write_catalog(".toml", TOML_CATALOG);
    let err = load_registry(&CatalogSettings {
        fallback_role: "partner".to_string(),
        ..settings(file.path().to_path_buf())
    })
    .unwrap_err();

    match err {
        CatalogError::Registry(inner) => assert_eq!(
            inner,
            RegistryError::ElevatedFallbackRole {
                role: RoleId::new("partner"),
                lower: RoleId::new("viewer"),
            }
        ),
        other => panic!("unexpected error: {other}"),
    }

    let err = load_registry(&CatalogSettings {
        fallback_role: "admin".to_string(),
        ..Default::default()
    })
    .unwrap_err();
    assert_eq!(RolegateError::from(err).code(), ErrorCode::ElevatedFallbackRole);
}

// ============================================================================
// Failures
// ============================================================================

#[test]
fn test_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let err = load_registry(&settings(dir.path().join("roles.toml"))).unwrap_err();

    assert!(matches!(err, CatalogError::Io { .. }));
    assert_eq!(RolegateError::from(err).code(), ErrorCode::CatalogNotFound);
}

#[test]
fn test_unsupported_extension() {
    let file = write_catalog(".yaml", "roles: []");
    let err = load_registry(&settings(file.path().to_path_buf())).unwrap_err();
    assert_eq!(
        RolegateError::from(err).code(),
        ErrorCode::UnsupportedCatalogFormat
    );
}

#[test]
fn test_malformed_document() {
    let file = write_catalog(".toml", "[[roles]]\nid = ");
    let err = load_registry(&settings(file.path().to_path_buf())).unwrap_err();

    assert!(matches!(err, CatalogError::Toml(_)));
    assert_eq!(RolegateError::from(err).code(), ErrorCode::CatalogParseError);
}

// ============================================================================
// Configuration wiring
// ============================================================================

#[tokio::test]
async fn test_authorizer_from_config_file() {
    let catalog = write_catalog(".toml", TOML_CATALOG);
    let config_file = write_catalog(
        ".toml",
        &format!(
            r#"
[auth]
verifier = "static"
header = "X-Api-Key"

[catalog]
path = "{}"

[audit]
enabled = false
"#,
            catalog.path().display()
        ),
    );

    let config = Config::from_file(config_file.path()).unwrap();
    assert_eq!(config.auth.verifier, VerifierKind::Static);

    let authorizer = Authorizer::from_config(&config).unwrap();
    assert!(authorizer.registry().contains("partner"));
    assert_eq!(authorizer.get_role_permissions("partner").len(), 1);
    assert!(authorizer.jwt_verifier().is_none());
}

#[tokio::test]
async fn test_revoked_token_rejected_by_configured_authorizer() {
    let mut config = Config::default();
    config.auth.jwt_secret = Some("config-secret".to_string());
    config.audit.enabled = false;

    let authorizer = Authorizer::from_config(&config).unwrap();
    let identity = VerifiedClaims::new("u-1", "u1@example.com", "viewer", "org-1");
    let claims = JwtClaims::new(identity, chrono::Duration::minutes(5));
    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(b"config-secret"),
    )
    .unwrap();

    let mut headers = HeaderMap::new();
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {token}")).unwrap(),
    );

    let allowed = authorizer
        .authorize(&headers, ResourceType::Campaigns, ActionType::Read, |id| async move {
            id.user_id
        })
        .await;
    assert_eq!(allowed.unwrap(), "u-1");

    let jwt = authorizer.jwt_verifier().expect("jwt verifier configured");
    jwt.revoke(claims.jti.clone().unwrap(), chrono::Utc::now() + chrono::Duration::minutes(5));

    let err = authorizer
        .authorize(&headers, ResourceType::Campaigns, ActionType::Read, |_| async {})
        .await
        .unwrap_err();
    assert!(matches!(err, AuthorizeError::Verification(VerifyError::TokenRevoked)));
    assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
}

#[test]
fn test_authorizer_requires_jwt_key_material() {
    let config = Config::default();
    let err = match Authorizer::from_config(&config) {
        Ok(_) => panic!("expected a configuration error"),
        Err(err) => err,
    };
    assert_eq!(err.code(), ErrorCode::ConfigurationError);
}
