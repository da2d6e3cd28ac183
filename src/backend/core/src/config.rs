//! Configuration management.
//!
//! Every section has defaults, so an empty environment yields a working
//! configuration apart from the JWT key material. Environment variables use
//! the `ROLEGATE__` prefix with `__` between path segments, e.g.
//! `ROLEGATE__AUTH__JWT_SECRET` or `ROLEGATE__CATALOG__PATH`.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::Result;
use crate::rbac::DuplicatePolicy;
use crate::telemetry::LoggingConfig;

const ENV_PREFIX: &str = "ROLEGATE";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// development, staging or production
    #[serde(default = "default_environment")]
    pub environment: String,

    #[serde(default)]
    pub auth: AuthSettings,

    #[serde(default)]
    pub catalog: CatalogSettings,

    #[serde(default)]
    pub audit: AuditSettings,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            environment: default_environment(),
            auth: AuthSettings::default(),
            catalog: CatalogSettings::default(),
            audit: AuditSettings::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Which [`TokenVerifier`](crate::rbac::TokenVerifier) to build.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerifierKind {
    #[default]
    Jwt,
    Static,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthSettings {
    /// Header carrying the bearer credential
    #[serde(default = "default_auth_header")]
    pub header: String,

    #[serde(default)]
    pub verifier: VerifierKind,

    /// HMAC secret (HS256/384/512)
    #[serde(default)]
    pub jwt_secret: Option<String>,

    /// PEM public key (RS*/ES*)
    #[serde(default)]
    pub jwt_public_key: Option<String>,

    #[serde(default = "default_jwt_algorithm")]
    pub jwt_algorithm: String,

    #[serde(default)]
    pub issuer: Option<String>,

    #[serde(default)]
    pub audience: Option<String>,

    /// Clock skew tolerance for `exp`
    #[serde(default = "default_leeway", with = "humantime_serde")]
    pub leeway: Duration,

    #[serde(default = "default_true")]
    pub revocation_check: bool,

    /// Used when `verifier = "static"`
    #[serde(default)]
    pub static_credentials: Vec<StaticCredentialSettings>,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            header: default_auth_header(),
            verifier: VerifierKind::default(),
            jwt_secret: None,
            jwt_public_key: None,
            jwt_algorithm: default_jwt_algorithm(),
            issuer: None,
            audience: None,
            leeway: default_leeway(),
            revocation_check: true,
            static_credentials: Vec::new(),
        }
    }
}

/// A service credential, stored as the hex SHA-256 of the raw value.
#[derive(Debug, Clone, Deserialize)]
pub struct StaticCredentialSettings {
    pub credential_sha256: String,
    pub user_id: String,
    pub email: String,
    pub role: String,
    pub organization_id: String,
    #[serde(default)]
    pub team_id: Option<String>,
    #[serde(default = "default_true")]
    pub active: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CatalogSettings {
    /// TOML or JSON role catalog; the predefined roles when unset
    #[serde(default)]
    pub path: Option<PathBuf>,

    #[serde(default)]
    pub duplicate_policy: DuplicatePolicy,

    /// Role given to identities whose role id is unknown
    #[serde(default = "default_fallback_role")]
    pub fallback_role: String,
}

impl Default for CatalogSettings {
    fn default() -> Self {
        Self {
            path: None,
            duplicate_policy: DuplicatePolicy::default(),
            fallback_role: default_fallback_role(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuditSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Audit allowed requests too, not only denials
    #[serde(default)]
    pub record_grants: bool,

    #[serde(default = "default_audit_buffer")]
    pub buffer_size: usize,
}

impl Default for AuditSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            record_grants: false,
            buffer_size: default_audit_buffer(),
        }
    }
}

fn default_environment() -> String { "production".to_string() }
fn default_auth_header() -> String { "authorization".to_string() }
fn default_jwt_algorithm() -> String { "HS256".to_string() }
fn default_leeway() -> Duration { Duration::from_secs(30) }
fn default_fallback_role() -> String { crate::rbac::VIEWER_ROLE_ID.to_string() }
fn default_audit_buffer() -> usize { 1024 }
fn default_true() -> bool { true }

impl Config {
    /// Load from `ROLEGATE__*` environment variables.
    pub fn load() -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()?;

        Ok(config.try_deserialize()?)
    }

    /// Load from a file, with environment variables taking precedence.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::File::from(path.as_ref()))
            .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()?;

        Ok(config.try_deserialize()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.environment, "production");
        assert_eq!(config.auth.header, "authorization");
        assert_eq!(config.auth.jwt_algorithm, "HS256");
        assert_eq!(config.auth.leeway, Duration::from_secs(30));
        assert_eq!(config.catalog.fallback_role, "viewer");
        assert_eq!(config.catalog.duplicate_policy, DuplicatePolicy::Reject);
        assert!(config.audit.enabled);
        assert!(!config.audit.record_grants);
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
environment = "development"

[auth]
jwt_secret = "from-file"
leeway = "2m"
verifier = "static"

[[auth.static_credentials]]
credential_sha256 = "abc123"
user_id = "svc-reports"
email = "reports@example.com"
role = "analyst"
organization_id = "org-1"

[catalog]
duplicate_policy = "warn"
fallback_role = "guest"

[audit]
record_grants = true
"#
        )
        .unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.environment, "development");
        assert_eq!(config.auth.jwt_secret.as_deref(), Some("from-file"));
        assert_eq!(config.auth.leeway, Duration::from_secs(120));
        assert_eq!(config.auth.verifier, VerifierKind::Static);
        assert_eq!(config.auth.static_credentials.len(), 1);
        assert!(config.auth.static_credentials[0].active);
        assert_eq!(config.catalog.duplicate_policy, DuplicatePolicy::Warn);
        assert_eq!(config.catalog.fallback_role, "guest");
        assert!(config.audit.record_grants);
        assert_eq!(config.audit.buffer_size, 1024);
    }
}
