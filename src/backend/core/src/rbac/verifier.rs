//! Token verification.
//!
//! The authorization gate only consumes [`VerifiedClaims`]; how a credential
//! becomes claims is behind the [`TokenVerifier`] trait. Two verifiers ship
//! with the crate: signed JWTs and a static table of hashed credentials for
//! service accounts.

use async_trait::async_trait;
use axum::http::StatusCode;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use jsonwebtoken::{decode, errors::ErrorKind, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use crate::config::{AuthSettings, StaticCredentialSettings};
use crate::error::ErrorCode;

/// Identity asserted by a verified credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifiedClaims {
    pub user_id: String,
    pub email: String,
    pub role: String,
    pub organization_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team_id: Option<String>,
}

impl VerifiedClaims {
    pub fn new(
        user_id: impl Into<String>,
        email: impl Into<String>,
        role: impl Into<String>,
        organization_id: impl Into<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            email: email.into(),
            role: role.into(),
            organization_id: organization_id.into(),
            team_id: None,
        }
    }

    pub fn with_team(mut self, team_id: impl Into<String>) -> Self {
        self.team_id = Some(team_id.into());
        self
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum VerifyError {
    #[error("invalid credential")]
    InvalidToken,

    #[error("credential has expired")]
    TokenExpired,

    #[error("credential has been revoked")]
    TokenRevoked,

    #[error("credential is disabled")]
    CredentialInactive,

    #[error("verifier misconfigured: {0}")]
    Misconfigured(String),
}

impl VerifyError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidToken => ErrorCode::InvalidToken,
            Self::TokenExpired => ErrorCode::TokenExpired,
            Self::TokenRevoked => ErrorCode::TokenRevoked,
            Self::CredentialInactive => ErrorCode::CredentialInactive,
            Self::Misconfigured(_) => ErrorCode::ConfigurationError,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.code().http_status()
    }
}

/// Turns a raw bearer credential into claims.
#[async_trait]
pub trait TokenVerifier: Send + Sync {
    async fn verify(&self, credential: &str) -> Result<VerifiedClaims, VerifyError>;
}

// ═══════════════════════════════════════════════════════════════════════════════
// JWT
// ═══════════════════════════════════════════════════════════════════════════════

/// JWT payload: the identity plus registered claims.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtClaims {
    #[serde(flatten)]
    pub identity: VerifiedClaims,
    pub exp: i64,
    pub iat: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jti: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aud: Option<String>,
}

impl JwtClaims {
    pub fn new(identity: VerifiedClaims, ttl: Duration) -> Self {
        let now = Utc::now();
        Self {
            identity,
            exp: (now + ttl).timestamp(),
            iat: now.timestamp(),
            jti: Some(Uuid::new_v4().to_string()),
            iss: None,
            aud: None,
        }
    }

    pub fn issuer(mut self, issuer: impl Into<String>) -> Self {
        self.iss = Some(issuer.into());
        self
    }

    pub fn audience(mut self, audience: impl Into<String>) -> Self {
        self.aud = Some(audience.into());
        self
    }
}

pub struct JwtVerifier {
    decoding_key: DecodingKey,
    validation: Validation,
    revocation_check: bool,
    revoked: Arc<DashMap<String, DateTime<Utc>>>,
}

impl JwtVerifier {
    pub fn new(settings: &AuthSettings) -> Result<Self, VerifyError> {
        let algorithm = Algorithm::from_str(&settings.jwt_algorithm).map_err(|_| {
            VerifyError::Misconfigured(format!(
                "unsupported JWT algorithm: {}",
                settings.jwt_algorithm
            ))
        })?;

        let decoding_key = match algorithm {
            Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512 => {
                let secret = settings.jwt_secret.as_ref().ok_or_else(|| {
                    VerifyError::Misconfigured("JWT secret required for HMAC algorithms".into())
                })?;
                DecodingKey::from_secret(secret.as_bytes())
            }
            Algorithm::RS256 | Algorithm::RS384 | Algorithm::RS512 => {
                let key = public_key(settings, "RSA")?;
                DecodingKey::from_rsa_pem(key.as_bytes()).map_err(|e| {
                    VerifyError::Misconfigured(format!("invalid RSA public key: {e}"))
                })?
            }
            Algorithm::ES256 | Algorithm::ES384 => {
                let key = public_key(settings, "EC")?;
                DecodingKey::from_ec_pem(key.as_bytes()).map_err(|e| {
                    VerifyError::Misconfigured(format!("invalid EC public key: {e}"))
                })?
            }
            other => {
                return Err(VerifyError::Misconfigured(format!(
                    "unsupported JWT algorithm: {other:?}"
                )));
            }
        };

        let mut validation = Validation::new(algorithm);
        validation.leeway = settings.leeway.as_secs();
        if let Some(issuer) = &settings.issuer {
            validation.set_issuer(&[issuer]);
        }
        match &settings.audience {
            Some(audience) => validation.set_audience(&[audience]),
            None => validation.validate_aud = false,
        }

        Ok(Self {
            decoding_key,
            validation,
            revocation_check: settings.revocation_check,
            revoked: Arc::new(DashMap::new()),
        })
    }

    /// Reject the token with this id until `expires_at`.
    pub fn revoke(&self, jti: impl Into<String>, expires_at: DateTime<Utc>) {
        self.revoked.insert(jti.into(), expires_at);
    }

    /// Drop revocations whose tokens have expired anyway.
    pub fn cleanup_revoked(&self) {
        let now = Utc::now();
        self.revoked.retain(|_, exp| *exp > now);
    }

    pub fn revoked_count(&self) -> usize {
        self.revoked.len()
    }
}

fn public_key<'a>(settings: &'a AuthSettings, family: &str) -> Result<&'a str, VerifyError> {
    settings.jwt_public_key.as_deref().ok_or_else(|| {
        VerifyError::Misconfigured(format!("JWT public key required for {family} algorithms"))
    })
}

#[async_trait]
impl TokenVerifier for JwtVerifier {
    async fn verify(&self, credential: &str) -> Result<VerifiedClaims, VerifyError> {
        let data = decode::<JwtClaims>(credential, &self.decoding_key, &self.validation)
            .map_err(|e| {
                debug!(error = %e, "JWT validation failed");
                match e.kind() {
                    ErrorKind::ExpiredSignature => VerifyError::TokenExpired,
                    _ => VerifyError::InvalidToken,
                }
            })?;

        let claims = data.claims;
        if self.revocation_check {
            if let Some(jti) = &claims.jti {
                if self.revoked.contains_key(jti) {
                    return Err(VerifyError::TokenRevoked);
                }
            }
        }

        Ok(claims.identity)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Static credentials
// ═══════════════════════════════════════════════════════════════════════════════

/// Hex SHA-256 of a raw credential, the form stored in configuration.
pub fn hash_credential(credential: &str) -> String {
    hex::encode(Sha256::digest(credential.as_bytes()))
}

#[derive(Debug, Clone)]
struct StaticCredential {
    claims: VerifiedClaims,
    active: bool,
}

/// Fixed credential table. Only hashes are kept in memory.
#[derive(Debug, Clone, Default)]
pub struct StaticTokenVerifier {
    credentials: HashMap<String, StaticCredential>,
}

impl StaticTokenVerifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_credential(self, credential: &str, claims: VerifiedClaims) -> Self {
        self.with_hashed(hash_credential(credential), claims, true)
    }

    pub fn with_hashed(
        mut self,
        hash: impl Into<String>,
        claims: VerifiedClaims,
        active: bool,
    ) -> Self {
        self.credentials.insert(
            hash.into().to_ascii_lowercase(),
            StaticCredential { claims, active },
        );
        self
    }

    pub fn from_settings(entries: &[StaticCredentialSettings]) -> Self {
        entries.iter().fold(Self::new(), |verifier, entry| {
            let mut claims = VerifiedClaims::new(
                entry.user_id.clone(),
                entry.email.clone(),
                entry.role.clone(),
                entry.organization_id.clone(),
            );
            claims.team_id = entry.team_id.clone();
            verifier.with_hashed(entry.credential_sha256.clone(), claims, entry.active)
        })
    }

    pub fn len(&self) -> usize {
        self.credentials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.credentials.is_empty()
    }
}

#[async_trait]
impl TokenVerifier for StaticTokenVerifier {
    async fn verify(&self, credential: &str) -> Result<VerifiedClaims, VerifyError> {
        let entry = self
            .credentials
            .get(&hash_credential(credential))
            .ok_or(VerifyError::InvalidToken)?;

        if !entry.active {
            return Err(VerifyError::CredentialInactive);
        }
        Ok(entry.claims.clone())
    }
}
