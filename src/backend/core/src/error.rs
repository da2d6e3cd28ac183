//! Error handling for Rolegate.
//!
//! Module errors (`RegistryError`, `CatalogError`, `VerifyError`,
//! `AuthorizeError`) convert into [`RolegateError`], which carries a stable
//! [`ErrorCode`], a client-safe message and an internal message for logs.
//! Rendering to HTTP goes through [`ErrorResponse`].

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;
use tracing::{error, warn};

use crate::rbac::{AuthorizeError, CatalogError, RegistryError, VerifyError};
use crate::telemetry::metrics::ErrorCounter;

pub type Result<T> = std::result::Result<T, RolegateError>;

// ═══════════════════════════════════════════════════════════════════════════════
// Error Codes
// ═══════════════════════════════════════════════════════════════════════════════

/// Machine-readable error codes. Stable across releases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Authentication (1000-1099)
    MissingCredentials,
    InvalidToken,
    TokenExpired,
    TokenRevoked,
    CredentialInactive,

    // Authorization (1100-1199)
    Forbidden,

    // Role catalog (1200-1299)
    InvalidRole,
    DuplicateRole,
    DuplicatePermission,
    EmptyActions,
    MissingFallbackRole,
    CatalogNotFound,
    CatalogParseError,
    UnsupportedCatalogFormat,
    ElevatedFallbackRole,

    // Serialization (2200-2299)
    SerializationError,

    // Configuration (5000-5099)
    ConfigurationError,
    InvalidConfiguration,

    // Internal (9000-9099)
    InternalError,
}

impl ErrorCode {
    pub const fn numeric_code(&self) -> u32 {
        match self {
            Self::MissingCredentials => 1000,
            Self::InvalidToken => 1001,
            Self::TokenExpired => 1002,
            Self::TokenRevoked => 1003,
            Self::CredentialInactive => 1004,

            Self::Forbidden => 1100,

            Self::InvalidRole => 1200,
            Self::DuplicateRole => 1201,
            Self::DuplicatePermission => 1202,
            Self::EmptyActions => 1203,
            Self::MissingFallbackRole => 1204,
            Self::CatalogNotFound => 1205,
            Self::CatalogParseError => 1206,
            Self::UnsupportedCatalogFormat => 1207,
            Self::ElevatedFallbackRole => 1208,

            Self::SerializationError => 2200,

            Self::ConfigurationError => 5000,
            Self::InvalidConfiguration => 5001,

            Self::InternalError => 9000,
        }
    }

    pub const fn http_status(&self) -> StatusCode {
        match self {
            Self::MissingCredentials
            | Self::InvalidToken
            | Self::TokenExpired
            | Self::TokenRevoked
            | Self::CredentialInactive => StatusCode::UNAUTHORIZED,

            Self::Forbidden => StatusCode::FORBIDDEN,

            Self::CatalogNotFound => StatusCode::NOT_FOUND,

            Self::InvalidRole
            | Self::DuplicateRole
            | Self::DuplicatePermission
            | Self::EmptyActions
            | Self::MissingFallbackRole
            | Self::CatalogParseError
            | Self::UnsupportedCatalogFormat
            | Self::ElevatedFallbackRole => StatusCode::UNPROCESSABLE_ENTITY,

            Self::SerializationError
            | Self::ConfigurationError
            | Self::InvalidConfiguration
            | Self::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub const fn category(&self) -> &'static str {
        match self.numeric_code() {
            1000..=1099 => "authentication",
            1100..=1199 => "authorization",
            1200..=1299 => "catalog",
            2200..=2299 => "serialization",
            5000..=5099 => "configuration",
            9000..=9099 => "internal",
            _ => "unknown",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Error Severity
// ═══════════════════════════════════════════════════════════════════════════════

/// Drives the log level an error is reported at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorSeverity {
    /// Expected client outcomes (no credentials, denied)
    Low,
    /// Bad credentials or bad catalog input
    Medium,
    /// Misconfiguration
    High,
    /// Bugs and unexpected faults
    Critical,
}

impl ErrorSeverity {
    pub const fn from_code(code: &ErrorCode) -> Self {
        match code {
            ErrorCode::MissingCredentials | ErrorCode::Forbidden => Self::Low,

            ErrorCode::InvalidToken
            | ErrorCode::TokenExpired
            | ErrorCode::TokenRevoked
            | ErrorCode::CredentialInactive
            | ErrorCode::InvalidRole
            | ErrorCode::DuplicateRole
            | ErrorCode::DuplicatePermission
            | ErrorCode::EmptyActions
            | ErrorCode::MissingFallbackRole
            | ErrorCode::CatalogNotFound
            | ErrorCode::CatalogParseError
            | ErrorCode::UnsupportedCatalogFormat => Self::Medium,

            ErrorCode::ElevatedFallbackRole => Self::High,

            ErrorCode::SerializationError
            | ErrorCode::ConfigurationError
            | ErrorCode::InvalidConfiguration => Self::High,

            ErrorCode::InternalError => Self::Critical,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Main Error Type
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Error, Debug)]
pub struct RolegateError {
    code: ErrorCode,

    /// Safe to expose to clients
    user_message: Cow<'static, str>,

    /// Logs only
    internal_message: Option<String>,

    context: HashMap<String, serde_json::Value>,

    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl fmt::Display for RolegateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.user_message)?;
        if let Some(ref internal) = self.internal_message {
            write!(f, " (internal: {})", internal)?;
        }
        Ok(())
    }
}

impl RolegateError {
    // ─────────────────────────────────────────────────────────────────────────
    // Constructors
    // ─────────────────────────────────────────────────────────────────────────

    pub fn new(code: ErrorCode, user_message: impl Into<Cow<'static, str>>) -> Self {
        let error = Self {
            code,
            user_message: user_message.into(),
            internal_message: None,
            context: HashMap::new(),
            source: None,
        };
        error.record_metrics();
        error
    }

    pub fn with_internal(
        code: ErrorCode,
        user_message: impl Into<Cow<'static, str>>,
        internal_message: impl Into<String>,
    ) -> Self {
        let mut error = Self::new(code, user_message);
        error.internal_message = Some(internal_message.into());
        error
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::with_internal(ErrorCode::InternalError, "An internal error occurred", message)
    }

    pub fn unauthorized(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorCode::MissingCredentials, message)
    }

    pub fn forbidden(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorCode::Forbidden, message)
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::with_internal(
            ErrorCode::ConfigurationError,
            "Service is misconfigured",
            message,
        )
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Builder Methods
    // ─────────────────────────────────────────────────────────────────────────

    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.source = Some(Box::new(source));
        self
    }

    pub fn with_context(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(v) = serde_json::to_value(value) {
            self.context.insert(key.into(), v);
        }
        self
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Accessors
    // ─────────────────────────────────────────────────────────────────────────

    pub fn code(&self) -> ErrorCode {
        self.code
    }

    pub fn user_message(&self) -> &str {
        &self.user_message
    }

    pub fn internal_message(&self) -> Option<&str> {
        self.internal_message.as_deref()
    }

    pub fn context(&self) -> &HashMap<String, serde_json::Value> {
        &self.context
    }

    pub fn http_status(&self) -> StatusCode {
        self.code.http_status()
    }

    pub fn severity(&self) -> ErrorSeverity {
        ErrorSeverity::from_code(&self.code)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Logging & Metrics
    // ─────────────────────────────────────────────────────────────────────────

    /// Log at the level matching the code's severity.
    pub fn log(&self) {
        let code = self.code;
        let category = code.category();
        let status = code.http_status().as_u16();

        match self.severity() {
            ErrorSeverity::Critical => error!(
                error_code = %code,
                category,
                http_status = status,
                user_message = %self.user_message,
                internal_message = ?self.internal_message,
                source = ?self.source,
                "Critical error"
            ),
            ErrorSeverity::High => error!(
                error_code = %code,
                category,
                http_status = status,
                internal_message = ?self.internal_message,
                "High severity error"
            ),
            ErrorSeverity::Medium => warn!(
                error_code = %code,
                category,
                http_status = status,
                user_message = %self.user_message,
                "Request rejected"
            ),
            ErrorSeverity::Low => tracing::debug!(
                error_code = %code,
                category,
                http_status = status,
                user_message = %self.user_message,
                "Request rejected"
            ),
        }
    }

    fn record_metrics(&self) {
        ErrorCounter::increment(self.code.category(), &self.code.to_string());
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// API Response
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Always false
    pub success: bool,
    pub error: ErrorInfo,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub code: ErrorCode,
    pub numeric_code: u32,
    pub message: String,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub details: HashMap<String, serde_json::Value>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl From<&RolegateError> for ErrorResponse {
    fn from(error: &RolegateError) -> Self {
        Self {
            success: false,
            error: ErrorInfo {
                code: error.code,
                numeric_code: error.code.numeric_code(),
                message: error.user_message.to_string(),
                details: error.context.clone(),
                timestamp: chrono::Utc::now(),
            },
        }
    }
}

impl IntoResponse for RolegateError {
    fn into_response(self) -> Response {
        self.log();
        let status = self.http_status();
        (status, Json(ErrorResponse::from(&self))).into_response()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// From Implementations
// ═══════════════════════════════════════════════════════════════════════════════

impl From<RegistryError> for RolegateError {
    fn from(error: RegistryError) -> Self {
        let code = match &error {
            RegistryError::EmptyRoleId => ErrorCode::InvalidRole,
            RegistryError::DuplicateRole(_) => ErrorCode::DuplicateRole,
            RegistryError::DuplicatePermission { .. } => ErrorCode::DuplicatePermission,
            RegistryError::EmptyActions { .. } => ErrorCode::EmptyActions,
            RegistryError::MissingFallbackRole(_) => ErrorCode::MissingFallbackRole,
            RegistryError::SuperAdminFallback(_) | RegistryError::ElevatedFallbackRole { .. } => {
                ErrorCode::ElevatedFallbackRole
            }
        };
        Self::new(code, error.to_string())
    }
}

impl From<CatalogError> for RolegateError {
    fn from(error: CatalogError) -> Self {
        match error {
            CatalogError::Registry(inner) => inner.into(),
            CatalogError::Io { .. } => {
                Self::new(ErrorCode::CatalogNotFound, error.to_string()).with_source(error)
            }
            CatalogError::UnsupportedFormat(_) => {
                Self::new(ErrorCode::UnsupportedCatalogFormat, error.to_string())
            }
            CatalogError::Toml(_) | CatalogError::Json(_) => {
                Self::new(ErrorCode::CatalogParseError, error.to_string()).with_source(error)
            }
            CatalogError::Render(_) => Self::with_internal(
                ErrorCode::SerializationError,
                "Failed to render role catalog",
                error.to_string(),
            ),
        }
    }
}

impl From<VerifyError> for RolegateError {
    fn from(error: VerifyError) -> Self {
        match &error {
            VerifyError::Misconfigured(detail) => Self::configuration(detail.clone()),
            _ => Self::new(error.code(), error.to_string()),
        }
    }
}

impl From<AuthorizeError> for RolegateError {
    fn from(error: AuthorizeError) -> Self {
        match error {
            AuthorizeError::MissingCredentials => {
                Self::unauthorized("Authentication required")
            }
            AuthorizeError::Verification(inner) => inner.into(),
            AuthorizeError::Forbidden { resource, action } => Self::forbidden(format!(
                "Insufficient permissions: {action} on {resource}"
            ))
            .with_context("resource", resource)
            .with_context("action", action),
            AuthorizeError::Internal(detail) => Self::internal(detail),
        }
    }
}

impl From<config::ConfigError> for RolegateError {
    fn from(error: config::ConfigError) -> Self {
        Self::with_internal(
            ErrorCode::InvalidConfiguration,
            "Invalid configuration",
            error.to_string(),
        )
        .with_source(error)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════
