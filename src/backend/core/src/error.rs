//! Crate-level error type for Warden.
//!
//! Authentication and authorization failures have their own type,
//! [`AuthError`], which carries the rejection detail callers need. Everything
//! else (bad input, store outages, configuration problems) surfaces as
//! [`WardenError`], and an [`AuthError`] converts into it losslessly so
//! handlers can use a single `?`.
//!
//! # Usage
//!
//! ```rust,ignore
//! use warden_core::error::{Result, WardenError};
//!
//! fn parse_limit(raw: &str) -> Result<u32> {
//!     raw.parse().map_err(|_| WardenError::validation("limit must be a number"))
//! }
//! ```

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use metrics::counter;
use serde_json::{json, Value};
use std::borrow::Cow;
use std::fmt;
use thiserror::Error;
use tracing::{error, warn};

use crate::api::ApiResponse;
use crate::audit::{AuditStatus, Classify};
use crate::auth::{AuthError, TokenError};
use crate::store::StoreError;

// ═══════════════════════════════════════════════════════════════════════════════
// Result Type Alias
// ═══════════════════════════════════════════════════════════════════════════════

pub type Result<T> = std::result::Result<T, WardenError>;

// ═══════════════════════════════════════════════════════════════════════════════
// Error Codes
// ═══════════════════════════════════════════════════════════════════════════════

/// Machine-readable error codes. Stable across releases; the wire form is
/// [`ErrorCode::as_str`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    // Store
    DatabaseError,
    RecordNotFound,
    DuplicateRecord,

    SerializationError,
    ValidationError,
    ConfigurationError,
    InternalError,
}

impl ErrorCode {
    pub fn http_status(&self) -> StatusCode {
        match self {
            Self::RecordNotFound => StatusCode::NOT_FOUND,
            Self::DuplicateRecord => StatusCode::CONFLICT,
            Self::ValidationError | Self::SerializationError => StatusCode::BAD_REQUEST,
            Self::DatabaseError | Self::ConfigurationError | Self::InternalError => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DatabaseError => "DATABASE_ERROR",
            Self::RecordNotFound => "NOT_FOUND",
            Self::DuplicateRecord => "DUPLICATE_RECORD",
            Self::SerializationError => "SERIALIZATION_ERROR",
            Self::ValidationError => "VALIDATION_ERROR",
            Self::ConfigurationError => "CONFIG_ERROR",
            Self::InternalError => "INTERNAL_ERROR",
        }
    }

    /// Whether the caller caused it.
    pub fn is_client_error(&self) -> bool {
        self.http_status().is_client_error()
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Main Error Type
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Error)]
pub enum WardenError {
    /// Authentication or authorization failure, passed through untouched.
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("[{code}] {message}")]
    Service {
        code: ErrorCode,
        /// Safe to return to the client.
        message: Cow<'static, str>,
        /// Logged only.
        internal: Option<String>,
    },
}

impl WardenError {
    pub fn new(code: ErrorCode, message: impl Into<Cow<'static, str>>) -> Self {
        Self::Service {
            code,
            message: message.into(),
            internal: None,
        }
    }

    pub fn with_internal(
        code: ErrorCode,
        message: impl Into<Cow<'static, str>>,
        internal: impl Into<String>,
    ) -> Self {
        Self::Service {
            code,
            message: message.into(),
            internal: Some(internal.into()),
        }
    }

    pub fn not_found(entity: &str, id: impl fmt::Display) -> Self {
        Self::new(ErrorCode::RecordNotFound, format!("{} not found: {}", entity, id))
    }

    pub fn validation(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorCode::ValidationError, message)
    }

    pub fn http_status(&self) -> StatusCode {
        match self {
            Self::Auth(e) => e.status_code(),
            Self::Service { code, .. } => code.http_status(),
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Auth(e) => e.code(),
            Self::Service { code, .. } => code.as_str(),
        }
    }

    pub fn user_message(&self) -> String {
        match self {
            Self::Auth(e) => e.public_message(),
            Self::Service { message, .. } => message.to_string(),
        }
    }

    fn log(&self) {
        match self {
            Self::Auth(_) => {}
            Self::Service {
                code,
                message,
                internal,
            } => {
                if code.is_client_error() {
                    warn!(error_code = %code, user_message = %message, "Request rejected");
                } else {
                    error!(
                        error_code = %code,
                        user_message = %message,
                        internal_message = ?internal,
                        "Request failed"
                    );
                }
            }
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Axum Integration
// ═══════════════════════════════════════════════════════════════════════════════

impl IntoResponse for WardenError {
    fn into_response(self) -> Response {
        self.log();
        match self {
            Self::Auth(auth) => auth.into_response(),
            Self::Service { code, .. } => {
                counter!("warden_errors_total", "code" => code.as_str()).increment(1);
                let body: ApiResponse<()> = ApiResponse::from_error(&self);
                (code.http_status(), Json(body)).into_response()
            }
        }
    }
}

impl Classify for WardenError {
    fn audit_status(&self) -> AuditStatus {
        match self {
            Self::Auth(e) => e.audit_status(),
            Self::Service { .. } => AuditStatus::Failed,
        }
    }

    fn audit_details(&self) -> Value {
        match self {
            Self::Auth(e) => e.audit_details(),
            Self::Service { code, message, .. } => json!({
                "code": code.as_str(),
                "reason": message,
            }),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// From Implementations
// ═══════════════════════════════════════════════════════════════════════════════

impl From<StoreError> for WardenError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { entity, id } => Self::not_found(entity, id),
            StoreError::Conflict { entity, key } => Self::new(
                ErrorCode::DuplicateRecord,
                format!("{} already exists: {}", entity, key),
            ),
            other => Self::with_internal(
                ErrorCode::DatabaseError,
                "A database error occurred",
                other.to_string(),
            ),
        }
    }
}

impl From<TokenError> for WardenError {
    fn from(err: TokenError) -> Self {
        Self::Auth(err.into())
    }
}

impl From<serde_json::Error> for WardenError {
    fn from(err: serde_json::Error) -> Self {
        Self::with_internal(
            ErrorCode::SerializationError,
            "Failed to process JSON data",
            err.to_string(),
        )
    }
}

impl From<config::ConfigError> for WardenError {
    fn from(err: config::ConfigError) -> Self {
        Self::with_internal(
            ErrorCode::ConfigurationError,
            "Configuration error occurred",
            err.to_string(),
        )
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{Forbidden, Unauthenticated};

    #[test]
    fn test_error_code_status_mapping() {
        assert_eq!(ErrorCode::RecordNotFound.http_status(), StatusCode::NOT_FOUND);
        assert_eq!(ErrorCode::DuplicateRecord.http_status(), StatusCode::CONFLICT);
        assert_eq!(ErrorCode::ValidationError.http_status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            ErrorCode::DatabaseError.http_status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_auth_errors_keep_their_status() {
        let err: WardenError = AuthError::from(Unauthenticated::ExpiredToken).into();
        assert_eq!(err.http_status(), StatusCode::UNAUTHORIZED);
        assert_eq!(err.error_code(), "TOKEN_EXPIRED");
        assert_eq!(err.user_message(), "Token expired.");

        let err: WardenError = AuthError::from(Forbidden::SelfDeletion).into();
        assert_eq!(err.http_status(), StatusCode::FORBIDDEN);
        assert_eq!(err.audit_status(), AuditStatus::Denied);
    }

    #[test]
    fn test_store_error_conversion() {
        let err: WardenError = StoreError::not_found("principal", "abc").into();
        assert_eq!(err.http_status(), StatusCode::NOT_FOUND);

        let err: WardenError = StoreError::Conflict {
            entity: "principal",
            key: "alice".into(),
        }
        .into();
        assert_eq!(err.error_code(), "DUPLICATE_RECORD");

        let err: WardenError = StoreError::Backend("connection reset".into()).into();
        assert_eq!(err.http_status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!err.user_message().contains("connection reset"));
        assert_eq!(err.audit_status(), AuditStatus::Failed);
    }

    async fn body_of(err: WardenError) -> (StatusCode, Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_into_response_status() {
        let (status, _) = body_of(WardenError::validation("bad")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = body_of(WardenError::from(AuthError::InvalidCredentials)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_response_body_code_matches_error_code() {
        let cases = [
            WardenError::not_found("principal", "42"),
            WardenError::from(StoreError::Conflict {
                entity: "role",
                key: "Admin".into(),
            }),
            WardenError::from(config::ConfigError::Message("missing".into())),
            WardenError::from(StoreError::Backend("down".into())),
        ];
        for err in cases {
            let expected = err.error_code();
            let (status, body) = body_of(err).await;
            assert_eq!(body["error_code"], expected, "status {}", status);
            assert_eq!(body["success"], false);
            assert!(body.get("data").is_none());
        }

        let (status, body) = body_of(WardenError::not_found("principal", "42")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error_code"], "NOT_FOUND");
    }

    #[test]
    fn test_service_audit_details_use_wire_code() {
        let err = WardenError::not_found("role", "x");
        assert_eq!(err.audit_details()["code"], "NOT_FOUND");
    }
}
