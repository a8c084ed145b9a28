//! Authentication and authorization errors.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use metrics::counter;
use thiserror::Error;

use super::token::TokenError;
use crate::rbac::Denial;
use crate::store::StoreError;

/// Why a caller could not be identified.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Unauthenticated {
    #[error("no credential supplied")]
    MissingCredential,

    #[error("invalid token")]
    InvalidToken,

    #[error("token expired")]
    ExpiredToken,

    #[error("principal no longer exists")]
    PrincipalGone,
}

/// Why an identified caller may not proceed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Forbidden {
    #[error("account deactivated")]
    AccountDeactivated,

    #[error("insufficient permissions")]
    InsufficientPermissions(Denial),

    #[error("insufficient role privileges")]
    InsufficientRole(Denial),

    #[error("cannot delete your own account")]
    SelfDeletion,
}

impl Forbidden {
    pub fn denial(&self) -> Option<&Denial> {
        match self {
            Self::InsufficientPermissions(d) | Self::InsufficientRole(d) => Some(d),
            Self::AccountDeactivated | Self::SelfDeletion => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("unauthenticated: {0}")]
    Unauthenticated(Unauthenticated),

    #[error("forbidden: {0}")]
    Forbidden(Forbidden),

    /// Login failed. Deliberately says nothing about which check failed.
    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("credential store failure: {0}")]
    Store(String),

    #[error("authentication misconfigured: {0}")]
    Configuration(String),
}

impl AuthError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Unauthenticated(_) | Self::InvalidCredentials => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::Store(_) | Self::Configuration(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::Unauthenticated(reason) => match reason {
                Unauthenticated::MissingCredential => "MISSING_CREDENTIALS",
                Unauthenticated::InvalidToken => "INVALID_TOKEN",
                Unauthenticated::ExpiredToken => "TOKEN_EXPIRED",
                Unauthenticated::PrincipalGone => "PRINCIPAL_NOT_FOUND",
            },
            Self::Forbidden(reason) => match reason {
                Forbidden::AccountDeactivated => "ACCOUNT_DEACTIVATED",
                Forbidden::InsufficientPermissions(_) => "INSUFFICIENT_PERMISSIONS",
                Forbidden::InsufficientRole(_) => "INSUFFICIENT_ROLE",
                Forbidden::SelfDeletion => "SELF_DELETION",
            },
            Self::InvalidCredentials => "INVALID_CREDENTIALS",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::Store(_) | Self::Configuration(_) => "INTERNAL_ERROR",
        }
    }

    /// Message safe to show to the caller.
    pub fn public_message(&self) -> String {
        match self {
            Self::Unauthenticated(Unauthenticated::MissingCredential) => {
                "Access denied. No token provided.".to_string()
            }
            Self::Unauthenticated(Unauthenticated::InvalidToken) => "Invalid token.".to_string(),
            Self::Unauthenticated(Unauthenticated::ExpiredToken) => "Token expired.".to_string(),
            Self::Unauthenticated(Unauthenticated::PrincipalGone) => {
                "Invalid token. User not found.".to_string()
            }
            Self::Forbidden(Forbidden::AccountDeactivated) => {
                "Account is inactive. Contact administrator.".to_string()
            }
            Self::Forbidden(Forbidden::InsufficientPermissions(_)) => {
                "Insufficient permissions.".to_string()
            }
            Self::Forbidden(Forbidden::InsufficientRole(_)) => {
                "Insufficient role privileges.".to_string()
            }
            Self::Forbidden(Forbidden::SelfDeletion) => {
                "Cannot delete your own account.".to_string()
            }
            Self::InvalidCredentials => "Invalid credentials".to_string(),
            Self::NotFound { entity, .. } => format!("{} not found", entity),
            Self::Store(_) | Self::Configuration(_) => "An authentication error occurred".to_string(),
        }
    }

    /// Authentication or authorization rejected the caller.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            Self::Unauthenticated(_) | Self::Forbidden(_) | Self::InvalidCredentials
        )
    }

    pub fn denial(&self) -> Option<&Denial> {
        match self {
            Self::Forbidden(reason) => reason.denial(),
            _ => None,
        }
    }
}

impl From<Unauthenticated> for AuthError {
    fn from(reason: Unauthenticated) -> Self {
        Self::Unauthenticated(reason)
    }
}

impl From<Forbidden> for AuthError {
    fn from(reason: Forbidden) -> Self {
        Self::Forbidden(reason)
    }
}

impl From<TokenError> for AuthError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Invalid => Self::Unauthenticated(Unauthenticated::InvalidToken),
            TokenError::Expired => Self::Unauthenticated(Unauthenticated::ExpiredToken),
            TokenError::Signing(msg) | TokenError::Configuration(msg) => Self::Configuration(msg),
        }
    }
}

impl From<StoreError> for AuthError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { entity, id } => Self::NotFound { entity, id },
            other => Self::Store(other.to_string()),
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.code();

        counter!(
            "auth_errors_total",
            "error_type" => code
        )
        .increment(1);

        let mut body = serde_json::json!({
            "success": false,
            "error": self.public_message(),
            "error_code": code,
        });

        if let Some(denial) = self.denial() {
            body["required"] = serde_json::json!(denial.required);
            body["available"] = serde_json::json!(denial.available);
        }

        (status, Json(body)).into_response()
    }
}
