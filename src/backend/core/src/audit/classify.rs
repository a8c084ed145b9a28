//! Mapping an operation's result onto an audit status.

use axum::{http::StatusCode, response::Response};
use serde_json::{json, Value};
use std::convert::Infallible;

use super::record::AuditStatus;
use crate::auth::AuthError;

/// Anything whose completion can be classified for the audit trail.
pub trait Classify {
    fn audit_status(&self) -> AuditStatus;

    /// Extra structured detail to store with the record.
    fn audit_details(&self) -> Value {
        Value::Null
    }
}

/// An explicit outcome for operations that classify themselves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome<T, E> {
    Success(T),
    Failed(E),
    Denied(E),
}

impl<T, E> Outcome<T, E> {
    pub fn into_result(self) -> Result<T, E> {
        match self {
            Self::Success(v) => Ok(v),
            Self::Failed(e) | Self::Denied(e) => Err(e),
        }
    }
}

impl<T, E> Classify for Outcome<T, E> {
    fn audit_status(&self) -> AuditStatus {
        match self {
            Self::Success(_) => AuditStatus::Success,
            Self::Failed(_) => AuditStatus::Failed,
            Self::Denied(_) => AuditStatus::Denied,
        }
    }
}

impl<T, E: Classify> Classify for Result<T, E> {
    fn audit_status(&self) -> AuditStatus {
        match self {
            Ok(_) => AuditStatus::Success,
            Err(e) => e.audit_status(),
        }
    }

    fn audit_details(&self) -> Value {
        match self {
            Ok(_) => Value::Null,
            Err(e) => e.audit_details(),
        }
    }
}

impl Classify for AuthError {
    fn audit_status(&self) -> AuditStatus {
        if self.is_rejection() {
            AuditStatus::Denied
        } else {
            AuditStatus::Failed
        }
    }

    fn audit_details(&self) -> Value {
        let mut details = json!({
            "code": self.code(),
            "reason": self.to_string(),
        });
        if let Some(denial) = self.denial() {
            details["required"] = json!(denial.required);
            details["available"] = json!(denial.available);
        }
        details
    }
}

impl Classify for StatusCode {
    fn audit_status(&self) -> AuditStatus {
        if self.is_success() {
            AuditStatus::Success
        } else if *self == StatusCode::UNAUTHORIZED || *self == StatusCode::FORBIDDEN {
            AuditStatus::Denied
        } else {
            AuditStatus::Failed
        }
    }

    fn audit_details(&self) -> Value {
        json!({ "status_code": self.as_u16() })
    }
}

impl Classify for Response {
    fn audit_status(&self) -> AuditStatus {
        self.status().audit_status()
    }

    fn audit_details(&self) -> Value {
        self.status().audit_details()
    }
}

impl Classify for Infallible {
    fn audit_status(&self) -> AuditStatus {
        match *self {}
    }
}
