//! Audit records and the request metadata captured alongside them.

use axum::http::HeaderMap;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::rbac::PrincipalId;

/// Terminal outcome of a gated operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditStatus {
    Success,
    Failed,
    Denied,
}

impl AuditStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Denied => "denied",
        }
    }
}

impl fmt::Display for AuditStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuditStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(Self::Success),
            "failed" => Ok(Self::Failed),
            "denied" => Ok(Self::Denied),
            other => Err(format!("unknown audit status '{}'", other)),
        }
    }
}

/// One immutable entry in the audit trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: Uuid,
    /// `None` when the caller never authenticated.
    pub actor_id: Option<PrincipalId>,
    pub action: String,
    pub resource: String,
    pub status: AuditStatus,
    pub timestamp: DateTime<Utc>,
    pub origin: Option<String>,
    pub user_agent: Option<String>,
    pub details: Value,
}

impl AuditRecord {
    pub(crate) fn new(
        actor_id: Option<PrincipalId>,
        action: impl Into<String>,
        resource: impl Into<String>,
        status: AuditStatus,
        details: Value,
        meta: &RequestMeta,
    ) -> Self {
        let mut details = redact_details(details);
        meta.merge_into(&mut details);

        Self {
            id: Uuid::new_v4(),
            actor_id,
            action: action.into(),
            resource: resource.into(),
            status,
            timestamp: Utc::now(),
            origin: meta.origin.clone(),
            user_agent: meta.user_agent.clone(),
            details,
        }
    }

    /// Rebuild a record that was already persisted.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn restore(
        id: Uuid,
        actor_id: Option<PrincipalId>,
        action: String,
        resource: String,
        status: AuditStatus,
        timestamp: DateTime<Utc>,
        origin: Option<String>,
        user_agent: Option<String>,
        details: Value,
    ) -> Self {
        Self {
            id,
            actor_id,
            action,
            resource,
            status,
            timestamp,
            origin,
            user_agent,
            details,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Request Metadata
// ═══════════════════════════════════════════════════════════════════════════════

/// Where a request came from, as far as the transport can tell.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestMeta {
    pub origin: Option<String>,
    pub user_agent: Option<String>,
    pub method: Option<String>,
    pub path: Option<String>,
}

impl RequestMeta {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let header = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(|s| s.to_string())
        };

        // First hop of x-forwarded-for is the client.
        let origin = header("x-forwarded-for")
            .and_then(|v| v.split(',').next().map(|s| s.trim().to_string()))
            .filter(|s| !s.is_empty())
            .or_else(|| header("x-real-ip"));

        Self {
            origin,
            user_agent: header("user-agent"),
            method: None,
            path: None,
        }
    }

    pub fn with_route(mut self, method: impl Into<String>, path: impl Into<String>) -> Self {
        self.method = Some(method.into());
        self.path = Some(path.into());
        self
    }

    fn merge_into(&self, details: &mut Value) {
        if self.method.is_none() && self.path.is_none() {
            return;
        }
        if !details.is_object() {
            let previous = std::mem::take(details);
            let mut map = Map::new();
            if !previous.is_null() {
                map.insert("value".to_string(), previous);
            }
            *details = Value::Object(map);
        }
        if let Value::Object(map) = details {
            if let Some(ref method) = self.method {
                map.entry("method").or_insert_with(|| Value::from(method.clone()));
            }
            if let Some(ref path) = self.path {
                map.entry("path").or_insert_with(|| Value::from(path.clone()));
            }
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Redaction
// ═══════════════════════════════════════════════════════════════════════════════

const SENSITIVE_FIELDS: &[&str] = &[
    "password",
    "passwd",
    "secret",
    "token",
    "api_key",
    "apikey",
    "credential",
    "private_key",
    "authorization",
];

pub fn is_sensitive_field(name: &str) -> bool {
    let lower = name.to_lowercase();
    SENSITIVE_FIELDS.iter().any(|p| lower.contains(p))
}

/// Replace the value of every sensitive-looking key, at any depth.
pub fn redact_details(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| {
                    if is_sensitive_field(&k) {
                        (k, Value::from("[REDACTED]"))
                    } else {
                        (k, redact_details(v))
                    }
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.into_iter().map(redact_details).collect()),
        other => other,
    }
}
