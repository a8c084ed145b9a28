//! # Warden Core
//!
//! Role-based access control engine.
//!
//! ## Architecture
//!
//! - **Token Codec**: signs and verifies time-limited bearer tokens
//! - **Authentication**: resolves a token to an active, fully loaded principal
//! - **RBAC**: permission aggregation and the permission (AND) / role (OR) policies
//! - **Audit**: fire-and-forget recording of every gated decision and its outcome
//! - **Store**: the credential store seam, in-memory and PostgreSQL backends
//! - **API**: axum routes guarded by a tower layer over the engine
//! - **Telemetry**: structured logging, OTLP traces and Prometheus metrics

pub mod api;
pub mod audit;
pub mod auth;
pub mod config;
pub mod engine;
pub mod error;
pub mod rbac;
pub mod seed;
pub mod store;
pub mod telemetry;

pub use error::{ErrorCode, Result, WardenError};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::audit::{AuditRecord, AuditStatus, Auditor, Classify, Outcome, RequestMeta};
    pub use crate::auth::{AuthError, Forbidden, TokenCodec, Unauthenticated};
    pub use crate::engine::{AccessEngine, AuditLabel, LoginSuccess, NewPrincipal};
    pub use crate::error::{ErrorCode, Result, WardenError};
    pub use crate::rbac::{
        aggregate, CurrentPrincipal, EffectivePermissions, GuardLayer, PermissionKey, Principal,
        PrincipalId, Requirement, Role, RouteGuard,
    };
    pub use crate::store::{AuditLog, CredentialStore, MemoryStore, StoreError};
}
