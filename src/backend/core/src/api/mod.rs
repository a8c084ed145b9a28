//! HTTP surface for the access engine.
//!
//! Every protected route is wrapped in a [`GuardLayer`]; handlers only ever
//! see a caller that already passed authentication and authorization.
//!
//! | Route                          | Requirement            | Audit label            |
//! |--------------------------------|------------------------|------------------------|
//! | `POST /api/auth/login`         | public                 | `login` / `login_failed` |
//! | `POST /api/auth/register`      | public                 | `register`             |
//! | `GET  /api/auth/me`            | authenticated          |                        |
//! | `POST /api/auth/logout`        | authenticated          | `logout`               |
//! | `GET  /api/users`              | `read:users`           | `view_users`           |
//! | `POST /api/users`              | `create:users`         | `create_user`          |
//! | `GET  /api/users/:id`          | `read:users`           |                        |
//! | `PUT  /api/users/:id`          | `update:users`         | `update_user`          |
//! | `PUT  /api/users/:id/active`   | `update:users`         | `update_user`          |
//! | `DELETE /api/users/:id`        | `delete:users`         | `delete_user`          |
//! | `GET  /api/roles[/:id]`        | `read:roles`           |                        |
//! | `POST /api/roles`              | `create:roles`         | `create_role`          |
//! | `PUT  /api/roles/:id`          | `update:roles`         | `update_role`          |
//! | `DELETE /api/roles/:id`        | `delete:roles`         | `delete_role`          |
//! | `GET  /api/permissions[/:id]`  | `read:permissions`     |                        |
//! | `POST /api/permissions`        | `create:permissions`   |                        |
//! | `PUT  /api/permissions/:id`    | `update:permissions`   |                        |
//! | `DELETE /api/permissions/:id`  | `delete:permissions`   |                        |
//! | `GET  /api/resources`          | role `Admin`/`Manager` |                        |
//! | `GET  /api/resources/:id`      | role `Admin`           |                        |
//! | `POST/PUT/DELETE /api/resources[/:id]` | role `Admin`   |                        |
//! | `GET  /api/audit`              | `read:audit`           |                        |
//! | `GET  /api/audit/stats`        | `read:audit`           |                        |

mod handlers;

use axum::{
    routing::{delete, get, post, put},
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::engine::AccessEngine;
use crate::error::WardenError;
use crate::rbac::{GuardLayer, PermissionKeyError, RouteGuard};
use crate::store::AuditLog;
use crate::telemetry::MetricsRegistry;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<AccessEngine>,
    pub audit_log: Arc<dyn AuditLog>,
    pub metrics: MetricsRegistry,
}

/// Build the API router.
///
/// # Example
///
/// ```rust,ignore
/// let state = AppState { engine, audit_log, metrics };
/// let app = build_router(state)?;
/// ```
pub fn build_router(state: AppState) -> Result<Router, PermissionKeyError> {
    let engine = state.engine.clone();
    let guarded = |guard: RouteGuard| GuardLayer::new(engine.clone(), guard);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let router = Router::new()
        // Public
        .route("/health", get(handlers::health_check))
        .route("/metrics", get(handlers::prometheus_metrics))
        .route("/api/auth/login", post(handlers::login))
        .route("/api/auth/register", post(handlers::register))
        // Any authenticated caller
        .route(
            "/api/auth/me",
            get(handlers::me).layer(guarded(RouteGuard::authenticated())),
        )
        .route(
            "/api/auth/logout",
            post(handlers::logout).layer(guarded(RouteGuard::authenticated())),
        )
        // Users
        .route(
            "/api/users",
            get(handlers::list_users).layer(guarded(
                RouteGuard::permissions(&["read:users"])?.audited("view_users", "users"),
            )),
        )
        .route(
            "/api/users",
            post(handlers::create_user).layer(guarded(
                RouteGuard::permissions(&["create:users"])?.audited("create_user", "users"),
            )),
        )
        .route(
            "/api/users/:id",
            get(handlers::get_user).layer(guarded(RouteGuard::permissions(&["read:users"])?)),
        )
        .route(
            "/api/users/:id",
            put(handlers::update_user).layer(guarded(
                RouteGuard::permissions(&["update:users"])?.audited("update_user", "users"),
            )),
        )
        .route(
            "/api/users/:id",
            delete(handlers::delete_user).layer(guarded(
                RouteGuard::permissions(&["delete:users"])?.audited("delete_user", "users"),
            )),
        )
        .route(
            "/api/users/:id/active",
            put(handlers::set_user_active).layer(guarded(
                RouteGuard::permissions(&["update:users"])?.audited("update_user", "users"),
            )),
        )
        // Roles
        .route(
            "/api/roles",
            get(handlers::list_roles).layer(guarded(RouteGuard::permissions(&["read:roles"])?)),
        )
        .route(
            "/api/roles",
            post(handlers::create_role).layer(guarded(
                RouteGuard::permissions(&["create:roles"])?.audited("create_role", "roles"),
            )),
        )
        .route(
            "/api/roles/:id",
            get(handlers::get_role).layer(guarded(RouteGuard::permissions(&["read:roles"])?)),
        )
        .route(
            "/api/roles/:id",
            put(handlers::update_role).layer(guarded(
                RouteGuard::permissions(&["update:roles"])?.audited("update_role", "roles"),
            )),
        )
        .route(
            "/api/roles/:id",
            delete(handlers::delete_role).layer(guarded(
                RouteGuard::permissions(&["delete:roles"])?.audited("delete_role", "roles"),
            )),
        )
        // Permissions
        .route(
            "/api/permissions",
            get(handlers::list_permissions)
                .layer(guarded(RouteGuard::permissions(&["read:permissions"])?)),
        )
        .route(
            "/api/permissions",
            post(handlers::create_permission)
                .layer(guarded(RouteGuard::permissions(&["create:permissions"])?)),
        )
        .route(
            "/api/permissions/:id",
            get(handlers::get_permission)
                .layer(guarded(RouteGuard::permissions(&["read:permissions"])?)),
        )
        .route(
            "/api/permissions/:id",
            put(handlers::update_permission)
                .layer(guarded(RouteGuard::permissions(&["update:permissions"])?)),
        )
        .route(
            "/api/permissions/:id",
            delete(handlers::delete_permission)
                .layer(guarded(RouteGuard::permissions(&["delete:permissions"])?)),
        )
        // Resource descriptors: role policy
        .route(
            "/api/resources",
            get(handlers::list_resources)
                .layer(guarded(RouteGuard::any_role(["Admin", "Manager"]))),
        )
        .route(
            "/api/resources",
            post(handlers::create_resource).layer(guarded(RouteGuard::any_role(["Admin"]))),
        )
        .route(
            "/api/resources/:id",
            get(handlers::get_resource).layer(guarded(RouteGuard::any_role(["Admin"]))),
        )
        .route(
            "/api/resources/:id",
            put(handlers::update_resource).layer(guarded(RouteGuard::any_role(["Admin"]))),
        )
        .route(
            "/api/resources/:id",
            delete(handlers::delete_resource).layer(guarded(RouteGuard::any_role(["Admin"]))),
        )
        // Audit trail
        .route(
            "/api/audit",
            get(handlers::list_audit).layer(guarded(RouteGuard::permissions(&["read:audit"])?)),
        )
        .route(
            "/api/audit/stats",
            get(handlers::audit_stats).layer(guarded(RouteGuard::permissions(&["read:audit"])?)),
        )
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state);

    Ok(router)
}

/// Standard API response wrapper.
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            error_code: None,
        }
    }

    /// The failure envelope every [`WardenError`] response body uses.
    pub fn from_error(err: &WardenError) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(err.user_message()),
            error_code: Some(err.error_code().to_string()),
        }
    }
}
