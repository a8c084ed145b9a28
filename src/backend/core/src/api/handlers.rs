//! API request handlers.
//!
//! Handlers behind a [`GuardLayer`](crate::rbac::GuardLayer) receive the
//! caller through [`CurrentPrincipal`] and return `Result<_, WardenError>`
//! so failures map to status codes via `IntoResponse`.

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{ApiResponse, AppState};
use crate::audit::{AuditFilter, AuditStatus, RequestMeta};
use crate::engine::{NewPermission, NewPrincipal, NewResource, NewRole, Registration, RoleDetail};
use crate::error::WardenError;
use crate::rbac::{
    CurrentPrincipal, Permission, PermissionChanges, PermissionId, PrincipalChanges,
    PrincipalId, PrincipalProfile, Resource, ResourceChanges, ResourceId, Role, RoleChanges,
    RoleId,
};

// ═══════════════════════════════════════════════════════════════════════════════
// Health & Metrics
// ═══════════════════════════════════════════════════════════════════════════════

pub async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": Utc::now().to_rfc3339()
    }))
}

pub async fn prometheus_metrics(State(state): State<AppState>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        state.metrics.render(),
    )
}

// ═══════════════════════════════════════════════════════════════════════════════
// Authentication
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

pub async fn login(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, WardenError> {
    if req.username.trim().is_empty() || req.password.is_empty() {
        return Err(WardenError::validation("username and password are required"));
    }

    let meta = RequestMeta::from_headers(&headers).with_route("POST", "/api/auth/login");
    let success = state
        .engine
        .login(req.username.trim(), &req.password, &meta)
        .await?;

    Ok(Json(ApiResponse::success(success)))
}

pub async fn register(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<Registration>,
) -> Result<impl IntoResponse, WardenError> {
    let meta = RequestMeta::from_headers(&headers).with_route("POST", "/api/auth/register");
    let principal = state.engine.register(req, &meta).await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(principal.profile())),
    ))
}

pub async fn me(CurrentPrincipal(principal): CurrentPrincipal) -> impl IntoResponse {
    Json(ApiResponse::success(principal.profile()))
}

pub async fn logout(
    State(state): State<AppState>,
    headers: HeaderMap,
    CurrentPrincipal(principal): CurrentPrincipal,
) -> impl IntoResponse {
    let meta = RequestMeta::from_headers(&headers).with_route("POST", "/api/auth/logout");
    state.engine.logout(&principal, &meta);
    Json(ApiResponse::success(serde_json::json!({ "message": "Logged out" })))
}

// ═══════════════════════════════════════════════════════════════════════════════
// Users
// ═══════════════════════════════════════════════════════════════════════════════

pub async fn list_users(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Vec<PrincipalProfile>>>, WardenError> {
    let principals = state.engine.list_principals().await?;
    let profiles = principals.iter().map(|p| p.profile()).collect();
    Ok(Json(ApiResponse::success(profiles)))
}

pub async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<PrincipalId>,
) -> Result<Json<ApiResponse<PrincipalProfile>>, WardenError> {
    let principal = state.engine.find_principal(id).await?;
    Ok(Json(ApiResponse::success(principal.profile())))
}

pub async fn create_user(
    State(state): State<AppState>,
    Json(req): Json<NewPrincipal>,
) -> Result<impl IntoResponse, WardenError> {
    let principal = state.engine.create_principal(req).await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(principal.profile())),
    ))
}

#[derive(Deserialize)]
pub struct SetActiveRequest {
    pub is_active: bool,
}

pub async fn set_user_active(
    State(state): State<AppState>,
    Path(id): Path<PrincipalId>,
    Json(req): Json<SetActiveRequest>,
) -> Result<Json<ApiResponse<PrincipalProfile>>, WardenError> {
    let principal = state.engine.set_principal_active(id, req.is_active).await?;
    Ok(Json(ApiResponse::success(principal.profile())))
}

pub async fn update_user(
    State(state): State<AppState>,
    Path(id): Path<PrincipalId>,
    Json(changes): Json<PrincipalChanges>,
) -> Result<Json<ApiResponse<PrincipalProfile>>, WardenError> {
    let principal = state.engine.update_principal(id, changes).await?;
    Ok(Json(ApiResponse::success(principal.profile())))
}

pub async fn delete_user(
    State(state): State<AppState>,
    CurrentPrincipal(actor): CurrentPrincipal,
    Path(id): Path<PrincipalId>,
) -> Result<impl IntoResponse, WardenError> {
    state.engine.delete_principal(&actor, id).await?;
    Ok(Json(ApiResponse::success(serde_json::json!({
        "message": "User deleted successfully"
    }))))
}

// ═══════════════════════════════════════════════════════════════════════════════
// Roles
// ═══════════════════════════════════════════════════════════════════════════════

pub async fn list_roles(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Vec<Role>>>, WardenError> {
    let roles = state.engine.list_roles().await?;
    Ok(Json(ApiResponse::success(roles)))
}

pub async fn get_role(
    State(state): State<AppState>,
    Path(id): Path<RoleId>,
) -> Result<Json<ApiResponse<RoleDetail>>, WardenError> {
    let detail = state.engine.role_detail(id).await?;
    Ok(Json(ApiResponse::success(detail)))
}

pub async fn create_role(
    State(state): State<AppState>,
    Json(req): Json<NewRole>,
) -> Result<impl IntoResponse, WardenError> {
    let role = state.engine.create_role(req).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(role))))
}

pub async fn update_role(
    State(state): State<AppState>,
    Path(id): Path<RoleId>,
    Json(changes): Json<RoleChanges>,
) -> Result<Json<ApiResponse<Role>>, WardenError> {
    let role = state.engine.update_role(id, changes).await?;
    Ok(Json(ApiResponse::success(role)))
}

pub async fn delete_role(
    State(state): State<AppState>,
    Path(id): Path<RoleId>,
) -> Result<impl IntoResponse, WardenError> {
    state.engine.delete_role(id).await?;
    Ok(Json(ApiResponse::success(serde_json::json!({
        "message": "Role deleted successfully"
    }))))
}

// ═══════════════════════════════════════════════════════════════════════════════
// Permissions
// ═══════════════════════════════════════════════════════════════════════════════

pub async fn list_permissions(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Vec<Permission>>>, WardenError> {
    let permissions = state.engine.list_permissions().await?;
    Ok(Json(ApiResponse::success(permissions)))
}

pub async fn get_permission(
    State(state): State<AppState>,
    Path(id): Path<PermissionId>,
) -> Result<Json<ApiResponse<Permission>>, WardenError> {
    let permission = state.engine.find_permission(id).await?;
    Ok(Json(ApiResponse::success(permission)))
}

pub async fn create_permission(
    State(state): State<AppState>,
    Json(req): Json<NewPermission>,
) -> Result<impl IntoResponse, WardenError> {
    let permission = state.engine.create_permission(req).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(permission))))
}

pub async fn update_permission(
    State(state): State<AppState>,
    Path(id): Path<PermissionId>,
    Json(changes): Json<PermissionChanges>,
) -> Result<Json<ApiResponse<Permission>>, WardenError> {
    let permission = state.engine.update_permission(id, changes).await?;
    Ok(Json(ApiResponse::success(permission)))
}

pub async fn delete_permission(
    State(state): State<AppState>,
    Path(id): Path<PermissionId>,
) -> Result<impl IntoResponse, WardenError> {
    state.engine.delete_permission(id).await?;
    Ok(Json(ApiResponse::success(serde_json::json!({
        "message": "Permission deleted successfully"
    }))))
}

// ═══════════════════════════════════════════════════════════════════════════════
// Resources
// ═══════════════════════════════════════════════════════════════════════════════

pub async fn list_resources(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Vec<Resource>>>, WardenError> {
    let resources = state.engine.list_resources().await?;
    Ok(Json(ApiResponse::success(resources)))
}

pub async fn get_resource(
    State(state): State<AppState>,
    Path(id): Path<ResourceId>,
) -> Result<Json<ApiResponse<Resource>>, WardenError> {
    let resource = state.engine.find_resource(id).await?;
    Ok(Json(ApiResponse::success(resource)))
}

pub async fn create_resource(
    State(state): State<AppState>,
    Json(req): Json<NewResource>,
) -> Result<impl IntoResponse, WardenError> {
    let resource = state.engine.create_resource(req).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(resource))))
}

pub async fn update_resource(
    State(state): State<AppState>,
    Path(id): Path<ResourceId>,
    Json(changes): Json<ResourceChanges>,
) -> Result<Json<ApiResponse<Resource>>, WardenError> {
    let resource = state.engine.update_resource(id, changes).await?;
    Ok(Json(ApiResponse::success(resource)))
}

pub async fn delete_resource(
    State(state): State<AppState>,
    Path(id): Path<ResourceId>,
) -> Result<impl IntoResponse, WardenError> {
    state.engine.delete_resource(id).await?;
    Ok(Json(ApiResponse::success(serde_json::json!({
        "message": "Resource deleted successfully"
    }))))
}

// ═══════════════════════════════════════════════════════════════════════════════
// Audit Trail
// ═══════════════════════════════════════════════════════════════════════════════

/// Query string for `GET /api/audit`. Accepts both snake and camel case.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct AuditQuery {
    pub action: Option<String>,
    pub status: Option<AuditStatus>,
    #[serde(alias = "userId")]
    pub user_id: Option<PrincipalId>,
    #[serde(alias = "startDate")]
    pub start_date: Option<DateTime<Utc>>,
    #[serde(alias = "endDate")]
    pub end_date: Option<DateTime<Utc>>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

impl From<AuditQuery> for AuditFilter {
    fn from(q: AuditQuery) -> Self {
        Self {
            action: q.action.filter(|a| !a.is_empty()),
            status: q.status,
            actor_id: q.user_id,
            start: q.start_date,
            end: q.end_date,
            page: q.page,
            limit: q.limit,
        }
    }
}

pub async fn list_audit(
    State(state): State<AppState>,
    Query(query): Query<AuditQuery>,
) -> Result<impl IntoResponse, WardenError> {
    let filter = AuditFilter::from(query);
    if let (Some(start), Some(end)) = (filter.start, filter.end) {
        if start > end {
            return Err(WardenError::validation("start_date must not be after end_date"));
        }
    }
    let page = state.audit_log.query_audit(&filter).await?;
    Ok(Json(ApiResponse::success(page)))
}

pub async fn audit_stats(State(state): State<AppState>) -> Result<impl IntoResponse, WardenError> {
    let stats = state.audit_log.audit_stats().await?;
    Ok(Json(ApiResponse::success(stats)))
}
