//! API integration tests.
//!
//! Drives the full router with `tower::ServiceExt::oneshot` against an
//! in-memory store seeded with the demo accounts.

use std::sync::Arc;

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;
use warden_core::api::{build_router, AppState};
use warden_core::audit::{AuditStatus, Auditor};
use warden_core::auth::TokenCodec;
use warden_core::config::AuthConfig;
use warden_core::engine::AccessEngine;
use warden_core::seed;
use warden_core::store::{CatalogStore, CredentialStore, MemoryStore, StoreError};
use warden_core::telemetry::MetricsRegistry;

// ============================================================================
// Fixtures
// ============================================================================

struct TestApp {
    router: Router,
    engine: Arc<AccessEngine>,
    store: Arc<MemoryStore>,
}

async fn app() -> TestApp {
    let store = Arc::new(MemoryStore::with_defaults());
    seed::seed_demo_users(store.as_ref()).await.unwrap();

    let config = AuthConfig {
        jwt_secret: "api-tests-secret".into(),
        ..AuthConfig::default()
    };
    let codec = TokenCodec::with_system_clock(&config).unwrap();
    let auditor = Auditor::new(store.clone(), 64);
    let engine = Arc::new(AccessEngine::new(Arc::new(codec), store.clone(), auditor));

    let router = build_router(AppState {
        engine: engine.clone(),
        audit_log: store.clone(),
        metrics: MetricsRegistry::disabled(),
    })
    .unwrap();

    TestApp {
        router,
        engine,
        store,
    }
}

impl TestApp {
    async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, body)
    }

    async fn login(&self, username: &str, password: &str) -> String {
        let (status, body) = self
            .send(json_request(
                Method::POST,
                "/api/auth/login",
                None,
                json!({ "username": username, "password": password }),
            ))
            .await;
        assert_eq!(status, StatusCode::OK, "login failed: {}", body);
        body["data"]["token"].as_str().unwrap().to_string()
    }

    async fn settle(&self) {
        self.engine.auditor().flush().await;
    }
}

fn request(method: Method, uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    builder.body(Body::empty()).unwrap()
}

fn json_request(method: Method, uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

// ============================================================================
// Public routes
// ============================================================================

#[tokio::test]
async fn test_health() {
    let app = app().await;
    let (status, body) = app.send(request(Method::GET, "/health", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn test_login_returns_token_and_profile() {
    let app = app().await;
    let (status, body) = app
        .send(json_request(
            Method::POST,
            "/api/auth/login",
            None,
            json!({ "username": "manager", "password": "Manager@123" }),
        ))
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert!(body["data"]["token"].as_str().is_some());
    assert_eq!(body["data"]["principal"]["username"], "manager");
    assert_eq!(body["data"]["principal"]["roles"], json!(["Manager"]));
    assert!(body["data"]["principal"].get("secret_hash").is_none());
}

#[tokio::test]
async fn test_login_failures_are_indistinguishable() {
    let app = app().await;
    let (unknown_status, unknown) = app
        .send(json_request(
            Method::POST,
            "/api/auth/login",
            None,
            json!({ "username": "ghost", "password": "x" }),
        ))
        .await;
    let (wrong_status, wrong) = app
        .send(json_request(
            Method::POST,
            "/api/auth/login",
            None,
            json!({ "username": "admin", "password": "x" }),
        ))
        .await;

    assert_eq!(unknown_status, StatusCode::UNAUTHORIZED);
    assert_eq!(wrong_status, StatusCode::UNAUTHORIZED);
    assert_eq!(unknown, wrong);
}

#[tokio::test]
async fn test_login_requires_both_fields() {
    let app = app().await;
    let (status, body) = app
        .send(json_request(
            Method::POST,
            "/api/auth/login",
            None,
            json!({ "username": "", "password": "" }),
        ))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error_code"], "VALIDATION_ERROR");
}

// ============================================================================
// Authentication
// ============================================================================

#[tokio::test]
async fn test_me_without_token_is_unauthorized() {
    let app = app().await;
    let (status, body) = app.send(request(Method::GET, "/api/auth/me", None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["success"], false);
    assert_eq!(body["error_code"], "MISSING_CREDENTIALS");
}

#[tokio::test]
async fn test_me_with_garbage_token() {
    let app = app().await;
    let (status, body) = app
        .send(request(Method::GET, "/api/auth/me", Some("garbage")))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error_code"], "INVALID_TOKEN");
}

#[tokio::test]
async fn test_me_returns_profile_with_permissions() {
    let app = app().await;
    let token = app.login("hruser", "HR@123").await;
    let (status, body) = app
        .send(request(Method::GET, "/api/auth/me", Some(&token)))
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["username"], "hruser");
    let permissions = body["data"]["permissions"].as_array().unwrap();
    assert!(permissions.contains(&json!("create:users")));
    assert!(!permissions.contains(&json!("delete:users")));
}

#[tokio::test]
async fn test_deactivated_account_rejected_with_live_token() {
    let app = app().await;
    let admin = app.login("admin", "Admin@123").await;
    let employee = app.login("employee", "Employee@123").await;

    let employee_id = app
        .store
        .find_principal_by_username("employee")
        .await
        .unwrap()
        .id;
    let (status, _) = app
        .send(json_request(
            Method::PUT,
            &format!("/api/users/{}/active", employee_id),
            Some(&admin),
            json!({ "is_active": false }),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = app
        .send(request(Method::GET, "/api/auth/me", Some(&employee)))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error_code"], "ACCOUNT_DEACTIVATED");
}

// ============================================================================
// Authorization
// ============================================================================

#[tokio::test]
async fn test_manager_cannot_delete_users() {
    let app = app().await;
    let token = app.login("manager", "Manager@123").await;
    let target = app
        .store
        .find_principal_by_username("employee")
        .await
        .unwrap()
        .id;

    let (status, body) = app
        .send(request(
            Method::DELETE,
            &format!("/api/users/{}", target),
            Some(&token),
        ))
        .await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error_code"], "INSUFFICIENT_PERMISSIONS");
    assert_eq!(body["required"], json!(["delete:users"]));
    let available = body["available"].as_array().unwrap();
    assert!(available.contains(&json!("read:users")));
    assert!(!available.contains(&json!("delete:users")));

    app.settle().await;
    let denied: Vec<_> = app
        .store
        .audit_records()
        .into_iter()
        .filter(|r| r.action == "delete_user")
        .collect();
    assert_eq!(denied.len(), 1);
    assert_eq!(denied[0].status, AuditStatus::Denied);
}

#[tokio::test]
async fn test_resource_list_requires_admin_or_manager_role() {
    let app = app().await;
    let hr = app.login("hruser", "HR@123").await;
    let manager = app.login("manager", "Manager@123").await;

    let (status, body) = app
        .send(request(Method::GET, "/api/resources", Some(&hr)))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error_code"], "INSUFFICIENT_ROLE");
    assert_eq!(body["required"], json!(["Admin", "Manager"]));
    assert_eq!(body["available"], json!(["HR"]));

    let (status, body) = app
        .send(request(Method::GET, "/api/resources", Some(&manager)))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 7);
}

#[tokio::test]
async fn test_unauthenticated_audited_route_records_null_actor() {
    let app = app().await;
    let (status, _) = app
        .send(json_request(
            Method::POST,
            "/api/roles",
            None,
            json!({ "name": "Auditor" }),
        ))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    app.settle().await;
    let records = app.store.audit_records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].action, "create_role");
    assert_eq!(records[0].actor_id, None);
    assert_eq!(records[0].status, AuditStatus::Denied);
}

#[tokio::test]
async fn test_store_outage_during_authentication_returns_internal_error() {
    let app = app().await;
    let admin = app.login("admin", "Admin@123").await;
    app.store
        .fail_lookups(|| StoreError::Backend("connection refused".into()));

    let (status, body) = app
        .send(request(Method::GET, "/api/users", Some(&admin)))
        .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error_code"], "INTERNAL_ERROR");
    assert!(!body.to_string().contains("connection refused"));

    app.settle().await;
    let views: Vec<_> = app
        .store
        .audit_records()
        .into_iter()
        .filter(|r| r.action == "view_users")
        .collect();
    assert_eq!(views.len(), 1);
    assert_eq!(views[0].status, AuditStatus::Failed);
}

#[tokio::test]
async fn test_register_assigns_employee_role() {
    let app = app().await;
    let (status, body) = app
        .send(json_request(
            Method::POST,
            "/api/auth/register",
            None,
            json!({
                "username": "walkin",
                "email": "walkin@rbac.com",
                "password": "Walkin@1",
                "fullName": "Walk In"
            }),
        ))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["roles"], json!(["Employee"]));
    assert_eq!(body["data"]["display_name"], "Walk In");

    let token = app.login("walkin", "Walkin@1").await;
    let (status, _) = app
        .send(request(Method::GET, "/api/users", Some(&token)))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    app.settle().await;
    let registered: Vec<_> = app
        .store
        .audit_records()
        .into_iter()
        .filter(|r| r.action == "register")
        .collect();
    assert_eq!(registered.len(), 1);
    assert_eq!(registered[0].status, AuditStatus::Success);
}

#[tokio::test]
async fn test_register_rejects_taken_username() {
    let app = app().await;
    let (status, body) = app
        .send(json_request(
            Method::POST,
            "/api/auth/register",
            None,
            json!({
                "username": "admin",
                "email": "someone@rbac.com",
                "password": "Walkin@1",
                "fullName": "Someone"
            }),
        ))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error_code"], "DUPLICATE_RECORD");
}

// ============================================================================
// Users
// ============================================================================

#[tokio::test]
async fn test_admin_cannot_delete_self() {
    let app = app().await;
    let token = app.login("admin", "Admin@123").await;
    let admin_id = app
        .store
        .find_principal_by_username("admin")
        .await
        .unwrap()
        .id;

    let (status, body) = app
        .send(request(
            Method::DELETE,
            &format!("/api/users/{}", admin_id),
            Some(&token),
        ))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error_code"], "SELF_DELETION");
    assert!(app.store.find_principal_by_id(admin_id).await.is_ok());
}

#[tokio::test]
async fn test_admin_deletes_other_user() {
    let app = app().await;
    let token = app.login("admin", "Admin@123").await;
    let target = app
        .store
        .find_principal_by_username("employee")
        .await
        .unwrap()
        .id;

    let (status, _) = app
        .send(request(
            Method::DELETE,
            &format!("/api/users/{}", target),
            Some(&token),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = app
        .send(request(
            Method::GET,
            &format!("/api/users/{}", target),
            Some(&token),
        ))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], false);
    assert_eq!(body["error_code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_hr_creates_user() {
    let app = app().await;
    let token = app.login("hruser", "HR@123").await;

    let (status, body) = app
        .send(json_request(
            Method::POST,
            "/api/users",
            Some(&token),
            json!({
                "username": "newhire",
                "email": "newhire@rbac.com",
                "password": "Welcome@1",
                "roles": ["Employee"]
            }),
        ))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["roles"], json!(["Employee"]));

    let fresh = app.login("newhire", "Welcome@1").await;
    assert!(!fresh.is_empty());
}

#[tokio::test]
async fn test_list_users_is_audited() {
    let app = app().await;
    let token = app.login("manager", "Manager@123").await;

    let (status, body) = app
        .send(request(Method::GET, "/api/users", Some(&token)))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 4);

    app.settle().await;
    let views: Vec<_> = app
        .store
        .audit_records()
        .into_iter()
        .filter(|r| r.action == "view_users")
        .collect();
    assert_eq!(views.len(), 1);
    assert_eq!(views[0].status, AuditStatus::Success);
}

#[tokio::test]
async fn test_update_user_replaces_roles() {
    let app = app().await;
    let admin = app.login("admin", "Admin@123").await;
    let manager_role = app
        .store
        .list_roles()
        .await
        .unwrap()
        .into_iter()
        .find(|r| r.name == "Manager")
        .unwrap();
    let target = app
        .store
        .find_principal_by_username("employee")
        .await
        .unwrap()
        .id;

    let (status, body) = app
        .send(json_request(
            Method::PUT,
            &format!("/api/users/{}", target),
            Some(&admin),
            json!({ "fullName": "Promoted", "roleIds": [manager_role.id] }),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["display_name"], "Promoted");
    assert_eq!(body["data"]["roles"], json!(["Manager"]));

    let promoted = app.login("employee", "Employee@123").await;
    let (status, _) = app
        .send(request(Method::GET, "/api/resources", Some(&promoted)))
        .await;
    assert_eq!(status, StatusCode::OK);

    app.settle().await;
    assert!(app
        .store
        .audit_records()
        .iter()
        .any(|r| r.action == "update_user" && r.status == AuditStatus::Success));
}

#[tokio::test]
async fn test_update_user_requires_update_users() {
    let app = app().await;
    let employee = app.login("employee", "Employee@123").await;
    let target = app
        .store
        .find_principal_by_username("employee")
        .await
        .unwrap()
        .id;

    let (status, body) = app
        .send(json_request(
            Method::PUT,
            &format!("/api/users/{}", target),
            Some(&employee),
            json!({ "isActive": false }),
        ))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error_code"], "INSUFFICIENT_PERMISSIONS");
    assert!(app.store.find_principal_by_id(target).await.unwrap().is_active);
}

// ============================================================================
// Roles, permissions & resources
// ============================================================================

#[tokio::test]
async fn test_role_lifecycle() {
    let app = app().await;
    let admin = app.login("admin", "Admin@123").await;
    let read_reports = app
        .store
        .list_permissions()
        .await
        .unwrap()
        .into_iter()
        .find(|p| p.action == "read" && p.resource == "reports")
        .unwrap();

    let (status, body) = app
        .send(json_request(
            Method::POST,
            "/api/roles",
            Some(&admin),
            json!({
                "name": "Analyst",
                "description": "Reads reports",
                "level": 2,
                "permissionIds": [read_reports.id]
            }),
        ))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["permissions"][0]["resource"], "reports");
    let role_id = body["data"]["id"].as_str().unwrap().to_string();

    let (status, body) = app
        .send(json_request(
            Method::PUT,
            &format!("/api/roles/{}", role_id),
            Some(&admin),
            json!({ "description": "Reads and exports reports" }),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["name"], "Analyst");
    assert_eq!(body["data"]["description"], "Reads and exports reports");

    let (status, body) = app
        .send(request(
            Method::GET,
            &format!("/api/roles/{}", role_id),
            Some(&admin),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["members"], json!([]));

    let (status, _) = app
        .send(request(
            Method::DELETE,
            &format!("/api/roles/{}", role_id),
            Some(&admin),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = app
        .send(request(
            Method::GET,
            &format!("/api/roles/{}", role_id),
            Some(&admin),
        ))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error_code"], "NOT_FOUND");

    app.settle().await;
    let actions: Vec<_> = app
        .store
        .audit_records()
        .into_iter()
        .filter(|r| r.resource == "roles")
        .map(|r| r.action)
        .collect();
    assert_eq!(actions, vec!["create_role", "update_role", "delete_role"]);
}

#[tokio::test]
async fn test_role_detail_lists_members() {
    let app = app().await;
    let manager = app.login("manager", "Manager@123").await;
    let hr_role = app
        .store
        .list_roles()
        .await
        .unwrap()
        .into_iter()
        .find(|r| r.name == "HR")
        .unwrap();

    let (status, body) = app
        .send(request(
            Method::GET,
            &format!("/api/roles/{}", hr_role.id),
            Some(&manager),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["name"], "HR");
    assert_eq!(body["data"]["members"][0]["username"], "hruser");
}

#[tokio::test]
async fn test_employee_cannot_create_role() {
    let app = app().await;
    let employee = app.login("employee", "Employee@123").await;
    let (status, body) = app
        .send(json_request(
            Method::POST,
            "/api/roles",
            Some(&employee),
            json!({ "name": "Shadow" }),
        ))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["required"], json!(["create:roles"]));
    assert!(app
        .store
        .list_roles()
        .await
        .unwrap()
        .iter()
        .all(|r| r.name != "Shadow"));
}

#[tokio::test]
async fn test_permission_create_and_duplicate() {
    let app = app().await;
    let admin = app.login("admin", "Admin@123").await;
    let payload = json!({ "action": "execute", "resource": "reports", "description": "Run reports" });

    let (status, body) = app
        .send(json_request(Method::POST, "/api/permissions", Some(&admin), payload.clone()))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["name"], "execute:reports");
    let id = body["data"]["id"].as_str().unwrap().to_string();

    let (status, body) = app
        .send(json_request(Method::POST, "/api/permissions", Some(&admin), payload))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error_code"], "DUPLICATE_RECORD");

    let (status, body) = app
        .send(request(
            Method::GET,
            &format!("/api/permissions/{}", id),
            Some(&admin),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["description"], "Run reports");

    let (status, _) = app
        .send(request(
            Method::DELETE,
            &format!("/api/permissions/{}", id),
            Some(&admin),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_permission_rejects_malformed_key() {
    let app = app().await;
    let admin = app.login("admin", "Admin@123").await;
    let (status, body) = app
        .send(json_request(
            Method::POST,
            "/api/permissions",
            Some(&admin),
            json!({ "action": "", "resource": "reports" }),
        ))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error_code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_resource_mutation_is_admin_only() {
    let app = app().await;
    let manager = app.login("manager", "Manager@123").await;
    let admin = app.login("admin", "Admin@123").await;
    let payload = json!({ "name": "billing", "type": "data", "path": "/api/billing" });

    let (status, body) = app
        .send(json_request(Method::POST, "/api/resources", Some(&manager), payload.clone()))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["required"], json!(["Admin"]));

    let (status, body) = app
        .send(json_request(Method::POST, "/api/resources", Some(&admin), payload))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["kind"], "data");
    assert_eq!(body["data"]["is_active"], true);
    let id = body["data"]["id"].as_str().unwrap().to_string();

    let (status, body) = app
        .send(json_request(
            Method::PUT,
            &format!("/api/resources/{}", id),
            Some(&admin),
            json!({ "isActive": false }),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["is_active"], false);
    assert_eq!(body["data"]["path"], "/api/billing");
}

// ============================================================================
// Audit trail
// ============================================================================

#[tokio::test]
async fn test_audit_query_filters_by_action() {
    let app = app().await;
    let admin = app.login("admin", "Admin@123").await;
    app.send(json_request(
        Method::POST,
        "/api/auth/login",
        None,
        json!({ "username": "admin", "password": "nope" }),
    ))
    .await;
    app.settle().await;

    let (status, body) = app
        .send(request(
            Method::GET,
            "/api/audit?action=login_failed",
            Some(&admin),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    let records = body["data"]["records"].as_array().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["details"]["reason"], "wrong_password");
    assert_eq!(records[0]["actor"]["username"], "admin");
    assert_eq!(records[0]["actor"]["email"], "admin@rbac.com");
}

#[tokio::test]
async fn test_audit_rejects_inverted_range() {
    let app = app().await;
    let admin = app.login("admin", "Admin@123").await;
    let (status, body) = app
        .send(request(
            Method::GET,
            "/api/audit?start_date=2024-02-01T00:00:00Z&end_date=2024-01-01T00:00:00Z",
            Some(&admin),
        ))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error_code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_audit_requires_read_audit() {
    let app = app().await;
    let employee = app.login("employee", "Employee@123").await;
    let (status, _) = app
        .send(request(Method::GET, "/api/audit/stats", Some(&employee)))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_audit_stats_counts_statuses() {
    let app = app().await;
    let admin = app.login("admin", "Admin@123").await;
    app.send(request(Method::GET, "/api/auth/me", None)).await;
    app.settle().await;

    let (status, body) = app
        .send(request(Method::GET, "/api/audit/stats", Some(&admin)))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["total"], 1);
    assert_eq!(body["data"]["success"], 1);
}
