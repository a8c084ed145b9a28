//! The access engine: the single entry point route handlers talk to.
//!
//! Wires the token codec, credential store and audit interceptor together
//! and exposes the gated-operation pipeline:
//!
//! ```text
//! token ─► authenticate ─► authorize ─► operation ─► audit (detached)
//!              │               │
//!              └──── denied ───┴─────────────────────► audit (detached)
//! ```
//!
//! Every terminal state of a guarded call produces exactly one audit record.
//! Role, permission and resource management lives in [`catalog`].

pub mod catalog;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::audit::{AuditStatus, Auditor, Classify, RequestMeta};
use crate::auth::{self, AuthError, Forbidden, TokenCodec};
use crate::config::Config;
use crate::error::{Result, WardenError};
use crate::rbac::{
    self, PermissionKey, PredefinedRole, Principal, PrincipalChanges, PrincipalId,
    PrincipalProfile, Requirement,
};
use crate::store::{CatalogStore, CredentialStore, StoreError};

pub use catalog::{NewPermission, NewResource, NewRole, RoleDetail, RoleMember};

/// Audit labels for a guarded operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuditLabel<'a> {
    pub action: &'a str,
    pub resource: &'a str,
}

impl<'a> AuditLabel<'a> {
    pub fn new(action: &'a str, resource: &'a str) -> Self {
        Self { action, resource }
    }
}

/// Result of a successful credential exchange.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginSuccess {
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub principal: PrincipalProfile,
}

/// Input for creating a principal.
#[derive(Debug, Clone, Deserialize)]
pub struct NewPrincipal {
    pub username: String,
    pub email: String,
    #[serde(default, alias = "fullName")]
    pub display_name: Option<String>,
    pub password: String,
    #[serde(default)]
    pub roles: Vec<String>,
}

/// Self-service sign-up. The new principal always gets the Employee role.
#[derive(Debug, Clone, Deserialize)]
pub struct Registration {
    pub username: String,
    pub email: String,
    pub password: String,
    #[serde(alias = "fullName")]
    pub display_name: String,
}

pub const MIN_USERNAME_LEN: usize = 3;
pub const MIN_PASSWORD_LEN: usize = 6;

/// `local@domain.tld` with no whitespace.
fn is_plausible_email(email: &str) -> bool {
    if email.chars().any(char::is_whitespace) {
        return false;
    }
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain
                    .split_once('.')
                    .is_some_and(|(host, tld)| !host.is_empty() && !tld.is_empty())
        }
        None => false,
    }
}

#[derive(Clone)]
pub struct AccessEngine {
    codec: Arc<TokenCodec>,
    store: Arc<dyn CredentialStore>,
    auditor: Auditor,
}

impl std::fmt::Debug for AccessEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessEngine")
            .field("codec", &self.codec)
            .field("auditor", &self.auditor)
            .finish_non_exhaustive()
    }
}

impl AccessEngine {
    pub fn new(codec: Arc<TokenCodec>, store: Arc<dyn CredentialStore>, auditor: Auditor) -> Self {
        Self {
            codec,
            store,
            auditor,
        }
    }

    /// Build an engine from configuration. Spawns the audit worker, so this
    /// must run inside a Tokio runtime.
    pub fn from_config(config: &Config, store: Arc<dyn CredentialStore>) -> Result<Self> {
        let codec = TokenCodec::with_system_clock(&config.auth)?;
        let auditor = Auditor::new(store.clone(), config.audit.channel_buffer_size);
        Ok(Self::new(Arc::new(codec), store, auditor))
    }

    pub fn codec(&self) -> &TokenCodec {
        &self.codec
    }

    pub fn store(&self) -> &Arc<dyn CredentialStore> {
        &self.store
    }

    pub fn auditor(&self) -> &Auditor {
        &self.auditor
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Core operations
    // ─────────────────────────────────────────────────────────────────────────

    pub async fn authenticate(&self, raw_token: Option<&str>) -> std::result::Result<Principal, AuthError> {
        auth::authenticate(&self.codec, self.store.as_ref(), raw_token).await
    }

    pub fn authorize_by_permission(
        &self,
        principal: &Principal,
        required: &[PermissionKey],
    ) -> std::result::Result<(), AuthError> {
        rbac::authorize_by_permission(principal, required)
    }

    pub fn authorize_by_role<S: AsRef<str>>(
        &self,
        principal: &Principal,
        required: &[S],
    ) -> std::result::Result<(), AuthError> {
        rbac::authorize_by_role(principal, required)
    }

    /// Run `operation` and record its classified outcome exactly once.
    pub async fn audit_wrap<F, T>(
        &self,
        action: &str,
        resource: &str,
        principal: Option<&Principal>,
        meta: &RequestMeta,
        operation: F,
    ) -> T
    where
        F: Future<Output = T>,
        T: Classify,
    {
        self.auditor
            .wrap(principal.map(|p| p.id), action, resource, meta, operation)
            .await
    }

    /// Best-effort direct record. Never fails.
    pub fn audit_record(
        &self,
        actor: Option<PrincipalId>,
        action: &str,
        resource: &str,
        status: AuditStatus,
        details: Value,
        meta: &RequestMeta,
    ) {
        self.auditor
            .record(actor, action, resource, status, details, meta);
    }

    /// Authenticate, authorize against `requirement`, then run `operation`.
    ///
    /// When `label` is set, exactly one audit record is written for whichever
    /// terminal state is reached. A rejected caller never reaches the
    /// operation; the rejection is returned as `Err`. An unauthenticated
    /// rejection is recorded with a null actor.
    pub async fn guard<F, Fut, T>(
        &self,
        raw_token: Option<&str>,
        meta: &RequestMeta,
        requirement: &Requirement,
        label: Option<AuditLabel<'_>>,
        operation: F,
    ) -> std::result::Result<T, AuthError>
    where
        F: FnOnce(Principal) -> Fut,
        Fut: Future<Output = T>,
        T: Classify,
    {
        let principal = match self.authenticate(raw_token).await {
            Ok(principal) => principal,
            Err(err) => {
                if let Some(label) = label {
                    self.record_rejection(None, label, &err, meta);
                }
                return Err(err);
            }
        };

        if let Err(err) = requirement.evaluate(&principal) {
            if let Some(label) = label {
                self.record_rejection(Some(principal.id), label, &err, meta);
            }
            return Err(err);
        }

        match label {
            Some(label) => Ok(self
                .auditor
                .wrap(
                    Some(principal.id),
                    label.action,
                    label.resource,
                    meta,
                    operation(principal),
                )
                .await),
            None => Ok(operation(principal).await),
        }
    }

    fn record_rejection(
        &self,
        actor: Option<PrincipalId>,
        label: AuditLabel<'_>,
        err: &AuthError,
        meta: &RequestMeta,
    ) {
        // Unauthenticated callers get no required/available detail anywhere.
        let details = if actor.is_some() {
            err.audit_details()
        } else {
            json!({ "code": err.code() })
        };
        self.auditor.record(
            actor,
            label.action,
            label.resource,
            err.audit_status(),
            details,
            meta,
        );
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Credential exchange
    // ─────────────────────────────────────────────────────────────────────────

    /// Exchange a username and secret for a token.
    ///
    /// Unknown user and wrong secret are recorded with different reasons but
    /// return the same `InvalidCredentials` error.
    #[instrument(skip(self, secret, meta))]
    pub async fn login(
        &self,
        username: &str,
        secret: &str,
        meta: &RequestMeta,
    ) -> std::result::Result<LoginSuccess, AuthError> {
        let principal = match self.store.find_principal_by_username(username).await {
            Ok(principal) => principal,
            Err(StoreError::NotFound { .. }) => {
                self.login_failed(None, username, "user_not_found", meta);
                return Err(AuthError::InvalidCredentials);
            }
            Err(e) => {
                warn!(error = %e, "Credential store lookup failed during login");
                return Err(e.into());
            }
        };

        if !auth::verify_secret(secret, &principal.secret_hash) {
            self.login_failed(Some(principal.id), username, "wrong_password", meta);
            return Err(AuthError::InvalidCredentials);
        }

        if !principal.is_active {
            self.login_failed(Some(principal.id), username, "inactive_account", meta);
            return Err(Forbidden::AccountDeactivated.into());
        }

        let now = Utc::now();
        if let Err(e) = self.store.touch_last_authenticated(principal.id, now).await {
            warn!(principal_id = %principal.id, error = %e, "Failed to update last login");
        }

        let issued = self.codec.issue(principal.id, &principal.username)?;

        self.auditor.record(
            Some(principal.id),
            "login",
            "auth",
            AuditStatus::Success,
            json!({ "username": principal.username }),
            meta,
        );
        info!(principal_id = %principal.id, "Login succeeded");

        let mut principal = principal;
        principal.last_authenticated_at = Some(now);

        Ok(LoginSuccess {
            token: issued.token,
            expires_at: issued.expires_at,
            principal: principal.profile(),
        })
    }

    fn login_failed(
        &self,
        actor: Option<PrincipalId>,
        username: &str,
        reason: &'static str,
        meta: &RequestMeta,
    ) {
        debug!(reason, "Login rejected");
        self.auditor.record(
            actor,
            "login_failed",
            "auth",
            AuditStatus::Failed,
            json!({ "username": username, "reason": reason }),
            meta,
        );
    }

    /// Tokens are stateless; logout only leaves a trail.
    pub fn logout(&self, principal: &Principal, meta: &RequestMeta) {
        self.auditor.record(
            Some(principal.id),
            "logout",
            "auth",
            AuditStatus::Success,
            Value::Null,
            meta,
        );
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Principal lifecycle
    // ─────────────────────────────────────────────────────────────────────────

    /// Delete `target` on behalf of `actor`. A principal may not delete itself.
    pub async fn delete_principal(&self, actor: &Principal, target: PrincipalId) -> Result<()> {
        if actor.id == target {
            return Err(AuthError::from(Forbidden::SelfDeletion).into());
        }
        self.store.delete_principal(target).await?;
        info!(actor = %actor.id, target = %target, "Principal deleted");
        Ok(())
    }

    /// Takes effect on the target's next request, even with a live token.
    pub async fn set_principal_active(&self, target: PrincipalId, active: bool) -> Result<Principal> {
        let principal = self.store.set_principal_active(target, active).await?;
        info!(target = %target, active, "Principal activation changed");
        Ok(principal)
    }

    /// Apply `changes` to `target`. A present `role_ids` replaces its roles.
    pub async fn update_principal(
        &self,
        target: PrincipalId,
        changes: PrincipalChanges,
    ) -> Result<Principal> {
        if let Some(ref email) = changes.email {
            if !is_plausible_email(email.trim()) {
                return Err(WardenError::validation("valid email is required"));
            }
        }
        if let Some(ref name) = changes.display_name {
            if name.trim().is_empty() {
                return Err(WardenError::validation("full name must not be empty"));
            }
        }
        let PrincipalChanges {
            email,
            display_name,
            is_active,
            role_ids,
        } = changes;
        let changes = PrincipalChanges {
            email: email.map(|e| e.trim().to_string()),
            display_name: display_name.map(|n| n.trim().to_string()),
            is_active,
            role_ids,
        };
        let principal = self.store.update_principal(target, &changes).await?;
        info!(target = %target, "Principal updated");
        Ok(principal)
    }

    pub async fn find_principal(&self, id: PrincipalId) -> Result<Principal> {
        Ok(self.store.find_principal_by_id(id).await?)
    }

    pub async fn list_principals(&self) -> Result<Vec<Principal>> {
        Ok(self.store.list_principals().await?)
    }

    /// Hash the secret, resolve role names and insert the principal.
    pub async fn create_principal(&self, input: NewPrincipal) -> Result<Principal> {
        let username = input.username.trim();
        let email = input.email.trim();
        if username.is_empty() || email.is_empty() {
            return Err(WardenError::validation("username and email are required"));
        }
        if input.password.is_empty() {
            return Err(WardenError::validation("password is required"));
        }

        let known = self.store.list_roles().await?;
        let roles = input
            .roles
            .iter()
            .map(|name| {
                known
                    .iter()
                    .find(|r| &r.name == name)
                    .cloned()
                    .ok_or_else(|| WardenError::validation(format!("unknown role: {}", name)))
            })
            .collect::<Result<Vec<_>>>()?;

        let hash = auth::hash_secret(&input.password)?;
        let display_name = input
            .display_name
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| username.to_string());

        let principal = Principal::new(username, email, display_name, hash).with_roles(roles);
        self.store.create_principal(&principal).await?;
        info!(principal_id = %principal.id, username = %principal.username, "Principal created");
        Ok(principal)
    }

    /// Create an Employee principal from a sign-up form and record it.
    pub async fn register(&self, input: Registration, meta: &RequestMeta) -> Result<Principal> {
        let username = input.username.trim();
        let email = input.email.trim();
        let display_name = input.display_name.trim();
        if username.chars().count() < MIN_USERNAME_LEN {
            return Err(WardenError::validation(format!(
                "username must be at least {} characters",
                MIN_USERNAME_LEN
            )));
        }
        if !is_plausible_email(email) {
            return Err(WardenError::validation("valid email is required"));
        }
        if input.password.chars().count() < MIN_PASSWORD_LEN {
            return Err(WardenError::validation(format!(
                "password must be at least {} characters",
                MIN_PASSWORD_LEN
            )));
        }
        if display_name.is_empty() {
            return Err(WardenError::validation("full name is required"));
        }

        let role_name = PredefinedRole::Employee.name();
        let role = self
            .store
            .list_roles()
            .await?
            .into_iter()
            .find(|r| r.name == role_name)
            .ok_or_else(|| WardenError::not_found("role", role_name))?;

        let hash = auth::hash_secret(&input.password)?;
        let principal =
            Principal::new(username, email, display_name, hash).with_roles(vec![role]);
        self.store.create_principal(&principal).await?;

        self.auditor.record(
            Some(principal.id),
            "register",
            "auth",
            AuditStatus::Success,
            json!({ "username": principal.username }),
            meta,
        );
        info!(principal_id = %principal.id, "Principal registered");
        Ok(principal)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{hash_secret, ManualClock};
    use crate::config::AuthConfig;
    use crate::rbac::Catalog;
    use crate::store::MemoryStore;

    fn engine() -> (AccessEngine, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::with_defaults());
        let config = AuthConfig {
            jwt_secret: "unit-test-secret".into(),
            ..AuthConfig::default()
        };
        let codec = TokenCodec::new(&config, Arc::new(ManualClock::starting_now())).unwrap();
        let auditor = Auditor::new(store.clone(), 16);
        (
            AccessEngine::new(Arc::new(codec), store.clone(), auditor),
            store,
        )
    }

    async fn insert(store: &MemoryStore, username: &str, role: &str) -> Principal {
        let role = Catalog::defaults().role(role).cloned().unwrap();
        let principal = Principal::new(
            username,
            format!("{}@example.com", username),
            username,
            hash_secret("pw").unwrap(),
        )
        .with_roles(vec![role]);
        store.create_principal(&principal).await.unwrap();
        principal
    }

    #[tokio::test]
    async fn test_self_deletion_rejected() {
        let (engine, store) = engine();
        let admin = insert(&store, "root", "Admin").await;

        let err = engine.delete_principal(&admin, admin.id).await.unwrap_err();
        assert_eq!(err.error_code(), "SELF_DELETION");
        assert!(store.find_principal_by_id(admin.id).await.is_ok());
    }

    #[tokio::test]
    async fn test_guard_skips_operation_on_denial() {
        let (engine, store) = engine();
        let employee = insert(&store, "emp", "Employee").await;
        let token = engine.codec().issue(employee.id, "emp").unwrap().token;

        let requirement = Requirement::permissions(&["delete:users"]).unwrap();
        let mut ran = false;
        let result = engine
            .guard(
                Some(&token),
                &RequestMeta::default(),
                &requirement,
                Some(AuditLabel::new("delete_user", "users")),
                |_| {
                    ran = true;
                    async { Ok::<(), AuthError>(()) }
                },
            )
            .await;

        assert!(matches!(
            result,
            Err(AuthError::Forbidden(Forbidden::InsufficientPermissions(_)))
        ));
        assert!(!ran);

        engine.auditor().flush().await;
        let records = store.audit_records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status, AuditStatus::Denied);
        assert_eq!(records[0].actor_id, Some(employee.id));
    }

    #[tokio::test]
    async fn test_create_principal_rejects_unknown_role() {
        let (engine, _) = engine();
        let err = engine
            .create_principal(NewPrincipal {
                username: "new".into(),
                email: "new@example.com".into(),
                display_name: None,
                password: "pw".into(),
                roles: vec!["Wizard".into()],
            })
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "VALIDATION_ERROR");
    }

    #[test]
    fn test_email_plausibility() {
        assert!(is_plausible_email("a@rbac.com"));
        assert!(!is_plausible_email("a@rbac"));
        assert!(!is_plausible_email("@rbac.com"));
        assert!(!is_plausible_email("a b@rbac.com"));
        assert!(!is_plausible_email("a@b@rbac.com"));
    }

    #[tokio::test]
    async fn test_register_assigns_employee_and_records() {
        let (engine, store) = engine();
        let principal = engine
            .register(
                Registration {
                    username: "newbie".into(),
                    email: "newbie@rbac.com".into(),
                    password: "secret1".into(),
                    display_name: "New Bie".into(),
                },
                &RequestMeta::default(),
            )
            .await
            .unwrap();
        assert_eq!(principal.role_names().collect::<Vec<_>>(), vec!["Employee"]);

        engine.auditor().flush().await;
        let records = store.audit_records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].action, "register");
        assert_eq!(records[0].actor_id, Some(principal.id));
        assert_eq!(records[0].details["username"], "newbie");
    }

    #[tokio::test]
    async fn test_register_validation() {
        let (engine, store) = engine();
        let form = |username: &str, email: &str, password: &str, name: &str| Registration {
            username: username.into(),
            email: email.into(),
            password: password.into(),
            display_name: name.into(),
        };
        let meta = RequestMeta::default();
        for bad in [
            form("ab", "ab@rbac.com", "secret1", "Ab"),
            form("abc", "not-an-email", "secret1", "Abc"),
            form("abc", "abc@rbac.com", "short", "Abc"),
            form("abc", "abc@rbac.com", "secret1", "  "),
        ] {
            let err = engine.register(bad, &meta).await.unwrap_err();
            assert_eq!(err.error_code(), "VALIDATION_ERROR");
        }
        engine.auditor().flush().await;
        assert!(store.audit_records().is_empty());
    }

    #[tokio::test]
    async fn test_update_principal_reassigns_roles() {
        let (engine, store) = engine();
        let employee = insert(&store, "emp", "Employee").await;
        let manager_role = engine
            .list_roles()
            .await
            .unwrap()
            .into_iter()
            .find(|r| r.name == "Manager")
            .unwrap();

        let updated = engine
            .update_principal(
                employee.id,
                PrincipalChanges {
                    display_name: Some(" Emp Loyee ".into()),
                    role_ids: Some(vec![manager_role.id]),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.display_name, "Emp Loyee");
        assert!(updated.has_role("Manager"));
        assert!(!updated.has_role("Employee"));

        let err = engine
            .update_principal(
                employee.id,
                PrincipalChanges {
                    email: Some("nope".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "VALIDATION_ERROR");
    }
}
