//! Credential store: the engine's only persistence collaborator.
//!
//! The engine consumes [`CredentialStore`] and never knows which backend sits
//! behind it. Two implementations ship:
//!
//! - [`MemoryStore`]: `dashmap`-backed, used for tests and when no database
//!   URL is configured.
//! - [`PgStore`]: PostgreSQL via `sqlx`.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::audit::{AuditFilter, AuditPage, AuditRecord, AuditStats};
use crate::rbac::{
    Catalog, Permission, PermissionChanges, PermissionId, Principal, PrincipalChanges,
    PrincipalId, Resource, ResourceChanges, ResourceId, Role, RoleChanges, RoleId,
};

pub use memory::MemoryStore;
pub use postgres::PgStore;

// ═══════════════════════════════════════════════════════════════════════════════
// Errors
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// A lookup that must be unique matched more than one record.
    #[error("{entity} lookup by '{key}' matched more than one record")]
    Ambiguous { entity: &'static str, key: String },

    #[error("{entity} already exists: {key}")]
    Conflict { entity: &'static str, key: String },

    #[error("store backend error: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => Self::NotFound {
                entity: "row",
                id: String::new(),
            },
            sqlx::Error::Database(ref db) if db.is_unique_violation() => Self::Conflict {
                entity: "row",
                key: db.constraint().unwrap_or("unique").to_string(),
            },
            other => Self::Backend(other.to_string()),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Traits
// ═══════════════════════════════════════════════════════════════════════════════

/// Principal lookup, lifecycle and audit persistence.
///
/// Principals are always returned with their roles and each role's
/// permissions already loaded.
#[async_trait]
pub trait CredentialStore: CatalogStore {
    async fn find_principal_by_id(&self, id: PrincipalId) -> Result<Principal, StoreError>;

    async fn find_principal_by_username(&self, username: &str) -> Result<Principal, StoreError>;

    async fn append_audit_record(&self, record: &AuditRecord) -> Result<(), StoreError>;

    async fn touch_last_authenticated(
        &self,
        id: PrincipalId,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    async fn set_principal_active(
        &self,
        id: PrincipalId,
        active: bool,
    ) -> Result<Principal, StoreError>;

    /// A present `role_ids` replaces the role set; every id must exist.
    async fn update_principal(
        &self,
        id: PrincipalId,
        changes: &PrincipalChanges,
    ) -> Result<Principal, StoreError>;

    async fn delete_principal(&self, id: PrincipalId) -> Result<(), StoreError>;

    async fn list_principals(&self) -> Result<Vec<Principal>, StoreError>;

    /// Insert a principal. Its roles are linked by name and must already exist.
    async fn create_principal(&self, principal: &Principal) -> Result<(), StoreError>;
}

/// Roles, permissions and resource descriptors.
///
/// Names are unique per entity; a duplicate is a [`StoreError::Conflict`].
/// Deleting a permission or role drops its links; deleting a resource
/// unlinks the permissions that pointed at it.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Highest level first, then by name.
    async fn list_roles(&self) -> Result<Vec<Role>, StoreError>;

    async fn find_role(&self, id: RoleId) -> Result<Role, StoreError>;

    /// Principals currently holding the role.
    async fn role_members(&self, id: RoleId) -> Result<Vec<Principal>, StoreError>;

    /// Insert a role. Its permissions are linked by id and must already exist.
    async fn create_role(&self, role: &Role) -> Result<(), StoreError>;

    async fn update_role(&self, id: RoleId, changes: &RoleChanges) -> Result<Role, StoreError>;

    async fn delete_role(&self, id: RoleId) -> Result<(), StoreError>;

    /// Ordered by resource, then action.
    async fn list_permissions(&self) -> Result<Vec<Permission>, StoreError>;

    async fn find_permission(&self, id: PermissionId) -> Result<Permission, StoreError>;

    async fn create_permission(&self, permission: &Permission) -> Result<(), StoreError>;

    async fn update_permission(
        &self,
        id: PermissionId,
        changes: &PermissionChanges,
    ) -> Result<Permission, StoreError>;

    async fn delete_permission(&self, id: PermissionId) -> Result<(), StoreError>;

    async fn list_resources(&self) -> Result<Vec<Resource>, StoreError>;

    async fn find_resource(&self, id: ResourceId) -> Result<Resource, StoreError>;

    async fn create_resource(&self, resource: &Resource) -> Result<(), StoreError>;

    async fn update_resource(
        &self,
        id: ResourceId,
        changes: &ResourceChanges,
    ) -> Result<Resource, StoreError>;

    async fn delete_resource(&self, id: ResourceId) -> Result<(), StoreError>;
}

/// Read access to the audit trail. Entries carry the acting principal's
/// current identity when it still exists.
#[async_trait]
pub trait AuditLog: Send + Sync {
    async fn query_audit(&self, filter: &AuditFilter) -> Result<AuditPage, StoreError>;

    async fn audit_stats(&self) -> Result<AuditStats, StoreError>;
}

/// Anything that can receive the built-in resources, permissions and roles.
#[async_trait]
pub trait SeedTarget: Send + Sync {
    /// Idempotent: existing rows (matched by name) are kept.
    async fn install_catalog(&self, catalog: &Catalog) -> Result<(), StoreError>;
}
