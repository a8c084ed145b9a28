//! PostgreSQL credential store.
//!
//! A principal is loaded with its roles and permissions in a single joined
//! query; [`assemble_principals`] folds the flat rows back into the nested
//! model.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgPoolOptions, PgConnection, PgPool, Postgres, QueryBuilder};
use tracing::info;
use uuid::Uuid;

use super::{AuditLog, CatalogStore, CredentialStore, SeedTarget, StoreError};
use crate::audit::{
    ActorSummary, AuditEntry, AuditFilter, AuditPage, AuditRecord, AuditStats, AuditStatus,
};
use crate::config::DatabaseConfig;
use crate::rbac::{
    Catalog, Permission, PermissionChanges, PermissionId, Principal, PrincipalChanges,
    PrincipalId, Resource, ResourceChanges, ResourceId, ResourceKind, Role, RoleChanges, RoleId,
};

const PRINCIPAL_SELECT: &str = r#"
    SELECT u.id AS user_id, u.username, u.email, u.password_hash, u.full_name,
           u.is_active, u.last_login, u.created_at,
           r.id AS role_id, r.name AS role_name, r.description AS role_description,
           r.level AS role_level,
           p.id AS permission_id, p.name AS permission_name, p.action, p.resource,
           p.description AS permission_description, p.resource_id
    FROM users u
    LEFT JOIN user_roles ur ON ur.user_id = u.id
    LEFT JOIN roles r ON r.id = ur.role_id
    LEFT JOIN role_permissions rp ON rp.role_id = r.id
    LEFT JOIN permissions p ON p.id = rp.permission_id
"#;

const PRINCIPAL_ORDER: &str = " ORDER BY u.username, r.level DESC, r.name, p.name";

const ROLE_SELECT: &str = r#"
    SELECT r.id AS role_id, r.name AS role_name, r.description AS role_description,
           r.level AS role_level,
           p.id AS permission_id, p.name AS permission_name, p.action, p.resource,
           p.description AS permission_description, p.resource_id
    FROM roles r
    LEFT JOIN role_permissions rp ON rp.role_id = r.id
    LEFT JOIN permissions p ON p.id = rp.permission_id
"#;

const ROLE_ORDER: &str = " ORDER BY r.level DESC, r.name, p.name";

const PERMISSION_SELECT: &str =
    "SELECT id, name, action, resource, description, resource_id FROM permissions";

const RESOURCE_SELECT: &str =
    "SELECT id, name, type AS kind, path, description, is_active FROM resources";

// ═══════════════════════════════════════════════════════════════════════════════
// Rows
// ═══════════════════════════════════════════════════════════════════════════════

/// One row of the principal join: a user, optionally one role, optionally one
/// of that role's permissions.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PrincipalRow {
    pub user_id: Uuid,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub full_name: String,
    pub is_active: bool,
    pub last_login: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub role_id: Option<Uuid>,
    pub role_name: Option<String>,
    pub role_description: Option<String>,
    pub role_level: Option<i32>,
    pub permission_id: Option<Uuid>,
    pub permission_name: Option<String>,
    pub action: Option<String>,
    pub resource: Option<String>,
    pub permission_description: Option<String>,
    pub resource_id: Option<Uuid>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct RoleRow {
    role_id: Uuid,
    role_name: String,
    role_description: String,
    role_level: i32,
    permission_id: Option<Uuid>,
    permission_name: Option<String>,
    action: Option<String>,
    resource: Option<String>,
    permission_description: Option<String>,
    resource_id: Option<Uuid>,
}

/// An audit row left-joined with the current `users` row of its actor.
#[derive(Debug, sqlx::FromRow)]
struct AuditRow {
    id: Uuid,
    user_id: Option<Uuid>,
    action: String,
    resource: String,
    status: String,
    ip_address: Option<String>,
    user_agent: Option<String>,
    details: serde_json::Value,
    timestamp: DateTime<Utc>,
    actor_username: Option<String>,
    actor_email: Option<String>,
}

impl TryFrom<AuditRow> for AuditEntry {
    type Error = StoreError;

    fn try_from(row: AuditRow) -> Result<Self, Self::Error> {
        let status: AuditStatus = row.status.parse().map_err(StoreError::Backend)?;
        let actor = match (row.user_id, row.actor_username, row.actor_email) {
            (Some(id), Some(username), Some(email)) => Some(ActorSummary {
                id: PrincipalId(id),
                username,
                email,
            }),
            _ => None,
        };
        let record = AuditRecord::restore(
            row.id,
            row.user_id.map(PrincipalId),
            row.action,
            row.resource,
            status,
            row.timestamp,
            row.ip_address,
            row.user_agent,
            row.details,
        );
        Ok(AuditEntry { record, actor })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct PermissionRow {
    id: Uuid,
    name: String,
    action: String,
    resource: String,
    description: Option<String>,
    resource_id: Option<Uuid>,
}

impl From<PermissionRow> for Permission {
    fn from(row: PermissionRow) -> Self {
        let mut permission = Permission::new(row.action, row.resource).named(row.name);
        permission.id = row.id.into();
        permission.description = row.description;
        permission.resource_id = row.resource_id.map(Into::into);
        permission
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ResourceRow {
    id: Uuid,
    name: String,
    kind: String,
    path: Option<String>,
    description: Option<String>,
    is_active: bool,
}

impl From<ResourceRow> for Resource {
    fn from(row: ResourceRow) -> Self {
        let mut resource = Resource::new(row.name, ResourceKind::parse(&row.kind));
        resource.id = row.id.into();
        resource.path = row.path;
        resource.description = row.description;
        resource.is_active = row.is_active;
        resource
    }
}

fn permission_from_parts(
    id: Option<Uuid>,
    name: Option<String>,
    action: Option<String>,
    resource: Option<String>,
    description: Option<String>,
    resource_id: Option<Uuid>,
) -> Option<Permission> {
    let (id, action, resource) = (id?, action?, resource?);
    let mut permission = Permission::new(action, resource);
    permission.id = id.into();
    if let Some(name) = name {
        permission.name = name;
    }
    permission.description = description;
    permission.resource_id = resource_id.map(Into::into);
    Some(permission)
}

/// Fold joined rows into principals, preserving first-seen order.
pub fn assemble_principals(rows: Vec<PrincipalRow>) -> Vec<Principal> {
    let mut principals: Vec<Principal> = Vec::new();

    for row in rows {
        let idx = match principals.iter().position(|p| p.id.0 == row.user_id) {
            Some(idx) => idx,
            None => {
                let mut principal =
                    Principal::new(row.username, row.email, row.full_name, row.password_hash);
                principal.id = PrincipalId(row.user_id);
                principal.is_active = row.is_active;
                principal.last_authenticated_at = row.last_login;
                principal.created_at = row.created_at;
                principals.push(principal);
                principals.len() - 1
            }
        };
        let principal = &mut principals[idx];

        let (Some(role_id), Some(role_name)) = (row.role_id, row.role_name) else {
            continue;
        };

        let role_idx = match principal.roles.iter().position(|r| r.id.0 == role_id) {
            Some(i) => i,
            None => {
                let mut role = Role::new(
                    role_name,
                    row.role_description.unwrap_or_default(),
                    row.role_level.unwrap_or_default(),
                );
                role.id = role_id.into();
                principal.roles.push(role);
                principal.roles.len() - 1
            }
        };

        if let Some(permission) = permission_from_parts(
            row.permission_id,
            row.permission_name,
            row.action,
            row.resource,
            row.permission_description,
            row.resource_id,
        ) {
            principal.roles[role_idx].grant(permission);
        }
    }

    principals
}

/// Exactly one principal must come out of a unique lookup.
pub fn assemble_principal(rows: Vec<PrincipalRow>, key: &str) -> Result<Principal, StoreError> {
    let mut principals = assemble_principals(rows);
    match principals.len() {
        0 => Err(StoreError::not_found("principal", key)),
        1 => Ok(principals.remove(0)),
        _ => Err(StoreError::Ambiguous {
            entity: "principal",
            key: key.to_string(),
        }),
    }
}

fn assemble_roles(rows: Vec<RoleRow>) -> Vec<Role> {
    let mut roles: Vec<Role> = Vec::new();
    for row in rows {
        let idx = match roles.iter().position(|r| r.id.0 == row.role_id) {
            Some(i) => i,
            None => {
                let mut role = Role::new(row.role_name, row.role_description, row.role_level);
                role.id = row.role_id.into();
                roles.push(role);
                roles.len() - 1
            }
        };
        if let Some(permission) = permission_from_parts(
            row.permission_id,
            row.permission_name,
            row.action,
            row.resource,
            row.permission_description,
            row.resource_id,
        ) {
            roles[idx].grant(permission);
        }
    }
    roles
}

/// Filters over `audit_logs` aliased as `a`.
fn push_audit_filters<'a>(qb: &mut QueryBuilder<'a, Postgres>, filter: &AuditFilter) {
    if let Some(ref action) = filter.action {
        qb.push(" AND a.action LIKE ").push_bind(format!("%{}%", action));
    }
    if let Some(status) = filter.status {
        qb.push(" AND a.status = ").push_bind(status.as_str());
    }
    if let Some(actor) = filter.actor_id {
        qb.push(" AND a.user_id = ").push_bind(actor.0);
    }
    if let Some(start) = filter.start {
        qb.push(" AND a.timestamp >= ").push_bind(start);
    }
    if let Some(end) = filter.end {
        qb.push(" AND a.timestamp <= ").push_bind(end);
    }
}

/// Unique violations are reported against `entity` rather than the raw row.
fn conflict_on(entity: &'static str) -> impl Fn(sqlx::Error) -> StoreError {
    move |err| match StoreError::from(err) {
        StoreError::Conflict { key, .. } => StoreError::Conflict { entity, key },
        other => other,
    }
}

/// `table` is always a literal from this module.
async fn require_row(
    conn: &mut PgConnection,
    table: &'static str,
    entity: &'static str,
    id: Uuid,
) -> Result<(), StoreError> {
    let sql = format!("SELECT EXISTS (SELECT 1 FROM {} WHERE id = $1)", table);
    let exists: bool = sqlx::query_scalar(&sql).bind(id).fetch_one(conn).await?;
    if exists {
        Ok(())
    } else {
        Err(StoreError::not_found(entity, id))
    }
}

async fn link_role_permissions(
    conn: &mut PgConnection,
    role_id: Uuid,
    permission_ids: &[PermissionId],
) -> Result<(), StoreError> {
    for permission_id in permission_ids {
        require_row(&mut *conn, "permissions", "permission", permission_id.0).await?;
        sqlx::query(
            "INSERT INTO role_permissions (role_id, permission_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
        )
        .bind(role_id)
        .bind(permission_id.0)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

// ═══════════════════════════════════════════════════════════════════════════════
// Store
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Create a new database connection pool.
    pub async fn connect(url: &str, config: &DatabaseConfig) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(std::time::Duration::from_secs(5))
            .connect(url)
            .await?;

        info!(max_connections = config.max_connections, "Connected to PostgreSQL");
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Run migrations.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn fetch_principal_rows<K>(
        &self,
        clause: &str,
        key: K,
    ) -> Result<Vec<PrincipalRow>, StoreError>
    where
        K: for<'q> sqlx::Encode<'q, Postgres> + sqlx::Type<Postgres> + Send + 'static,
    {
        let sql = format!("{} WHERE {}{}", PRINCIPAL_SELECT, clause, PRINCIPAL_ORDER);
        let rows = sqlx::query_as::<_, PrincipalRow>(&sql)
            .bind(key)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn fetch_roles(&self, id: Option<RoleId>) -> Result<Vec<Role>, StoreError> {
        let rows = match id {
            Some(id) => {
                let sql = format!("{} WHERE r.id = $1{}", ROLE_SELECT, ROLE_ORDER);
                sqlx::query_as::<_, RoleRow>(&sql)
                    .bind(id.0)
                    .fetch_all(&self.pool)
                    .await?
            }
            None => {
                let sql = format!("{}{}", ROLE_SELECT, ROLE_ORDER);
                sqlx::query_as::<_, RoleRow>(&sql)
                    .fetch_all(&self.pool)
                    .await?
            }
        };
        Ok(assemble_roles(rows))
    }
}

#[async_trait]
impl CredentialStore for PgStore {
    async fn find_principal_by_id(&self, id: PrincipalId) -> Result<Principal, StoreError> {
        let rows = self.fetch_principal_rows("u.id = $1", id.0).await?;
        assemble_principal(rows, &id.to_string())
    }

    async fn find_principal_by_username(&self, username: &str) -> Result<Principal, StoreError> {
        let rows = self
            .fetch_principal_rows("u.username = $1", username.to_string())
            .await?;
        assemble_principal(rows, username)
    }

    async fn append_audit_record(&self, record: &AuditRecord) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO audit_logs (id, user_id, action, resource, status, ip_address, user_agent, details, timestamp)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(record.id)
        .bind(record.actor_id.map(|id| id.0))
        .bind(&record.action)
        .bind(&record.resource)
        .bind(record.status.as_str())
        .bind(&record.origin)
        .bind(&record.user_agent)
        .bind(&record.details)
        .bind(record.timestamp)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn touch_last_authenticated(
        &self,
        id: PrincipalId,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE users SET last_login = $2, updated_at = NOW() WHERE id = $1")
            .bind(id.0)
            .bind(at)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("principal", id));
        }
        Ok(())
    }

    async fn set_principal_active(
        &self,
        id: PrincipalId,
        active: bool,
    ) -> Result<Principal, StoreError> {
        let result = sqlx::query("UPDATE users SET is_active = $2, updated_at = NOW() WHERE id = $1")
            .bind(id.0)
            .bind(active)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("principal", id));
        }
        self.find_principal_by_id(id).await
    }

    async fn update_principal(
        &self,
        id: PrincipalId,
        changes: &PrincipalChanges,
    ) -> Result<Principal, StoreError> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE users
            SET email = COALESCE($2, email),
                full_name = COALESCE($3, full_name),
                is_active = COALESCE($4, is_active),
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id.0)
        .bind(&changes.email)
        .bind(&changes.display_name)
        .bind(changes.is_active)
        .execute(&mut *tx)
        .await
        .map_err(conflict_on("principal"))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("principal", id));
        }

        if let Some(ref role_ids) = changes.role_ids {
            sqlx::query("DELETE FROM user_roles WHERE user_id = $1")
                .bind(id.0)
                .execute(&mut *tx)
                .await?;
            for role_id in role_ids {
                require_row(&mut tx, "roles", "role", role_id.0).await?;
                sqlx::query("INSERT INTO user_roles (user_id, role_id) VALUES ($1, $2) ON CONFLICT DO NOTHING")
                    .bind(id.0)
                    .bind(role_id.0)
                    .execute(&mut *tx)
                    .await?;
            }
        }

        tx.commit().await?;
        self.find_principal_by_id(id).await
    }

    async fn delete_principal(&self, id: PrincipalId) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id.0)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("principal", id));
        }
        Ok(())
    }

    async fn list_principals(&self) -> Result<Vec<Principal>, StoreError> {
        let sql = format!("{}{}", PRINCIPAL_SELECT, PRINCIPAL_ORDER);
        let rows = sqlx::query_as::<_, PrincipalRow>(&sql)
            .fetch_all(&self.pool)
            .await?;
        Ok(assemble_principals(rows))
    }

    async fn create_principal(&self, principal: &Principal) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO users (id, username, email, password_hash, full_name, is_active, last_login, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(principal.id.0)
        .bind(&principal.username)
        .bind(&principal.email)
        .bind(&principal.secret_hash)
        .bind(&principal.display_name)
        .bind(principal.is_active)
        .bind(principal.last_authenticated_at)
        .bind(principal.created_at)
        .execute(&mut *tx)
        .await
        .map_err(conflict_on("principal"))?;

        for role in &principal.roles {
            let role_id: Option<Uuid> = sqlx::query_scalar("SELECT id FROM roles WHERE name = $1")
                .bind(&role.name)
                .fetch_optional(&mut *tx)
                .await?;
            let role_id = role_id.ok_or_else(|| StoreError::not_found("role", &role.name))?;

            sqlx::query("INSERT INTO user_roles (user_id, role_id) VALUES ($1, $2) ON CONFLICT DO NOTHING")
                .bind(principal.id.0)
                .bind(role_id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl CatalogStore for PgStore {
    async fn list_roles(&self) -> Result<Vec<Role>, StoreError> {
        self.fetch_roles(None).await
    }

    async fn find_role(&self, id: RoleId) -> Result<Role, StoreError> {
        self.fetch_roles(Some(id))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| StoreError::not_found("role", id))
    }

    async fn role_members(&self, id: RoleId) -> Result<Vec<Principal>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        require_row(&mut conn, "roles", "role", id.0).await?;
        let rows = self
            .fetch_principal_rows(
                "u.id IN (SELECT user_id FROM user_roles WHERE role_id = $1)",
                id.0,
            )
            .await?;
        Ok(assemble_principals(rows))
    }

    async fn create_role(&self, role: &Role) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("INSERT INTO roles (id, name, description, level) VALUES ($1, $2, $3, $4)")
            .bind(role.id.0)
            .bind(&role.name)
            .bind(&role.description)
            .bind(role.level)
            .execute(&mut *tx)
            .await
            .map_err(conflict_on("role"))?;

        let permission_ids: Vec<PermissionId> = role.permissions.iter().map(|p| p.id).collect();
        link_role_permissions(&mut tx, role.id.0, &permission_ids).await?;

        tx.commit().await?;
        Ok(())
    }

    async fn update_role(&self, id: RoleId, changes: &RoleChanges) -> Result<Role, StoreError> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE roles
            SET name = COALESCE($2, name),
                description = COALESCE($3, description),
                level = COALESCE($4, level)
            WHERE id = $1
            "#,
        )
        .bind(id.0)
        .bind(&changes.name)
        .bind(&changes.description)
        .bind(changes.level)
        .execute(&mut *tx)
        .await
        .map_err(conflict_on("role"))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("role", id));
        }

        if let Some(ref permission_ids) = changes.permission_ids {
            sqlx::query("DELETE FROM role_permissions WHERE role_id = $1")
                .bind(id.0)
                .execute(&mut *tx)
                .await?;
            link_role_permissions(&mut tx, id.0, permission_ids).await?;
        }

        tx.commit().await?;
        self.find_role(id).await
    }

    async fn delete_role(&self, id: RoleId) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM roles WHERE id = $1")
            .bind(id.0)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("role", id));
        }
        Ok(())
    }

    async fn list_permissions(&self) -> Result<Vec<Permission>, StoreError> {
        let sql = format!("{} ORDER BY resource, action", PERMISSION_SELECT);
        let rows = sqlx::query_as::<_, PermissionRow>(&sql)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(Permission::from).collect())
    }

    async fn find_permission(&self, id: PermissionId) -> Result<Permission, StoreError> {
        let sql = format!("{} WHERE id = $1", PERMISSION_SELECT);
        sqlx::query_as::<_, PermissionRow>(&sql)
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?
            .map(Permission::from)
            .ok_or_else(|| StoreError::not_found("permission", id))
    }

    async fn create_permission(&self, permission: &Permission) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO permissions (id, name, action, resource, description, resource_id)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(permission.id.0)
        .bind(&permission.name)
        .bind(&permission.action)
        .bind(&permission.resource)
        .bind(&permission.description)
        .bind(permission.resource_id.map(|r| r.0))
        .execute(&self.pool)
        .await
        .map_err(conflict_on("permission"))?;
        Ok(())
    }

    async fn update_permission(
        &self,
        id: PermissionId,
        changes: &PermissionChanges,
    ) -> Result<Permission, StoreError> {
        let row = sqlx::query_as::<_, PermissionRow>(
            r#"
            UPDATE permissions
            SET name = COALESCE($2, name),
                action = COALESCE($3, action),
                resource = COALESCE($4, resource),
                description = COALESCE($5, description),
                resource_id = COALESCE($6, resource_id)
            WHERE id = $1
            RETURNING id, name, action, resource, description, resource_id
            "#,
        )
        .bind(id.0)
        .bind(&changes.name)
        .bind(&changes.action)
        .bind(&changes.resource)
        .bind(&changes.description)
        .bind(changes.resource_id.map(|r| r.0))
        .fetch_optional(&self.pool)
        .await
        .map_err(conflict_on("permission"))?;

        row.map(Permission::from)
            .ok_or_else(|| StoreError::not_found("permission", id))
    }

    async fn delete_permission(&self, id: PermissionId) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM permissions WHERE id = $1")
            .bind(id.0)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("permission", id));
        }
        Ok(())
    }

    async fn list_resources(&self) -> Result<Vec<Resource>, StoreError> {
        let sql = format!("{} ORDER BY name", RESOURCE_SELECT);
        let rows = sqlx::query_as::<_, ResourceRow>(&sql)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(Resource::from).collect())
    }

    async fn find_resource(&self, id: ResourceId) -> Result<Resource, StoreError> {
        let sql = format!("{} WHERE id = $1", RESOURCE_SELECT);
        sqlx::query_as::<_, ResourceRow>(&sql)
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?
            .map(Resource::from)
            .ok_or_else(|| StoreError::not_found("resource", id))
    }

    async fn create_resource(&self, resource: &Resource) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO resources (id, name, type, path, description, is_active)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(resource.id.0)
        .bind(&resource.name)
        .bind(resource.kind.as_str())
        .bind(&resource.path)
        .bind(&resource.description)
        .bind(resource.is_active)
        .execute(&self.pool)
        .await
        .map_err(conflict_on("resource"))?;
        Ok(())
    }

    async fn update_resource(
        &self,
        id: ResourceId,
        changes: &ResourceChanges,
    ) -> Result<Resource, StoreError> {
        let kind = changes.kind.as_deref().map(|k| ResourceKind::parse(k).as_str().to_string());
        let row = sqlx::query_as::<_, ResourceRow>(
            r#"
            UPDATE resources
            SET name = COALESCE($2, name),
                type = COALESCE($3, type),
                path = COALESCE($4, path),
                description = COALESCE($5, description),
                is_active = COALESCE($6, is_active)
            WHERE id = $1
            RETURNING id, name, type AS kind, path, description, is_active
            "#,
        )
        .bind(id.0)
        .bind(&changes.name)
        .bind(kind)
        .bind(&changes.path)
        .bind(&changes.description)
        .bind(changes.is_active)
        .fetch_optional(&self.pool)
        .await
        .map_err(conflict_on("resource"))?;

        row.map(Resource::from)
            .ok_or_else(|| StoreError::not_found("resource", id))
    }

    async fn delete_resource(&self, id: ResourceId) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM resources WHERE id = $1")
            .bind(id.0)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("resource", id));
        }
        Ok(())
    }
}

#[async_trait]
impl AuditLog for PgStore {
    async fn query_audit(&self, filter: &AuditFilter) -> Result<AuditPage, StoreError> {
        let mut count =
            QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM audit_logs a WHERE TRUE");
        push_audit_filters(&mut count, filter);
        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

        let mut select = QueryBuilder::<Postgres>::new(
            "SELECT a.id, a.user_id, a.action, a.resource, a.status, a.ip_address, a.user_agent, \
                    a.details, a.timestamp, u.username AS actor_username, u.email AS actor_email \
             FROM audit_logs a LEFT JOIN users u ON u.id = a.user_id WHERE TRUE",
        );
        push_audit_filters(&mut select, filter);
        select
            .push(" ORDER BY a.timestamp DESC LIMIT ")
            .push_bind(i64::from(filter.limit()))
            .push(" OFFSET ")
            .push_bind(i64::try_from(filter.offset()).unwrap_or(i64::MAX));

        let rows: Vec<AuditRow> = select.build_query_as().fetch_all(&self.pool).await?;
        let records = rows
            .into_iter()
            .map(AuditEntry::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(AuditPage::new(records, total.max(0) as u64, filter))
    }

    async fn audit_stats(&self) -> Result<AuditStats, StoreError> {
        let (total, success, failed, denied): (i64, i64, i64, i64) = sqlx::query_as(
            r#"
            SELECT COUNT(*),
                   COUNT(*) FILTER (WHERE status = 'success'),
                   COUNT(*) FILTER (WHERE status = 'failed'),
                   COUNT(*) FILTER (WHERE status = 'denied')
            FROM audit_logs
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(AuditStats {
            total: total.max(0) as u64,
            success: success.max(0) as u64,
            failed: failed.max(0) as u64,
            denied: denied.max(0) as u64,
        })
    }
}

#[async_trait]
impl SeedTarget for PgStore {
    async fn install_catalog(&self, catalog: &Catalog) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        for resource in &catalog.resources {
            sqlx::query(
                r#"
                INSERT INTO resources (id, name, type, path, description, is_active)
                VALUES ($1, $2, $3, $4, $5, $6)
                ON CONFLICT (name) DO NOTHING
                "#,
            )
            .bind(resource.id.0)
            .bind(&resource.name)
            .bind(resource.kind.as_str())
            .bind(&resource.path)
            .bind(&resource.description)
            .bind(resource.is_active)
            .execute(&mut *tx)
            .await?;
        }

        for permission in &catalog.permissions {
            sqlx::query(
                r#"
                INSERT INTO permissions (id, name, action, resource, description, resource_id)
                VALUES ($1, $2, $3, $4, $5, (SELECT id FROM resources WHERE name = $4))
                ON CONFLICT (name) DO NOTHING
                "#,
            )
            .bind(permission.id.0)
            .bind(&permission.name)
            .bind(&permission.action)
            .bind(&permission.resource)
            .bind(&permission.description)
            .execute(&mut *tx)
            .await?;
        }

        for role in &catalog.roles {
            sqlx::query(
                r#"
                INSERT INTO roles (id, name, description, level)
                VALUES ($1, $2, $3, $4)
                ON CONFLICT (name) DO NOTHING
                "#,
            )
            .bind(role.id.0)
            .bind(&role.name)
            .bind(&role.description)
            .bind(role.level)
            .execute(&mut *tx)
            .await?;

            for permission in &role.permissions {
                sqlx::query(
                    r#"
                    INSERT INTO role_permissions (role_id, permission_id)
                    SELECT r.id, p.id FROM roles r, permissions p
                    WHERE r.name = $1 AND p.name = $2
                    ON CONFLICT DO NOTHING
                    "#,
                )
                .bind(&role.name)
                .bind(&permission.name)
                .execute(&mut *tx)
                .await?;
            }
        }

        tx.commit().await?;
        info!(
            roles = catalog.roles.len(),
            permissions = catalog.permissions.len(),
            "Installed default catalog"
        );
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    fn row(user: Uuid, username: &str, role: Option<(Uuid, &str)>, perm: Option<(&str, &str)>) -> PrincipalRow {
        PrincipalRow {
            user_id: user,
            username: username.to_string(),
            email: format!("{}@example.com", username),
            password_hash: "h".to_string(),
            full_name: username.to_string(),
            is_active: true,
            last_login: None,
            created_at: Utc::now(),
            role_id: role.map(|(id, _)| id),
            role_name: role.map(|(_, name)| name.to_string()),
            role_description: role.map(|_| String::new()),
            role_level: role.map(|_| 10),
            permission_id: perm.map(|_| Uuid::new_v4()),
            permission_name: perm.map(|(a, r)| format!("{}:{}", a, r)),
            action: perm.map(|(a, _)| a.to_string()),
            resource: perm.map(|(_, r)| r.to_string()),
            permission_description: None,
            resource_id: None,
        }
    }

    #[test]
    fn test_assemble_nested_principal() {
        let user = Uuid::new_v4();
        let manager = Uuid::new_v4();
        let auditor = Uuid::new_v4();
        let rows = vec![
            row(user, "alice", Some((manager, "Manager")), Some(("read", "users"))),
            row(user, "alice", Some((manager, "Manager")), Some(("update", "users"))),
            row(user, "alice", Some((auditor, "Auditor")), Some(("read", "audit"))),
        ];

        let principal = assemble_principal(rows, "alice").unwrap();
        assert_eq!(principal.id, PrincipalId(user));
        assert_eq!(principal.roles.len(), 2);
        assert_eq!(principal.roles[0].permissions.len(), 2);
        assert_eq!(principal.roles[1].permissions[0].key().to_string(), "read:audit");
    }

    #[test]
    fn test_assemble_principal_without_roles() {
        let user = Uuid::new_v4();
        let principal = assemble_principal(vec![row(user, "bare", None, None)], "bare").unwrap();
        assert!(principal.roles.is_empty());
    }

    #[test]
    fn test_role_without_permissions_kept() {
        let user = Uuid::new_v4();
        let role = Uuid::new_v4();
        let principal =
            assemble_principal(vec![row(user, "x", Some((role, "Empty")), None)], "x").unwrap();
        assert_eq!(principal.roles.len(), 1);
        assert!(principal.roles[0].permissions.is_empty());
    }

    #[test]
    fn test_not_found_and_ambiguous_are_distinct() {
        assert!(matches!(
            assemble_principal(vec![], "ghost"),
            Err(StoreError::NotFound { .. })
        ));

        let rows = vec![
            row(Uuid::new_v4(), "twin", None, None),
            row(Uuid::new_v4(), "twin", None, None),
        ];
        assert!(matches!(
            assemble_principal(rows, "twin"),
            Err(StoreError::Ambiguous { .. })
        ));
    }

    fn audit_row(user: Option<Uuid>, actor: Option<(&str, &str)>) -> AuditRow {
        AuditRow {
            id: Uuid::new_v4(),
            user_id: user,
            action: "delete_user".to_string(),
            resource: "users".to_string(),
            status: "denied".to_string(),
            ip_address: None,
            user_agent: None,
            details: serde_json::Value::Null,
            timestamp: Utc::now(),
            actor_username: actor.map(|(u, _)| u.to_string()),
            actor_email: actor.map(|(_, e)| e.to_string()),
        }
    }

    #[test]
    fn test_audit_row_joins_actor_only_when_user_row_exists() {
        let user = Uuid::new_v4();
        let entry =
            AuditEntry::try_from(audit_row(Some(user), Some(("manager", "manager@rbac.com")))).unwrap();
        let actor = entry.actor.unwrap();
        assert_eq!(actor.id, PrincipalId(user));
        assert_eq!(actor.username, "manager");
        assert_eq!(entry.record.status, AuditStatus::Denied);

        let deleted = AuditEntry::try_from(audit_row(Some(user), None)).unwrap();
        assert!(deleted.actor.is_none());
        assert_eq!(deleted.record.actor_id, Some(PrincipalId(user)));

        let mut bad = audit_row(None, None);
        bad.status = "maybe".to_string();
        assert!(AuditEntry::try_from(bad).is_err());
    }

    #[test]
    fn test_resource_row_parses_kind() {
        let resource = Resource::from(ResourceRow {
            id: Uuid::new_v4(),
            name: "ledger".to_string(),
            kind: "database".to_string(),
            path: None,
            description: None,
            is_active: false,
        });
        assert_eq!(resource.kind, ResourceKind::Data);
        assert!(!resource.is_active);
    }
}
