//! Role, permission and resource management.
//!
//! These are ordinary engine operations: the routes that call them are
//! guarded and audited like any other. Validation happens here so both
//! store backends see the same input.

use serde::{Deserialize, Serialize};
use tracing::info;

use super::AccessEngine;
use crate::error::{Result, WardenError};
use crate::rbac::{
    Permission, PermissionChanges, PermissionId, PermissionKey, PrincipalId, Resource,
    ResourceChanges, ResourceId, ResourceKind, Role, RoleChanges, RoleId,
};
use crate::store::CatalogStore;

// ═══════════════════════════════════════════════════════════════════════════════
// Inputs & Views
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Deserialize)]
pub struct NewRole {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub level: i32,
    #[serde(default, alias = "permissionIds")]
    pub permission_ids: Vec<PermissionId>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewPermission {
    /// Defaults to the `action:resource` key.
    #[serde(default)]
    pub name: Option<String>,
    pub action: String,
    pub resource: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, alias = "resourceId")]
    pub resource_id: Option<ResourceId>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewResource {
    pub name: String,
    #[serde(default, alias = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, alias = "isActive")]
    pub is_active: Option<bool>,
}

/// A principal holding a role, as listed in the role's detail view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleMember {
    pub id: PrincipalId,
    pub username: String,
    pub email: String,
    pub display_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleDetail {
    #[serde(flatten)]
    pub role: Role,
    pub members: Vec<RoleMember>,
}

fn require_name(field: &'static str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(WardenError::validation(format!("{} must not be empty", field)));
    }
    Ok(())
}

// ═══════════════════════════════════════════════════════════════════════════════
// Operations
// ═══════════════════════════════════════════════════════════════════════════════

impl AccessEngine {
    // ─────────────────────────────────────────────────────────────────────────
    // Roles
    // ─────────────────────────────────────────────────────────────────────────

    pub async fn list_roles(&self) -> Result<Vec<Role>> {
        Ok(self.store.list_roles().await?)
    }

    pub async fn role_detail(&self, id: RoleId) -> Result<RoleDetail> {
        let role = self.store.find_role(id).await?;
        let members = self
            .store
            .role_members(id)
            .await?
            .into_iter()
            .map(|p| RoleMember {
                id: p.id,
                username: p.username,
                email: p.email,
                display_name: p.display_name,
            })
            .collect();
        Ok(RoleDetail { role, members })
    }

    pub async fn create_role(&self, input: NewRole) -> Result<Role> {
        require_name("name", &input.name)?;
        let permissions = self.resolve_permissions(&input.permission_ids).await?;

        let role = Role::new(input.name.trim(), input.description, input.level)
            .with_permissions(permissions);
        self.store.create_role(&role).await?;
        info!(role_id = %role.id, name = %role.name, "Role created");
        Ok(role)
    }

    /// A present `permission_ids` replaces the role's grants; members see the
    /// change on their next request.
    pub async fn update_role(&self, id: RoleId, changes: RoleChanges) -> Result<Role> {
        if let Some(ref name) = changes.name {
            require_name("name", name)?;
        }
        if let Some(ref ids) = changes.permission_ids {
            self.resolve_permissions(ids).await?;
        }
        let role = self.store.update_role(id, &changes).await?;
        info!(role_id = %id, "Role updated");
        Ok(role)
    }

    pub async fn delete_role(&self, id: RoleId) -> Result<()> {
        self.store.delete_role(id).await?;
        info!(role_id = %id, "Role deleted");
        Ok(())
    }

    async fn resolve_permissions(&self, ids: &[PermissionId]) -> Result<Vec<Permission>> {
        let mut permissions = Vec::with_capacity(ids.len());
        for id in ids {
            match self.store.find_permission(*id).await {
                Ok(permission) => permissions.push(permission),
                Err(e) if e.is_not_found() => {
                    return Err(WardenError::validation(format!("unknown permission: {}", id)))
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(permissions)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Permissions
    // ─────────────────────────────────────────────────────────────────────────

    pub async fn list_permissions(&self) -> Result<Vec<Permission>> {
        Ok(self.store.list_permissions().await?)
    }

    pub async fn find_permission(&self, id: PermissionId) -> Result<Permission> {
        Ok(self.store.find_permission(id).await?)
    }

    pub async fn create_permission(&self, input: NewPermission) -> Result<Permission> {
        let key = permission_key(input.action.trim(), input.resource.trim())?;
        if let Some(resource_id) = input.resource_id {
            self.require_resource(resource_id).await?;
        }

        let mut permission = Permission::new(key.action(), key.resource());
        if let Some(name) = input.name.filter(|n| !n.trim().is_empty()) {
            permission = permission.named(name.trim());
        }
        permission.description = input.description;
        permission.resource_id = input.resource_id;

        self.store.create_permission(&permission).await?;
        info!(permission_id = %permission.id, key = %key, "Permission created");
        Ok(permission)
    }

    pub async fn update_permission(
        &self,
        id: PermissionId,
        changes: PermissionChanges,
    ) -> Result<Permission> {
        if let Some(ref name) = changes.name {
            require_name("name", name)?;
        }
        if changes.action.is_some() || changes.resource.is_some() {
            let current = self.store.find_permission(id).await?;
            permission_key(
                changes.action.as_deref().unwrap_or(&current.action),
                changes.resource.as_deref().unwrap_or(&current.resource),
            )?;
        }
        if let Some(resource_id) = changes.resource_id {
            self.require_resource(resource_id).await?;
        }
        let permission = self.store.update_permission(id, &changes).await?;
        info!(permission_id = %id, "Permission updated");
        Ok(permission)
    }

    pub async fn delete_permission(&self, id: PermissionId) -> Result<()> {
        self.store.delete_permission(id).await?;
        info!(permission_id = %id, "Permission deleted");
        Ok(())
    }

    async fn require_resource(&self, id: ResourceId) -> Result<()> {
        match self.store.find_resource(id).await {
            Ok(_) => Ok(()),
            Err(e) if e.is_not_found() => {
                Err(WardenError::validation(format!("unknown resource: {}", id)))
            }
            Err(e) => Err(e.into()),
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Resources
    // ─────────────────────────────────────────────────────────────────────────

    pub async fn list_resources(&self) -> Result<Vec<Resource>> {
        Ok(self.store.list_resources().await?)
    }

    pub async fn find_resource(&self, id: ResourceId) -> Result<Resource> {
        Ok(self.store.find_resource(id).await?)
    }

    pub async fn create_resource(&self, input: NewResource) -> Result<Resource> {
        require_name("name", &input.name)?;
        let kind = input
            .kind
            .as_deref()
            .map(ResourceKind::parse)
            .unwrap_or(ResourceKind::Endpoint);

        let mut resource = Resource::new(input.name.trim(), kind);
        resource.path = input.path;
        resource.description = input.description;
        resource.is_active = input.is_active.unwrap_or(true);

        self.store.create_resource(&resource).await?;
        info!(resource_id = %resource.id, name = %resource.name, "Resource created");
        Ok(resource)
    }

    pub async fn update_resource(
        &self,
        id: ResourceId,
        changes: ResourceChanges,
    ) -> Result<Resource> {
        if let Some(ref name) = changes.name {
            require_name("name", name)?;
        }
        let resource = self.store.update_resource(id, &changes).await?;
        info!(resource_id = %id, "Resource updated");
        Ok(resource)
    }

    pub async fn delete_resource(&self, id: ResourceId) -> Result<()> {
        self.store.delete_resource(id).await?;
        info!(resource_id = %id, "Resource deleted");
        Ok(())
    }
}

fn permission_key(action: &str, resource: &str) -> Result<PermissionKey> {
    if action.contains(':') {
        return Err(WardenError::validation("action must not contain ':'"));
    }
    PermissionKey::parse(&format!("{}:{}", action, resource))
        .map_err(|e| WardenError::validation(e.to_string()))
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::Auditor;
    use crate::auth::{ManualClock, TokenCodec};
    use crate::config::AuthConfig;
    use crate::store::MemoryStore;
    use std::sync::Arc;

    fn engine() -> AccessEngine {
        let store = Arc::new(MemoryStore::with_defaults());
        let config = AuthConfig {
            jwt_secret: "catalog-test-secret".into(),
            ..AuthConfig::default()
        };
        let codec = TokenCodec::new(&config, Arc::new(ManualClock::starting_now())).unwrap();
        let auditor = Auditor::new(store.clone(), 16);
        AccessEngine::new(Arc::new(codec), store, auditor)
    }

    async fn permission_id(engine: &AccessEngine, name: &str) -> PermissionId {
        engine
            .list_permissions()
            .await
            .unwrap()
            .into_iter()
            .find(|p| p.name == name)
            .unwrap()
            .id
    }

    #[tokio::test]
    async fn test_create_role_with_permissions() {
        let engine = engine();
        let read_reports = permission_id(&engine, "read:reports").await;

        let role = engine
            .create_role(NewRole {
                name: " Analyst ".into(),
                description: "Reads reports".into(),
                level: 20,
                permission_ids: vec![read_reports],
            })
            .await
            .unwrap();
        assert_eq!(role.name, "Analyst");
        assert_eq!(role.permissions[0].key().to_string(), "read:reports");

        let detail = engine.role_detail(role.id).await.unwrap();
        assert!(detail.members.is_empty());
        assert_eq!(detail.role.level, 20);
    }

    #[tokio::test]
    async fn test_create_role_rejects_unknown_permission_and_blank_name() {
        let engine = engine();
        let err = engine
            .create_role(NewRole {
                name: "Ghostly".into(),
                description: String::new(),
                level: 0,
                permission_ids: vec![PermissionId::new()],
            })
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "VALIDATION_ERROR");

        let err = engine
            .create_role(NewRole {
                name: "  ".into(),
                description: String::new(),
                level: 0,
                permission_ids: vec![],
            })
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_duplicate_role_is_conflict() {
        let engine = engine();
        let err = engine
            .create_role(NewRole {
                name: "Admin".into(),
                description: String::new(),
                level: 1,
                permission_ids: vec![],
            })
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "DUPLICATE_RECORD");
    }

    #[tokio::test]
    async fn test_permission_key_validation() {
        let engine = engine();
        let bad = NewPermission {
            name: None,
            action: "read:all".into(),
            resource: "users".into(),
            description: None,
            resource_id: None,
        };
        assert_eq!(
            engine.create_permission(bad).await.unwrap_err().error_code(),
            "VALIDATION_ERROR"
        );

        let created = engine
            .create_permission(NewPermission {
                name: None,
                action: "export".into(),
                resource: "reports".into(),
                description: Some("Export reports".into()),
                resource_id: None,
            })
            .await
            .unwrap();
        assert_eq!(created.name, "export:reports");

        let blank_resource = PermissionChanges {
            resource: Some(String::new()),
            ..Default::default()
        };
        assert_eq!(
            engine
                .update_permission(created.id, blank_resource)
                .await
                .unwrap_err()
                .error_code(),
            "VALIDATION_ERROR"
        );
    }

    #[tokio::test]
    async fn test_permission_rejects_unknown_resource_link() {
        let engine = engine();
        let err = engine
            .create_permission(NewPermission {
                name: None,
                action: "read".into(),
                resource: "ledger".into(),
                description: None,
                resource_id: Some(ResourceId::new()),
            })
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_resource_defaults_and_missing_delete() {
        let engine = engine();
        let resource = engine
            .create_resource(NewResource {
                name: "ledger".into(),
                kind: None,
                path: Some("/api/ledger".into()),
                description: None,
                is_active: None,
            })
            .await
            .unwrap();
        assert_eq!(resource.kind, ResourceKind::Endpoint);
        assert!(resource.is_active);

        let err = engine.delete_resource(ResourceId::new()).await.unwrap_err();
        assert_eq!(err.error_code(), "NOT_FOUND");
    }
}
