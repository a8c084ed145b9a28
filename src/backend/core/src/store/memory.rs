//! In-memory credential store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};

use super::{AuditLog, CatalogStore, CredentialStore, SeedTarget, StoreError};
use crate::audit::{ActorSummary, AuditFilter, AuditPage, AuditRecord, AuditStats};
use crate::rbac::{
    Catalog, Permission, PermissionChanges, PermissionId, Principal, PrincipalChanges,
    PrincipalId, Resource, ResourceChanges, ResourceId, Role, RoleChanges, RoleId,
};

/// Principals are kept with role ids rather than role copies so that role
/// changes are visible on the next lookup.
#[derive(Debug, Clone)]
struct StoredPrincipal {
    principal: Principal,
    role_ids: Vec<RoleId>,
}

/// Same idea one level down: roles link permissions by id.
#[derive(Debug, Clone)]
struct StoredRole {
    role: Role,
    permission_ids: Vec<PermissionId>,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    roles: DashMap<RoleId, StoredRole>,
    permissions: DashMap<PermissionId, Permission>,
    resources: DashMap<ResourceId, Resource>,
    principals: DashMap<PrincipalId, StoredPrincipal>,
    audit: RwLock<Vec<AuditRecord>>,
    fail_audit_writes: AtomicBool,
    lookup_failure: RwLock<Option<fn() -> StoreError>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store pre-loaded with the built-in roles, permissions and resources.
    pub fn with_defaults() -> Self {
        let store = Self::new();
        store.install(&Catalog::defaults());
        store
    }

    /// Make subsequent audit writes fail, to exercise the failure path.
    pub fn fail_audit_writes(&self, fail: bool) {
        self.fail_audit_writes.store(fail, Ordering::SeqCst);
    }

    /// Make principal lookups return `failure()` until [`restore_lookups`]
    /// is called.
    ///
    /// [`restore_lookups`]: MemoryStore::restore_lookups
    pub fn fail_lookups(&self, failure: fn() -> StoreError) {
        *self.lookup_failure.write() = Some(failure);
    }

    pub fn restore_lookups(&self) {
        *self.lookup_failure.write() = None;
    }

    /// Snapshot of the audit trail in write order.
    pub fn audit_records(&self) -> Vec<AuditRecord> {
        self.audit.read().clone()
    }

    fn check_lookup(&self) -> Result<(), StoreError> {
        match *self.lookup_failure.read() {
            Some(failure) => Err(failure()),
            None => Ok(()),
        }
    }

    fn install(&self, catalog: &Catalog) {
        for resource in &catalog.resources {
            if !self.resources.iter().any(|r| r.name == resource.name) {
                self.resources.insert(resource.id, resource.clone());
            }
        }
        for permission in &catalog.permissions {
            self.upsert_permission(permission);
        }
        for role in &catalog.roles {
            if self.role_id_by_name(&role.name).is_none() {
                self.insert_role(role.clone());
            }
        }
    }

    /// Existing permission id with the same name, or the newly inserted one.
    fn upsert_permission(&self, permission: &Permission) -> PermissionId {
        if let Some(id) = self.permission_id_by_name(&permission.name) {
            return id;
        }
        let mut permission = permission.clone();
        permission.resource_id = self
            .resources
            .iter()
            .find(|r| r.name == permission.resource)
            .map(|r| *r.key())
            .or(permission.resource_id);
        let id = permission.id;
        self.permissions.insert(id, permission);
        id
    }

    /// Insert or replace a role, matched by name. Its permissions are
    /// upserted by name.
    fn insert_role(&self, role: Role) -> RoleId {
        let permission_ids = role
            .permissions
            .iter()
            .map(|p| self.upsert_permission(p))
            .collect();
        let mut bare = role;
        bare.permissions.clear();
        if let Some(existing) = self.role_id_by_name(&bare.name) {
            bare.id = existing;
        }
        let id = bare.id;
        self.roles.insert(
            id,
            StoredRole {
                role: bare,
                permission_ids,
            },
        );
        id
    }

    fn role_id_by_name(&self, name: &str) -> Option<RoleId> {
        self.roles
            .iter()
            .find(|r| r.role.name == name)
            .map(|r| *r.key())
    }

    fn permission_id_by_name(&self, name: &str) -> Option<PermissionId> {
        self.permissions
            .iter()
            .find(|p| p.name == name)
            .map(|p| *p.key())
    }

    fn materialize_role(&self, stored: &StoredRole) -> Role {
        let permissions = stored
            .permission_ids
            .iter()
            .filter_map(|id| self.permissions.get(id).map(|p| p.value().clone()))
            .collect();
        stored.role.clone().with_permissions(permissions)
    }

    fn materialize(&self, stored: &StoredPrincipal) -> Principal {
        let roles = stored
            .role_ids
            .iter()
            .filter_map(|id| {
                let role = self.roles.get(id).map(|r| r.value().clone())?;
                Some(self.materialize_role(&role))
            })
            .collect();
        stored.principal.clone().with_roles(roles)
    }

    fn stored(&self, id: PrincipalId) -> Result<StoredPrincipal, StoreError> {
        self.principals
            .get(&id)
            .map(|p| p.value().clone())
            .ok_or_else(|| StoreError::not_found("principal", id))
    }

    fn stored_role(&self, id: RoleId) -> Result<StoredRole, StoreError> {
        self.roles
            .get(&id)
            .map(|r| r.value().clone())
            .ok_or_else(|| StoreError::not_found("role", id))
    }

    fn require_roles(&self, ids: &[RoleId]) -> Result<(), StoreError> {
        match ids.iter().find(|id| !self.roles.contains_key(*id)) {
            Some(missing) => Err(StoreError::not_found("role", missing)),
            None => Ok(()),
        }
    }

    fn require_permissions(&self, ids: &[PermissionId]) -> Result<(), StoreError> {
        match ids.iter().find(|id| !self.permissions.contains_key(*id)) {
            Some(missing) => Err(StoreError::not_found("permission", missing)),
            None => Ok(()),
        }
    }

    fn actor_summary(&self, id: PrincipalId) -> Option<ActorSummary> {
        self.principals.get(&id).map(|p| ActorSummary {
            id,
            username: p.principal.username.clone(),
            email: p.principal.email.clone(),
        })
    }
}

fn conflict(entity: &'static str, key: &str) -> StoreError {
    StoreError::Conflict {
        entity,
        key: key.to_string(),
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn find_principal_by_id(&self, id: PrincipalId) -> Result<Principal, StoreError> {
        self.check_lookup()?;
        let stored = self.stored(id)?;
        Ok(self.materialize(&stored))
    }

    async fn find_principal_by_username(&self, username: &str) -> Result<Principal, StoreError> {
        self.check_lookup()?;
        let matches: Vec<StoredPrincipal> = self
            .principals
            .iter()
            .filter(|p| p.principal.username == username)
            .map(|p| p.value().clone())
            .collect();

        match matches.as_slice() {
            [] => Err(StoreError::not_found("principal", username)),
            [only] => Ok(self.materialize(only)),
            _ => Err(StoreError::Ambiguous {
                entity: "principal",
                key: username.to_string(),
            }),
        }
    }

    async fn append_audit_record(&self, record: &AuditRecord) -> Result<(), StoreError> {
        if self.fail_audit_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("audit table unavailable".into()));
        }
        self.audit.write().push(record.clone());
        Ok(())
    }

    async fn touch_last_authenticated(
        &self,
        id: PrincipalId,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut entry = self
            .principals
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("principal", id))?;
        entry.principal.last_authenticated_at = Some(at);
        Ok(())
    }

    async fn set_principal_active(
        &self,
        id: PrincipalId,
        active: bool,
    ) -> Result<Principal, StoreError> {
        let changes = PrincipalChanges {
            is_active: Some(active),
            ..Default::default()
        };
        self.update_principal(id, &changes).await
    }

    async fn update_principal(
        &self,
        id: PrincipalId,
        changes: &PrincipalChanges,
    ) -> Result<Principal, StoreError> {
        self.stored(id)?;
        if let Some(ref email) = changes.email {
            let taken = self
                .principals
                .iter()
                .any(|p| *p.key() != id && &p.principal.email == email);
            if taken {
                return Err(conflict("principal", email));
            }
        }
        if let Some(ref role_ids) = changes.role_ids {
            self.require_roles(role_ids)?;
        }

        let updated = {
            let mut entry = self
                .principals
                .get_mut(&id)
                .ok_or_else(|| StoreError::not_found("principal", id))?;
            changes.apply_to(&mut entry.principal);
            if let Some(ref role_ids) = changes.role_ids {
                entry.role_ids = role_ids.clone();
            }
            entry.clone()
        };
        Ok(self.materialize(&updated))
    }

    async fn delete_principal(&self, id: PrincipalId) -> Result<(), StoreError> {
        self.principals
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| StoreError::not_found("principal", id))
    }

    async fn list_principals(&self) -> Result<Vec<Principal>, StoreError> {
        let stored: Vec<StoredPrincipal> =
            self.principals.iter().map(|p| p.value().clone()).collect();
        let mut principals: Vec<Principal> =
            stored.iter().map(|s| self.materialize(s)).collect();
        principals.sort_by(|a, b| a.username.cmp(&b.username));
        Ok(principals)
    }

    async fn create_principal(&self, principal: &Principal) -> Result<(), StoreError> {
        let taken = self.principals.iter().find_map(|p| {
            if p.principal.username == principal.username {
                Some(principal.username.clone())
            } else if p.principal.email == principal.email {
                Some(principal.email.clone())
            } else {
                None
            }
        });
        if let Some(key) = taken {
            return Err(conflict("principal", &key));
        }

        let role_ids = principal
            .roles
            .iter()
            .map(|role| {
                self.role_id_by_name(&role.name)
                    .ok_or_else(|| StoreError::not_found("role", &role.name))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut bare = principal.clone();
        bare.roles.clear();
        self.principals.insert(
            principal.id,
            StoredPrincipal {
                principal: bare,
                role_ids,
            },
        );
        Ok(())
    }
}

#[async_trait]
impl CatalogStore for MemoryStore {
    async fn list_roles(&self) -> Result<Vec<Role>, StoreError> {
        let stored: Vec<StoredRole> = self.roles.iter().map(|r| r.value().clone()).collect();
        let mut roles: Vec<Role> = stored.iter().map(|r| self.materialize_role(r)).collect();
        roles.sort_by(|a, b| b.level.cmp(&a.level).then_with(|| a.name.cmp(&b.name)));
        Ok(roles)
    }

    async fn find_role(&self, id: RoleId) -> Result<Role, StoreError> {
        let stored = self.stored_role(id)?;
        Ok(self.materialize_role(&stored))
    }

    async fn role_members(&self, id: RoleId) -> Result<Vec<Principal>, StoreError> {
        self.stored_role(id)?;
        let stored: Vec<StoredPrincipal> = self
            .principals
            .iter()
            .filter(|p| p.role_ids.contains(&id))
            .map(|p| p.value().clone())
            .collect();
        let mut members: Vec<Principal> = stored.iter().map(|s| self.materialize(s)).collect();
        members.sort_by(|a, b| a.username.cmp(&b.username));
        Ok(members)
    }

    async fn create_role(&self, role: &Role) -> Result<(), StoreError> {
        if self.role_id_by_name(&role.name).is_some() {
            return Err(conflict("role", &role.name));
        }
        let permission_ids: Vec<PermissionId> = role.permissions.iter().map(|p| p.id).collect();
        self.require_permissions(&permission_ids)?;

        let mut bare = role.clone();
        bare.permissions.clear();
        self.roles.insert(
            role.id,
            StoredRole {
                role: bare,
                permission_ids,
            },
        );
        Ok(())
    }

    async fn update_role(&self, id: RoleId, changes: &RoleChanges) -> Result<Role, StoreError> {
        self.stored_role(id)?;
        if let Some(ref name) = changes.name {
            if self.role_id_by_name(name).is_some_and(|other| other != id) {
                return Err(conflict("role", name));
            }
        }
        if let Some(ref permission_ids) = changes.permission_ids {
            self.require_permissions(permission_ids)?;
        }

        let updated = {
            let mut entry = self
                .roles
                .get_mut(&id)
                .ok_or_else(|| StoreError::not_found("role", id))?;
            changes.apply_to(&mut entry.role);
            if let Some(ref permission_ids) = changes.permission_ids {
                entry.permission_ids = permission_ids.clone();
            }
            entry.clone()
        };
        Ok(self.materialize_role(&updated))
    }

    async fn delete_role(&self, id: RoleId) -> Result<(), StoreError> {
        self.roles
            .remove(&id)
            .ok_or_else(|| StoreError::not_found("role", id))?;
        for mut principal in self.principals.iter_mut() {
            principal.role_ids.retain(|r| *r != id);
        }
        Ok(())
    }

    async fn list_permissions(&self) -> Result<Vec<Permission>, StoreError> {
        let mut permissions: Vec<Permission> =
            self.permissions.iter().map(|p| p.value().clone()).collect();
        permissions.sort_by(|a, b| {
            a.resource
                .cmp(&b.resource)
                .then_with(|| a.action.cmp(&b.action))
        });
        Ok(permissions)
    }

    async fn find_permission(&self, id: PermissionId) -> Result<Permission, StoreError> {
        self.permissions
            .get(&id)
            .map(|p| p.value().clone())
            .ok_or_else(|| StoreError::not_found("permission", id))
    }

    async fn create_permission(&self, permission: &Permission) -> Result<(), StoreError> {
        if self.permission_id_by_name(&permission.name).is_some() {
            return Err(conflict("permission", &permission.name));
        }
        self.permissions.insert(permission.id, permission.clone());
        Ok(())
    }

    async fn update_permission(
        &self,
        id: PermissionId,
        changes: &PermissionChanges,
    ) -> Result<Permission, StoreError> {
        if let Some(ref name) = changes.name {
            if self.permission_id_by_name(name).is_some_and(|other| other != id) {
                return Err(conflict("permission", name));
            }
        }
        let mut entry = self
            .permissions
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("permission", id))?;
        changes.apply_to(&mut entry);
        Ok(entry.clone())
    }

    async fn delete_permission(&self, id: PermissionId) -> Result<(), StoreError> {
        self.permissions
            .remove(&id)
            .ok_or_else(|| StoreError::not_found("permission", id))?;
        for mut role in self.roles.iter_mut() {
            role.permission_ids.retain(|p| *p != id);
        }
        Ok(())
    }

    async fn list_resources(&self) -> Result<Vec<Resource>, StoreError> {
        let mut resources: Vec<Resource> =
            self.resources.iter().map(|r| r.value().clone()).collect();
        resources.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(resources)
    }

    async fn find_resource(&self, id: ResourceId) -> Result<Resource, StoreError> {
        self.resources
            .get(&id)
            .map(|r| r.value().clone())
            .ok_or_else(|| StoreError::not_found("resource", id))
    }

    async fn create_resource(&self, resource: &Resource) -> Result<(), StoreError> {
        if self.resources.iter().any(|r| r.name == resource.name) {
            return Err(conflict("resource", &resource.name));
        }
        self.resources.insert(resource.id, resource.clone());
        Ok(())
    }

    async fn update_resource(
        &self,
        id: ResourceId,
        changes: &ResourceChanges,
    ) -> Result<Resource, StoreError> {
        if let Some(ref name) = changes.name {
            let taken = self
                .resources
                .iter()
                .any(|r| *r.key() != id && &r.name == name);
            if taken {
                return Err(conflict("resource", name));
            }
        }
        let mut entry = self
            .resources
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("resource", id))?;
        changes.apply_to(&mut entry);
        Ok(entry.clone())
    }

    async fn delete_resource(&self, id: ResourceId) -> Result<(), StoreError> {
        self.resources
            .remove(&id)
            .ok_or_else(|| StoreError::not_found("resource", id))?;
        for mut permission in self.permissions.iter_mut() {
            if permission.resource_id == Some(id) {
                permission.resource_id = None;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl AuditLog for MemoryStore {
    async fn query_audit(&self, filter: &AuditFilter) -> Result<AuditPage, StoreError> {
        let records = self.audit.read();
        Ok(AuditPage::from_records(records.iter(), filter, |id| {
            self.actor_summary(id)
        }))
    }

    async fn audit_stats(&self) -> Result<AuditStats, StoreError> {
        Ok(AuditStats::tally(self.audit.read().iter()))
    }
}

#[async_trait]
impl SeedTarget for MemoryStore {
    async fn install_catalog(&self, catalog: &Catalog) -> Result<(), StoreError> {
        self.install(catalog);
        Ok(())
    }
}
