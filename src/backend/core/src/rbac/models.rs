//! RBAC data models: Principal, Role, Permission, Resource and the permission key.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

// ═══════════════════════════════════════════════════════════════════════════════
// Identifiers
// ═══════════════════════════════════════════════════════════════════════════════

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Generate a fresh random identifier.
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s).map(Self)
            }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }
    };
}

uuid_id!(
    /// Strongly-typed principal (user) identifier.
    PrincipalId
);
uuid_id!(
    /// Strongly-typed role identifier.
    RoleId
);
uuid_id!(
    /// Strongly-typed permission identifier.
    PermissionId
);
uuid_id!(
    /// Strongly-typed resource descriptor identifier.
    ResourceId
);

// ═══════════════════════════════════════════════════════════════════════════════
// Permission Key
// ═══════════════════════════════════════════════════════════════════════════════

/// Error returned when a string is not a valid `action:resource` key.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid permission key '{0}': expected \"<action>:<resource>\"")]
pub struct PermissionKeyError(pub String);

/// Canonical identity of a grantable capability: the `(action, resource)` pair.
///
/// Rendered on the wire as `"<action>:<resource>"`, e.g. `"read:users"`. UIs
/// pre-check visibility of protected actions with this exact format.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PermissionKey {
    action: String,
    resource: String,
}

impl PermissionKey {
    pub fn new(action: impl Into<String>, resource: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            resource: resource.into(),
        }
    }

    /// Parse a key like `"delete:roles"`. Both halves must be non-empty.
    pub fn parse(s: &str) -> Result<Self, PermissionKeyError> {
        match s.split_once(':') {
            Some((action, resource)) if !action.is_empty() && !resource.is_empty() => {
                Ok(Self::new(action, resource))
            }
            _ => Err(PermissionKeyError(s.to_string())),
        }
    }

    /// Parse a list of keys, failing on the first malformed entry.
    pub fn parse_all<S: AsRef<str>>(keys: &[S]) -> Result<Vec<Self>, PermissionKeyError> {
        keys.iter().map(|k| Self::parse(k.as_ref())).collect()
    }

    pub fn action(&self) -> &str {
        &self.action
    }

    pub fn resource(&self) -> &str {
        &self.resource
    }
}

impl fmt::Display for PermissionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.action, self.resource)
    }
}

impl FromStr for PermissionKey {
    type Err = PermissionKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for PermissionKey {
    type Error = PermissionKeyError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<PermissionKey> for String {
    fn from(key: PermissionKey) -> Self {
        key.to_string()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Resource
// ═══════════════════════════════════════════════════════════════════════════════

/// What kind of target a resource descriptor names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Endpoint,
    Page,
    Data,
    Other(String),
}

impl ResourceKind {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Endpoint => "endpoint",
            Self::Page => "page",
            Self::Data => "data",
            Self::Other(s) => s,
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "endpoint" => Self::Endpoint,
            "page" => Self::Page,
            "data" | "database" => Self::Data,
            other => Self::Other(other.to_string()),
        }
    }
}

/// Descriptive metadata about a protected target. Never evaluated by the decider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    pub id: ResourceId,
    pub name: String,
    pub kind: ResourceKind,
    pub path: Option<String>,
    pub description: Option<String>,
    pub is_active: bool,
}

impl Resource {
    pub fn new(name: impl Into<String>, kind: ResourceKind) -> Self {
        Self {
            id: ResourceId::new(),
            name: name.into(),
            kind,
            path: None,
            description: None,
            is_active: true,
        }
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Permission
// ═══════════════════════════════════════════════════════════════════════════════

/// A stored permission row. Two rows with the same `(action, resource)` are
/// the same capability as far as matching is concerned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permission {
    pub id: PermissionId,
    /// Unique display name.
    pub name: String,
    /// Action type: create, read, update, delete, execute.
    pub action: String,
    /// Resource identifier: users, roles, reports, ...
    pub resource: String,
    pub description: Option<String>,
    /// Optional link to a resource descriptor.
    pub resource_id: Option<ResourceId>,
}

impl Permission {
    /// Create a permission named after its key.
    pub fn new(action: impl Into<String>, resource: impl Into<String>) -> Self {
        let action = action.into();
        let resource = resource.into();
        Self {
            id: PermissionId::new(),
            name: format!("{}:{}", action, resource),
            action,
            resource,
            description: None,
            resource_id: None,
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn linked_to(mut self, resource_id: ResourceId) -> Self {
        self.resource_id = Some(resource_id);
        self
    }

    /// The matching identity of this permission.
    pub fn key(&self) -> PermissionKey {
        PermissionKey::new(self.action.clone(), self.resource.clone())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Role
// ═══════════════════════════════════════════════════════════════════════════════

/// A named group of permissions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub id: RoleId,
    pub name: String,
    pub description: String,
    /// Hierarchy level, higher = more privileged. Informational only.
    pub level: i32,
    pub permissions: Vec<Permission>,
}

impl Role {
    pub fn new(name: impl Into<String>, description: impl Into<String>, level: i32) -> Self {
        Self {
            id: RoleId::new(),
            name: name.into(),
            description: description.into(),
            level,
            permissions: Vec::new(),
        }
    }

    pub fn with_permissions(mut self, permissions: Vec<Permission>) -> Self {
        self.permissions = permissions;
        self
    }

    pub fn grant(&mut self, permission: Permission) {
        self.permissions.push(permission);
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Principal
// ═══════════════════════════════════════════════════════════════════════════════

/// An identity evaluated by the engine, with its roles (and their
/// permissions) already materialized.
#[derive(Clone, Serialize, Deserialize)]
pub struct Principal {
    pub id: PrincipalId,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing, default)]
    pub secret_hash: String,
    pub display_name: String,
    pub is_active: bool,
    pub last_authenticated_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub roles: Vec<Role>,
}

impl fmt::Debug for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Principal")
            .field("id", &self.id)
            .field("username", &self.username)
            .field("email", &self.email)
            .field("display_name", &self.display_name)
            .field("is_active", &self.is_active)
            .field("roles", &self.role_names().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl Principal {
    pub fn new(
        username: impl Into<String>,
        email: impl Into<String>,
        display_name: impl Into<String>,
        secret_hash: impl Into<String>,
    ) -> Self {
        Self {
            id: PrincipalId::new(),
            username: username.into(),
            email: email.into(),
            secret_hash: secret_hash.into(),
            display_name: display_name.into(),
            is_active: true,
            last_authenticated_at: None,
            created_at: Utc::now(),
            roles: Vec::new(),
        }
    }

    pub fn with_roles(mut self, roles: Vec<Role>) -> Self {
        self.roles = roles;
        self
    }

    pub fn inactive(mut self) -> Self {
        self.is_active = false;
        self
    }

    pub fn role_names(&self) -> impl Iterator<Item = &str> {
        self.roles.iter().map(|r| r.name.as_str())
    }

    pub fn has_role(&self, name: &str) -> bool {
        self.role_names().any(|r| r == name)
    }

    /// The externally safe view of this principal.
    pub fn profile(&self) -> PrincipalProfile {
        PrincipalProfile {
            id: self.id,
            username: self.username.clone(),
            email: self.email.clone(),
            display_name: self.display_name.clone(),
            is_active: self.is_active,
            last_authenticated_at: self.last_authenticated_at,
            roles: self.role_names().map(str::to_string).collect(),
            permissions: super::aggregate::aggregate(self).to_sorted_vec(),
        }
    }
}

/// Principal without its secret hash, plus the flattened permission keys a UI
/// needs for visibility pre-checks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrincipalProfile {
    pub id: PrincipalId,
    pub username: String,
    pub email: String,
    pub display_name: String,
    pub is_active: bool,
    pub last_authenticated_at: Option<DateTime<Utc>>,
    pub roles: Vec<String>,
    pub permissions: Vec<String>,
}

// ═══════════════════════════════════════════════════════════════════════════════
// Partial Updates
// ═══════════════════════════════════════════════════════════════════════════════

/// Changes to an existing principal. Absent fields are left untouched;
/// `role_ids`, when present, replaces the whole role set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrincipalChanges {
    pub email: Option<String>,
    #[serde(alias = "fullName")]
    pub display_name: Option<String>,
    #[serde(alias = "isActive")]
    pub is_active: Option<bool>,
    #[serde(alias = "roleIds")]
    pub role_ids: Option<Vec<RoleId>>,
}

impl PrincipalChanges {
    /// Apply the scalar fields. Role links are the store's concern.
    pub fn apply_to(&self, principal: &mut Principal) {
        if let Some(ref email) = self.email {
            principal.email = email.clone();
        }
        if let Some(ref display_name) = self.display_name {
            principal.display_name = display_name.clone();
        }
        if let Some(is_active) = self.is_active {
            principal.is_active = is_active;
        }
    }
}

/// Changes to a role. `permission_ids`, when present, replaces the grant set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleChanges {
    pub name: Option<String>,
    pub description: Option<String>,
    pub level: Option<i32>,
    #[serde(alias = "permissionIds")]
    pub permission_ids: Option<Vec<PermissionId>>,
}

impl RoleChanges {
    pub fn apply_to(&self, role: &mut Role) {
        if let Some(ref name) = self.name {
            role.name = name.clone();
        }
        if let Some(ref description) = self.description {
            role.description = description.clone();
        }
        if let Some(level) = self.level {
            role.level = level;
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionChanges {
    pub name: Option<String>,
    pub action: Option<String>,
    pub resource: Option<String>,
    pub description: Option<String>,
    #[serde(alias = "resourceId")]
    pub resource_id: Option<ResourceId>,
}

impl PermissionChanges {
    pub fn apply_to(&self, permission: &mut Permission) {
        if let Some(ref name) = self.name {
            permission.name = name.clone();
        }
        if let Some(ref action) = self.action {
            permission.action = action.clone();
        }
        if let Some(ref resource) = self.resource {
            permission.resource = resource.clone();
        }
        if let Some(ref description) = self.description {
            permission.description = Some(description.clone());
        }
        if let Some(resource_id) = self.resource_id {
            permission.resource_id = Some(resource_id);
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceChanges {
    pub name: Option<String>,
    /// Free-form kind, parsed with [`ResourceKind::parse`].
    #[serde(alias = "type")]
    pub kind: Option<String>,
    pub path: Option<String>,
    pub description: Option<String>,
    #[serde(alias = "isActive")]
    pub is_active: Option<bool>,
}

impl ResourceChanges {
    pub fn apply_to(&self, resource: &mut Resource) {
        if let Some(ref name) = self.name {
            resource.name = name.clone();
        }
        if let Some(ref kind) = self.kind {
            resource.kind = ResourceKind::parse(kind);
        }
        if let Some(ref path) = self.path {
            resource.path = Some(path.clone());
        }
        if let Some(ref description) = self.description {
            resource.description = Some(description.clone());
        }
        if let Some(is_active) = self.is_active {
            resource.is_active = is_active;
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════
