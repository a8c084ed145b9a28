//! Role-based access control.
//!
//! This module provides:
//! - **Models**: Principal, Role, Permission, Resource and the `action:resource` key
//! - **Aggregation**: a principal's effective permission set
//! - **Policy**: the permission (AND) and role (OR) policies
//! - **Predefined Roles**: Admin, Manager, HR, Employee and the default catalog
//! - **Guard Middleware**: tower layer enforcing a requirement per route
//!
//! # Usage
//!
//! ```rust,ignore
//! use warden_core::rbac::{authorize_by_permission, PermissionKey};
//!
//! let required = PermissionKey::parse_all(&["read:users", "update:users"])?;
//! authorize_by_permission(&principal, &required)?;
//! ```

pub mod aggregate;
pub mod middleware;
pub mod models;
pub mod policy;
pub mod roles;

pub use aggregate::{aggregate, EffectivePermissions};
pub use middleware::{CurrentPrincipal, GuardLayer, GuardService, RouteGuard};
pub use models::{
    Permission, PermissionChanges, PermissionId, PermissionKey, PermissionKeyError, Principal,
    PrincipalChanges, PrincipalId, PrincipalProfile, Resource, ResourceChanges, ResourceId,
    ResourceKind, Role, RoleChanges, RoleId,
};
pub use policy::{
    authorize_by_permission, authorize_by_role, check_permissions, check_roles, Denial,
    PolicyDecision, PolicyKind, Requirement,
};
pub use roles::{Catalog, PredefinedRole};
