//! Predefined roles with default permission sets.
//!
//! Warden ships with four built-in roles:
//!
//! | Role     | Level | Description                                  |
//! |----------|-------|----------------------------------------------|
//! | Admin    | 100   | Full system access                           |
//! | Manager  | 50    | Manage users and view reports                |
//! | HR       | 40    | Manage employees                             |
//! | Employee | 10    | Basic access                                 |

use std::collections::HashMap;

use super::models::{Permission, PermissionKey, Resource, ResourceKind, Role};

/// Built-in resource descriptors: `(name, kind, path, description)`.
const DEFAULT_RESOURCES: &[(&str, &str, &str, &str)] = &[
    ("users", "endpoint", "/api/users", "User management"),
    ("roles", "endpoint", "/api/roles", "Role management"),
    ("permissions", "endpoint", "/api/permissions", "Permission management"),
    ("resources", "endpoint", "/api/resources", "Resource management"),
    ("audit", "endpoint", "/api/audit", "Audit logs"),
    ("dashboard", "page", "/dashboard", "Dashboard page"),
    ("reports", "page", "/reports", "Reports page"),
];

/// Built-in permissions: `(action, resource, description)`.
const DEFAULT_PERMISSIONS: &[(&str, &str, &str)] = &[
    ("create", "users", "Create users"),
    ("read", "users", "View users"),
    ("update", "users", "Update users"),
    ("delete", "users", "Delete users"),
    ("create", "roles", "Create roles"),
    ("read", "roles", "View roles"),
    ("update", "roles", "Update roles"),
    ("delete", "roles", "Delete roles"),
    ("create", "permissions", "Create permissions"),
    ("read", "permissions", "View permissions"),
    ("update", "permissions", "Update permissions"),
    ("delete", "permissions", "Delete permissions"),
    ("read", "audit", "View audit logs"),
    ("read", "dashboard", "View dashboard"),
    ("read", "reports", "View reports"),
];

/// Predefined role templates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PredefinedRole {
    Admin,
    Manager,
    Hr,
    Employee,
}

impl PredefinedRole {
    /// Get the role name as stored.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Admin => "Admin",
            Self::Manager => "Manager",
            Self::Hr => "HR",
            Self::Employee => "Employee",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::Admin => "Full system access",
            Self::Manager => "Manage users and view reports",
            Self::Hr => "Manage employees",
            Self::Employee => "Basic access",
        }
    }

    pub fn level(&self) -> i32 {
        match self {
            Self::Admin => 100,
            Self::Manager => 50,
            Self::Hr => 40,
            Self::Employee => 10,
        }
    }

    /// Permission keys granted to this role.
    pub fn permission_keys(&self) -> Vec<PermissionKey> {
        match self {
            Self::Admin => DEFAULT_PERMISSIONS
                .iter()
                .map(|(action, resource, _)| PermissionKey::new(*action, *resource))
                .collect(),
            Self::Manager => keys(&[
                ("read", "users"),
                ("update", "users"),
                ("read", "roles"),
                ("read", "audit"),
                ("read", "dashboard"),
                ("read", "reports"),
            ]),
            Self::Hr => keys(&[
                ("create", "users"),
                ("read", "users"),
                ("update", "users"),
                ("read", "dashboard"),
            ]),
            // read:users covers the employee's own profile
            Self::Employee => keys(&[("read", "users"), ("read", "dashboard")]),
        }
    }

    pub fn all() -> Vec<PredefinedRole> {
        vec![Self::Admin, Self::Manager, Self::Hr, Self::Employee]
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::all().into_iter().find(|r| r.name() == name)
    }
}

fn keys(pairs: &[(&str, &str)]) -> Vec<PermissionKey> {
    pairs
        .iter()
        .map(|(action, resource)| PermissionKey::new(*action, *resource))
        .collect()
}

// ═══════════════════════════════════════════════════════════════════════════════
// Catalog
// ═══════════════════════════════════════════════════════════════════════════════

/// The full set of built-in resources, permissions and roles, with
/// permissions linked to their resource descriptors and roles sharing the
/// same permission rows.
#[derive(Debug, Clone)]
pub struct Catalog {
    pub resources: Vec<Resource>,
    pub permissions: Vec<Permission>,
    pub roles: Vec<Role>,
}

impl Catalog {
    pub fn defaults() -> Self {
        let resources: Vec<Resource> = DEFAULT_RESOURCES
            .iter()
            .map(|(name, kind, path, description)| {
                Resource::new(*name, ResourceKind::parse(kind))
                    .with_path(*path)
                    .with_description(*description)
            })
            .collect();

        let by_name: HashMap<&str, &Resource> =
            resources.iter().map(|r| (r.name.as_str(), r)).collect();

        let permissions: Vec<Permission> = DEFAULT_PERMISSIONS
            .iter()
            .map(|(action, resource, description)| {
                let permission = Permission::new(*action, *resource).with_description(*description);
                match by_name.get(resource) {
                    Some(r) => permission.linked_to(r.id),
                    None => permission,
                }
            })
            .collect();

        let roles = PredefinedRole::all()
            .into_iter()
            .map(|predefined| {
                let granted = predefined.permission_keys();
                let role_permissions = permissions
                    .iter()
                    .filter(|p| granted.contains(&p.key()))
                    .cloned()
                    .collect();
                Role::new(predefined.name(), predefined.description(), predefined.level())
                    .with_permissions(role_permissions)
            })
            .collect();

        Self {
            resources,
            permissions,
            roles,
        }
    }

    pub fn role(&self, name: &str) -> Option<&Role> {
        self.roles.iter().find(|r| r.name == name)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    fn role_keys(catalog: &Catalog, name: &str) -> Vec<String> {
        let mut keys: Vec<String> = catalog
            .role(name)
            .unwrap()
            .permissions
            .iter()
            .map(|p| p.key().to_string())
            .collect();
        keys.sort();
        keys
    }

    #[test]
    fn test_admin_has_every_permission() {
        let catalog = Catalog::defaults();
        assert_eq!(catalog.permissions.len(), 15);
        assert_eq!(catalog.role("Admin").unwrap().permissions.len(), 15);
    }

    #[test]
    fn test_manager_permissions() {
        let catalog = Catalog::defaults();
        assert_eq!(
            role_keys(&catalog, "Manager"),
            vec![
                "read:audit",
                "read:dashboard",
                "read:reports",
                "read:roles",
                "read:users",
                "update:users"
            ]
        );
    }

    #[test]
    fn test_hr_and_employee_permissions() {
        let catalog = Catalog::defaults();
        assert_eq!(
            role_keys(&catalog, "HR"),
            vec!["create:users", "read:dashboard", "read:users", "update:users"]
        );
        assert_eq!(
            role_keys(&catalog, "Employee"),
            vec!["read:dashboard", "read:users"]
        );
    }

    #[test]
    fn test_permissions_linked_to_resources() {
        let catalog = Catalog::defaults();
        let audit = catalog.resources.iter().find(|r| r.name == "audit").unwrap();
        let read_audit = catalog
            .permissions
            .iter()
            .find(|p| p.name == "read:audit")
            .unwrap();
        assert_eq!(read_audit.resource_id, Some(audit.id));

        let dashboard = catalog
            .resources
            .iter()
            .find(|r| r.name == "dashboard")
            .unwrap();
        assert_eq!(dashboard.kind, ResourceKind::Page);
    }

    #[test]
    fn test_roles_share_permission_rows() {
        let catalog = Catalog::defaults();
        let admin = catalog.role("Admin").unwrap();
        let manager = catalog.role("Manager").unwrap();
        let admin_read = admin.permissions.iter().find(|p| p.name == "read:users").unwrap();
        let manager_read = manager.permissions.iter().find(|p| p.name == "read:users").unwrap();
        assert_eq!(admin_read.id, manager_read.id);
    }

    #[test]
    fn test_from_name() {
        assert_eq!(PredefinedRole::from_name("HR"), Some(PredefinedRole::Hr));
        assert_eq!(PredefinedRole::from_name("hr"), None);
        assert_eq!(PredefinedRole::Admin.level(), 100);
    }
}
