//! Startup seeding: the built-in catalog and optional initial accounts.
//!
//! Every step is idempotent; existing rows are left alone.

use tracing::info;

use crate::auth::hash_secret;
use crate::error::{Result, WardenError};
use crate::rbac::{Catalog, PredefinedRole, Principal};
use crate::store::{CatalogStore, CredentialStore, SeedTarget, StoreError};

/// A demo account created by [`seed_demo_users`].
#[derive(Debug, Clone, Copy)]
pub struct DemoUser {
    pub username: &'static str,
    pub email: &'static str,
    pub password: &'static str,
    pub display_name: &'static str,
    pub role: PredefinedRole,
}

pub const DEMO_USERS: &[DemoUser] = &[
    DemoUser {
        username: "admin",
        email: "admin@rbac.com",
        password: "Admin@123",
        display_name: "System Administrator",
        role: PredefinedRole::Admin,
    },
    DemoUser {
        username: "manager",
        email: "manager@rbac.com",
        password: "Manager@123",
        display_name: "John Manager",
        role: PredefinedRole::Manager,
    },
    DemoUser {
        username: "hruser",
        email: "hr@rbac.com",
        password: "HR@123",
        display_name: "Sarah HR",
        role: PredefinedRole::Hr,
    },
    DemoUser {
        username: "employee",
        email: "employee@rbac.com",
        password: "Employee@123",
        display_name: "Mike Employee",
        role: PredefinedRole::Employee,
    },
];

/// Install the predefined resources, permissions and roles.
pub async fn seed_defaults(target: &dyn SeedTarget) -> Result<()> {
    let catalog = Catalog::defaults();
    target.install_catalog(&catalog).await?;
    info!(
        resources = catalog.resources.len(),
        permissions = catalog.permissions.len(),
        roles = catalog.roles.len(),
        "Default catalog installed"
    );
    Ok(())
}

/// Create an `admin` account holding the Admin role unless one exists.
///
/// Returns `true` if the account was created.
pub async fn bootstrap_admin(store: &dyn CredentialStore, password: &str) -> Result<bool> {
    if password.is_empty() {
        return Err(WardenError::validation("bootstrap admin password must not be empty"));
    }
    ensure_principal(
        store,
        "admin",
        "admin@localhost",
        "System Administrator",
        password,
        PredefinedRole::Admin,
    )
    .await
}

/// Create the four demo accounts. Returns how many were newly created.
pub async fn seed_demo_users(store: &dyn CredentialStore) -> Result<usize> {
    let mut created = 0;
    for user in DEMO_USERS {
        if ensure_principal(
            store,
            user.username,
            user.email,
            user.display_name,
            user.password,
            user.role,
        )
        .await?
        {
            created += 1;
        }
    }
    info!(created, "Demo users seeded");
    Ok(created)
}

async fn ensure_principal(
    store: &dyn CredentialStore,
    username: &str,
    email: &str,
    display_name: &str,
    password: &str,
    role: PredefinedRole,
) -> Result<bool> {
    match store.find_principal_by_username(username).await {
        Ok(_) => return Ok(false),
        Err(StoreError::NotFound { .. }) => {}
        Err(e) => return Err(e.into()),
    }

    let role = store
        .list_roles()
        .await?
        .into_iter()
        .find(|r| r.name == role.name())
        .ok_or_else(|| WardenError::not_found("role", role.name()))?;

    let principal =
        Principal::new(username, email, display_name, hash_secret(password)?).with_roles(vec![role]);
    store.create_principal(&principal).await?;
    info!(username, principal_id = %principal.id, "Seeded principal");
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::verify_secret;
    use crate::store::MemoryStore;

    #[tokio::test]
    async fn test_seed_defaults_then_demo_users() {
        let store = MemoryStore::new();
        seed_defaults(&store).await.unwrap();
        assert_eq!(store.list_roles().await.unwrap().len(), 4);

        assert_eq!(seed_demo_users(&store).await.unwrap(), 4);
        assert_eq!(seed_demo_users(&store).await.unwrap(), 0);

        let hr = store.find_principal_by_username("hruser").await.unwrap();
        assert!(hr.has_role("HR"));
        assert!(verify_secret("HR@123", &hr.secret_hash));
    }

    #[tokio::test]
    async fn test_bootstrap_admin_requires_catalog() {
        let store = MemoryStore::new();
        assert!(bootstrap_admin(&store, "s3cret").await.is_err());

        seed_defaults(&store).await.unwrap();
        assert!(bootstrap_admin(&store, "s3cret").await.unwrap());
        assert!(!bootstrap_admin(&store, "other").await.unwrap());

        let admin = store.find_principal_by_username("admin").await.unwrap();
        assert!(admin.has_role("Admin"));
    }
}
