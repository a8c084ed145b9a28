//! User management commands.
//!
//! Provides list, inspect, create, update, activate/deactivate and delete
//! operations.

use anyhow::Result;
use chrono::{DateTime, Utc};
use clap::Subcommand;
use serde::{Deserialize, Serialize};
use tabled::Tabled;
use uuid::Uuid;

use crate::client::ApiClient;
use crate::output::{self, Card, Printer, Tone};

#[derive(Subcommand)]
pub enum UserCommands {
    /// List all users
    List,

    /// Inspect a specific user
    Inspect {
        /// User ID
        user_id: Uuid,
    },

    /// Create a user
    Create {
        username: String,

        #[arg(short, long)]
        email: String,

        /// Initial password
        #[arg(short, long, env = "WARDEN_NEW_PASSWORD", hide_env_values = true)]
        password: String,

        /// Display name (defaults to the username)
        #[arg(long)]
        name: Option<String>,

        /// Role to assign; repeat for several
        #[arg(short, long = "role")]
        roles: Vec<String>,
    },

    /// Change a user's profile or replace their roles
    Update {
        user_id: Uuid,

        #[arg(short, long)]
        email: Option<String>,

        #[arg(long)]
        name: Option<String>,

        /// Role ID to hold after the update; repeat for several. Replaces
        /// every current role.
        #[arg(long = "role-id")]
        role_ids: Vec<Uuid>,
    },

    /// Re-enable a deactivated user
    Activate { user_id: Uuid },

    /// Deactivate a user; their live tokens stop working immediately
    Deactivate { user_id: Uuid },

    /// Permanently delete a user
    Delete {
        user_id: Uuid,

        /// Skip confirmation
        #[arg(short, long)]
        force: bool,
    },
}

// ── API response types ──────────────────────────────────────────────────────

#[derive(Debug, Deserialize, Serialize)]
pub struct UserProfile {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub display_name: String,
    pub is_active: bool,
    #[serde(default)]
    pub last_authenticated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default)]
    pub permissions: Vec<String>,
}

impl UserProfile {
    pub fn card(&self, title: impl Into<String>) -> Card {
        Card::new(title)
            .field("ID", self.id)
            .field("Email", &self.email)
            .field("Name", &self.display_name)
            .field("Active", if self.is_active { "yes" } else { "no" })
            .list("Roles", &self.roles)
            .list("Permissions", &self.permissions)
            .maybe("Last Login", self.last_authenticated_at.map(|t| t.to_rfc3339()))
    }
}

#[derive(Debug, Serialize, Tabled)]
struct UserRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Username")]
    username: String,
    #[tabled(rename = "Email")]
    email: String,
    #[tabled(rename = "Roles")]
    roles: String,
    #[tabled(rename = "Active")]
    active: String,
    #[tabled(rename = "Last Login")]
    last_login: String,
}

impl From<&UserProfile> for UserRow {
    fn from(u: &UserProfile) -> Self {
        Self {
            id: output::short_id(u.id),
            username: u.username.clone(),
            email: u.email.clone(),
            roles: u.roles.join(", "),
            active: if u.is_active { "yes".into() } else { "no".into() },
            last_login: u
                .last_authenticated_at
                .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                .unwrap_or_else(|| "never".into()),
        }
    }
}

#[derive(Serialize)]
struct CreateUserRequest {
    username: String,
    email: String,
    password: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    display_name: Option<String>,
    roles: Vec<String>,
}

#[derive(Serialize)]
struct UpdateUserRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    role_ids: Option<Vec<Uuid>>,
}

#[derive(Serialize)]
struct SetActiveRequest {
    is_active: bool,
}

// ── Execution ───────────────────────────────────────────────────────────────

pub async fn execute(cmd: UserCommands, client: &ApiClient, printer: &Printer) -> Result<()> {
    match cmd {
        UserCommands::List => {
            let users: Vec<UserProfile> = client.get("/api/users").await?;
            let rows: Vec<UserRow> = users.iter().map(UserRow::from).collect();
            printer.rows(rows, &users)?;
        }

        UserCommands::Inspect { user_id } => {
            let user: UserProfile = client.get(&format!("/api/users/{}", user_id)).await?;
            printer.card(user.card(format!("User: {}", user.username)), &user)?;
        }

        UserCommands::Create {
            username,
            email,
            password,
            name,
            roles,
        } => {
            let body = CreateUserRequest {
                username,
                email,
                password,
                display_name: name,
                roles,
            };
            let user: UserProfile = client.post("/api/users", &body).await?;
            printer.done(
                &format!("Created user {} ({})", user.username, user.id),
                &user,
            )?;
        }

        UserCommands::Update {
            user_id,
            email,
            name,
            role_ids,
        } => {
            let body = UpdateUserRequest {
                email,
                display_name: name,
                role_ids: (!role_ids.is_empty()).then_some(role_ids),
            };
            anyhow::ensure!(
                body.email.is_some() || body.display_name.is_some() || body.role_ids.is_some(),
                "Nothing to update; pass --email, --name or --role-id"
            );
            let user: UserProfile = client.put(&format!("/api/users/{}", user_id), &body).await?;
            printer.done(
                &format!("Updated {} (roles: {})", user.username, user.roles.join(", ")),
                &user,
            )?;
        }

        UserCommands::Activate { user_id } => set_active(client, user_id, true, printer).await?,

        UserCommands::Deactivate { user_id } => set_active(client, user_id, false, printer).await?,

        UserCommands::Delete { user_id, force } => {
            if !force {
                printer.note(
                    Tone::Hint,
                    "This will permanently delete the user. Use --force to confirm.",
                );
                return Ok(());
            }

            let resp: serde_json::Value = client.delete(&format!("/api/users/{}", user_id)).await?;
            printer.done(&format!("User {} deleted", user_id), &resp)?;
        }
    }

    Ok(())
}

async fn set_active(client: &ApiClient, user_id: Uuid, active: bool, printer: &Printer) -> Result<()> {
    let user: UserProfile = client
        .put(
            &format!("/api/users/{}/active", user_id),
            &SetActiveRequest { is_active: active },
        )
        .await?;

    let verb = if active { "activated" } else { "deactivated" };
    printer.done(&format!("User {} {}", user.username, verb), &user)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_request_sends_only_given_fields() {
        let role = Uuid::new_v4();
        let body = UpdateUserRequest {
            email: None,
            display_name: Some("Dana".into()),
            role_ids: Some(vec![role]),
        };
        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            serde_json::json!({ "display_name": "Dana", "role_ids": [role] })
        );
    }

    #[test]
    fn test_row_marks_never_logged_in() {
        let profile = UserProfile {
            id: Uuid::nil(),
            username: "hruser".into(),
            email: "hr@rbac.com".into(),
            display_name: "HR".into(),
            is_active: false,
            last_authenticated_at: None,
            roles: vec!["HR".into()],
            permissions: vec![],
        };
        let row = UserRow::from(&profile);
        assert_eq!(row.id, "00000000");
        assert_eq!(row.active, "no");
        assert_eq!(row.last_login, "never");
    }
}
