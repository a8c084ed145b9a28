//! Role commands.

use anyhow::Result;
use clap::Subcommand;
use serde::{Deserialize, Serialize};
use tabled::Tabled;
use uuid::Uuid;

use super::catalog::PermissionInfo;
use crate::client::ApiClient;
use crate::output::{self, Card, Printer, Tone};

#[derive(Subcommand)]
pub enum RoleCommands {
    /// List roles, most privileged first
    List {
        /// Show every permission key instead of a count
        #[arg(short, long)]
        verbose: bool,
    },

    /// Show a role with its permissions and members
    Inspect { role_id: Uuid },

    /// Create a role
    Create {
        name: String,

        #[arg(short, long, default_value = "")]
        description: String,

        #[arg(short, long, default_value = "0")]
        level: i32,

        /// Permission ID to grant; repeat for several
        #[arg(short, long = "permission-id")]
        permission_ids: Vec<Uuid>,
    },

    /// Replace the permissions a role grants
    Grant {
        role_id: Uuid,

        #[arg(short, long = "permission-id", required = true)]
        permission_ids: Vec<Uuid>,
    },

    /// Delete a role; its members lose it immediately
    Delete {
        role_id: Uuid,

        #[arg(short, long)]
        force: bool,
    },
}

// ── API response types ──────────────────────────────────────────────────────

#[derive(Debug, Deserialize, Serialize)]
struct RoleInfo {
    id: Uuid,
    name: String,
    description: String,
    level: i32,
    #[serde(default)]
    permissions: Vec<PermissionInfo>,
}

impl RoleInfo {
    fn keys(&self) -> Vec<String> {
        self.permissions.iter().map(PermissionInfo::key).collect()
    }
}

#[derive(Debug, Deserialize, Serialize)]
struct Member {
    id: Uuid,
    username: String,
    email: String,
}

#[derive(Debug, Deserialize, Serialize)]
struct RoleDetail {
    #[serde(flatten)]
    role: RoleInfo,
    #[serde(default)]
    members: Vec<Member>,
}

#[derive(Debug, Serialize, Tabled)]
struct RoleRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Level")]
    level: i32,
    #[tabled(rename = "Description")]
    description: String,
    #[tabled(rename = "Permissions")]
    permissions: String,
}

#[derive(Serialize)]
struct CreateRoleRequest {
    name: String,
    description: String,
    level: i32,
    permission_ids: Vec<Uuid>,
}

#[derive(Serialize)]
struct GrantRequest {
    permission_ids: Vec<Uuid>,
}

// ── Execution ───────────────────────────────────────────────────────────────

pub async fn execute(cmd: RoleCommands, client: &ApiClient, printer: &Printer) -> Result<()> {
    match cmd {
        RoleCommands::List { verbose } => {
            let mut roles: Vec<RoleInfo> = client.get("/api/roles").await?;
            roles.sort_by(|a, b| b.level.cmp(&a.level));

            let rows = roles
                .iter()
                .map(|r| RoleRow {
                    id: output::short_id(r.id),
                    name: r.name.clone(),
                    level: r.level,
                    description: r.description.clone(),
                    permissions: if verbose {
                        r.keys().join("\n")
                    } else {
                        r.permissions.len().to_string()
                    },
                })
                .collect();
            printer.rows(rows, &roles)?;
        }

        RoleCommands::Inspect { role_id } => {
            let detail: RoleDetail = client.get(&format!("/api/roles/{}", role_id)).await?;
            let members: Vec<&str> = detail.members.iter().map(|m| m.username.as_str()).collect();
            let card = Card::new(format!("Role: {}", detail.role.name))
                .field("ID", detail.role.id)
                .field("Level", detail.role.level)
                .field("Description", &detail.role.description)
                .list("Permissions", &detail.role.keys())
                .list("Members", &members);
            printer.card(card, &detail)?;
        }

        RoleCommands::Create {
            name,
            description,
            level,
            permission_ids,
        } => {
            let body = CreateRoleRequest {
                name,
                description,
                level,
                permission_ids,
            };
            let role: RoleInfo = client.post("/api/roles", &body).await?;
            printer.done(&format!("Created role {} ({})", role.name, role.id), &role)?;
        }

        RoleCommands::Grant {
            role_id,
            permission_ids,
        } => {
            let role: RoleInfo = client
                .put(&format!("/api/roles/{}", role_id), &GrantRequest { permission_ids })
                .await?;
            printer.done(
                &format!("{} now grants {}", role.name, role.keys().join(", ")),
                &role,
            )?;
        }

        RoleCommands::Delete { role_id, force } => {
            if !force {
                printer.note(
                    Tone::Hint,
                    "Members lose this role immediately. Use --force to confirm.",
                );
                return Ok(());
            }
            let resp: serde_json::Value = client.delete(&format!("/api/roles/{}", role_id)).await?;
            printer.done(&format!("Role {} deleted", role_id), &resp)?;
        }
    }

    Ok(())
}
