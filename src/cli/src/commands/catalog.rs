//! Permission and resource descriptor listings.

use anyhow::Result;
use clap::Subcommand;
use serde::{Deserialize, Serialize};
use tabled::Tabled;
use uuid::Uuid;

use crate::client::ApiClient;
use crate::output::{self, Printer, Tone};

#[derive(Subcommand)]
pub enum PermissionCommands {
    /// List every permission
    List,

    /// Define a new permission; the name defaults to `action:resource`
    Create {
        action: String,
        resource: String,

        #[arg(short, long)]
        description: Option<String>,
    },

    Delete {
        permission_id: Uuid,

        #[arg(short, long)]
        force: bool,
    },
}

#[derive(Subcommand)]
pub enum ResourceCommands {
    /// List resource descriptors
    List,
}

// ── API response types ──────────────────────────────────────────────────────

#[derive(Debug, Deserialize, Serialize)]
pub struct PermissionInfo {
    pub id: Uuid,
    #[serde(default)]
    pub name: String,
    pub action: String,
    pub resource: String,
    #[serde(default)]
    pub description: Option<String>,
}

impl PermissionInfo {
    pub fn key(&self) -> String {
        format!("{}:{}", self.action, self.resource)
    }
}

#[derive(Debug, Deserialize, Serialize)]
struct ResourceInfo {
    id: Uuid,
    name: String,
    kind: serde_json::Value,
    #[serde(default)]
    path: Option<String>,
    is_active: bool,
}

impl ResourceInfo {
    /// Known kinds arrive as plain strings; custom ones as `{"other": "..."}`.
    fn kind_label(&self) -> String {
        match &self.kind {
            serde_json::Value::String(kind) => kind.clone(),
            serde_json::Value::Object(map) => map
                .values()
                .next()
                .and_then(|v| v.as_str())
                .unwrap_or("other")
                .to_string(),
            other => other.to_string(),
        }
    }
}

#[derive(Debug, Serialize, Tabled)]
struct PermissionRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Key")]
    key: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Description")]
    description: String,
}

#[derive(Debug, Serialize, Tabled)]
struct ResourceRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Kind")]
    kind: String,
    #[tabled(rename = "Path")]
    path: String,
    #[tabled(rename = "Active")]
    active: String,
}

#[derive(Serialize)]
struct CreatePermissionRequest {
    action: String,
    resource: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
}

// ── Execution ───────────────────────────────────────────────────────────────

pub async fn permissions(
    cmd: PermissionCommands,
    client: &ApiClient,
    printer: &Printer,
) -> Result<()> {
    match cmd {
        PermissionCommands::List => {
            let mut permissions: Vec<PermissionInfo> = client.get("/api/permissions").await?;
            permissions.sort_by(|a, b| (&a.resource, &a.action).cmp(&(&b.resource, &b.action)));
            let rows = permissions
                .iter()
                .map(|p| PermissionRow {
                    id: output::short_id(p.id),
                    key: p.key(),
                    name: p.name.clone(),
                    description: p.description.clone().unwrap_or_default(),
                })
                .collect();
            printer.rows(rows, &permissions)?;
        }

        PermissionCommands::Create {
            action,
            resource,
            description,
        } => {
            let body = CreatePermissionRequest {
                action,
                resource,
                description,
            };
            let created: PermissionInfo = client.post("/api/permissions", &body).await?;
            printer.done(&format!("Created {} ({})", created.key(), created.id), &created)?;
        }

        PermissionCommands::Delete {
            permission_id,
            force,
        } => {
            if !force {
                printer.note(
                    Tone::Hint,
                    "Roles granting this permission lose it. Use --force to confirm.",
                );
                return Ok(());
            }
            let resp: serde_json::Value = client
                .delete(&format!("/api/permissions/{}", permission_id))
                .await?;
            printer.done(&format!("Permission {} deleted", permission_id), &resp)?;
        }
    }
    Ok(())
}

pub async fn resources(cmd: ResourceCommands, client: &ApiClient, printer: &Printer) -> Result<()> {
    match cmd {
        ResourceCommands::List => {
            let resources: Vec<ResourceInfo> = client.get("/api/resources").await?;
            let rows = resources
                .iter()
                .map(|r| ResourceRow {
                    id: output::short_id(r.id),
                    name: r.name.clone(),
                    kind: r.kind_label(),
                    path: r.path.clone().unwrap_or_default(),
                    active: if r.is_active { "yes".into() } else { "no".into() },
                })
                .collect();
            printer.rows(rows, &resources)?;
        }
    }
    Ok(())
}
