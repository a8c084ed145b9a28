//! Audit trail commands.

use anyhow::Result;
use chrono::{DateTime, Utc};
use clap::{Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};
use tabled::Tabled;
use uuid::Uuid;

use crate::client::ApiClient;
use crate::output::{self, Card, Printer, Tone};

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum StatusFilter {
    Success,
    Failed,
    Denied,
}

impl StatusFilter {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Denied => "denied",
        }
    }
}

#[derive(Subcommand)]
pub enum AuditCommands {
    /// Query audit records, newest first
    List {
        /// Match actions containing this text
        #[arg(short, long)]
        action: Option<String>,

        #[arg(short, long)]
        status: Option<StatusFilter>,

        /// Only records by this user ID
        #[arg(short, long)]
        user: Option<Uuid>,

        /// RFC 3339 lower bound, inclusive
        #[arg(long)]
        since: Option<DateTime<Utc>>,

        /// RFC 3339 upper bound, inclusive
        #[arg(long)]
        until: Option<DateTime<Utc>>,

        #[arg(short, long, default_value = "1")]
        page: u32,

        #[arg(short, long, default_value = "50")]
        limit: u32,
    },

    /// Counts by status
    Stats,
}

// ── API response types ──────────────────────────────────────────────────────

/// The acting user, joined in by the server when the account still exists.
#[derive(Debug, Deserialize, Serialize)]
struct Actor {
    id: Uuid,
    username: String,
    email: String,
}

#[derive(Debug, Deserialize, Serialize)]
struct AuditRecord {
    id: Uuid,
    actor_id: Option<Uuid>,
    #[serde(default)]
    actor: Option<Actor>,
    action: String,
    resource: String,
    status: String,
    timestamp: DateTime<Utc>,
    #[serde(default)]
    origin: Option<String>,
    #[serde(default)]
    details: serde_json::Value,
}

#[derive(Debug, Deserialize, Serialize)]
struct AuditPage {
    records: Vec<AuditRecord>,
    total: u64,
    page: u32,
    limit: u32,
    pages: u64,
}

#[derive(Debug, Deserialize, Serialize)]
struct AuditStats {
    total: u64,
    success: u64,
    failed: u64,
    denied: u64,
}

#[derive(Debug, Serialize, Tabled)]
struct AuditRow {
    #[tabled(rename = "Time")]
    time: String,
    #[tabled(rename = "Actor")]
    actor: String,
    #[tabled(rename = "Action")]
    action: String,
    #[tabled(rename = "Resource")]
    resource: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Origin")]
    origin: String,
}

/// Username when joined, a short id for deleted accounts, `-` when anonymous.
fn actor_label(record: &AuditRecord) -> String {
    match (&record.actor, record.actor_id) {
        (Some(actor), _) => actor.username.clone(),
        (None, Some(id)) => output::short_id(id),
        (None, None) => "-".into(),
    }
}

impl From<&AuditRecord> for AuditRow {
    fn from(r: &AuditRecord) -> Self {
        Self {
            time: r.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
            actor: actor_label(r),
            action: r.action.clone(),
            resource: r.resource.clone(),
            status: output::paint_status(&r.status),
            origin: r.origin.clone().unwrap_or_default(),
        }
    }
}

// ── Execution ───────────────────────────────────────────────────────────────

fn query_string(
    action: Option<&str>,
    status: Option<StatusFilter>,
    user: Option<Uuid>,
    since: Option<DateTime<Utc>>,
    until: Option<DateTime<Utc>>,
    page: u32,
    limit: u32,
) -> String {
    let mut params = vec![format!("page={}", page), format!("limit={}", limit)];
    if let Some(action) = action {
        params.push(format!("action={}", action));
    }
    if let Some(status) = status {
        params.push(format!("status={}", status.as_str()));
    }
    if let Some(user) = user {
        params.push(format!("user_id={}", user));
    }
    if let Some(since) = since {
        params.push(format!("start_date={}", since.format("%Y-%m-%dT%H:%M:%SZ")));
    }
    if let Some(until) = until {
        params.push(format!("end_date={}", until.format("%Y-%m-%dT%H:%M:%SZ")));
    }
    format!("/api/audit?{}", params.join("&"))
}

pub async fn execute(cmd: AuditCommands, client: &ApiClient, printer: &Printer) -> Result<()> {
    match cmd {
        AuditCommands::List {
            action,
            status,
            user,
            since,
            until,
            page,
            limit,
        } => {
            if let (Some(since), Some(until)) = (since, until) {
                anyhow::ensure!(since <= until, "--since must not be after --until");
            }

            let path = query_string(action.as_deref(), status, user, since, until, page, limit);
            let result: AuditPage = client.get(&path).await?;

            let rows: Vec<AuditRow> = result.records.iter().map(AuditRow::from).collect();
            printer.rows(rows, &result)?;
            if printer.is_table() {
                printer.note(
                    Tone::Hint,
                    &format!(
                        "Page {}/{} ({} records)",
                        result.page,
                        result.pages.max(1),
                        result.total
                    ),
                );
            }
        }

        AuditCommands::Stats => {
            let stats: AuditStats = client.get("/api/audit/stats").await?;
            let card = Card::new("Audit Trail")
                .field("Total", stats.total)
                .field("Success", stats.success)
                .field("Failed", stats.failed)
                .field("Denied", stats.denied);
            printer.card(card, &stats)?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_query_string_includes_only_given_filters() {
        let path = query_string(None, None, None, None, None, 1, 50);
        assert_eq!(path, "/api/audit?page=1&limit=50");

        let since = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let path = query_string(
            Some("login"),
            Some(StatusFilter::Denied),
            None,
            Some(since),
            None,
            2,
            10,
        );
        assert_eq!(
            path,
            "/api/audit?page=2&limit=10&action=login&status=denied&start_date=2024-01-01T00:00:00Z"
        );
    }

    #[test]
    fn test_actor_column_prefers_joined_username() {
        let record: AuditRecord = serde_json::from_value(serde_json::json!({
            "id": Uuid::nil(),
            "actor_id": "6f1c2a4e-0000-0000-0000-000000000000",
            "actor": {
                "id": "6f1c2a4e-0000-0000-0000-000000000000",
                "username": "manager",
                "email": "manager@rbac.com"
            },
            "action": "view_users",
            "resource": "users",
            "status": "success",
            "timestamp": "2024-03-01T12:00:00Z",
            "details": {}
        }))
        .unwrap();
        assert_eq!(actor_label(&record), "manager");

        let deleted = AuditRecord {
            actor: None,
            ..record
        };
        assert_eq!(actor_label(&deleted), "6f1c2a4e");

        let anonymous = AuditRecord {
            actor_id: None,
            ..deleted
        };
        assert_eq!(actor_label(&anonymous), "-");
    }
}
