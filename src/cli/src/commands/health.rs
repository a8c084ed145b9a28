//! Health check command.
//!
//! Queries the `/health` endpoint.

use anyhow::Result;
use clap::Args;

use crate::client::ApiClient;
use crate::output::{Card, Printer, Tone};

#[derive(Args)]
pub struct HealthArgs {
    /// Also report whether a session token is configured
    #[arg(short, long)]
    detailed: bool,
}

pub async fn execute(args: HealthArgs, client: &ApiClient, printer: &Printer) -> Result<()> {
    let health: serde_json::Value = client.get_raw("/health").await?;
    let text = |key: &str| health.get(key).and_then(|v| v.as_str()).map(str::to_string);
    let status = text("status").unwrap_or_else(|| "unknown".to_string());

    let mut card = Card::new("Server Health")
        .field("Status", &status)
        .field("API URL", client.base_url())
        .maybe("Version", text("version"))
        .maybe("Timestamp", text("timestamp"));
    if args.detailed {
        card = card.field("Session", if client.has_token() { "configured" } else { "none" });
    }
    printer.card(card, &health)?;

    if printer.is_table() {
        if status == "healthy" {
            printer.note(Tone::Done, "Server is up");
        } else {
            printer.note(Tone::Failure, &format!("Server status: {}", status));
        }
    }
    Ok(())
}
