//! Session commands: login, logout and whoami.

use anyhow::{Context, Result};
use clap::Args;
use serde::{Deserialize, Serialize};

use super::config::{self, TOKEN_KEY};
use super::users::UserProfile;
use crate::client::ApiClient;
use crate::output::{Printer, Tone};

#[derive(Args)]
pub struct LoginArgs {
    /// Account username
    username: String,

    /// Password; may also come from WARDEN_PASSWORD
    #[arg(short, long, env = "WARDEN_PASSWORD", hide_env_values = true)]
    password: String,

    /// Print the token instead of storing it
    #[arg(long)]
    print_token: bool,
}

#[derive(Serialize)]
struct LoginRequest<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Debug, Deserialize, Serialize)]
struct LoginResponse {
    token: String,
    expires_at: String,
    principal: UserProfile,
}

pub async fn login(args: LoginArgs, client: &ApiClient, printer: &Printer) -> Result<()> {
    let resp: LoginResponse = client
        .post(
            "/api/auth/login",
            &LoginRequest {
                username: &args.username,
                password: &args.password,
            },
        )
        .await?;

    if args.print_token {
        println!("{}", resp.token);
        return Ok(());
    }

    config::store_value(TOKEN_KEY, &resp.token).context("Failed to save session token")?;

    printer.done(
        &format!(
            "Logged in as {} ({}), session expires {}",
            resp.principal.username,
            resp.principal.roles.join(", "),
            resp.expires_at
        ),
        &resp.principal,
    )
}

pub async fn logout(client: &ApiClient, printer: &Printer) -> Result<()> {
    if client.has_token() {
        // The server only records the logout; a failure here is not fatal.
        if let Err(e) = client
            .post::<_, serde_json::Value>("/api/auth/logout", &serde_json::json!({}))
            .await
        {
            printer.note(Tone::Hint, &format!("Server logout failed: {:#}", e));
        }
    }

    if config::remove_value(TOKEN_KEY)? {
        printer.note(Tone::Done, "Logged out");
    } else {
        printer.note(Tone::Hint, "No stored session");
    }
    Ok(())
}

pub async fn whoami(client: &ApiClient, printer: &Printer) -> Result<()> {
    let me: UserProfile = client.get("/api/auth/me").await?;
    printer.card(me.card(me.username.clone()), &me)
}
