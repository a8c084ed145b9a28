//! Warden CLI - Command-line interface for a Warden access-control server.
//!
//! Provides session, user, role, permission, resource, audit, health and
//! configuration commands.

mod client;
mod commands;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{audit, auth, catalog, config, health, roles, users};
use output::{OutputFormat, Printer};

/// Warden - Role-Based Access Control CLI
#[derive(Parser)]
#[command(
    name = "warden",
    version,
    about = "Warden - Role-Based Access Control",
    long_about = "CLI tool for logging in to a Warden server and administering users, roles and the audit trail.",
    propagate_version = true
)]
pub struct Cli {
    /// Output format
    #[arg(short, long, global = true, default_value = "table")]
    output: OutputFormat,

    /// API server URL
    #[arg(long, global = true, env = "WARDEN_API_URL")]
    api_url: Option<String>,

    /// Bearer token; overrides the one stored by `warden login`
    #[arg(long, global = true, env = "WARDEN_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Exchange credentials for a session token
    Login(auth::LoginArgs),

    /// Forget the stored session token
    Logout,

    /// Show the current principal and its permissions
    Whoami,

    /// User management operations
    #[command(subcommand)]
    Users(users::UserCommands),

    /// Role management operations
    #[command(subcommand)]
    Roles(roles::RoleCommands),

    /// Permission catalog
    #[command(subcommand)]
    Permissions(catalog::PermissionCommands),

    /// Resource descriptors
    #[command(subcommand)]
    Resources(catalog::ResourceCommands),

    /// Audit trail queries
    #[command(subcommand)]
    Audit(audit::AuditCommands),

    /// Check server health
    Health(health::HealthArgs),

    /// Configuration management
    #[command(subcommand)]
    Config(config::ConfigCommands),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.no_color {
        colored::control::set_override(false);
    }

    let api_url = cli
        .api_url
        .clone()
        .or_else(|| config::load_value(config::API_URL_KEY))
        .unwrap_or_else(|| "http://localhost:8080".to_string());
    let token = cli
        .token
        .clone()
        .or_else(|| config::load_value(config::TOKEN_KEY));

    let client = client::ApiClient::new(&api_url, token)?;
    let printer = Printer::new(cli.output);

    let result = match cli.command {
        Commands::Login(args) => auth::login(args, &client, &printer).await,
        Commands::Logout => auth::logout(&client, &printer).await,
        Commands::Whoami => auth::whoami(&client, &printer).await,
        Commands::Users(cmd) => users::execute(cmd, &client, &printer).await,
        Commands::Roles(cmd) => roles::execute(cmd, &client, &printer).await,
        Commands::Permissions(cmd) => catalog::permissions(cmd, &client, &printer).await,
        Commands::Resources(cmd) => catalog::resources(cmd, &client, &printer).await,
        Commands::Audit(cmd) => audit::execute(cmd, &client, &printer).await,
        Commands::Health(args) => health::execute(args, &client, &printer).await,
        Commands::Config(cmd) => config::execute(cmd, &printer).await,
    };

    if let Err(e) = result {
        output::report_failure(&e);
        std::process::exit(1);
    }

    Ok(())
}
