//! Configuration management commands.
//!
//! Stores CLI configuration in `~/.warden/config.toml`. The session token
//! written by `warden login` lives here too, under the `token` key.

use anyhow::{Context, Result};
use clap::Subcommand;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

use tabled::Tabled;

use crate::output::{Printer, Tone};

pub const API_URL_KEY: &str = "api-url";
pub const TOKEN_KEY: &str = "token";

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Set a configuration value
    Set {
        /// Configuration key (e.g., api-url)
        key: String,
        /// Value to set
        value: String,
    },

    /// Get a configuration value
    Get {
        /// Configuration key
        key: String,
    },

    /// Show all configuration
    Show,

    /// Reset configuration to defaults
    Reset {
        /// Skip confirmation
        #[arg(short, long)]
        force: bool,
    },
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct CliConfig {
    #[serde(default)]
    pub values: BTreeMap<String, String>,
}

impl CliConfig {
    /// Values safe to print: the stored token is masked.
    fn masked(&self) -> BTreeMap<String, String> {
        self.values
            .iter()
            .map(|(k, v)| {
                let shown = if k == TOKEN_KEY { mask(v) } else { v.clone() };
                (k.clone(), shown)
            })
            .collect()
    }
}

fn mask(secret: &str) -> String {
    let visible: String = secret.chars().take(8).collect();
    format!("{}…", visible)
}

fn config_path() -> Result<PathBuf> {
    let home = dirs::home_dir().context("Could not determine home directory")?;
    Ok(home.join(".warden").join("config.toml"))
}

/// Load the CLI configuration, returning defaults if the file does not exist.
fn load_config() -> Result<CliConfig> {
    let path = config_path()?;
    if !path.exists() {
        return Ok(CliConfig::default());
    }
    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    toml::from_str(&content).context("Failed to parse config file")
}

fn save_config(cfg: &CliConfig) -> Result<()> {
    let path = config_path()?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let content = toml::to_string_pretty(cfg).context("Failed to serialize config")?;
    std::fs::write(&path, content)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

pub fn load_value(key: &str) -> Option<String> {
    load_config().ok().and_then(|cfg| cfg.values.get(key).cloned())
}

pub fn store_value(key: &str, value: &str) -> Result<()> {
    let mut cfg = load_config()?;
    cfg.values.insert(key.to_string(), value.to_string());
    save_config(&cfg)
}

/// Remove a key. Returns whether it was present.
pub fn remove_value(key: &str) -> Result<bool> {
    let mut cfg = load_config()?;
    let removed = cfg.values.remove(key).is_some();
    if removed {
        save_config(&cfg)?;
    }
    Ok(removed)
}

#[derive(Tabled)]
struct ConfigRow<'a> {
    #[tabled(rename = "Key")]
    key: &'a str,
    #[tabled(rename = "Value")]
    value: &'a str,
}

pub async fn execute(cmd: ConfigCommands, printer: &Printer) -> Result<()> {
    match cmd {
        ConfigCommands::Set { key, value } => {
            store_value(&key, &value)?;
            let shown = if key == TOKEN_KEY { mask(&value) } else { value };
            printer.done(
                &format!("{} = {}", key, shown),
                &serde_json::json!({ "key": key, "value": shown }),
            )?;
        }

        ConfigCommands::Get { key } => {
            let masked = load_config()?.masked();
            let value = masked
                .get(&key)
                .ok_or_else(|| anyhow::anyhow!("Key '{}' not found", key))?;
            if printer.is_table() {
                println!("{}", value);
            } else {
                printer.done("", &serde_json::json!({ "key": key, "value": value }))?;
            }
        }

        ConfigCommands::Show => {
            let cfg = load_config()?;
            if cfg.values.is_empty() {
                printer.note(Tone::Hint, "No configuration values set.");
                return Ok(());
            }

            let masked = cfg.masked();
            let rows = masked
                .iter()
                .map(|(key, value)| ConfigRow { key, value })
                .collect();
            printer.rows(rows, &masked)?;
        }

        ConfigCommands::Reset { force } => {
            if !force {
                printer.note(
                    Tone::Hint,
                    "This will reset all CLI configuration. Use --force to confirm.",
                );
                return Ok(());
            }

            let path = config_path()?;
            if path.exists() {
                std::fs::remove_file(&path)
                    .with_context(|| format!("Failed to remove {}", path.display()))?;
            }
            printer.note(Tone::Done, "Configuration reset to defaults");
        }
    }

    Ok(())
}
