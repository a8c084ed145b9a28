//! Configuration management.
//!
//! Values come from an optional file plus `WARDEN__<SECTION>__<KEY>` environment
//! variables, e.g. `WARDEN__AUTH__JWT_SECRET` or `WARDEN__SERVER__PORT`.

use serde::Deserialize;
use std::time::Duration;

/// Main application configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Token and credential configuration
    #[serde(default)]
    pub auth: AuthConfig,

    /// Audit trail configuration
    #[serde(default)]
    pub audit: AuditConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// HTTP server host
    #[serde(default = "default_host")]
    pub host: String,

    /// HTTP server port
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL. When absent the in-memory store is used.
    pub url: Option<String>,

    /// Maximum number of connections
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum number of connections
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
        }
    }
}

#[derive(Clone, Deserialize)]
pub struct AuthConfig {
    /// HMAC signing secret for bearer tokens. Must be non-empty.
    #[serde(default)]
    pub jwt_secret: String,

    /// How long an issued token stays valid, e.g. `"24h"` or `"90m"`.
    #[serde(with = "humantime_serde", default = "default_token_lifetime")]
    pub token_lifetime: Duration,

    /// Clock skew tolerated when checking expiry (seconds)
    #[serde(default = "default_leeway_secs")]
    pub leeway_secs: u64,

    /// Issuer claim stamped into and required on tokens
    pub issuer: Option<String>,

    /// If set and no `admin` account exists, one is created with this password at startup.
    pub bootstrap_admin_password: Option<String>,

    /// Create the demo accounts (admin, manager, hruser, employee) at startup.
    #[serde(default)]
    pub seed_demo_users: bool,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: String::new(),
            token_lifetime: default_token_lifetime(),
            leeway_secs: default_leeway_secs(),
            issuer: None,
            bootstrap_admin_password: None,
            seed_demo_users: false,
        }
    }
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("jwt_secret", &"[REDACTED]")
            .field("token_lifetime", &self.token_lifetime)
            .field("leeway_secs", &self.leeway_secs)
            .field("issuer", &self.issuer)
            .field(
                "bootstrap_admin_password",
                &self.bootstrap_admin_password.as_ref().map(|_| "[REDACTED]"),
            )
            .field("seed_demo_users", &self.seed_demo_users)
            .finish()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuditConfig {
    /// Capacity of the background audit writer's queue
    #[serde(default = "default_channel_buffer_size")]
    pub channel_buffer_size: usize,

    /// How long shutdown waits for queued records to be written
    #[serde(with = "humantime_serde", default = "default_drain_timeout")]
    pub drain_timeout: Duration,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            channel_buffer_size: default_channel_buffer_size(),
            drain_timeout: default_drain_timeout(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ObservabilityConfig {
    /// OpenTelemetry OTLP endpoint
    pub otlp_endpoint: Option<String>,

    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default = "default_json_logging")]
    pub json_logging: bool,

    /// Service name reported to the tracing backend
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            otlp_endpoint: None,
            log_level: default_log_level(),
            json_logging: default_json_logging(),
            service_name: default_service_name(),
        }
    }
}

// Default value functions
fn default_host() -> String { "0.0.0.0".to_string() }
fn default_port() -> u16 { 8080 }
fn default_max_connections() -> u32 { 20 }
fn default_min_connections() -> u32 { 5 }
fn default_token_lifetime() -> Duration { Duration::from_secs(24 * 60 * 60) }
fn default_leeway_secs() -> u64 { 0 }
fn default_channel_buffer_size() -> usize { 1024 }
fn default_drain_timeout() -> Duration { Duration::from_secs(5) }
fn default_log_level() -> String { "info".to_string() }
fn default_json_logging() -> bool { true }
fn default_service_name() -> String { "warden".to_string() }

impl Config {
    /// Load configuration from environment.
    pub fn load() -> anyhow::Result<Self> {
        let config = config::Config::builder()
            .add_source(config::Environment::with_prefix("WARDEN").separator("__"))
            .build()?;

        let cfg: Config = config.try_deserialize()?;
        Ok(cfg)
    }

    /// Load from a specific file path, with environment overrides on top.
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let config = config::Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(config::Environment::with_prefix("WARDEN").separator("__"))
            .build()?;

        let cfg: Config = config.try_deserialize()?;
        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let cfg = Config::default();
        assert_eq!(cfg.server.port, 8080);
        assert!(cfg.database.url.is_none());
        assert_eq!(cfg.auth.token_lifetime, Duration::from_secs(86_400));
        assert_eq!(cfg.audit.channel_buffer_size, 1024);
        assert!(cfg.auth.jwt_secret.is_empty());
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[server]
port = 9090

[auth]
jwt_secret = "file-secret"
token_lifetime = "90m"
issuer = "warden-test"

[audit]
channel_buffer_size = 16
"#
        )
        .unwrap();

        let path = file.path().to_str().unwrap().to_string();
        let cfg = Config::from_file(&path).unwrap();
        assert_eq!(cfg.server.port, 9090);
        assert_eq!(cfg.server.host, "0.0.0.0");
        assert_eq!(cfg.auth.jwt_secret, "file-secret");
        assert_eq!(cfg.auth.token_lifetime, Duration::from_secs(90 * 60));
        assert_eq!(cfg.auth.issuer.as_deref(), Some("warden-test"));
        assert_eq!(cfg.audit.channel_buffer_size, 16);
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let auth = AuthConfig {
            jwt_secret: "hunter2".to_string(),
            bootstrap_admin_password: Some("Admin@123".to_string()),
            ..Default::default()
        };
        let rendered = format!("{:?}", auth);
        assert!(!rendered.contains("hunter2"));
        assert!(!rendered.contains("Admin@123"));
    }
}
