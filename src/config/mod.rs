use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Directory holding the built SPA bundle served for non-API paths
    #[serde(default = "default_static_dir")]
    pub static_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            data_dir: default_data_dir(),
            static_dir: default_static_dir(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

fn default_static_dir() -> PathBuf {
    PathBuf::from("static/dist")
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// Static API token that authenticates as a synthetic admin
    #[serde(default = "default_admin_token")]
    pub admin_token: String,
    /// Session lifetime in days
    #[serde(default = "default_session_ttl_days")]
    pub session_ttl_days: i64,
    /// Admin account created at startup when no users exist yet.
    /// Both fields must be set for the bootstrap to run.
    #[serde(default)]
    pub bootstrap_admin_email: Option<String>,
    #[serde(default)]
    pub bootstrap_admin_password: Option<String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            admin_token: default_admin_token(),
            session_ttl_days: default_session_ttl_days(),
            bootstrap_admin_email: None,
            bootstrap_admin_password: None,
        }
    }
}

fn default_admin_token() -> String {
    // Generate a random token if not provided
    uuid::Uuid::new_v4().to_string()
}

fn default_session_ttl_days() -> i64 {
    7
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        if path.exists() {
            info!("Loading configuration from {}", path.display());
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            let config: Config = toml::from_str(&content)
                .with_context(|| "Failed to parse configuration file")?;
            Ok(config)
        } else {
            info!("No config file found, using defaults");
            Ok(Config::default())
        }
    }

    pub fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            auth: AuthConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_missing_sections() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.auth.session_ttl_days, 7);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn partial_section_keeps_other_defaults() {
        let config: Config = toml::from_str(
            r#"
            [server]
            port = 9090

            [auth]
            admin_token = "fixed-token"
            bootstrap_admin_email = "root@clinic.test"
            bootstrap_admin_password = "clinic-pass42"
            "#,
        )
        .unwrap();
        assert_eq!(config.server.port, 9090);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.auth.admin_token, "fixed-token");
        assert_eq!(config.auth.session_ttl_days, 7);
        assert_eq!(
            config.auth.bootstrap_admin_email.as_deref(),
            Some("root@clinic.test")
        );
        assert!(config.auth.bootstrap_admin_password.is_some());
    }
}
