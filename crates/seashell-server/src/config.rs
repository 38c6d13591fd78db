//! Server configuration: TOML file + CLI overrides.

use crate::profiles::ConnectionProfile;
use seashell_core::{BridgeError, BridgeResult};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

/// Top-level config file structure.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ConfigFile {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub ssh: SshSection,
    #[serde(default)]
    pub auth: AuthSection,
    #[serde(default)]
    pub connections: Vec<ConnectionProfile>,
}

/// `[server]` section of the config TOML.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
        }
    }
}

/// `[ssh]` section of the config TOML.
#[derive(Debug, Clone, Deserialize)]
pub struct SshSection {
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    /// Accept any remote host key. Insecure; development only.
    #[serde(default)]
    pub accept_any_host_key: bool,
    /// SHA-256 host key fingerprints the server will accept.
    #[serde(default)]
    pub host_key_fingerprints: Vec<String>,
}

impl Default for SshSection {
    fn default() -> Self {
        Self {
            connect_timeout_secs: default_connect_timeout(),
            accept_any_host_key: false,
            host_key_fingerprints: Vec::new(),
        }
    }
}

/// `[auth]` section of the config TOML.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthSection {
    #[serde(default = "default_secret_file")]
    pub secret_file: String,
}

impl Default for AuthSection {
    fn default() -> Self {
        Self {
            secret_file: default_secret_file(),
        }
    }
}

fn default_bind() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8080
}
fn default_connect_timeout() -> u64 {
    10
}
fn default_secret_file() -> String {
    "~/.seashell/secret".to_string()
}

/// Resolved server configuration (paths expanded, CLI overrides applied).
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
    pub connect_timeout: Duration,
    pub accept_any_host_key: bool,
    pub host_key_fingerprints: Vec<String>,
    pub secret_path: PathBuf,
    pub connections: Vec<ConnectionProfile>,
}

impl ServerConfig {
    /// Load config from TOML file, then apply CLI overrides.
    pub fn load(
        config_path: Option<&Path>,
        cli_port: Option<u16>,
        cli_bind: Option<&str>,
    ) -> BridgeResult<Self> {
        let file_config = if let Some(path) = config_path {
            let expanded = expand_tilde(path);
            if expanded.exists() {
                info!(path = %expanded.display(), "loading config file");
                let content = std::fs::read_to_string(&expanded)?;
                toml::from_str::<ConfigFile>(&content)
                    .map_err(|e| BridgeError::Config(format!("config parse error: {e}")))?
            } else {
                info!(path = %expanded.display(), "config file not found, using defaults");
                ConfigFile::default()
            }
        } else {
            ConfigFile::default()
        };

        let bind = cli_bind
            .map(|s| s.to_string())
            .unwrap_or(file_config.server.bind);
        let port = cli_port.unwrap_or(file_config.server.port);

        Ok(Self {
            bind,
            port,
            connect_timeout: Duration::from_secs(file_config.ssh.connect_timeout_secs),
            accept_any_host_key: file_config.ssh.accept_any_host_key,
            host_key_fingerprints: file_config.ssh.host_key_fingerprints,
            secret_path: expand_tilde_str(&file_config.auth.secret_file),
            connections: file_config.connections,
        })
    }
}

/// Expand `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
    let s = path.to_string_lossy();
    expand_tilde_str(&s)
}

fn expand_tilde_str(s: &str) -> PathBuf {
    if let Some(rest) = s.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(s)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = ServerConfig::load(None, None, None).unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.bind, "0.0.0.0");
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
        assert!(!config.accept_any_host_key);
        assert!(config.connections.is_empty());
    }

    #[test]
    fn cli_overrides_win() {
        let config = ServerConfig::load(None, Some(9000), Some("127.0.0.1")).unwrap();
        assert_eq!(config.port, 9000);
        assert_eq!(config.bind, "127.0.0.1");
    }

    #[test]
    fn parse_full_file() {
        let content = r#"
[server]
bind = "127.0.0.1"
port = 9090

[ssh]
connect_timeout_secs = 5
accept_any_host_key = true

[auth]
secret_file = "/tmp/seashell-secret"

[[connections]]
id = 1
name = "staging"
host = "staging.internal"
username = "deploy"
auth = "password"
password = "s3cret"

[[connections]]
id = 2
host = "prod.internal"
port = 2222
username = "ops"
owner = 7
auth = "key"
private_key_file = "/etc/seashell/prod.pem"
"#;
        let file: ConfigFile = toml::from_str(content).unwrap();
        assert_eq!(file.server.port, 9090);
        assert_eq!(file.ssh.connect_timeout_secs, 5);
        assert!(file.ssh.accept_any_host_key);
        assert_eq!(file.connections.len(), 2);
        assert_eq!(file.connections[0].id, 1);
        assert_eq!(file.connections[1].port, 2222);
        assert_eq!(file.connections[1].owner, Some(7));
    }

    #[test]
    fn tilde_expansion() {
        let expanded = expand_tilde_str("~/x/y");
        assert!(!expanded.to_string_lossy().starts_with('~'));
        assert!(expanded.ends_with("x/y"));
    }
}
