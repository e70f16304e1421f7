use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::smb::Dialect;

/// Server configuration loaded from TOML file.
/// See config.toml.example for format.
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// TCP port to listen on (default 445, use 4450 for non-root)
    #[serde(default = "default_port")]
    pub port: u16,
    /// Server name advertised in NEGOTIATE response
    pub server_name: String,
    /// Domain or workgroup advertised in NEGOTIATE response
    #[serde(default = "default_domain_name")]
    pub domain_name: String,
    /// Largest message body the server accepts and the largest read it serves
    #[serde(default = "default_max_buffer_size")]
    pub max_buffer_size: u32,
    /// Outstanding requests a client may have in flight
    #[serde(default = "default_max_mpx_count")]
    pub max_mpx_count: u16,
    /// Server offset from UTC, reported to clients
    #[serde(default)]
    pub time_zone_offset_minutes: i16,
    /// Dialect values the server will accept (empty = all known)
    #[serde(default)]
    pub dialects: Vec<u16>,
    /// Close connections that send nothing for this long
    #[serde(default)]
    pub idle_timeout_secs: Option<u64>,
    /// List of shared directories
    pub shares: Vec<ShareConfig>,
    /// Configured user accounts (empty = guest-only)
    #[serde(default)]
    pub users: Vec<UserConfig>,
}

fn default_port() -> u16 {
    445
}

fn default_domain_name() -> String {
    "WORKGROUP".to_string()
}

fn default_max_buffer_size() -> u32 {
    65536
}

fn default_max_mpx_count() -> u16 {
    50
}

/// A single shared directory configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct ShareConfig {
    /// Share name as seen by clients (e.g. "Public")
    pub name: String,
    /// Local filesystem path to share
    pub path: PathBuf,
    #[serde(default)]
    pub read_only: bool,
    #[serde(default)]
    pub guest_ok: bool,
}

/// A configured user account.
#[derive(Debug, Deserialize, Clone)]
pub struct UserConfig {
    pub username: String,
    pub password: String,
}

impl Config {
    /// The dialects this server negotiates, in ascending order.
    pub fn supported_dialects(&self) -> Vec<Dialect> {
        if self.dialects.is_empty() {
            return Dialect::ALL.to_vec();
        }
        Dialect::ALL
            .into_iter()
            .filter(|d| self.dialects.contains(&d.as_u16()))
            .collect()
    }

    /// Whether any share admits guest sessions.
    pub fn guest_allowed(&self) -> bool {
        self.shares.iter().any(|s| s.guest_ok)
    }
}

/// Load and parse the TOML configuration file.
pub fn load_config(path: impl AsRef<Path>) -> anyhow::Result<Config> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("Failed to read config file '{}': {}", path.display(), e))?;
    let config: Config = toml::from_str(&content)
        .map_err(|e| anyhow::anyhow!("Failed to parse config file '{}': {}", path.display(), e))?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> anyhow::Result<()> {
    if config.shares.is_empty() {
        anyhow::bail!("No shares configured");
    }
    if config.supported_dialects().is_empty() {
        anyhow::bail!("None of the configured dialects {:x?} is known", config.dialects);
    }
    if config.max_buffer_size == 0 {
        anyhow::bail!("max_buffer_size must be positive");
    }
    Ok(())
}
