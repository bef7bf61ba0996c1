use anyhow::{anyhow, Result};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use log::info;
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const ENV_SERVER: &str = "MURMUR_SERVER";
pub const ENV_USER_ID: &str = "MURMUR_USER_ID";
pub const ENV_TOKEN: &str = "MURMUR_TOKEN";

const DEFAULT_TIMEOUT_SECS: u64 = 15;

fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

/// Connection settings for one user session
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ClientConfig {
    pub server_url: String,
    pub user_id: String,
    /// Session token, base64 encoded at rest
    #[serde(default, skip_serializing_if = "Option::is_none")]
    token: Option<String>,
    #[serde(default = "default_timeout")]
    pub request_timeout_secs: u64,
}

impl ClientConfig {
    pub fn new(server_url: &str, user_id: &str, token: Option<&str>) -> Self {
        ClientConfig {
            server_url: server_url.trim_end_matches('/').to_string(),
            user_id: user_id.to_string(),
            token: token.map(|t| BASE64.encode(t)),
            request_timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }

    pub fn token(&self) -> Option<String> {
        self.token.as_ref().and_then(|encoded| {
            BASE64
                .decode(encoded)
                .ok()
                .and_then(|bytes| String::from_utf8(bytes).ok())
        })
    }

    pub fn set_token(&mut self, token: Option<&str>) {
        self.token = token.map(|t| BASE64.encode(t));
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Apply overrides from a variable lookup (normally the process environment)
    pub fn apply_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(server) = lookup(ENV_SERVER) {
            self.server_url = server.trim_end_matches('/').to_string();
        }
        if let Some(user_id) = lookup(ENV_USER_ID) {
            self.user_id = user_id;
        }
        if let Some(token) = lookup(ENV_TOKEN) {
            self.set_token(Some(&token));
        }
        self
    }

    pub fn apply_env(self) -> Self {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.server_url.starts_with("http://") || self.server_url.starts_with("https://")) {
            return Err(anyhow!(
                "Server URL must start with http:// or https:// (got '{}')",
                self.server_url
            ));
        }
        if self.user_id.trim().is_empty() {
            return Err(anyhow!("User id must not be empty"));
        }
        if self.request_timeout_secs == 0 {
            return Err(anyhow!("Request timeout must be at least one second"));
        }
        Ok(())
    }
}

static CONFIG_PATH_OVERRIDE: OnceCell<PathBuf> = OnceCell::new();

/// Use `path` instead of the per-user config file. Only the first call wins.
pub fn set_config_path_override(path: PathBuf) -> bool {
    CONFIG_PATH_OVERRIDE.set(path).is_ok()
}

pub fn get_config_dir() -> Result<PathBuf> {
    let config_dir = dirs::config_dir()
        .ok_or_else(|| anyhow!("Could not determine config directory"))?
        .join("murmur");

    if !config_dir.exists() {
        fs::create_dir_all(&config_dir)?;
    }

    Ok(config_dir)
}

fn get_config_path() -> Result<PathBuf> {
    if let Some(path) = CONFIG_PATH_OVERRIDE.get() {
        return Ok(path.clone());
    }
    Ok(get_config_dir()?.join("config.json"))
}

pub fn save_config(config: &ClientConfig) -> Result<()> {
    save_config_to(&get_config_path()?, config)
}

pub fn load_config() -> Result<Option<ClientConfig>> {
    load_config_from(&get_config_path()?)
}

pub fn save_config_to(path: &Path, config: &ClientConfig) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent)?;
        }
    }
    let file = File::create(path)?;
    serde_json::to_writer_pretty(file, config)?;

    info!("Config saved for user {} to {}", config.user_id, path.display());
    Ok(())
}

pub fn load_config_from(path: &Path) -> Result<Option<ClientConfig>> {
    if !path.exists() {
        return Ok(None);
    }

    let contents = fs::read_to_string(path)?;
    let config: ClientConfig = serde_json::from_str(&contents)
        .map_err(|e| anyhow!("Invalid config file {}: {}", path.display(), e))?;
    info!("Loaded config for user {} from {}", config.user_id, path.display());

    Ok(Some(config))
}
