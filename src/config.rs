use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_CONFIG_PATH: &str = "config/config.toml";
pub const DEFAULT_SERVER_PORT: u16 = 8080;
pub const DEFAULT_RATE_LIMIT_TTL_SECS: u64 = 60;
pub const DEFAULT_TRIGGER_SECRET: &str = "dev-secret";

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub app: AppSection,
    pub logging: LoggingSection,
    #[serde(default)]
    pub server: Option<ServerSection>,
    #[serde(default)]
    pub store: Option<StoreSection>,
    #[serde(default)]
    pub rate_limit: Option<RateLimitSection>,
    #[serde(default)]
    pub verdict: Option<VerdictSection>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppSection {
    pub name: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingSection {
    pub level: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerSection {
    /// Port to listen on (default: 8080)
    pub port: Option<u16>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreSection {
    /// Base URL of the remote table store. Absent → in-memory store.
    pub url: Option<String>,
    pub api_key: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RateLimitSection {
    /// Base URL of the flag store. Absent → rate limiting disabled.
    pub url: Option<String>,
    pub token: Option<String>,
    pub ttl_seconds: Option<u64>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct VerdictSection {
    /// Shared secret for the cron trigger endpoint.
    pub trigger_secret: Option<String>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Read(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

pub fn load_default() -> Result<Config, ConfigError> {
    load_from_path(DEFAULT_CONFIG_PATH)
}

pub fn load_from_path(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
    let contents = std::fs::read_to_string(path)?;
    let config: Config = toml::from_str(&contents)?;
    Ok(config)
}

impl Config {
    /// Returns the server port (default: 8080)
    pub fn server_port(&self) -> u16 {
        self.server
            .as_ref()
            .and_then(|s| s.port)
            .unwrap_or(DEFAULT_SERVER_PORT)
    }

    /// Remote table store credentials, or `None` when not fully configured.
    pub fn store_credentials(&self) -> Option<(&str, &str)> {
        let section = self.store.as_ref()?;
        let url = section.url.as_deref().filter(|s| !s.is_empty())?;
        let api_key = section.api_key.as_deref().filter(|s| !s.is_empty())?;
        Some((url, api_key))
    }

    /// Flag store credentials, or `None` when not fully configured.
    pub fn rate_limit_credentials(&self) -> Option<(&str, &str)> {
        let section = self.rate_limit.as_ref()?;
        let url = section.url.as_deref().filter(|s| !s.is_empty())?;
        let token = section.token.as_deref().filter(|s| !s.is_empty())?;
        Some((url, token))
    }

    /// Rate limit flag TTL (default: 60 seconds)
    pub fn rate_limit_ttl(&self) -> Duration {
        let secs = self
            .rate_limit
            .as_ref()
            .and_then(|s| s.ttl_seconds)
            .unwrap_or(DEFAULT_RATE_LIMIT_TTL_SECS);
        Duration::from_secs(secs)
    }

    /// Trigger secret (default: "dev-secret", for local development only)
    pub fn trigger_secret(&self) -> &str {
        self.verdict
            .as_ref()
            .and_then(|s| s.trigger_secret.as_deref())
            .filter(|s| !s.is_empty())
            .unwrap_or(DEFAULT_TRIGGER_SECRET)
    }
}
