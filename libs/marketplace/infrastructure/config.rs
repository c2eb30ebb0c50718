use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load config file: {0}")]
    FileError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Environment variable not found: {0}")]
    EnvVarMissing(String),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Realtime client configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RealtimeConfig {
    #[serde(default)]
    pub socket: SocketConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub presence: PresenceConfig,
    #[serde(default)]
    pub notifications: NotificationsConfig,

    /// Bearer token from .env (not in YAML)
    #[serde(skip)]
    pub access_token: String,

    /// Signed-in user from .env (not in YAML)
    #[serde(skip)]
    pub user_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SocketConfig {
    /// Base URL; each namespace connects to `<url>/<namespace>`
    #[serde(default = "default_socket_url")]
    pub url: String,
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_secs: u64,
    #[serde(default = "default_handshake_timeout")]
    pub handshake_timeout_secs: u64,
    #[serde(default = "default_backoff_base")]
    pub backoff_base_ms: u64,
    #[serde(default = "default_backoff_cap")]
    pub backoff_cap_ms: u64,
    /// Give up after this many consecutive failures (unlimited when absent)
    #[serde(default)]
    pub max_reconnect_attempts: Option<u32>,
}

impl Default for SocketConfig {
    fn default() -> Self {
        Self {
            url: default_socket_url(),
            heartbeat_interval_secs: default_heartbeat_interval(),
            handshake_timeout_secs: default_handshake_timeout(),
            backoff_base_ms: default_backoff_base(),
            backoff_cap_ms: default_backoff_cap(),
            max_reconnect_attempts: None,
        }
    }
}

impl SocketConfig {
    pub fn namespace_url(&self, namespace: &str) -> String {
        format!("{}/{}", self.url.trim_end_matches('/'), namespace)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_secs(self.handshake_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_api_url")]
    pub base_url: String,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_api_url(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresenceConfig {
    #[serde(default = "default_presence_timeout")]
    pub timeout_secs: u64,
    /// How often timed-out users are swept to offline
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_presence_timeout(),
            sweep_interval_secs: default_sweep_interval(),
        }
    }
}

impl PresenceConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationsConfig {
    #[serde(default = "default_unread_poll")]
    pub unread_poll_interval_secs: u64,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

impl Default for NotificationsConfig {
    fn default() -> Self {
        Self {
            unread_poll_interval_secs: default_unread_poll(),
            page_size: default_page_size(),
        }
    }
}

impl NotificationsConfig {
    pub fn unread_poll_interval(&self) -> Duration {
        Duration::from_secs(self.unread_poll_interval_secs)
    }
}

fn default_socket_url() -> String {
    "ws://localhost:8000/ws".to_string()
}

fn default_heartbeat_interval() -> u64 {
    25
}

fn default_handshake_timeout() -> u64 {
    10
}

fn default_backoff_base() -> u64 {
    1_000
}

fn default_backoff_cap() -> u64 {
    30_000
}

fn default_api_url() -> String {
    "http://localhost:8000/api".to_string()
}

fn default_request_timeout() -> u64 {
    15
}

fn default_presence_timeout() -> u64 {
    45
}

fn default_sweep_interval() -> u64 {
    5
}

fn default_unread_poll() -> u64 {
    10
}

fn default_page_size() -> u32 {
    20
}

impl RealtimeConfig {
    /// Load configuration from YAML file and .env
    pub fn load(config_path: impl AsRef<Path>) -> Result<Self> {
        // Load YAML config
        let yaml_content = std::fs::read_to_string(config_path)?;
        let mut config = Self::from_yaml_str(&yaml_content)?;

        // Load .env file
        dotenv::dotenv().ok(); // Don't fail if .env doesn't exist

        config.access_token = std::env::var("ACCESS_TOKEN")
            .map_err(|_| ConfigError::EnvVarMissing("ACCESS_TOKEN".to_string()))?;
        config.user_id = std::env::var("USER_ID")
            .map_err(|_| ConfigError::EnvVarMissing("USER_ID".to_string()))?;

        if let Ok(url) = std::env::var("SOCKET_URL") {
            info!("Overriding socket URL from environment variable");
            config.socket.url = url;
        }
        if let Ok(url) = std::env::var("API_BASE_URL") {
            info!("Overriding API base URL from environment variable");
            config.api.base_url = url;
        }

        config.validate()?;

        Ok(config)
    }

    /// Parse YAML without touching the environment or validating credentials
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        // An empty document means "all defaults"
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.socket.url.is_empty() {
            return Err(ConfigError::ValidationError(
                "socket.url must not be empty".to_string(),
            ));
        }
        if !(self.socket.url.starts_with("ws://") || self.socket.url.starts_with("wss://")) {
            return Err(ConfigError::ValidationError(
                "socket.url must start with ws:// or wss://".to_string(),
            ));
        }
        if self.api.base_url.is_empty() {
            return Err(ConfigError::ValidationError(
                "api.base_url must not be empty".to_string(),
            ));
        }

        let intervals = [
            ("socket.heartbeat_interval_secs", self.socket.heartbeat_interval_secs),
            ("socket.handshake_timeout_secs", self.socket.handshake_timeout_secs),
            ("socket.backoff_base_ms", self.socket.backoff_base_ms),
            ("api.request_timeout_secs", self.api.request_timeout_secs),
            ("presence.timeout_secs", self.presence.timeout_secs),
            ("presence.sweep_interval_secs", self.presence.sweep_interval_secs),
            (
                "notifications.unread_poll_interval_secs",
                self.notifications.unread_poll_interval_secs,
            ),
        ];
        for (name, value) in intervals {
            if value == 0 {
                return Err(ConfigError::ValidationError(format!(
                    "{} must be greater than 0",
                    name
                )));
            }
        }

        if self.socket.backoff_cap_ms < self.socket.backoff_base_ms {
            return Err(ConfigError::ValidationError(
                "socket.backoff_cap_ms must be >= socket.backoff_base_ms".to_string(),
            ));
        }
        if self.notifications.page_size == 0 {
            return Err(ConfigError::ValidationError(
                "notifications.page_size must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Log configuration summary
    pub fn log(&self) {
        info!("Configuration loaded:");
        info!("  Socket: {}", self.socket.url);
        info!("  API: {}", self.api.base_url);
        info!(
            "  Backoff: {}ms base, {}ms cap",
            self.socket.backoff_base_ms, self.socket.backoff_cap_ms
        );
        info!("  Presence timeout: {}s", self.presence.timeout_secs);
        info!(
            "  Unread poll: {}s",
            self.notifications.unread_poll_interval_secs
        );
        info!("  User: {}", self.user_id);
    }
}
