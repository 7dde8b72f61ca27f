//! Configuration System
//!
//! Handles loading configuration from files and environment variables.
//! Supports TOML config files and environment variable overrides.
//!
//! The loaded `Config` is built once in `main` and passed down explicitly;
//! nothing in the crate reads configuration from global state.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::hub::HubConfig;

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub hub: HubConfig,

    #[serde(default)]
    pub redis: RedisConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// HTTP / WebSocket server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Room used when a connection does not name one
    #[serde(default = "default_room")]
    pub default_room: String,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_room() -> String {
    "General".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            default_room: default_room(),
        }
    }
}

impl ServerConfig {
    /// Get the socket address string
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Resolve the room requested by a connection
    pub fn resolve_room(&self, requested: Option<&str>) -> String {
        match requested {
            Some(room) if !room.is_empty() => room.to_string(),
            _ => self.default_room.clone(),
        }
    }
}

/// Redis fanout bridge and presence configuration
#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_redis_url")]
    pub url: String,

    /// Prefix of the per-room pub/sub channels
    #[serde(default = "default_channel_prefix")]
    pub channel_prefix: String,

    /// Set of non-empty room names
    #[serde(default = "default_rooms_key")]
    pub rooms_key: String,

    /// Hash of room name -> approximate member count
    #[serde(default = "default_members_key")]
    pub members_key: String,

    /// Upper bound on any single Redis operation
    #[serde(default = "default_op_timeout")]
    pub op_timeout_ms: u64,

    /// Pending publishes / presence updates before new ones are dropped
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Track room presence in Redis (requires `enabled`)
    #[serde(default = "default_presence_enabled")]
    pub presence: bool,
}

fn default_redis_url() -> String {
    "redis://127.0.0.1:6379".to_string()
}

fn default_channel_prefix() -> String {
    "chat:".to_string()
}

fn default_rooms_key() -> String {
    "rooms".to_string()
}

fn default_members_key() -> String {
    "room:members".to_string()
}

fn default_op_timeout() -> u64 {
    500
}

fn default_queue_capacity() -> usize {
    1024
}

fn default_presence_enabled() -> bool {
    true
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            url: default_redis_url(),
            channel_prefix: default_channel_prefix(),
            rooms_key: default_rooms_key(),
            members_key: default_members_key(),
            op_timeout_ms: default_op_timeout(),
            queue_capacity: default_queue_capacity(),
            presence: default_presence_enabled(),
        }
    }
}

impl RedisConfig {
    pub fn op_timeout(&self) -> Duration {
        Duration::from_millis(self.op_timeout_ms)
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl LoggingConfig {
    pub fn is_json(&self) -> bool {
        self.format.eq_ignore_ascii_case("json")
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        Self::parse(&content).map_err(|error| ConfigError::Parse {
            path: path.to_path_buf(),
            error,
        })
    }

    fn parse(content: &str) -> Result<Self, String> {
        toml::from_str(content).map_err(|e| e.to_string())
    }

    /// Load configuration from environment variables only
    pub fn from_env() -> Self {
        let mut config = Config::default();
        config.apply_env_overrides();
        config
    }

    /// Load configuration with environment variable overrides
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load from default locations or environment
    pub fn load_default() -> Self {
        let config_paths = [
            dirs::config_dir().map(|p| p.join("roomcast").join("config.toml")),
            Some(PathBuf::from("/etc/roomcast/config.toml")),
            Some(PathBuf::from("./config.toml")),
        ];

        for path_opt in config_paths.iter().flatten() {
            if path_opt.exists() {
                match Self::load_with_env(path_opt) {
                    Ok(config) => {
                        tracing::info!("Loaded config from {:?}", path_opt);
                        return config;
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load config from {:?}: {}", path_opt, e);
                    }
                }
            }
        }

        tracing::info!("Using default config with environment overrides");
        Self::from_env()
    }

    /// Apply environment variable overrides to an existing config
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        // Server overrides
        if let Some(host) = lookup("ROOMCAST_HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("ROOMCAST_PORT").and_then(|p| p.parse().ok()) {
            self.server.port = port;
        }
        if let Some(room) = lookup("ROOMCAST_DEFAULT_ROOM").filter(|r| !r.is_empty()) {
            self.server.default_room = room;
        }

        // Hub overrides
        if let Some(capacity) = lookup("ROOMCAST_OUTBOUND_CAPACITY").and_then(|c| c.parse().ok()) {
            self.hub.outbound_capacity = capacity;
        }

        // Redis overrides
        if let Some(url) = lookup("ROOMCAST_REDIS_URL") {
            self.redis.url = url;
        }
        if let Some(enabled) = lookup("ROOMCAST_REDIS_ENABLED") {
            self.redis.enabled = parse_flag(&enabled);
        }

        // Logging overrides
        if let Some(level) = lookup("ROOMCAST_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = lookup("ROOMCAST_LOG_FORMAT") {
            self.logging.format = format;
        }
    }
}

fn parse_flag(value: &str) -> bool {
    !matches!(value.to_lowercase().as_str(), "false" | "0" | "no" | "off" | "")
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {error}")]
    Io { path: PathBuf, error: String },

    #[error("Failed to parse config file {path:?}: {error}")]
    Parse { path: PathBuf, error: String },
}

/// Generate a default config file content
pub fn generate_default_config() -> String {
    r#"# Roomcast Configuration
#
# Environment variables override these settings:
# - ROOMCAST_HOST
# - ROOMCAST_PORT
# - ROOMCAST_DEFAULT_ROOM
# - ROOMCAST_OUTBOUND_CAPACITY
# - ROOMCAST_REDIS_URL
# - ROOMCAST_REDIS_ENABLED
# - ROOMCAST_LOG_LEVEL
# - ROOMCAST_LOG_FORMAT

[server]
# Server host
host = "0.0.0.0"

# Server port
port = 8000

# Room for connections that do not pass ?room=
default_room = "General"

[hub]
# Pending join/leave/broadcast requests before submitters wait
command_capacity = 4096

# Per-connection outbound queue bound; a full queue evicts the connection
outbound_capacity = 256

[redis]
# Enable cross-instance fanout over Redis pub/sub
enabled = false

# Redis server URL
url = "redis://127.0.0.1:6379"

# Per-room channel is <channel_prefix><room>
channel_prefix = "chat:"

# Track non-empty rooms and member counts in Redis
presence = true
rooms_key = "rooms"
members_key = "room:members"

# Upper bound on a single Redis operation (ms)
op_timeout_ms = 500

# Pending publishes before new ones are dropped
queue_capacity = 1024

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log format: pretty (for development) or json (for production)
format = "pretty"
"#
    .to_string()
}
