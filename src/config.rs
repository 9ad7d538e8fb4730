//! Configuration for Mirror.
//!
//! Values are layered: built-in defaults, then an optional TOML file with
//! `${VAR}` substitution, then environment overrides.
//!
//! # Example
//!
//! ```toml
//! [server]
//! port = 8090
//!
//! [redis]
//! addr = "localhost:6379"
//! password = "${REDIS_PASSWORD}"
//! db = 0
//!
//! [queue]
//! stream = "messages:events"
//! consumer_group = "mirror"
//! ```
//!
//! # Environment
//!
//! - `MIRROR_CONFIG`: config file path (default: `config/mirror.toml`)
//! - `PORT`: HTTP port
//! - `REDIS_ADDR`, `REDIS_PASSWORD`, `REDIS_DB`: record store connection
//! - `QUEUE_URL`: event broker URL (default: the record store's Redis)
//! - `QUEUE_STREAM`, `QUEUE_CONSUMER_GROUP`, `QUEUE_CONSUMER_NAME`

use regex::Regex;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;
use std::sync::OnceLock;
use thiserror::Error;
use tracing::{debug, info};

use crate::{DEFAULT_CONSUMER_GROUP, DEFAULT_EVENT_STREAM};

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    ValidationError(String),
}

/// Root configuration structure
#[derive(Debug, Deserialize, Clone, Default, PartialEq, Eq)]
pub struct MirrorConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub redis: RedisConfig,

    #[serde(default)]
    pub queue: QueueConfig,
}

/// HTTP server configuration
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
        }
    }
}

fn default_port() -> u16 {
    8090
}

/// Record store connection
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct RedisConfig {
    #[serde(default = "default_redis_addr")]
    pub addr: String,

    #[serde(default)]
    pub password: Option<String>,

    /// Database (namespace) index
    #[serde(default)]
    pub db: i64,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            addr: default_redis_addr(),
            password: None,
            db: 0,
        }
    }
}

fn default_redis_addr() -> String {
    "localhost:6379".to_string()
}

impl RedisConfig {
    /// Connection URL, e.g. `redis://:secret@localhost:6379/2`.
    ///
    /// The password is percent-encoded; the client decodes it back.
    pub fn connection_url(&self) -> String {
        match self.password.as_deref().filter(|p| !p.is_empty()) {
            Some(password) => format!(
                "redis://:{}@{}/{}",
                urlencoding::encode(password),
                self.addr,
                self.db
            ),
            None => format!("redis://{}/{}", self.addr, self.db),
        }
    }
}

/// Event queue configuration
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct QueueConfig {
    /// Broker URL; falls back to the record store's Redis
    #[serde(default)]
    pub url: Option<String>,

    #[serde(default = "default_stream")]
    pub stream: String,

    #[serde(default = "default_consumer_group")]
    pub consumer_group: String,

    #[serde(default)]
    pub consumer_name: Option<String>,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            url: None,
            stream: default_stream(),
            consumer_group: default_consumer_group(),
            consumer_name: None,
        }
    }
}

fn default_stream() -> String {
    DEFAULT_EVENT_STREAM.to_string()
}

fn default_consumer_group() -> String {
    DEFAULT_CONSUMER_GROUP.to_string()
}

impl QueueConfig {
    /// Consumer name from config, else `mirror-{hostname}`, else `mirror-{uuid}`.
    pub fn consumer_name(&self) -> String {
        if let Some(name) = &self.consumer_name {
            return name.clone();
        }

        if let Ok(hostname) = hostname::get() {
            if let Some(name) = hostname.to_str() {
                return format!("mirror-{}", name);
            }
        }

        format!("mirror-{}", uuid::Uuid::new_v4())
    }
}

impl MirrorConfig {
    /// Load from `MIRROR_CONFIG` (or the default path), then apply the
    /// process environment.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path =
            env::var("MIRROR_CONFIG").unwrap_or_else(|_| "config/mirror.toml".to_string());

        let mut config = Self::load_from(&config_path)?;
        config.apply_overrides(|key| env::var(key).ok())?;
        Ok(config)
    }

    /// Load configuration from a specific path; a missing file yields defaults.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        if !path.exists() {
            info!(
                path = %path.display(),
                "Config file not found, using defaults"
            );
            return Ok(Self::default());
        }

        info!(path = %path.display(), "Loading configuration");

        let content = fs::read_to_string(path)?;
        let content = substitute_env_vars(&content);

        debug!("Parsing TOML configuration");
        let config: MirrorConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Apply overrides looked up by environment variable name.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(port) = lookup("PORT").filter(|p| !p.is_empty()) {
            self.server.port = port
                .parse()
                .map_err(|_| ConfigError::ValidationError(format!("PORT is not a port: {port}")))?;
        }
        if let Some(addr) = lookup("REDIS_ADDR").filter(|a| !a.is_empty()) {
            self.redis.addr = addr;
        }
        if let Some(password) = lookup("REDIS_PASSWORD") {
            self.redis.password = Some(password);
        }
        if let Some(db) = lookup("REDIS_DB").filter(|d| !d.is_empty()) {
            self.redis.db = db.parse().map_err(|_| {
                ConfigError::ValidationError(format!("REDIS_DB is not an integer: {db}"))
            })?;
        }
        if let Some(url) = lookup("QUEUE_URL").filter(|u| !u.is_empty()) {
            self.queue.url = Some(url);
        }
        if let Some(stream) = lookup("QUEUE_STREAM").filter(|s| !s.is_empty()) {
            self.queue.stream = stream;
        }
        if let Some(group) = lookup("QUEUE_CONSUMER_GROUP").filter(|g| !g.is_empty()) {
            self.queue.consumer_group = group;
        }
        if let Some(name) = lookup("QUEUE_CONSUMER_NAME").filter(|n| !n.is_empty()) {
            self.queue.consumer_name = Some(name);
        }

        self.validate()
    }

    /// Broker URL for the event stream.
    pub fn queue_url(&self) -> String {
        self.queue
            .url
            .clone()
            .unwrap_or_else(|| self.redis.connection_url())
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.redis.addr.is_empty() {
            return Err(ConfigError::ValidationError(
                "Redis address must not be empty".to_string(),
            ));
        }
        if self.redis.db < 0 {
            return Err(ConfigError::ValidationError(format!(
                "Redis db index must not be negative: {}",
                self.redis.db
            )));
        }
        if self.queue.stream.is_empty() || self.queue.consumer_group.is_empty() {
            return Err(ConfigError::ValidationError(
                "Queue stream and consumer group must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

fn env_var_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("valid env var pattern")
    })
}

/// Substitute environment variables in the format ${VAR_NAME}
fn substitute_env_vars(content: &str) -> String {
    env_var_pattern()
        .replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            match env::var(var_name) {
                Ok(value) => value,
                Err(_) => {
                    debug!(var = %var_name, "Environment variable not set, keeping placeholder");
                    caps[0].to_string()
                }
            }
        })
        .to_string()
}
