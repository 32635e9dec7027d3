//! Process configuration.
//!
//! Loaded once at startup from a JSON file and handed to constructors as an immutable
//! value. Every field has a default, so `{}` is a valid configuration.
//!
//! ```json
//! {
//!   "logger": { "level": "debug" },
//!   "server": { "listen": "0.0.0.0:50051" },
//!   "redis": { "url": "redis://cache:6379", "idle_ttl_secs": 3600 },
//!   "sql_storage": { "dsn": "postgres://bouncer@db/bouncer", "max_connections": 10 },
//!   "leaky_bucket": {
//!     "leak_rate_secs": 60,
//!     "login_capacity": 10,
//!     "password_capacity": 100,
//!     "ip_capacity": 1000,
//!     "key_namespace": "per_dimension"
//!   },
//!   "call_timeout_ms": 250
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::decision::{KeyNamespace, RateLimits};
use crate::rate_limit::leaky_bucket::DEFAULT_MAX_CAS_ATTEMPTS;

/// Errors raised while loading configuration.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggerConfig {
    /// `tracing` filter directive, e.g. `info` or `bouncer=debug`.
    pub level: String,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self { level: "info".into() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { listen: "0.0.0.0:50051".into() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RedisConfig {
    pub url: String,
    /// Expire idle bucket keys after this many seconds. Unset keeps them forever.
    pub idle_ttl_secs: Option<u64>,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self { url: "redis://127.0.0.1:6379".into(), idle_ttl_secs: None }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SqlStorageConfig {
    pub dsn: String,
    pub max_connections: u32,
}

impl Default for SqlStorageConfig {
    fn default() -> Self {
        Self { dsn: "postgres://postgres@127.0.0.1:5432/bouncer".into(), max_connections: 5 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LeakyBucketConfig {
    /// Seconds for a full bucket to drain.
    pub leak_rate_secs: u64,
    pub login_capacity: u32,
    pub password_capacity: u32,
    pub ip_capacity: u32,
    pub key_namespace: KeyNamespace,
    pub max_cas_attempts: usize,
}

impl Default for LeakyBucketConfig {
    fn default() -> Self {
        Self {
            leak_rate_secs: 60,
            login_capacity: 10,
            password_capacity: 100,
            ip_capacity: 1000,
            key_namespace: KeyNamespace::Shared,
            max_cas_attempts: DEFAULT_MAX_CAS_ATTEMPTS,
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BouncerConfig {
    pub logger: LoggerConfig,
    pub server: ServerConfig,
    pub redis: RedisConfig,
    pub sql_storage: SqlStorageConfig,
    pub leaky_bucket: LeakyBucketConfig,
    /// Deadline applied to each command when the caller supplies none.
    pub call_timeout_ms: Option<u64>,
}

impl BouncerConfig {
    /// Parse and validate JSON text.
    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        let cfg: Self = serde_json::from_str(text)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Read, parse and validate a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|source| ConfigError::Io { path: path.to_path_buf(), source })?;
        Self::from_json_str(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let lb = &self.leaky_bucket;
        if lb.leak_rate_secs == 0 {
            return Err(ConfigError::Invalid("leaky_bucket.leak_rate_secs must be greater than zero".into()));
        }
        for (name, cap) in [
            ("login_capacity", lb.login_capacity),
            ("password_capacity", lb.password_capacity),
            ("ip_capacity", lb.ip_capacity),
        ] {
            if cap == 0 {
                return Err(ConfigError::Invalid(format!("leaky_bucket.{name} must be greater than zero")));
            }
        }
        if lb.max_cas_attempts == 0 {
            return Err(ConfigError::Invalid("leaky_bucket.max_cas_attempts must be greater than zero".into()));
        }
        if self.call_timeout_ms == Some(0) {
            return Err(ConfigError::Invalid("call_timeout_ms must be greater than zero".into()));
        }
        Ok(())
    }

    pub fn rate_limits(&self) -> RateLimits {
        let lb = &self.leaky_bucket;
        RateLimits {
            login: lb.login_capacity,
            password: lb.password_capacity,
            ip: lb.ip_capacity,
            leak_rate: Duration::from_secs(lb.leak_rate_secs),
        }
    }

    pub fn call_timeout(&self) -> Option<Duration> {
        self.call_timeout_ms.map(Duration::from_millis)
    }
}
