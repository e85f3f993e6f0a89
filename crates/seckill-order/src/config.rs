//! # Seckill Configuration
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     SECKILL_REDIS_URL=redis://cache:6379                               │
//! │     SECKILL_DATABASE_PATH=/var/lib/seckill/seckill.db                  │
//! │     SECKILL_CONSUMER=worker-a                                          │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/seckill/seckill.toml (Linux)                             │
//! │     ~/Library/Application Support/com.seckill.seckill/seckill.toml     │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! │     consumer "c1", local Redis, ./seckill.db                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! [redis]
//! url = "redis://127.0.0.1:6379"
//!
//! [database]
//! path = "seckill.db"
//! max_connections = 5
//!
//! [queue]
//! stream = "stream.orders"
//! group = "g1"
//! consumer = "c1"
//! block_ms = 2000
//! recovery_backoff_ms = 20
//! max_recovery_backoff_ms = 5000
//! claim_idle_ms = 60000
//!
//! [lock]
//! lease_ms = 30000
//!
//! [ids]
//! order_tag = "order"
//! ```
//!
//! Pending entries belong to a consumer name, so the name is fixed by
//! configuration and never generated. Workers sharing a group need distinct
//! names; entries a retired name leaves behind are claimed by the others
//! once idle for `claim_idle_ms`.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

use crate::error::{SeckillError, SeckillResult};
use seckill_core::ORDER_ID_TAG;
use seckill_db::DbConfig;

// =============================================================================
// Redis Settings
// =============================================================================

/// Key-value store connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisSettings {
    #[serde(default = "default_redis_url")]
    pub url: String,
}

fn default_redis_url() -> String {
    "redis://127.0.0.1:6379".to_string()
}

impl Default for RedisSettings {
    fn default() -> Self {
        RedisSettings {
            url: default_redis_url(),
        }
    }
}

// =============================================================================
// Database Settings
// =============================================================================

/// Relational store connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSettings {
    /// SQLite file, created if missing.
    #[serde(default = "default_database_path")]
    pub path: PathBuf,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_database_path() -> PathBuf {
    PathBuf::from("seckill.db")
}

fn default_max_connections() -> u32 {
    5
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        DatabaseSettings {
            path: default_database_path(),
            max_connections: default_max_connections(),
        }
    }
}

// =============================================================================
// Queue Settings
// =============================================================================

/// Intent stream and worker loop timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueSettings {
    #[serde(default = "default_stream")]
    pub stream: String,

    #[serde(default = "default_group")]
    pub group: String,

    /// This worker's consumer name within the group.
    #[serde(default = "default_consumer")]
    pub consumer: String,

    /// Longest wait of one intake read (milliseconds).
    #[serde(default = "default_block_ms")]
    pub block_ms: u64,

    /// First pause after a failed recovery step (milliseconds). Doubles on
    /// each further failure.
    #[serde(default = "default_recovery_backoff_ms")]
    pub recovery_backoff_ms: u64,

    /// Ceiling of the recovery pause (milliseconds).
    #[serde(default = "default_max_recovery_backoff_ms")]
    pub max_recovery_backoff_ms: u64,

    /// Idle time after which another consumer's pending entry is claimed
    /// (milliseconds).
    #[serde(default = "default_claim_idle_ms")]
    pub claim_idle_ms: u64,
}

fn default_stream() -> String {
    "stream.orders".to_string()
}

fn default_group() -> String {
    "g1".to_string()
}

fn default_consumer() -> String {
    "c1".to_string()
}

fn default_block_ms() -> u64 {
    2000
}

fn default_recovery_backoff_ms() -> u64 {
    20
}

fn default_max_recovery_backoff_ms() -> u64 {
    5_000
}

fn default_claim_idle_ms() -> u64 {
    60_000
}

impl Default for QueueSettings {
    fn default() -> Self {
        QueueSettings {
            stream: default_stream(),
            group: default_group(),
            consumer: default_consumer(),
            block_ms: default_block_ms(),
            recovery_backoff_ms: default_recovery_backoff_ms(),
            max_recovery_backoff_ms: default_max_recovery_backoff_ms(),
            claim_idle_ms: default_claim_idle_ms(),
        }
    }
}

impl QueueSettings {
    pub fn block(&self) -> Duration {
        Duration::from_millis(self.block_ms)
    }

    pub fn recovery_backoff(&self) -> Duration {
        Duration::from_millis(self.recovery_backoff_ms)
    }

    pub fn max_recovery_backoff(&self) -> Duration {
        Duration::from_millis(self.max_recovery_backoff_ms)
    }

    pub fn claim_idle(&self) -> Duration {
        Duration::from_millis(self.claim_idle_ms)
    }
}

// =============================================================================
// Lock Settings
// =============================================================================

/// Per-user order lock.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockSettings {
    /// Lease of one acquisition (milliseconds).
    #[serde(default = "default_lease_ms")]
    pub lease_ms: u64,
}

fn default_lease_ms() -> u64 {
    30_000
}

impl Default for LockSettings {
    fn default() -> Self {
        LockSettings {
            lease_ms: default_lease_ms(),
        }
    }
}

impl LockSettings {
    pub fn lease(&self) -> Duration {
        Duration::from_millis(self.lease_ms)
    }
}

// =============================================================================
// Id Settings
// =============================================================================

/// Order id generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdSettings {
    /// Business tag of the order id counter.
    #[serde(default = "default_order_tag")]
    pub order_tag: String,
}

fn default_order_tag() -> String {
    ORDER_ID_TAG.to_string()
}

impl Default for IdSettings {
    fn default() -> Self {
        IdSettings {
            order_tag: default_order_tag(),
        }
    }
}

// =============================================================================
// Main Configuration
// =============================================================================

/// Complete seckill configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SeckillConfig {
    #[serde(default)]
    pub redis: RedisSettings,

    #[serde(default)]
    pub database: DatabaseSettings,

    #[serde(default)]
    pub queue: QueueSettings,

    #[serde(default)]
    pub lock: LockSettings,

    #[serde(default)]
    pub ids: IdSettings,
}

impl SeckillConfig {
    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (seckill.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> SeckillResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading seckill config from file");
                config = Self::read_file(&path)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Validates the configuration.
    pub fn validate(&self) -> SeckillResult<()> {
        if !self.redis.url.starts_with("redis://") && !self.redis.url.starts_with("rediss://") {
            return Err(SeckillError::InvalidConfig(format!(
                "Redis URL must start with redis:// or rediss://, got: {}",
                self.redis.url
            )));
        }

        if self.database.max_connections == 0 {
            return Err(SeckillError::InvalidConfig(
                "max_connections must be greater than 0".into(),
            ));
        }

        for (name, value) in [
            ("stream", &self.queue.stream),
            ("group", &self.queue.group),
            ("consumer", &self.queue.consumer),
            ("order_tag", &self.ids.order_tag),
        ] {
            if value.trim().is_empty() {
                return Err(SeckillError::InvalidConfig(format!("{name} must not be empty")));
            }
        }

        if self.queue.recovery_backoff_ms == 0
            || self.queue.max_recovery_backoff_ms < self.queue.recovery_backoff_ms
        {
            return Err(SeckillError::InvalidConfig(
                "recovery backoff must be positive and not exceed its maximum".into(),
            ));
        }

        if self.queue.claim_idle_ms == 0 {
            return Err(SeckillError::InvalidConfig(
                "claim_idle_ms must be greater than 0".into(),
            ));
        }

        if self.lock.lease_ms == 0 {
            return Err(SeckillError::InvalidConfig(
                "lease_ms must be greater than 0".into(),
            ));
        }

        Ok(())
    }

    /// Returns the default config file path.
    pub fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "seckill", "seckill")
            .map(|dirs| dirs.config_dir().join("seckill.toml"))
    }

    /// Database pool settings derived from `[database]`.
    pub fn db_config(&self) -> DbConfig {
        DbConfig::new(self.database.path.clone()).max_connections(self.database.max_connections)
    }

    fn read_file(path: &Path) -> SeckillResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&contents)?)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("SECKILL_REDIS_URL") {
            debug!("Overriding Redis URL from environment");
            self.redis.url = url;
        }

        if let Ok(path) = std::env::var("SECKILL_DATABASE_PATH") {
            debug!(path = %path, "Overriding database path from environment");
            self.database.path = PathBuf::from(path);
        }

        if let Ok(consumer) = std::env::var("SECKILL_CONSUMER") {
            debug!(consumer = %consumer, "Overriding consumer name from environment");
            self.queue.consumer = consumer;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SeckillConfig::default();

        assert_eq!(config.queue.consumer, "c1");
        assert_eq!(config.queue.stream, "stream.orders");
        assert_eq!(config.queue.group, "g1");
        assert_eq!(config.queue.block(), Duration::from_secs(2));
        assert_eq!(config.queue.recovery_backoff(), Duration::from_millis(20));
        assert_eq!(config.queue.max_recovery_backoff(), Duration::from_secs(5));
        assert_eq!(config.queue.claim_idle(), Duration::from_secs(60));
        assert_eq!(config.lock.lease(), Duration::from_secs(30));
        assert_eq!(config.ids.order_tag, "order");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_consumer_name_is_stable_across_loads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("seckill.toml");
        std::fs::write(&path, "[redis]\nurl = \"redis://cache:6379\"\n").unwrap();

        let first = SeckillConfig::load(Some(path.clone())).unwrap();
        let second = SeckillConfig::load(Some(path)).unwrap();

        assert_eq!(first.redis.url, "redis://cache:6379");
        assert_eq!(first.queue.consumer, second.queue.consumer);
        assert_eq!(first.queue.consumer, SeckillConfig::default().queue.consumer);
    }

    #[test]
    fn test_config_validation() {
        let mut config = SeckillConfig::default();

        config.redis.url = "http://localhost".to_string();
        assert!(config.validate().is_err());

        config.redis.url = "redis://localhost:6379".to_string();
        config.queue.consumer = "  ".to_string();
        assert!(config.validate().is_err());

        config.queue.consumer = "c2".to_string();
        config.lock.lease_ms = 0;
        assert!(config.validate().is_err());

        config.lock.lease_ms = 1000;
        config.queue.max_recovery_backoff_ms = 10;
        assert!(config.validate().is_err());

        config.queue.max_recovery_backoff_ms = 1000;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("seckill.toml");
        std::fs::write(
            &path,
            "[queue]\nconsumer = \"worker-a\"\nblock_ms = 500\n\n[lock]\nlease_ms = 1000\n",
        )
        .unwrap();

        let config = SeckillConfig::read_file(&path).unwrap();

        assert_eq!(config.queue.consumer, "worker-a");
        assert_eq!(config.queue.block_ms, 500);
        assert_eq!(config.queue.group, "g1");
        assert_eq!(config.lock.lease_ms, 1000);
        assert_eq!(config.database.max_connections, 5);
    }

    #[test]
    fn test_invalid_toml_fails_to_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("seckill.toml");
        std::fs::write(&path, "[queue\nblock_ms = ").unwrap();

        let err = SeckillConfig::read_file(&path).unwrap_err();
        assert!(err.is_config_error());
    }
}
