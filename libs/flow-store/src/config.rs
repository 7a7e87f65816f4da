//! Configuration surface for both store backends (spec §4.5/§4.6/§6).

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Which access(es) renew an entry's sliding deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SlidingReset {
    OnRead,
    OnWrite,
    OnReadAndWrite,
}

impl Default for SlidingReset {
    fn default() -> Self {
        Self::OnRead
    }
}

impl SlidingReset {
    #[must_use]
    pub fn renews_on_read(self) -> bool {
        matches!(self, Self::OnRead | Self::OnReadAndWrite)
    }

    #[must_use]
    pub fn renews_on_write(self) -> bool {
        matches!(self, Self::OnWrite | Self::OnReadAndWrite)
    }
}

fn default_sliding_enabled() -> bool {
    false
}

fn default_ttl_seconds() -> u64 {
    3600
}

fn default_absolute_ttl_seconds() -> u64 {
    0
}

fn default_max_size() -> u64 {
    10_000
}

fn default_max_history() -> usize {
    flow_domain::DEFAULT_MAX_HISTORY
}

/// Configuration for the in-memory store (spec §4.5/§6).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InMemoryStoreConfig {
    /// Base TTL, applied on creation and (per `sliding_reset`) renewed
    /// on access. Default 1h.
    pub ttl_seconds: u64,
    /// Absolute cap on total lifetime; 0 disables the cap.
    pub absolute_ttl_seconds: u64,
    /// Bounded-cache capacity; least-recently-used entries are evicted
    /// beyond this, independent of TTL.
    pub maximum_size: u64,
    pub sliding_enabled: bool,
    pub sliding_reset: SlidingReset,
    /// Snapshot history retained per aggregate (spec §9: a default, not
    /// a contract).
    pub max_history: usize,
}

impl Default for InMemoryStoreConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: default_ttl_seconds(),
            absolute_ttl_seconds: default_absolute_ttl_seconds(),
            maximum_size: default_max_size(),
            sliding_enabled: default_sliding_enabled(),
            sliding_reset: SlidingReset::default(),
            max_history: default_max_history(),
        }
    }
}

impl InMemoryStoreConfig {
    #[must_use]
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds)
    }

    #[must_use]
    pub fn absolute_ttl(&self) -> Option<Duration> {
        (self.absolute_ttl_seconds > 0).then(|| Duration::from_secs(self.absolute_ttl_seconds))
    }

    /// Load from `FLOWSENTINEL_MEMORY_*` environment variables, falling
    /// back to documented defaults.
    pub fn from_env() -> Result<Self, flow_common::ConfigError> {
        flow_common::load_prefixed("FLOWSENTINEL_MEMORY")
    }
}

/// How the Redis store obtains its connection pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RedisConnectionMode {
    /// Reuse an ambient pool the caller already constructed.
    #[default]
    Shared,
    /// Build a dedicated pool from this config's own connection fields.
    Dedicated,
}

/// Configuration for the Redis-backed store (spec §4.6/§6).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RedisStoreConfig {
    /// Key namespace prefix; must end in a delimiter. Default `fs:flow:`.
    pub namespace: String,
    pub ttl_seconds: u64,
    pub absolute_ttl_seconds: u64,
    pub sliding_enabled: bool,
    pub sliding_reset: SlidingReset,
    pub max_history: usize,
    pub mode: RedisConnectionMode,
    pub host: String,
    pub port: u16,
    pub database: i64,
    pub password: Option<String>,
    pub command_timeout_ms: u64,
    pub connect_timeout_ms: u64,
}

impl Default for RedisStoreConfig {
    fn default() -> Self {
        Self {
            namespace: "fs:flow:".to_string(),
            ttl_seconds: default_ttl_seconds(),
            absolute_ttl_seconds: default_absolute_ttl_seconds(),
            sliding_enabled: default_sliding_enabled(),
            sliding_reset: SlidingReset::default(),
            max_history: default_max_history(),
            mode: RedisConnectionMode::default(),
            host: "127.0.0.1".to_string(),
            port: 6379,
            database: 0,
            password: None,
            command_timeout_ms: 2_000,
            connect_timeout_ms: 2_000,
        }
    }
}

impl RedisStoreConfig {
    #[must_use]
    pub fn ttl_duration(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds)
    }

    #[must_use]
    pub fn absolute_ttl(&self) -> Option<Duration> {
        (self.absolute_ttl_seconds > 0).then(|| Duration::from_secs(self.absolute_ttl_seconds))
    }

    /// A `redis://` URL built from `host`/`port`/`database`/`password`,
    /// for [`RedisConnectionMode::Dedicated`].
    #[must_use]
    pub fn connection_url(&self) -> String {
        match &self.password {
            Some(password) => format!(
                "redis://:{password}@{}:{}/{}",
                self.host, self.port, self.database
            ),
            None => format!("redis://{}:{}/{}", self.host, self.port, self.database),
        }
    }

    /// Load from `FLOWSENTINEL_REDIS_*` environment variables, falling
    /// back to documented defaults.
    pub fn from_env() -> Result<Self, flow_common::ConfigError> {
        flow_common::load_prefixed("FLOWSENTINEL_REDIS")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_memory_defaults_match_spec() {
        let cfg = InMemoryStoreConfig::default();
        assert_eq!(cfg.ttl_seconds, 3600);
        assert_eq!(cfg.absolute_ttl_seconds, 0);
        assert_eq!(cfg.maximum_size, 10_000);
        assert!(!cfg.sliding_enabled);
        assert_eq!(cfg.sliding_reset, SlidingReset::OnRead);
        assert!(cfg.absolute_ttl().is_none());
    }

    #[test]
    fn redis_defaults_match_spec() {
        let cfg = RedisStoreConfig::default();
        assert_eq!(cfg.namespace, "fs:flow:");
        assert_eq!(cfg.mode, RedisConnectionMode::Shared);
    }

    #[test]
    fn connection_url_without_password() {
        let cfg = RedisStoreConfig {
            host: "redis.internal".to_string(),
            port: 6380,
            database: 2,
            ..Default::default()
        };
        assert_eq!(cfg.connection_url(), "redis://redis.internal:6380/2");
    }

    #[test]
    fn sliding_reset_policy_membership() {
        assert!(SlidingReset::OnRead.renews_on_read());
        assert!(!SlidingReset::OnRead.renews_on_write());
        assert!(SlidingReset::OnReadAndWrite.renews_on_read());
        assert!(SlidingReset::OnReadAndWrite.renews_on_write());
    }
}
