//! Bounded in-memory store: per-entry sliding TTL, absolute cap, and
//! least-recently-used eviction beyond a maximum size (spec §4.5).

use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use flow_domain::FlowAggregate;
use flow_engine::{store::FlowStore, DataAccessError};
use moka::{
    sync::Cache,
    Expiry,
};
use tracing::{debug, trace};

use crate::config::InMemoryStoreConfig;

/// Computes each entry's expiration the way spec §4.5 prescribes:
/// `expireIn = min(ttl, absoluteTtl - age)` when an absolute cap is
/// set, else plain `ttl`. Reads/writes that don't qualify for the
/// configured [`SlidingReset`](crate::config::SlidingReset) policy
/// leave the current deadline untouched by returning the duration moka
/// already computed (`duration_until_expiry`).
struct AggregateExpiry {
    ttl: Duration,
    absolute_ttl: Option<Duration>,
    sliding_enabled: bool,
    sliding_reset: crate::config::SlidingReset,
}

impl AggregateExpiry {
    fn expire_in(&self, aggregate: &FlowAggregate) -> Option<Duration> {
        let Some(absolute_ttl) = self.absolute_ttl else {
            return Some(self.ttl);
        };
        let age = (Utc::now() - aggregate.meta.created_at)
            .to_std()
            .unwrap_or(Duration::ZERO);
        let remaining_abs = absolute_ttl.saturating_sub(age);
        Some(self.ttl.min(remaining_abs))
    }
}

impl Expiry<String, FlowAggregate> for AggregateExpiry {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &FlowAggregate,
        _created_at: Instant,
    ) -> Option<Duration> {
        self.expire_in(value)
    }

    fn expire_after_read(
        &self,
        _key: &String,
        value: &FlowAggregate,
        _read_at: Instant,
        duration_until_expiry: Option<Duration>,
        _last_modified_at: Instant,
    ) -> Option<Duration> {
        if self.sliding_enabled && self.sliding_reset.renews_on_read() {
            self.expire_in(value)
        } else {
            duration_until_expiry
        }
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &FlowAggregate,
        _updated_at: Instant,
        duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        if self.sliding_enabled && self.sliding_reset.renews_on_write() {
            self.expire_in(value)
        } else {
            duration_until_expiry
        }
    }
}

/// A bounded LRU cache of [`FlowAggregate`]s, safe for concurrent
/// readers and writers (backed by `moka::sync::Cache`).
pub struct InMemoryStore {
    cache: Cache<String, FlowAggregate>,
    max_history: usize,
}

impl InMemoryStore {
    #[must_use]
    pub fn new(config: &InMemoryStoreConfig) -> Self {
        let expiry = AggregateExpiry {
            ttl: config.ttl(),
            absolute_ttl: config.absolute_ttl(),
            sliding_enabled: config.sliding_enabled,
            sliding_reset: config.sliding_reset,
        };

        let cache = Cache::builder()
            .max_capacity(config.maximum_size)
            .expire_after(expiry)
            .build();

        Self {
            cache,
            max_history: config.max_history,
        }
    }

    #[must_use]
    pub fn max_history(&self) -> usize {
        self.max_history
    }

    fn partition_of(key: &str) -> Option<&str> {
        // storage key grammar: <flowName>:<ownerId|"anonymous">:<instanceId>
        key.split(':').nth(1)
    }
}

#[async_trait]
impl FlowStore for InMemoryStore {
    async fn save_aggregate(
        &self,
        key: &str,
        aggregate: &FlowAggregate,
    ) -> Result<(), DataAccessError> {
        self.cache.insert(key.to_string(), aggregate.clone());
        trace!(key, "in-memory store: saved aggregate");
        Ok(())
    }

    async fn load_aggregate(&self, key: &str) -> Result<Option<FlowAggregate>, DataAccessError> {
        Ok(self.cache.get(key))
    }

    async fn delete(&self, key: &str) -> Result<(), DataAccessError> {
        self.cache.invalidate(key);
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, DataAccessError> {
        // `contains_key` only peeks presence/expiry; it must not renew
        // a sliding deadline (spec §4.4's consistency contract).
        Ok(self.cache.contains_key(key))
    }

    async fn invalidate_by_partition(&self, partition_key: &str) -> Result<u64, DataAccessError> {
        let keys: Vec<String> = self
            .cache
            .iter()
            .filter(|(k, _)| Self::partition_of(k.as_str()) == Some(partition_key))
            .map(|(k, _)| k.as_str().to_string())
            .collect();

        let count = keys.len() as u64;
        for key in &keys {
            self.cache.invalidate(key);
        }
        debug!(partition_key, count, "in-memory store: invalidated partition");
        Ok(count)
    }

    async fn list_active_flows(
        &self,
        partition_key: &str,
    ) -> Result<Vec<String>, DataAccessError> {
        Ok(self
            .cache
            .iter()
            .filter(|(k, _)| Self::partition_of(k.as_str()) == Some(partition_key))
            .filter_map(|(k, _)| k.as_str().splitn(3, ':').nth(2).map(str::to_string))
            .collect())
    }

    async fn bulk_delete(&self, keys: &[String]) -> Result<u64, DataAccessError> {
        let mut count = 0;
        for key in keys {
            if self.cache.contains_key(key) {
                self.cache.invalidate(key);
                count += 1;
            }
        }
        Ok(count)
    }
}
