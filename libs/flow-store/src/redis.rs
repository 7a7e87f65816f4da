//! Redis-backed store: JSON-encoded aggregates, sliding TTL bounded by
//! an absolute cap, and atomic bulk deletion via a server-side script
//! (spec §4.6).

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use deadpool_redis::redis::{AsyncCommands, Script};
use deadpool_redis::{Config as PoolConfig, Pool, Runtime};
use flow_domain::{FlowAggregate, ANONYMOUS_OWNER};
use flow_engine::{store::FlowStore, DataAccessError};
use tracing::{debug, error, trace};

use crate::config::RedisStoreConfig;

/// A single server-side script deleting every key it is given,
/// returning the count actually removed. Used by both `bulk_delete`
/// and `invalidate_by_partition` so the deletion itself is atomic
/// regardless of how many keys are enumerated beforehand.
const BULK_DELETE_SCRIPT: &str = r"
local count = 0
for _, key in ipairs(KEYS) do
    count = count + redis.call('DEL', key)
end
return count
";

/// JSON-encoded [`FlowAggregate`] storage over a Redis connection pool.
pub struct RedisStore {
    pool: Pool,
    namespace: String,
    ttl: Duration,
    absolute_ttl: Option<Duration>,
    sliding_enabled: bool,
    sliding_reset: crate::config::SlidingReset,
    max_history: usize,
}

impl RedisStore {
    /// Build a dedicated connection pool from `config`'s own
    /// connection fields (spec §4.6/§9: the `dedicated` mode).
    pub fn connect(config: &RedisStoreConfig) -> Result<Self, DataAccessError> {
        let pool_config = PoolConfig::from_url(config.connection_url());
        let pool = pool_config
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|err| {
                error!(error = %err, "redis store: failed to create connection pool");
                DataAccessError::new("<connect>", "failed to create Redis pool").with_source(err)
            })?;
        Ok(Self::with_pool(pool, config))
    }

    /// Wrap an already-constructed pool (spec §4.6/§9: the `shared`
    /// mode, reusing an ambient connection the caller owns).
    #[must_use]
    pub fn with_pool(pool: Pool, config: &RedisStoreConfig) -> Self {
        Self {
            pool,
            namespace: config.namespace.clone(),
            ttl: config.ttl_duration(),
            absolute_ttl: config.absolute_ttl(),
            sliding_enabled: config.sliding_enabled,
            sliding_reset: config.sliding_reset,
            max_history: config.max_history,
        }
    }

    #[must_use]
    pub fn max_history(&self) -> usize {
        self.max_history
    }

    /// Builds the Redis key for a `FlowStore` storage key
    /// (`<flowName>:<ownerId|"anonymous">:<instanceId>`), per the
    /// grammar in spec §4.6/§6: `<namespace><partition>:<instance>:agg`
    /// when the storage key carries a partition (its owner segment),
    /// else `<namespace><instance>:agg`. The owner segment doubles as
    /// the partition here since the flat storage-key string is all the
    /// store ever sees (no separate `FlowContext` at this layer).
    fn redis_key(&self, storage_key: &str) -> String {
        match Self::split_storage_key(storage_key) {
            Some((_, Some(partition), instance)) => {
                format!("{}{partition}:{instance}:agg", self.namespace)
            }
            Some((_, None, instance)) => format!("{}{instance}:agg", self.namespace),
            None => format!("{}{storage_key}:agg", self.namespace),
        }
    }

    /// Splits a `<flowName>:<ownerId|"anonymous">:<instanceId>` storage
    /// key into `(flowName, partition, instanceId)`, where `partition`
    /// is `None` for the anonymous owner.
    fn split_storage_key(storage_key: &str) -> Option<(&str, Option<&str>, &str)> {
        let mut parts = storage_key.splitn(3, ':');
        let flow_name = parts.next()?;
        let owner = parts.next()?;
        let instance = parts.next()?;
        let partition = (owner != ANONYMOUS_OWNER).then_some(owner);
        Some((flow_name, partition, instance))
    }

    /// The partition-scoped pattern used to enumerate a partition's
    /// keys: `<namespace><partition>:*:agg`.
    fn partition_pattern(&self, partition_key: &str) -> String {
        format!("{}{partition_key}:*:agg", self.namespace)
    }

    /// Effective TTL for a write, derived from `meta.created_at` (not
    /// "now") so the absolute cap is a true global deadline: a replay
    /// of the same write never extends an aggregate's lifetime past
    /// its original creation instant plus the cap.
    fn effective_ttl(&self, aggregate: &FlowAggregate) -> Duration {
        let Some(absolute_ttl) = self.absolute_ttl else {
            return self.ttl;
        };
        let age = (Utc::now() - aggregate.meta.created_at)
            .to_std()
            .unwrap_or(Duration::ZERO);
        self.ttl.min(absolute_ttl.saturating_sub(age))
    }

    async fn connection(
        &self,
    ) -> Result<deadpool_redis::Connection, DataAccessError> {
        self.pool.get().await.map_err(|err| {
            error!(error = %err, "redis store: failed to acquire pooled connection");
            DataAccessError::new("<pool>", "failed to acquire Redis connection").with_source(err)
        })
    }

    /// Enumerate every key matching `pattern` via non-blocking `SCAN`,
    /// tolerant of concurrent key-set churn (best-effort snapshot, per
    /// spec §4.6).
    async fn scan_keys(
        &self,
        conn: &mut deadpool_redis::Connection,
        pattern: &str,
    ) -> Result<Vec<String>, DataAccessError> {
        let mut keys = Vec::new();
        let mut cursor: u64 = 0;
        loop {
            let (next_cursor, batch): (u64, Vec<String>) = deadpool_redis::redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(200)
                .query_async(conn)
                .await
                .map_err(|err| {
                    DataAccessError::new(pattern, "SCAN failed while enumerating partition").with_source(err)
                })?;
            keys.extend(batch);
            if next_cursor == 0 {
                break;
            }
            cursor = next_cursor;
        }
        Ok(keys)
    }

    async fn delete_keys(
        &self,
        conn: &mut deadpool_redis::Connection,
        keys: &[String],
    ) -> Result<u64, DataAccessError> {
        if keys.is_empty() {
            return Ok(0);
        }
        let script = Script::new(BULK_DELETE_SCRIPT);
        let count: u64 = script
            .key(keys)
            .invoke_async(conn)
            .await
            .map_err(|err| {
                DataAccessError::new(keys.join(","), "bulk delete script failed").with_source(err)
            })?;
        Ok(count)
    }
}

#[async_trait]
impl FlowStore for RedisStore {
    async fn save_aggregate(
        &self,
        key: &str,
        aggregate: &FlowAggregate,
    ) -> Result<(), DataAccessError> {
        let redis_key = self.redis_key(key);
        let ttl = self.effective_ttl(aggregate);
        let payload = serde_json::to_string(aggregate)
            .map_err(|err| DataAccessError::new(key, "failed to encode aggregate").with_source(err))?;

        let mut conn = self.connection().await?;
        let ttl_secs = ttl.as_secs().max(1);
        let () = conn
            .set_ex(&redis_key, payload, ttl_secs)
            .await
            .map_err(|err| DataAccessError::new(key, "SET EX failed").with_source(err))?;

        if self.sliding_enabled && self.sliding_reset.renews_on_write() {
            let () = conn
                .expire(&redis_key, ttl_secs as i64)
                .await
                .map_err(|err| DataAccessError::new(key, "EXPIRE failed after write").with_source(err))?;
        }

        trace!(key, ttl_secs, "redis store: saved aggregate");
        Ok(())
    }

    async fn load_aggregate(&self, key: &str) -> Result<Option<FlowAggregate>, DataAccessError> {
        let redis_key = self.redis_key(key);
        let mut conn = self.connection().await?;
        let raw: Option<String> = conn
            .get(&redis_key)
            .await
            .map_err(|err| DataAccessError::new(key, "GET failed").with_source(err))?;

        let Some(raw) = raw else {
            trace!(key, "redis store: cache miss");
            return Ok(None);
        };

        let aggregate: FlowAggregate = serde_json::from_str(&raw)
            .map_err(|err| DataAccessError::new(key, "failed to decode aggregate").with_source(err))?;

        if self.sliding_enabled && self.sliding_reset.renews_on_read() {
            let ttl_secs = self.effective_ttl(&aggregate).as_secs().max(1) as i64;
            let () = conn
                .expire(&redis_key, ttl_secs)
                .await
                .map_err(|err| DataAccessError::new(key, "EXPIRE failed after read").with_source(err))?;
            debug!(key, ttl_secs, "redis store: renewed sliding TTL on read");
        }

        Ok(Some(aggregate))
    }

    async fn delete(&self, key: &str) -> Result<(), DataAccessError> {
        let redis_key = self.redis_key(key);
        let mut conn = self.connection().await?;
        let _: u64 = conn
            .del(&redis_key)
            .await
            .map_err(|err| DataAccessError::new(key, "DEL failed").with_source(err))?;
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, DataAccessError> {
        let redis_key = self.redis_key(key);
        let mut conn = self.connection().await?;
        // EXISTS never renews TTL; spec §4.4 requires `exists` be a
        // non-side-effecting read.
        let count: u64 = conn
            .exists(&redis_key)
            .await
            .map_err(|err| DataAccessError::new(key, "EXISTS failed").with_source(err))?;
        Ok(count > 0)
    }

    async fn invalidate_by_partition(&self, partition_key: &str) -> Result<u64, DataAccessError> {
        let pattern = self.partition_pattern(partition_key);
        let mut conn = self.connection().await?;
        let keys = self.scan_keys(&mut conn, &pattern).await?;
        let count = self.delete_keys(&mut conn, &keys).await?;
        debug!(partition_key, count, "redis store: invalidated partition");
        Ok(count)
    }

    async fn list_active_flows(
        &self,
        partition_key: &str,
    ) -> Result<Vec<String>, DataAccessError> {
        let pattern = self.partition_pattern(partition_key);
        let mut conn = self.connection().await?;
        let keys = self.scan_keys(&mut conn, &pattern).await?;

        let prefix = format!("{}{partition_key}:", self.namespace);
        Ok(keys
            .into_iter()
            .filter_map(|k| {
                k.strip_prefix(prefix.as_str())
                    .and_then(|rest| rest.strip_suffix(":agg"))
                    .map(str::to_string)
            })
            .collect())
    }

    async fn bulk_delete(&self, keys: &[String]) -> Result<u64, DataAccessError> {
        let redis_keys: Vec<String> = keys.iter().map(|k| self.redis_key(k)).collect();
        let mut conn = self.connection().await?;
        self.delete_keys(&mut conn, &redis_keys).await
    }
}
