//! The storage port the engine persists aggregates through.
//!
//! This crate defines the interface only; `flow-store` supplies the
//! in-memory and Redis-backed implementations.

use async_trait::async_trait;
use flow_domain::FlowAggregate;

use crate::error::DataAccessError;

/// CRUD plus partition-scoped bulk operations over `FlowAggregate`
/// records, keyed by the `FlowKey` storage-key string.
///
/// Implementations must make single-key writes atomic and must not
/// treat `exists` as a side-effecting read (no TTL renewal).
#[async_trait]
pub trait FlowStore: Send + Sync {
    async fn save_aggregate(
        &self,
        key: &str,
        aggregate: &FlowAggregate,
    ) -> Result<(), DataAccessError>;

    async fn load_aggregate(&self, key: &str) -> Result<Option<FlowAggregate>, DataAccessError>;

    async fn delete(&self, key: &str) -> Result<(), DataAccessError>;

    async fn exists(&self, key: &str) -> Result<bool, DataAccessError>;

    /// Delete every aggregate scoped to `partition_key`, returning the
    /// count removed.
    async fn invalidate_by_partition(&self, partition_key: &str) -> Result<u64, DataAccessError>;

    /// Enumerate instance ids active within `partition_key`.
    async fn list_active_flows(
        &self,
        partition_key: &str,
    ) -> Result<Vec<String>, DataAccessError>;

    /// Delete exactly the given storage keys, returning the count
    /// actually removed.
    async fn bulk_delete(&self, keys: &[String]) -> Result<u64, DataAccessError>;
}
