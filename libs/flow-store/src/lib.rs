//! Store implementations for the flow engine's [`FlowStore`](flow_engine::FlowStore)
//! port: a bounded in-memory cache and a Redis-backed adapter, both
//! with sliding TTL bounded by an absolute cap (spec §4.5/§4.6).

pub mod config;
pub mod memory;
pub mod redis;

pub use config::{InMemoryStoreConfig, RedisConnectionMode, RedisStoreConfig, SlidingReset};
pub use flow_engine::DataAccessError as StoreError;
pub use memory::InMemoryStore;
pub use redis::RedisStore;
