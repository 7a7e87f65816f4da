//! A JSON-file-backed [`FlowStore`] for the CLI demo surface.
//!
//! The real stores (`flow-store::InMemoryStore`, `::RedisStore`) only
//! support partition-scoped enumeration, by design (spec §4.4) — which
//! is exactly right for a server process, but leaves nothing for a
//! one-shot CLI invocation to persist *all* state across runs. This
//! adapter reads and rewrites a flat JSON map on every call so
//! `flowsentinel flow start` and a later `flowsentinel flow advance`
//! see the same state, without pulling a real database into the demo.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use flow_domain::FlowAggregate;
use flow_engine::{store::FlowStore, DataAccessError};
use tokio::sync::Mutex;

pub struct FileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    fn read_all(path: &Path) -> Result<HashMap<String, FlowAggregate>, DataAccessError> {
        if !path.exists() {
            return Ok(HashMap::new());
        }
        let contents = std::fs::read_to_string(path)
            .map_err(|err| DataAccessError::new(path.display().to_string(), "failed to read store file").with_source(err))?;
        if contents.trim().is_empty() {
            return Ok(HashMap::new());
        }
        serde_json::from_str(&contents)
            .map_err(|err| DataAccessError::new(path.display().to_string(), "failed to decode store file").with_source(err))
    }

    fn write_all(path: &Path, data: &HashMap<String, FlowAggregate>) -> Result<(), DataAccessError> {
        let json = serde_json::to_string_pretty(data)
            .map_err(|err| DataAccessError::new(path.display().to_string(), "failed to encode store file").with_source(err))?;
        std::fs::write(path, json)
            .map_err(|err| DataAccessError::new(path.display().to_string(), "failed to write store file").with_source(err))
    }

    fn partition_of(key: &str) -> Option<&str> {
        key.split(':').nth(1)
    }
}

#[async_trait]
impl FlowStore for FileStore {
    async fn save_aggregate(&self, key: &str, aggregate: &FlowAggregate) -> Result<(), DataAccessError> {
        let _guard = self.lock.lock().await;
        let mut data = Self::read_all(&self.path)?;
        data.insert(key.to_string(), aggregate.clone());
        Self::write_all(&self.path, &data)
    }

    async fn load_aggregate(&self, key: &str) -> Result<Option<FlowAggregate>, DataAccessError> {
        let _guard = self.lock.lock().await;
        Ok(Self::read_all(&self.path)?.get(key).cloned())
    }

    async fn delete(&self, key: &str) -> Result<(), DataAccessError> {
        let _guard = self.lock.lock().await;
        let mut data = Self::read_all(&self.path)?;
        data.remove(key);
        Self::write_all(&self.path, &data)
    }

    async fn exists(&self, key: &str) -> Result<bool, DataAccessError> {
        let _guard = self.lock.lock().await;
        Ok(Self::read_all(&self.path)?.contains_key(key))
    }

    async fn invalidate_by_partition(&self, partition_key: &str) -> Result<u64, DataAccessError> {
        let _guard = self.lock.lock().await;
        let mut data = Self::read_all(&self.path)?;
        let to_remove: Vec<String> = data
            .keys()
            .filter(|k| Self::partition_of(k) == Some(partition_key))
            .cloned()
            .collect();
        for key in &to_remove {
            data.remove(key);
        }
        Self::write_all(&self.path, &data)?;
        Ok(to_remove.len() as u64)
    }

    async fn list_active_flows(&self, partition_key: &str) -> Result<Vec<String>, DataAccessError> {
        let _guard = self.lock.lock().await;
        let data = Self::read_all(&self.path)?;
        Ok(data
            .keys()
            .filter(|k| Self::partition_of(k) == Some(partition_key))
            .filter_map(|k| k.splitn(3, ':').nth(2).map(str::to_string))
            .collect())
    }

    async fn bulk_delete(&self, keys: &[String]) -> Result<u64, DataAccessError> {
        let _guard = self.lock.lock().await;
        let mut data = Self::read_all(&self.path)?;
        let mut count = 0;
        for key in keys {
            if data.remove(key).is_some() {
                count += 1;
            }
        }
        Self::write_all(&self.path, &data)?;
        Ok(count)
    }
}
