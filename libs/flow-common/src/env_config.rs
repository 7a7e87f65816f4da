//! Shared environment-variable configuration loading.
//!
//! Store configs (`InMemoryStoreConfig`, `RedisStoreConfig` in
//! `flow-store`) and anything else that wants a `from_env()`
//! constructor build on [`load_prefixed`] rather than hand-rolling
//! `std::env::var` parsing.

use config::{Config, Environment};
use serde::de::DeserializeOwned;
use thiserror::Error;

/// Errors loading typed configuration from the environment.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to build configuration source")]
    Source(#[from] config::ConfigError),
}

/// Load `.env` (if present) then deserialize `T` from environment
/// variables prefixed with `prefix`, nested fields separated by `__`
/// (e.g. `FLOWSENTINEL_REDIS__TTL_SECONDS`). Missing variables fall
/// back to `T`'s `serde(default)` values, so `T` should derive
/// `Default` and mark every field `#[serde(default)]`.
pub fn load_prefixed<T: DeserializeOwned + Default>(prefix: &str) -> Result<T, ConfigError> {
    dotenvy::dotenv().ok();

    let config = Config::builder()
        .add_source(
            Environment::with_prefix(prefix)
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    // With no matching environment variables this deserializes an empty
    // map; every field of `T` must carry `#[serde(default)]` to cover it.
    Ok(config.try_deserialize()?)
}
