//! Ambient stack shared by the flow engine's crates: telemetry
//! initialization and environment-variable configuration loading.
//!
//! Holds no domain knowledge of flows, steps, or stores.

pub mod env_config;
pub mod telemetry;

pub use env_config::{load_prefixed, ConfigError};
pub use telemetry::init_tracing;
