//! The flow engine: a pure decision function that advances a flow
//! instance through its definition, plus the parser and definition
//! provider that feed it.
//!
//! This crate defines the [`store::FlowStore`] port but ships no
//! implementation of it — see the `flow-store` crate for the
//! in-memory and Redis-backed adapters.

pub mod engine;
pub mod error;
pub mod parser;
pub mod provider;
pub mod store;

pub use engine::{Engine, TARGET_STEP_KEY};
pub use error::{ArgumentError, DataAccessError, EngineError, ProviderError};
pub use parser::ParseError;
pub use provider::{DefinitionProvider, DirectoryDefinitionProvider, StaticDefinitionProvider};
pub use store::FlowStore;
