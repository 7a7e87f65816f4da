//! Error kinds for the engine and its collaborators.
//!
//! Each operation family gets its own enum rather than one catch-all,
//! so callers can match on exactly the failures that operation can
//! produce.

use flow_domain::{DefinitionError, FlowId, StepId};
use thiserror::Error;

use crate::parser::ParseError;

/// A caller-supplied argument was invalid: blank identifier,
/// non-positive size, or similar. Never persisted, surfaced directly.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ArgumentError {
    #[error("{field} must not be blank")]
    Blank { field: &'static str },
    #[error("{field} must be positive, got {value}")]
    NotPositive { field: &'static str, value: i64 },
}

/// Resolving a definition by name failed.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("definition '{0}' failed to parse")]
    Parse(FlowId, #[source] ParseError),
}

/// Failures from the decision function that advances a flow instance.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("flow already exists for key '{0}'")]
    AlreadyExists(String),

    #[error("no flow found for key '{0}'")]
    NotFound(String),

    #[error("flow at key '{0}' is already completed")]
    AlreadyCompleted(String),

    #[error("current step '{0}' is not defined in the flow")]
    StepNotDefined(StepId),

    #[error("target step '{target}' is not reachable from step '{from}'")]
    TargetNotReachable { from: StepId, target: StepId },

    #[error("no transition out of step '{0}' matched the current state")]
    NoMatch(StepId),

    #[error("transitions out of step '{0}' are ambiguous without an explicit target")]
    Ambiguous(StepId),

    #[error("unresolved definition: {0}")]
    UnresolvedDefinition(FlowId),

    #[error(transparent)]
    Definition(#[from] DefinitionError),

    #[error(transparent)]
    DataAccess(#[from] DataAccessError),
}

/// Store I/O or decoding failure. Preserves the offending key and the
/// underlying cause; never retried automatically.
#[derive(Debug, Error)]
#[error("data access failure for key '{key}': {message}")]
pub struct DataAccessError {
    pub key: String,
    pub message: String,
    #[source]
    pub source: Option<anyhow::Error>,
}

impl DataAccessError {
    #[must_use]
    pub fn new(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            message: message.into(),
            source: None,
        }
    }

    #[must_use]
    pub fn with_source(mut self, source: impl Into<anyhow::Error>) -> Self {
        self.source = Some(source.into());
        self
    }
}
