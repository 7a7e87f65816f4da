//! Domain types for the flow engine: identifiers, the definition
//! graph, runtime state, and the persistence entities built from them.
//!
//! This crate has no knowledge of how definitions are parsed, how
//! state is advanced, or how aggregates are stored — it only defines
//! the shapes those concerns operate on.

pub mod definition;
pub mod ids;
pub mod snapshot;
pub mod state;

pub use definition::{
    DefinitionError, FlowDefinition, NavigationType, Predicate, StepDefinition, Transition,
};
pub use ids::{
    FlowContext, FlowId, FlowKey, FlowKeyParseError, IdentifierError, InstanceId, OwnerId,
    PartitionKey, StepId, ANONYMOUS_OWNER,
};
pub use snapshot::{FlowAggregate, FlowMeta, FlowSnapshot, DEFAULT_MAX_HISTORY};
pub use state::FlowState;
