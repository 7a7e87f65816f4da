//! Immutable runtime state for a single flow instance.

use std::sync::Arc;

use serde_json::{Map, Value};

use crate::definition::{FlowDefinition, Transition};
use crate::ids::StepId;

/// The current position of a single flow instance: its backing
/// definition, current step, completion flag, and accumulated
/// attributes.
///
/// Immutable by design (see spec §9's "mutable running state" note):
/// [`FlowState::advance`] returns a new value rather than mutating in
/// place, which keeps the engine a pure function and makes
/// preview/persist safe to retry.
#[derive(Debug, Clone)]
pub struct FlowState {
    definition: Arc<FlowDefinition>,
    current_step: StepId,
    completed: bool,
    attributes: Map<String, Value>,
}

impl FlowState {
    #[must_use]
    pub fn new(
        definition: Arc<FlowDefinition>,
        current_step: StepId,
        attributes: Map<String, Value>,
    ) -> Self {
        Self {
            definition,
            current_step,
            completed: false,
            attributes,
        }
    }

    #[must_use]
    pub fn definition(&self) -> &Arc<FlowDefinition> {
        &self.definition
    }

    #[must_use]
    pub fn current_step(&self) -> &StepId {
        &self.current_step
    }

    #[must_use]
    pub fn completed(&self) -> bool {
        self.completed
    }

    #[must_use]
    pub fn attributes(&self) -> &Map<String, Value> {
        &self.attributes
    }

    /// Apply a transition and payload, producing the next state.
    ///
    /// - Payload attributes are merged on top of the existing ones.
    /// - An end-of-flow transition marks `completed` but leaves
    ///   `current_step` unchanged (spec §9: "preserve the current step
    ///   at completion").
    /// - A `to` transition moves `current_step` and leaves `completed`
    ///   false.
    #[must_use]
    pub fn advance(&self, transition: &Transition, payload: &Map<String, Value>) -> Self {
        let mut attributes = self.attributes.clone();
        for (k, v) in payload {
            attributes.insert(k.clone(), v.clone());
        }

        match transition {
            Transition::To { to, .. } => Self {
                definition: Arc::clone(&self.definition),
                current_step: to.clone(),
                completed: false,
                attributes,
            },
            Transition::EndOfFlow { .. } => Self {
                definition: Arc::clone(&self.definition),
                current_step: self.current_step.clone(),
                completed: true,
                attributes,
            },
        }
    }
}
