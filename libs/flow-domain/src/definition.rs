//! The immutable definition graph: flows as directed graphs of steps
//! with conditional transitions.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use thiserror::Error;

use crate::ids::{FlowId, StepId};
use crate::state::FlowState;

/// Errors raised building or resolving a [`FlowDefinition`].
#[derive(Debug, Error, Clone)]
pub enum DefinitionError {
    #[error("initial step '{initial_step}' is not among the flow's steps")]
    InitialStepNotDefined { initial_step: StepId },

    #[error("duplicate step id '{0}' in flow definition")]
    DuplicateStep(StepId),

    #[error("step '{0}' has no transitions")]
    NoTransitions(StepId),

    #[error("step '{step}' is SIMPLE but declares {count} transitions (exactly one required)")]
    SimpleStepMultipleTransitions { step: StepId, count: usize },

    #[error("unresolved definition name: {0}")]
    UnresolvedName(String),

    #[error("definition '{0}' has no steps")]
    EmptyDefinition(FlowId),

    #[error("invalid transition shape: {0}")]
    InvalidTransitionShape(String),
}

/// Whether a step may have one unconditional transition (`Simple`) or
/// several guarded ones evaluated in order (`Complex`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum NavigationType {
    #[default]
    Simple,
    Complex,
}

/// A callable condition evaluated against the current [`FlowState`].
///
/// Not an embedded expression language: predicates are host-language
/// closures, composed with [`Predicate::always`], [`Predicate::when`],
/// [`Predicate::not`], [`Predicate::and`], and [`Predicate::or`].
#[derive(Clone)]
pub struct Predicate(Arc<dyn Fn(&FlowState) -> bool + Send + Sync>);

impl Predicate {
    /// A predicate that is always satisfied. The default for
    /// JSON-loaded transitions, which never attach conditions.
    #[must_use]
    pub fn always() -> Self {
        Self(Arc::new(|_| true))
    }

    /// Wrap an arbitrary closure as a predicate.
    pub fn when<F>(f: F) -> Self
    where
        F: Fn(&FlowState) -> bool + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    /// Convenience constructor over just the attribute map, for the
    /// common case of a condition that only inspects attributes.
    pub fn when_attrs<F>(f: F) -> Self
    where
        F: Fn(&serde_json::Map<String, serde_json::Value>) -> bool + Send + Sync + 'static,
    {
        Self(Arc::new(move |state| f(state.attributes())))
    }

    #[must_use]
    pub fn not(self) -> Self {
        Self(Arc::new(move |state| !(self.0)(state)))
    }

    #[must_use]
    pub fn and(self, other: Self) -> Self {
        Self(Arc::new(move |state| (self.0)(state) && (other.0)(state)))
    }

    #[must_use]
    pub fn or(self, other: Self) -> Self {
        Self(Arc::new(move |state| (self.0)(state) || (other.0)(state)))
    }

    #[must_use]
    pub fn evaluate(&self, state: &FlowState) -> bool {
        (self.0)(state)
    }
}

impl Default for Predicate {
    fn default() -> Self {
        Self::always()
    }
}

impl fmt::Debug for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Predicate(<closure>)")
    }
}

/// A single outgoing edge from a step: either a guarded pointer to
/// another step, or an end-of-flow marker. Exactly one of the two is
/// representable by construction.
#[derive(Debug, Clone)]
pub enum Transition {
    /// Move to `to` if `condition` is satisfied.
    To { to: StepId, condition: Predicate },
    /// Terminate the flow if `condition` is satisfied.
    EndOfFlow { condition: Predicate },
}

impl Transition {
    /// An unconditional transition to `to`.
    #[must_use]
    pub fn to(to: StepId) -> Self {
        Self::To {
            to,
            condition: Predicate::always(),
        }
    }

    /// A conditional transition to `to`.
    #[must_use]
    pub fn to_when(to: StepId, condition: Predicate) -> Self {
        Self::To { to, condition }
    }

    /// An unconditional end-of-flow marker.
    #[must_use]
    pub fn eof() -> Self {
        Self::EndOfFlow {
            condition: Predicate::always(),
        }
    }

    /// A conditional end-of-flow marker.
    #[must_use]
    pub fn eof_when(condition: Predicate) -> Self {
        Self::EndOfFlow { condition }
    }

    #[must_use]
    pub fn condition(&self) -> &Predicate {
        match self {
            Self::To { condition, .. } | Self::EndOfFlow { condition } => condition,
        }
    }

    #[must_use]
    pub fn target(&self) -> Option<&StepId> {
        match self {
            Self::To { to, .. } => Some(to),
            Self::EndOfFlow { .. } => None,
        }
    }

    #[must_use]
    pub fn is_end_of_flow(&self) -> bool {
        matches!(self, Self::EndOfFlow { .. })
    }
}

/// A node in the flow graph: an ordered list of outgoing transitions,
/// evaluated first-match-wins.
#[derive(Debug, Clone)]
pub struct StepDefinition {
    id: StepId,
    navigation_type: NavigationType,
    transitions: Vec<Transition>,
}

impl StepDefinition {
    /// Build a step, enforcing: non-empty transitions, and exactly one
    /// transition when `navigation_type` is [`NavigationType::Simple`].
    pub fn new(
        id: StepId,
        navigation_type: NavigationType,
        transitions: Vec<Transition>,
    ) -> Result<Self, DefinitionError> {
        if transitions.is_empty() {
            return Err(DefinitionError::NoTransitions(id));
        }
        if navigation_type == NavigationType::Simple && transitions.len() != 1 {
            return Err(DefinitionError::SimpleStepMultipleTransitions {
                step: id,
                count: transitions.len(),
            });
        }
        Ok(Self {
            id,
            navigation_type,
            transitions,
        })
    }

    #[must_use]
    pub fn id(&self) -> &StepId {
        &self.id
    }

    #[must_use]
    pub fn navigation_type(&self) -> NavigationType {
        self.navigation_type
    }

    #[must_use]
    pub fn transitions(&self) -> &[Transition] {
        &self.transitions
    }
}

/// An immutable directed graph of steps: the shape from which every
/// running flow instance's trajectory is derived.
#[derive(Debug, Clone)]
pub struct FlowDefinition {
    id: FlowId,
    initial_step: StepId,
    steps: IndexMap<StepId, StepDefinition>,
}

impl FlowDefinition {
    /// Build a definition, enforcing the graph invariants: no duplicate
    /// step ids, at least one step, and `initial_step` present among
    /// `steps`.
    pub fn new(
        id: FlowId,
        initial_step: StepId,
        steps: Vec<StepDefinition>,
    ) -> Result<Self, DefinitionError> {
        if steps.is_empty() {
            return Err(DefinitionError::EmptyDefinition(id));
        }

        let mut map = IndexMap::with_capacity(steps.len());
        for step in steps {
            let step_id = step.id().clone();
            if map.contains_key(&step_id) {
                return Err(DefinitionError::DuplicateStep(step_id));
            }
            map.insert(step_id, step);
        }

        if !map.contains_key(&initial_step) {
            return Err(DefinitionError::InitialStepNotDefined { initial_step });
        }

        Ok(Self {
            id,
            initial_step,
            steps: map,
        })
    }

    #[must_use]
    pub fn id(&self) -> &FlowId {
        &self.id
    }

    #[must_use]
    pub fn initial_step(&self) -> &StepId {
        &self.initial_step
    }

    #[must_use]
    pub fn step(&self, id: &StepId) -> Option<&StepDefinition> {
        self.steps.get(id)
    }

    #[must_use]
    pub fn steps(&self) -> &IndexMap<StepId, StepDefinition> {
        &self.steps
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::FlowState;

    fn sid(s: &str) -> StepId {
        StepId::new(s).unwrap()
    }
    fn fid(s: &str) -> FlowId {
        FlowId::new(s).unwrap()
    }

    #[test]
    fn simple_step_requires_exactly_one_transition() {
        let err = StepDefinition::new(
            sid("s1"),
            NavigationType::Simple,
            vec![Transition::to(sid("s2")), Transition::to(sid("s3"))],
        )
        .unwrap_err();
        assert!(matches!(
            err,
            DefinitionError::SimpleStepMultipleTransitions { .. }
        ));
    }

    #[test]
    fn step_requires_at_least_one_transition() {
        let err = StepDefinition::new(sid("s1"), NavigationType::Complex, vec![]).unwrap_err();
        assert!(matches!(err, DefinitionError::NoTransitions(_)));
    }

    #[test]
    fn definition_requires_initial_step_present() {
        let s1 = StepDefinition::new(sid("s1"), NavigationType::Simple, vec![Transition::eof()])
            .unwrap();
        let err = FlowDefinition::new(fid("f1"), sid("missing"), vec![s1]).unwrap_err();
        assert!(matches!(
            err,
            DefinitionError::InitialStepNotDefined { .. }
        ));
    }

    #[test]
    fn definition_rejects_duplicate_step_ids() {
        let s1a = StepDefinition::new(sid("s1"), NavigationType::Simple, vec![Transition::eof()])
            .unwrap();
        let s1b = StepDefinition::new(sid("s1"), NavigationType::Simple, vec![Transition::eof()])
            .unwrap();
        let err = FlowDefinition::new(fid("f1"), sid("s1"), vec![s1a, s1b]).unwrap_err();
        assert!(matches!(err, DefinitionError::DuplicateStep(_)));
    }

    #[test]
    fn definition_rejects_empty_steps() {
        let err = FlowDefinition::new(fid("f1"), sid("s1"), vec![]).unwrap_err();
        assert!(matches!(err, DefinitionError::EmptyDefinition(_)));
    }

    #[test]
    fn valid_definition_builds() {
        let s1 = StepDefinition::new(sid("s1"), NavigationType::Simple, vec![Transition::to(sid("s2"))])
            .unwrap();
        let s2 =
            StepDefinition::new(sid("s2"), NavigationType::Simple, vec![Transition::eof()]).unwrap();
        let def = FlowDefinition::new(fid("f1"), sid("s1"), vec![s1, s2]).unwrap();
        assert_eq!(def.initial_step(), &sid("s1"));
        assert_eq!(def.steps().len(), 2);
    }

    #[test]
    fn predicate_combinators() {
        let def = {
            let s1 = StepDefinition::new(
                sid("s1"),
                NavigationType::Simple,
                vec![Transition::eof()],
            )
            .unwrap();
            FlowDefinition::new(fid("f1"), sid("s1"), vec![s1]).unwrap()
        };
        let state = FlowState::new(Arc::new(def), sid("s1"), serde_json::Map::new());

        let always_true = Predicate::always();
        assert!(always_true.evaluate(&state));

        let always_false = Predicate::always().not();
        assert!(!always_false.evaluate(&state));

        let and_true = Predicate::always().and(Predicate::always());
        assert!(and_true.evaluate(&state));

        let or_one_false = Predicate::always().not().or(Predicate::always());
        assert!(or_one_false.evaluate(&state));
    }
}
