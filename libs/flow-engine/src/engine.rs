//! The two-phase preview/persist decision function.
//!
//! Previews are pure functions of `(stored aggregate, definition,
//! payload)`: the engine touches the store only through `exists` and
//! `loadAggregate` during preview, and only `persist` writes.

use std::sync::Arc;

use flow_domain::{
    FlowAggregate, FlowContext, FlowDefinition, FlowKey, FlowMeta, FlowSnapshot, FlowState, StepId,
    Transition, DEFAULT_MAX_HISTORY,
};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::error::EngineError;
use crate::store::FlowStore;

/// Payload key designating an explicit transition target for
/// `previewAdvance`.
pub const TARGET_STEP_KEY: &str = "__targetStep";

/// The engine's decision function, parameterized over a [`FlowStore`]
/// implementation.
pub struct Engine<S: FlowStore> {
    store: Arc<S>,
}

impl<S: FlowStore> Engine<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Build the initial state for a not-yet-existing flow instance.
    /// Observes the store only via `exists`.
    pub async fn preview_start(
        &self,
        key: &str,
        definition: Arc<FlowDefinition>,
        initial_attrs: Map<String, Value>,
    ) -> Result<FlowState, EngineError> {
        if self.store.exists(key).await? {
            warn!(key, "preview_start rejected: flow already exists");
            return Err(EngineError::AlreadyExists(key.to_string()));
        }

        let state = FlowState::new(definition.clone(), definition.initial_step().clone(), initial_attrs);
        debug!(key, step = %state.current_step(), "preview_start");
        Ok(state)
    }

    /// Load current state, reject a completed flow, select exactly
    /// one transition, and apply it.
    pub async fn preview_advance(
        &self,
        key: &str,
        definition: Arc<FlowDefinition>,
        payload: Map<String, Value>,
    ) -> Result<FlowState, EngineError> {
        let state = self.load_state(key, definition).await?;

        if state.completed() {
            warn!(key, "preview_advance rejected: flow already completed");
            return Err(EngineError::AlreadyCompleted(key.to_string()));
        }

        let step = state
            .definition()
            .step(state.current_step())
            .ok_or_else(|| EngineError::StepNotDefined(state.current_step().clone()))?;

        let transition = select_transition(state.current_step(), step.transitions(), &payload, &state)?;
        debug!(key, step = %state.current_step(), "preview_advance selected transition");

        // `__targetStep` only steers transition selection; it is not a
        // flow attribute and must not leak into the persisted/rehydrated
        // attribute map.
        let mut attrs_payload = payload;
        attrs_payload.remove(TARGET_STEP_KEY);
        Ok(state.advance(transition, &attrs_payload))
    }

    /// Persist a new aggregate for `key`: fresh meta, the snapshot
    /// derived from `state`, and an empty history (callers that want
    /// retained history should load the prior aggregate and append to
    /// it before calling this, or use the store's own history policy).
    pub async fn persist(&self, key: &str, state: &FlowState) -> Result<(), EngineError> {
        let previous = self.store.load_aggregate(key).await?;

        let meta = match &previous {
            Some(agg) => agg.meta.advance(state.current_step().as_str(), status_for(state)),
            None => {
                let context = key
                    .parse::<FlowKey>()
                    .map(|flow_key| {
                        FlowContext::new(flow_key.instance_id().clone(), flow_key.owner_id().cloned(), None)
                    })
                    .map_err(|err| EngineError::DataAccess(crate::error::DataAccessError::new(
                        key,
                        format!("key does not parse as a FlowKey: {err}"),
                    )))?;
                FlowMeta::create_new(context)
            }
        };

        let snapshot = FlowSnapshot::new(
            key.to_string(),
            state.current_step().clone(),
            state.completed(),
            state.attributes().clone(),
        );

        let mut aggregate = FlowAggregate::new(meta, Some(snapshot.clone()));
        if let Some(prior) = previous {
            aggregate.snapshot_history = prior.snapshot_history;
            if let Some(prior_snapshot) = prior.current_snapshot {
                aggregate.append_history(prior_snapshot, DEFAULT_MAX_HISTORY);
            }
        }

        self.store.save_aggregate(key, &aggregate).await?;
        Ok(())
    }

    /// `previewStart` followed immediately by `persist`.
    pub async fn start(
        &self,
        key: &str,
        definition: Arc<FlowDefinition>,
        initial_attrs: Map<String, Value>,
    ) -> Result<FlowState, EngineError> {
        let state = self.preview_start(key, definition, initial_attrs).await?;
        self.persist(key, &state).await?;
        Ok(state)
    }

    /// `previewAdvance` followed immediately by `persist`.
    pub async fn advance(
        &self,
        key: &str,
        definition: Arc<FlowDefinition>,
        payload: Map<String, Value>,
    ) -> Result<FlowState, EngineError> {
        let state = self.preview_advance(key, definition, payload).await?;
        self.persist(key, &state).await?;
        Ok(state)
    }

    /// Load the aggregate for `key` and rehydrate `FlowState` from its
    /// current snapshot, or `None` if no aggregate exists.
    pub async fn get_state(
        &self,
        key: &str,
        definition: Arc<FlowDefinition>,
    ) -> Result<Option<FlowState>, EngineError> {
        let Some(aggregate) = self.store.load_aggregate(key).await? else {
            return Ok(None);
        };
        let Some(snapshot) = aggregate.current_snapshot else {
            return Ok(None);
        };

        let mut state = FlowState::new(definition, snapshot.step_id, snapshot.attributes);
        if snapshot.completed {
            state = mark_completed(state);
        }
        Ok(Some(state))
    }

    async fn load_state(
        &self,
        key: &str,
        definition: Arc<FlowDefinition>,
    ) -> Result<FlowState, EngineError> {
        self.get_state(key, definition)
            .await?
            .ok_or_else(|| EngineError::NotFound(key.to_string()))
    }
}

fn status_for(state: &FlowState) -> &'static str {
    if state.completed() {
        "COMPLETED"
    } else {
        "RUNNING"
    }
}

/// `FlowState` has no public "already completed" constructor since
/// completion is only ever reached through `advance`; rehydrating a
/// persisted completed snapshot replays an end-of-flow transition on
/// the current step to reach the same state.
fn mark_completed(state: FlowState) -> FlowState {
    state.advance(&Transition::eof(), &Map::new())
}

/// Select the single transition to take out of `transitions`, given
/// `payload` and `state`.
///
/// If `payload["__targetStep"]` names a step, the matching transition
/// is checked strictly against its own predicate: an explicit target
/// that fails its condition fails the call rather than falling back
/// to ordered evaluation (see the design note on this exact case).
/// Otherwise, transitions are evaluated in declared order; exactly one
/// satisfied transition is required.
fn select_transition<'a>(
    current_step: &StepId,
    transitions: &'a [Transition],
    payload: &Map<String, Value>,
    state: &FlowState,
) -> Result<&'a Transition, EngineError> {
    if let Some(Value::String(target)) = payload.get(TARGET_STEP_KEY) {
        let target_step = StepId::new(target.as_str()).map_err(|_| EngineError::NoMatch(current_step.clone()))?;

        let found = transitions
            .iter()
            .find(|t| t.target() == Some(&target_step));

        return match found {
            Some(transition) if transition.condition().evaluate(state) => Ok(transition),
            _ => Err(EngineError::TargetNotReachable {
                from: current_step.clone(),
                target: target_step,
            }),
        };
    }

    let mut satisfied = transitions.iter().filter(|t| t.condition().evaluate(state));
    let first = satisfied.next();
    match (first, satisfied.next()) {
        (None, _) => Err(EngineError::NoMatch(current_step.clone())),
        (Some(_), Some(_)) => Err(EngineError::Ambiguous(current_step.clone())),
        (Some(transition), None) => Ok(transition),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DataAccessError;
    use async_trait::async_trait;
    use flow_domain::{FlowId, NavigationType, Predicate, StepDefinition};
    use std::sync::Mutex;
    use std::collections::HashMap;

    struct MemStore {
        data: Mutex<HashMap<String, FlowAggregate>>,
    }

    impl MemStore {
        fn new() -> Self {
            Self {
                data: Mutex::new(HashMap::new()),
            }
        }
    }

    #[async_trait]
    impl FlowStore for MemStore {
        async fn save_aggregate(&self, key: &str, aggregate: &FlowAggregate) -> Result<(), DataAccessError> {
            self.data.lock().unwrap().insert(key.to_string(), aggregate.clone());
            Ok(())
        }

        async fn load_aggregate(&self, key: &str) -> Result<Option<FlowAggregate>, DataAccessError> {
            Ok(self.data.lock().unwrap().get(key).cloned())
        }

        async fn delete(&self, key: &str) -> Result<(), DataAccessError> {
            self.data.lock().unwrap().remove(key);
            Ok(())
        }

        async fn exists(&self, key: &str) -> Result<bool, DataAccessError> {
            Ok(self.data.lock().unwrap().contains_key(key))
        }

        async fn invalidate_by_partition(&self, _partition_key: &str) -> Result<u64, DataAccessError> {
            Ok(0)
        }

        async fn list_active_flows(&self, _partition_key: &str) -> Result<Vec<String>, DataAccessError> {
            Ok(vec![])
        }

        async fn bulk_delete(&self, keys: &[String]) -> Result<u64, DataAccessError> {
            let mut data = self.data.lock().unwrap();
            let mut count = 0;
            for key in keys {
                if data.remove(key).is_some() {
                    count += 1;
                }
            }
            Ok(count)
        }
    }

    fn two_step_definition() -> Arc<FlowDefinition> {
        let s1 = StepDefinition::new(
            StepId::new("s1").unwrap(),
            NavigationType::Simple,
            vec![Transition::to(StepId::new("s2").unwrap())],
        )
        .unwrap();
        let s2 = StepDefinition::new(
            StepId::new("s2").unwrap(),
            NavigationType::Simple,
            vec![Transition::eof()],
        )
        .unwrap();
        Arc::new(FlowDefinition::new(FlowId::new("f1").unwrap(), StepId::new("s1").unwrap(), vec![s1, s2]).unwrap())
    }

    #[tokio::test]
    async fn two_step_simple_flow_reaches_end() {
        let engine = Engine::new(Arc::new(MemStore::new()));
        let def = two_step_definition();
        let key = "f1:anonymous:i1";

        let state = engine.start(key, def.clone(), Map::new()).await.unwrap();
        assert_eq!(state.current_step(), &StepId::new("s1").unwrap());

        let state = engine.advance(key, def.clone(), Map::new()).await.unwrap();
        assert_eq!(state.current_step(), &StepId::new("s2").unwrap());
        assert!(!state.completed());

        let state = engine.advance(key, def.clone(), Map::new()).await.unwrap();
        assert_eq!(state.current_step(), &StepId::new("s2").unwrap());
        assert!(state.completed());

        let err = engine.advance(key, def, Map::new()).await.unwrap_err();
        assert!(matches!(err, EngineError::AlreadyCompleted(_)));
    }

    #[tokio::test]
    async fn start_twice_is_rejected() {
        let engine = Engine::new(Arc::new(MemStore::new()));
        let def = two_step_definition();
        let key = "f1:anonymous:i1";

        engine.start(key, def.clone(), Map::new()).await.unwrap();
        let err = engine.start(key, def, Map::new()).await.unwrap_err();
        assert!(matches!(err, EngineError::AlreadyExists(_)));
    }

    fn complex_definition() -> Arc<FlowDefinition> {
        let a = StepDefinition::new(
            StepId::new("a").unwrap(),
            NavigationType::Complex,
            vec![
                Transition::to_when(
                    StepId::new("b").unwrap(),
                    Predicate::when_attrs(|attrs| attrs.get("k").and_then(Value::as_str) == Some("goB")),
                ),
                Transition::to_when(
                    StepId::new("c").unwrap(),
                    Predicate::when_attrs(|attrs| attrs.get("k").and_then(Value::as_str) == Some("goC")),
                ),
            ],
        )
        .unwrap();
        let b = StepDefinition::new(StepId::new("b").unwrap(), NavigationType::Simple, vec![Transition::eof()]).unwrap();
        let c = StepDefinition::new(StepId::new("c").unwrap(), NavigationType::Simple, vec![Transition::eof()]).unwrap();
        Arc::new(FlowDefinition::new(FlowId::new("f2").unwrap(), StepId::new("a").unwrap(), vec![a, b, c]).unwrap())
    }

    #[tokio::test]
    async fn conditional_dispatch_picks_matching_branch() {
        let engine = Engine::new(Arc::new(MemStore::new()));
        let def = complex_definition();
        let key = "f2:anonymous:i1";
        engine.start(key, def.clone(), Map::new()).await.unwrap();

        let mut payload = Map::new();
        payload.insert("k".into(), Value::from("goC"));
        let state = engine.advance(key, def, payload).await.unwrap();
        assert_eq!(state.current_step(), &StepId::new("c").unwrap());
    }

    #[tokio::test]
    async fn conditional_dispatch_no_match_fails() {
        let engine = Engine::new(Arc::new(MemStore::new()));
        let def = complex_definition();
        let key = "f2:anonymous:i1";
        engine.start(key, def.clone(), Map::new()).await.unwrap();

        let mut payload = Map::new();
        payload.insert("k".into(), Value::from("other"));
        let err = engine.advance(key, def, payload).await.unwrap_err();
        assert!(matches!(err, EngineError::NoMatch(_)));
    }

    fn ambiguous_definition() -> Arc<FlowDefinition> {
        let a = StepDefinition::new(
            StepId::new("a").unwrap(),
            NavigationType::Complex,
            vec![
                Transition::to_when(StepId::new("b").unwrap(), Predicate::always().not()),
                Transition::to_when(StepId::new("c").unwrap(), Predicate::always()),
                Transition::to_when(StepId::new("d").unwrap(), Predicate::always()),
            ],
        )
        .unwrap();
        let b = StepDefinition::new(StepId::new("b").unwrap(), NavigationType::Simple, vec![Transition::eof()]).unwrap();
        let c = StepDefinition::new(StepId::new("c").unwrap(), NavigationType::Simple, vec![Transition::eof()]).unwrap();
        let d = StepDefinition::new(StepId::new("d").unwrap(), NavigationType::Simple, vec![Transition::eof()]).unwrap();
        Arc::new(
            FlowDefinition::new(FlowId::new("f3").unwrap(), StepId::new("a").unwrap(), vec![a, b, c, d]).unwrap(),
        )
    }

    #[tokio::test]
    async fn ambiguous_without_explicit_target_fails() {
        let engine = Engine::new(Arc::new(MemStore::new()));
        let def = ambiguous_definition();
        let key = "f3:anonymous:i1";
        engine.start(key, def.clone(), Map::new()).await.unwrap();

        let err = engine.advance(key, def, Map::new()).await.unwrap_err();
        assert!(matches!(err, EngineError::Ambiguous(_)));
    }

    #[tokio::test]
    async fn explicit_target_step_selection() {
        let engine = Engine::new(Arc::new(MemStore::new()));
        let def = ambiguous_definition();
        let key = "f3:anonymous:i1";
        engine.start(key, def.clone(), Map::new()).await.unwrap();

        let mut payload = Map::new();
        payload.insert(TARGET_STEP_KEY.into(), Value::from("d"));
        let state = engine.advance(key, def, payload).await.unwrap();
        assert_eq!(state.current_step(), &StepId::new("d").unwrap());
    }

    #[tokio::test]
    async fn target_step_control_key_does_not_leak_into_attributes() {
        let engine = Engine::new(Arc::new(MemStore::new()));
        let def = ambiguous_definition();
        let key = "f3:anonymous:i1";
        engine.start(key, def.clone(), Map::new()).await.unwrap();

        let mut payload = Map::new();
        payload.insert(TARGET_STEP_KEY.into(), Value::from("d"));
        let state = engine.advance(key, def, payload).await.unwrap();
        assert!(!state.attributes().contains_key(TARGET_STEP_KEY));
    }

    #[tokio::test]
    async fn explicit_target_failing_its_own_predicate_fails_strictly() {
        let engine = Engine::new(Arc::new(MemStore::new()));
        let def = ambiguous_definition();
        let key = "f3:anonymous:i1";
        engine.start(key, def.clone(), Map::new()).await.unwrap();

        let mut payload = Map::new();
        payload.insert(TARGET_STEP_KEY.into(), Value::from("b"));
        let err = engine.advance(key, def, payload).await.unwrap_err();
        assert!(matches!(err, EngineError::TargetNotReachable { .. }));
    }
}
