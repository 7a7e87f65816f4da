//! Deserializes a [`FlowDefinition`] from JSON.
//!
//! Unknown properties are ignored; transitions loaded from JSON never
//! attach a predicate and default to [`Predicate::always`] — a
//! conditional transition can only be built programmatically.

use std::path::Path;

use flow_domain::{DefinitionError, FlowDefinition, FlowId, NavigationType, StepDefinition, StepId, Transition};
use serde::Deserialize;
use thiserror::Error;

/// Parser failures, carrying the descriptor of the source that was
/// being read (a path, or `"string"`/`"stream"`).
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("failed to parse flow definition from {source_descriptor}")]
    Json {
        source_descriptor: String,
        #[source]
        cause: serde_json::Error,
    },

    #[error("flow definition from {source_descriptor} is invalid")]
    Definition {
        source_descriptor: String,
        #[source]
        cause: DefinitionError,
    },

    #[error("failed to read flow definition from {path}")]
    Io {
        path: String,
        #[source]
        cause: std::io::Error,
    },
}

#[derive(Debug, Deserialize)]
struct WireDefinition {
    id: String,
    #[serde(rename = "initialStep")]
    initial_step: String,
    steps: Vec<WireStep>,
}

#[derive(Debug, Deserialize)]
struct WireStep {
    id: String,
    #[serde(rename = "navigationType", default)]
    navigation_type: WireNavigationType,
    transitions: Vec<WireTransition>,
}

#[derive(Debug, Deserialize, Default, Clone, Copy)]
#[serde(rename_all = "UPPERCASE")]
enum WireNavigationType {
    #[default]
    Simple,
    Complex,
}

#[derive(Debug, Deserialize)]
struct WireTransition {
    to: Option<String>,
    #[serde(rename = "endOfFlow", default)]
    end_of_flow: bool,
}

/// Parse a definition from a JSON string, identifying the source as
/// `source_descriptor` in any resulting error.
pub fn parse_str(json: &str, source_descriptor: &str) -> Result<FlowDefinition, ParseError> {
    let wire: WireDefinition =
        serde_json::from_str(json).map_err(|cause| ParseError::Json {
            source_descriptor: source_descriptor.to_string(),
            cause,
        })?;
    build(wire, source_descriptor)
}

/// Parse a definition from raw bytes (e.g. a network payload),
/// identifying the source as `"stream"`.
pub fn parse_slice(bytes: &[u8]) -> Result<FlowDefinition, ParseError> {
    let wire: WireDefinition = serde_json::from_slice(bytes).map_err(|cause| ParseError::Json {
        source_descriptor: "stream".to_string(),
        cause,
    })?;
    build(wire, "stream")
}

/// Parse a definition from a file on disk, identifying the source as
/// the file's path.
pub fn parse_file(path: impl AsRef<Path>) -> Result<FlowDefinition, ParseError> {
    let path = path.as_ref();
    let descriptor = path.display().to_string();
    let contents = std::fs::read_to_string(path).map_err(|cause| ParseError::Io {
        path: descriptor.clone(),
        cause,
    })?;
    parse_str(&contents, &descriptor)
}

fn build(wire: WireDefinition, source_descriptor: &str) -> Result<FlowDefinition, ParseError> {
    let to_definition_error = |cause: DefinitionError| ParseError::Definition {
        source_descriptor: source_descriptor.to_string(),
        cause,
    };

    let id = FlowId::new(wire.id).map_err(|e| to_definition_error(DefinitionError::UnresolvedName(e.to_string())))?;
    let initial_step = StepId::new(wire.initial_step)
        .map_err(|e| to_definition_error(DefinitionError::UnresolvedName(e.to_string())))?;

    let mut steps = Vec::with_capacity(wire.steps.len());
    for wire_step in wire.steps {
        let step_id = StepId::new(wire_step.id)
            .map_err(|e| to_definition_error(DefinitionError::UnresolvedName(e.to_string())))?;
        let navigation_type = match wire_step.navigation_type {
            WireNavigationType::Simple => NavigationType::Simple,
            WireNavigationType::Complex => NavigationType::Complex,
        };

        let mut transitions = Vec::with_capacity(wire_step.transitions.len());
        for wire_transition in wire_step.transitions {
            transitions.push(build_transition(wire_transition, source_descriptor)?);
        }

        steps.push(
            StepDefinition::new(step_id, navigation_type, transitions).map_err(to_definition_error)?,
        );
    }

    FlowDefinition::new(id, initial_step, steps).map_err(to_definition_error)
}

// `{ "to": "<id>" }`, `{ "endOfFlow": true }`, and
// `{ "to": "<id>", "endOfFlow": false }` are all accepted; `to` set
// together with `endOfFlow: true`, or neither set, is rejected.
fn build_transition(wire: WireTransition, source_descriptor: &str) -> Result<Transition, ParseError> {
    let invalid_shape = |msg: &str| ParseError::Definition {
        source_descriptor: source_descriptor.to_string(),
        cause: DefinitionError::InvalidTransitionShape(msg.to_string()),
    };

    match (wire.to, wire.end_of_flow) {
        (Some(_), true) => Err(invalid_shape("sets both 'to' and 'endOfFlow: true'")),
        (Some(to), false) => {
            let to = StepId::new(to).map_err(|e| ParseError::Definition {
                source_descriptor: source_descriptor.to_string(),
                cause: DefinitionError::UnresolvedName(e.to_string()),
            })?;
            Ok(Transition::to(to))
        }
        (None, true) => Ok(Transition::eof()),
        (None, false) => Err(invalid_shape("sets neither 'to' nor 'endOfFlow'")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_two_step_definition() {
        let json = r#"{
            "id": "onboarding",
            "initialStep": "s1",
            "steps": [
                { "id": "s1", "transitions": [ { "to": "s2" } ] },
                { "id": "s2", "navigationType": "SIMPLE", "transitions": [ { "endOfFlow": true } ] }
            ]
        }"#;
        let def = parse_str(json, "string").unwrap();
        assert_eq!(def.id().as_str(), "onboarding");
        assert_eq!(def.steps().len(), 2);
        assert!(def.step(&StepId::new("s2").unwrap()).unwrap().transitions()[0].is_end_of_flow());
    }

    #[test]
    fn ignores_unknown_fields() {
        let json = r#"{
            "id": "f",
            "initialStep": "s1",
            "description": "unused",
            "steps": [
                { "id": "s1", "extra": 1, "transitions": [ { "endOfFlow": true, "weight": 2 } ] }
            ]
        }"#;
        assert!(parse_str(json, "string").is_ok());
    }

    #[test]
    fn defaults_navigation_type_to_simple() {
        let json = r#"{
            "id": "f",
            "initialStep": "s1",
            "steps": [ { "id": "s1", "transitions": [ { "endOfFlow": true } ] } ]
        }"#;
        let def = parse_str(json, "string").unwrap();
        assert_eq!(
            def.step(&StepId::new("s1").unwrap()).unwrap().navigation_type(),
            NavigationType::Simple
        );
    }

    #[test]
    fn complex_step_with_explicit_to_and_end_of_flow_false() {
        let json = r#"{
            "id": "f",
            "initialStep": "s1",
            "steps": [
                { "id": "s1", "navigationType": "COMPLEX", "transitions": [
                    { "to": "s2", "endOfFlow": false },
                    { "endOfFlow": true }
                ] },
                { "id": "s2", "transitions": [ { "endOfFlow": true } ] }
            ]
        }"#;
        let def = parse_str(json, "string").unwrap();
        let s1 = def.step(&StepId::new("s1").unwrap()).unwrap();
        assert_eq!(s1.transitions().len(), 2);
        assert!(!s1.transitions()[0].is_end_of_flow());
    }

    #[test]
    fn rejects_malformed_json() {
        let err = parse_str("not json", "string").unwrap_err();
        assert!(matches!(err, ParseError::Json { .. }));
    }

    #[test]
    fn rejects_duplicate_step_ids_as_definition_error() {
        let json = r#"{
            "id": "f",
            "initialStep": "s1",
            "steps": [
                { "id": "s1", "transitions": [ { "endOfFlow": true } ] },
                { "id": "s1", "transitions": [ { "endOfFlow": true } ] }
            ]
        }"#;
        let err = parse_str(json, "string").unwrap_err();
        assert!(matches!(err, ParseError::Definition { .. }));
    }
}
