//! Persistence entities: snapshot, meta, and the aggregate unit of
//! storage composed from them.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::ids::{FlowContext, StepId};

/// Default bound on retained history entries per aggregate (spec §9:
/// "the source hard-codes 100; treat that as a default, not a
/// contract").
pub const DEFAULT_MAX_HISTORY: usize = 100;

/// A persistable record of `(step, completed, attributes)` for a flow
/// instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowSnapshot {
    /// The `FlowKey` storage-key string this snapshot belongs to.
    pub flow_id: String,
    pub step_id: StepId,
    #[serde(rename = "isCompleted")]
    pub completed: bool,
    pub attributes: Map<String, Value>,
}

impl FlowSnapshot {
    #[must_use]
    pub fn new(
        flow_id: impl Into<String>,
        step_id: StepId,
        completed: bool,
        attributes: Map<String, Value>,
    ) -> Self {
        Self {
            flow_id: flow_id.into(),
            step_id,
            completed,
            attributes,
        }
    }
}

/// Housekeeping record paired with a snapshot: status, version,
/// timestamps, and addressing context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowMeta {
    #[serde(rename = "flowContext")]
    pub context: FlowContext,
    pub status: String,
    pub step: String,
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FlowMeta {
    /// Meta for a flow instance that has not yet taken its first step:
    /// `status="NEW"`, `step="INIT"`, `version=0`, timestamps now.
    #[must_use]
    pub fn create_new(context: FlowContext) -> Self {
        let now = Utc::now();
        Self {
            context,
            status: "NEW".to_string(),
            step: "INIT".to_string(),
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Derive the next meta after a transition: bumps version, updates
    /// the step/status, and refreshes `updated_at`.
    #[must_use]
    pub fn advance(&self, step: impl Into<String>, status: impl Into<String>) -> Self {
        Self {
            context: self.context.clone(),
            status: status.into(),
            step: step.into(),
            version: self.version + 1,
            created_at: self.created_at,
            updated_at: Utc::now(),
        }
    }
}

/// The unit of persistence: meta, current snapshot, and a
/// bounded-retention history of prior snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowAggregate {
    pub meta: FlowMeta,
    pub current_snapshot: Option<FlowSnapshot>,
    pub snapshot_history: Vec<FlowSnapshot>,
}

impl FlowAggregate {
    #[must_use]
    pub fn new(meta: FlowMeta, current_snapshot: Option<FlowSnapshot>) -> Self {
        Self {
            meta,
            current_snapshot,
            snapshot_history: Vec::new(),
        }
    }

    /// Append `snapshot` to the history, retaining only the most
    /// recent `max_size` entries (oldest evicted first).
    pub fn append_history(&mut self, snapshot: FlowSnapshot, max_size: usize) {
        let mut deque: VecDeque<FlowSnapshot> = std::mem::take(&mut self.snapshot_history).into();
        deque.push_back(snapshot);
        while deque.len() > max_size {
            deque.pop_front();
        }
        self.snapshot_history = deque.into();
    }
}
