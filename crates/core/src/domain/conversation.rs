use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::execution::PrimitiveError;
use crate::domain::objective::{EscalationPolicy, ObjectiveId};

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TenantId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ConversationId(pub String);

/// Correlation key shared by every event belonging to one conversation
/// attempt.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TraceId(pub String);

impl TraceId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TraceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectiveState {
    Pending,
    InProgress,
    Completed,
    Failed,
    Skipped,
}

impl ObjectiveState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Skipped)
    }
}

/// Runtime record for one objective within one conversation. A cache over
/// the event stream, never authoritative and never persisted directly.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObjectiveInstance {
    pub objective_id: ObjectiveId,
    pub state: ObjectiveState,
    pub attempts: u32,
    pub captured_data: Option<serde_json::Value>,
    pub error: Option<PrimitiveError>,
}

impl ObjectiveInstance {
    pub fn pending(objective_id: ObjectiveId) -> Self {
        Self {
            objective_id,
            state: ObjectiveState::Pending,
            attempts: 0,
            captured_data: None,
            error: None,
        }
    }
}

/// Why a conversation reached its terminal event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EndReason {
    Completed,
    Failed { escalation: EscalationPolicy },
    InternalError,
}

impl EndReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Failed { .. } => "failed",
            Self::InternalError => "internal_error",
        }
    }
}

/// In-memory state for one conversation run. Exclusively owned and mutated
/// by the task driving that conversation; reconstructable by folding the
/// trace's event stream, and evicted once the terminal event is emitted.
#[derive(Clone, Debug)]
pub struct ConversationState {
    pub tenant_id: TenantId,
    pub conversation_id: ConversationId,
    pub trace_id: TraceId,
    pub current_objective: Option<ObjectiveId>,
    pub completed: BTreeSet<ObjectiveId>,
    pub failed: BTreeSet<ObjectiveId>,
    pub skipped: BTreeSet<ObjectiveId>,
    pub instances: BTreeMap<ObjectiveId, ObjectiveInstance>,
    pub visited: BTreeSet<ObjectiveId>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl ConversationState {
    pub fn new(tenant_id: TenantId, conversation_id: ConversationId, trace_id: TraceId) -> Self {
        Self {
            tenant_id,
            conversation_id,
            trace_id,
            current_objective: None,
            completed: BTreeSet::new(),
            failed: BTreeSet::new(),
            skipped: BTreeSet::new(),
            instances: BTreeMap::new(),
            visited: BTreeSet::new(),
            started_at: Utc::now(),
            ended_at: None,
        }
    }

    pub fn instance_mut(&mut self, objective_id: &ObjectiveId) -> &mut ObjectiveInstance {
        self.instances
            .entry(objective_id.clone())
            .or_insert_with(|| ObjectiveInstance::pending(objective_id.clone()))
    }

    /// Records an objective's terminal state, keeping the three id sets
    /// disjoint when an escalation re-marks a failed objective as skipped.
    pub fn mark(&mut self, objective_id: &ObjectiveId, state: ObjectiveState) {
        self.completed.remove(objective_id);
        self.failed.remove(objective_id);
        self.skipped.remove(objective_id);
        match state {
            ObjectiveState::Completed => {
                self.completed.insert(objective_id.clone());
            }
            ObjectiveState::Failed => {
                self.failed.insert(objective_id.clone());
            }
            ObjectiveState::Skipped => {
                self.skipped.insert(objective_id.clone());
            }
            ObjectiveState::Pending | ObjectiveState::InProgress => {}
        }
        self.instance_mut(objective_id).state = state;
    }

    pub fn duration_ms(&self) -> Option<i64> {
        self.ended_at.map(|ended| (ended - self.started_at).num_milliseconds())
    }

    /// Rebuilds conversation state by folding a trace's event stream. The
    /// in-memory state held by a running engine is only a cache of this
    /// fold; anything reconstructable here is everything there is.
    pub fn from_events(events: &[crate::domain::event::ConversationEvent]) -> Option<Self> {
        use crate::domain::event::EventType;

        let first = events.first()?;
        let mut state = Self {
            tenant_id: first.tenant_id.clone(),
            conversation_id: first.conversation_id.clone(),
            trace_id: first.trace_id.clone(),
            current_objective: None,
            completed: BTreeSet::new(),
            failed: BTreeSet::new(),
            skipped: BTreeSet::new(),
            instances: BTreeMap::new(),
            visited: BTreeSet::new(),
            started_at: first.occurred_at,
            ended_at: None,
        };

        for event in events {
            let objective_id = event
                .data
                .get("objective_id")
                .and_then(serde_json::Value::as_str)
                .map(ObjectiveId::new);
            match (event.event_type, objective_id) {
                (EventType::ObjectiveStarted, Some(id)) => {
                    state.visited.insert(id.clone());
                    state.current_objective = Some(id.clone());
                    state.instance_mut(&id).state = ObjectiveState::InProgress;
                }
                (EventType::ObjectiveCompleted, Some(id)) => {
                    state.mark(&id, ObjectiveState::Completed);
                    let instance = state.instance_mut(&id);
                    instance.captured_data = event.data.get("data").cloned();
                    instance.attempts = attempts_field(&event.data);
                }
                (EventType::ObjectiveFailed, Some(id)) => {
                    state.mark(&id, ObjectiveState::Failed);
                    let error = PrimitiveError {
                        code: string_field(&event.data, "error_code"),
                        message: string_field(&event.data, "error_message"),
                    };
                    let instance = state.instance_mut(&id);
                    instance.error = Some(error);
                    instance.attempts = attempts_field(&event.data);
                }
                (EventType::ObjectiveSkipped, Some(id)) => {
                    state.mark(&id, ObjectiveState::Skipped);
                }
                (EventType::ConversationEnded, _) => {
                    state.ended_at = Some(event.occurred_at);
                    state.current_objective = None;
                }
                _ => {}
            }
        }

        Some(state)
    }
}

fn attempts_field(data: &serde_json::Value) -> u32 {
    data.get("attempts").and_then(serde_json::Value::as_u64).unwrap_or(0) as u32
}

fn string_field(data: &serde_json::Value, key: &str) -> String {
    data.get(key).and_then(serde_json::Value::as_str).unwrap_or_default().to_owned()
}
