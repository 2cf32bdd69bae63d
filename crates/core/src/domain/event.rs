use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::conversation::{ConversationId, TenantId, TraceId};

/// Version tag stamped on every emitted event.
pub const EVENT_SCHEMA_VERSION: &str = "1.0";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    ConversationStarted,
    ObjectiveStarted,
    ObjectiveCompleted,
    ObjectiveFailed,
    ObjectiveSkipped,
    InternalError,
    ConversationEnded,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ConversationStarted => "CONVERSATION_STARTED",
            Self::ObjectiveStarted => "OBJECTIVE_STARTED",
            Self::ObjectiveCompleted => "OBJECTIVE_COMPLETED",
            Self::ObjectiveFailed => "OBJECTIVE_FAILED",
            Self::ObjectiveSkipped => "OBJECTIVE_SKIPPED",
            Self::InternalError => "INTERNAL_ERROR",
            Self::ConversationEnded => "CONVERSATION_ENDED",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "CONVERSATION_STARTED" => Some(Self::ConversationStarted),
            "OBJECTIVE_STARTED" => Some(Self::ObjectiveStarted),
            "OBJECTIVE_COMPLETED" => Some(Self::ObjectiveCompleted),
            "OBJECTIVE_FAILED" => Some(Self::ObjectiveFailed),
            "OBJECTIVE_SKIPPED" => Some(Self::ObjectiveSkipped),
            "INTERNAL_ERROR" => Some(Self::InternalError),
            "CONVERSATION_ENDED" => Some(Self::ConversationEnded),
            _ => None,
        }
    }

    /// Terminal events release the trace's in-memory sequence counter.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::ConversationEnded)
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An immutable, append-only record of one conversation lifecycle moment.
/// `(trace_id, sequence_number)` is unique and gapless from 1 within a
/// trace; no update or delete operation exists anywhere in the system.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationEvent {
    pub event_id: String,
    pub event_type: EventType,
    pub schema_version: String,
    pub trace_id: TraceId,
    pub sequence_number: u64,
    pub tenant_id: TenantId,
    pub conversation_id: ConversationId,
    pub occurred_at: DateTime<Utc>,
    pub data: serde_json::Value,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
}

/// Everything the caller supplies to `EventBus::emit`; the bus fills in the
/// event id, sequence number, sanitized payload, and timestamp.
#[derive(Clone, Debug)]
pub struct EventDraft {
    pub event_type: EventType,
    pub tenant_id: TenantId,
    pub conversation_id: ConversationId,
    pub data: serde_json::Value,
    pub trace_id: Option<TraceId>,
    pub metadata: BTreeMap<String, String>,
}

impl EventDraft {
    pub fn new(
        event_type: EventType,
        tenant_id: TenantId,
        conversation_id: ConversationId,
        data: serde_json::Value,
    ) -> Self {
        Self {
            event_type,
            tenant_id,
            conversation_id,
            data,
            trace_id: None,
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_trace(mut self, trace_id: TraceId) -> Self {
        self.trace_id = Some(trace_id);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Finalizes the draft into an event. Only the event bus calls this;
    /// sequence assignment order is its emission-order guarantee.
    pub fn into_event(
        self,
        trace_id: TraceId,
        sequence_number: u64,
        data: serde_json::Value,
    ) -> ConversationEvent {
        ConversationEvent {
            event_id: Uuid::new_v4().to_string(),
            event_type: self.event_type,
            schema_version: EVENT_SCHEMA_VERSION.to_owned(),
            trace_id,
            sequence_number,
            tenant_id: self.tenant_id,
            conversation_id: self.conversation_id,
            occurred_at: Utc::now(),
            data,
            metadata: self.metadata,
        }
    }
}
