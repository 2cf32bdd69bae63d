use async_trait::async_trait;
use thiserror::Error;

use crate::domain::conversation::TraceId;
use crate::domain::event::ConversationEvent;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("event store write failed: {0}")]
    Write(String),
    #[error("event store read failed: {0}")]
    Read(String),
}

/// Durable, append-only home of the event log. Writes must be idempotent
/// on the `(trace_id, sequence_number)` unique key so the bus may safely
/// retry a failed flush; reads return events ordered by sequence number.
#[async_trait]
pub trait EventStore: Send + Sync {
    async fn append_batch(&self, events: &[ConversationEvent]) -> Result<(), StoreError>;
    async fn events_for_trace(&self, trace_id: &TraceId)
        -> Result<Vec<ConversationEvent>, StoreError>;
}
