//! Voxflow core: domain model and pure logic for the objective-graph
//! orchestration engine.
//!
//! Conversation state is never stored directly: every lifecycle moment is
//! an append-only `ConversationEvent` ordered per trace by a gapless
//! sequence number, and state is the fold of that stream. This crate holds
//! the declarative graph model and its validator, the event and execution
//! wire shapes, the PII sanitizer applied to every outbound payload, the
//! durable-store seam, configuration, and the error taxonomy. Runtime
//! behavior (bus, execution client, orchestrator) lives in
//! `voxflow-engine`.

pub mod config;
pub mod domain;
pub mod errors;
pub mod sanitizer;
pub mod store;
pub mod validator;

pub use chrono;
pub use uuid;

pub use domain::conversation::{
    ConversationId, ConversationState, EndReason, ObjectiveInstance, ObjectiveState, TenantId,
    TraceId,
};
pub use domain::event::{ConversationEvent, EventDraft, EventType, EVENT_SCHEMA_VERSION};
pub use domain::execution::{PrimitiveError, PrimitiveOutcome, PrimitiveRequest};
pub use domain::graph::{GraphConfig, ObjectiveGraph, SUPPORTED_SCHEMA_VERSION};
pub use domain::objective::{EscalationPolicy, Objective, ObjectiveId, TERMINAL_SENTINEL};
pub use errors::{ApplicationError, OrchestrationError};
pub use sanitizer::Sanitizer;
pub use store::{EventStore, StoreError};
pub use validator::{GraphValidationError, GraphValidator, ValidationCode};
