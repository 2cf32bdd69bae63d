//! Voxflow engine - runtime half of the objective-graph orchestrator.
//!
//! This crate drives conversations through validated objective graphs:
//!
//! 1. **Event bus** (`bus`) - append-only, trace-scoped, sequence-numbered
//!    event log with buffered asynchronous persistence and per-listener
//!    bounded fan-out.
//! 2. **Execution client** (`client`) - circuit-broken, timeout-bounded
//!    facade over the external primitive execution service.
//! 3. **Walk reducer** (`reducer`) - the escalation table as a pure
//!    function.
//! 4. **Orchestrator** (`engine`) - one task per conversation, bounded
//!    retries, and a visited-set guard against cyclic configs that slipped
//!    past validation.
//!
//! # Correctness principle
//!
//! Conversation state is never authoritative in memory: every lifecycle
//! moment is emitted as an event with a per-trace gapless sequence number,
//! and any consumer can rebuild state by replaying the trace. Failures are
//! communicated through the event stream, never thrown out of the engine.

pub mod bus;
pub mod client;
pub mod engine;
pub mod reducer;

pub use bus::{
    EventBus, EventListener, EventSelector, FlusherHandle, InMemoryEventStore, ListenerError,
    Subscription,
};
pub use client::{
    CircuitBreaker, CircuitBreakerConfig, ClientOptions, ExecutionClient, ExecutionTransport,
    HttpExecutionTransport, ScriptedTransport, StubExecutionTransport, TransportError,
    CIRCUIT_OPEN, EXECUTION_TIMEOUT, TRANSPORT_FAILURE,
};
pub use engine::{ConversationSummary, Orchestrator};
pub use reducer::{resolve_transition, AttemptResult, Hop, SkipReason, Transition};
