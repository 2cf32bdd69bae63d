//! The orchestration engine: walks a validated objective graph for one
//! conversation at a time, coordinating the execution client and the
//! event bus.
//!
//! Each conversation is driven by a single task that exclusively owns its
//! `ConversationState`; conversations share only the bus and the client.
//! Nothing a walk does can throw out of the engine: every failure mode,
//! including invariant violations, surfaces through the event stream.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use tracing::{error, info, warn};

use voxflow_core::{
    ConversationId, ConversationState, EndReason, EventDraft, EventType, GraphConfig,
    GraphValidator, Objective, ObjectiveGraph, ObjectiveId, ObjectiveState, OrchestrationError,
    PrimitiveRequest, TenantId, TraceId,
};

use crate::bus::EventBus;
use crate::client::ExecutionClient;
use crate::reducer::{resolve_transition, AttemptResult, Hop};

/// Terminal snapshot of one conversation run, mirroring the
/// `CONVERSATION_ENDED` event for callers that awaited the walk.
#[derive(Clone, Debug)]
pub struct ConversationSummary {
    pub trace_id: TraceId,
    pub reason: EndReason,
    pub completed: BTreeSet<ObjectiveId>,
    pub failed: BTreeSet<ObjectiveId>,
    pub skipped: BTreeSet<ObjectiveId>,
    pub duration_ms: i64,
}

#[derive(Clone)]
pub struct Orchestrator {
    bus: EventBus,
    client: Arc<ExecutionClient>,
    validator: GraphValidator,
}

impl Orchestrator {
    pub fn new(bus: EventBus, client: Arc<ExecutionClient>) -> Self {
        Self { bus, client, validator: GraphValidator::new() }
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Validates the graph and returns the trace id synchronously; the
    /// walk itself runs on its own task and is observed via events.
    pub fn start_conversation(
        &self,
        tenant_id: TenantId,
        conversation_id: ConversationId,
        config: &GraphConfig,
        trace_id: Option<TraceId>,
    ) -> Result<TraceId, OrchestrationError> {
        let graph =
            self.validator.validate(config).map_err(OrchestrationError::InvalidGraph)?;
        let trace_id = trace_id.unwrap_or_else(TraceId::generate);
        let state = ConversationState::new(tenant_id, conversation_id, trace_id.clone());
        let meta = StartMetadata::from_config(config);

        let engine = self.clone();
        tokio::spawn(async move {
            engine.drive(state, graph, meta).await;
        });

        Ok(trace_id)
    }

    /// Same walk as `start_conversation`, awaitable. Used by tests and the
    /// CLI's `simulate`.
    pub async fn run_conversation(
        &self,
        tenant_id: TenantId,
        conversation_id: ConversationId,
        config: &GraphConfig,
        trace_id: Option<TraceId>,
    ) -> Result<ConversationSummary, OrchestrationError> {
        let graph =
            self.validator.validate(config).map_err(OrchestrationError::InvalidGraph)?;
        let trace_id = trace_id.unwrap_or_else(TraceId::generate);
        let state = ConversationState::new(tenant_id, conversation_id, trace_id);
        let meta = StartMetadata::from_config(config);

        Ok(self.drive(state, graph, meta).await)
    }

    async fn drive(
        &self,
        mut state: ConversationState,
        graph: ObjectiveGraph,
        meta: StartMetadata,
    ) -> ConversationSummary {
        info!(
            trace_id = %state.trace_id,
            conversation_id = %state.conversation_id.0,
            objectives = meta.objective_count,
            "conversation started"
        );
        self.emit(
            &state,
            EventType::ConversationStarted,
            json!({
                "locale": meta.locale,
                "objective_count": meta.objective_count,
                "config_version": meta.schema_version,
            }),
        );

        let mut current = graph.root().clone();
        let reason = loop {
            // Safety net for graphs that bypassed validation: a revisited
            // identifier aborts this conversation, never the process.
            if !state.visited.insert(current.clone()) {
                error!(
                    trace_id = %state.trace_id,
                    objective_id = %current,
                    "objective revisited during walk; aborting conversation"
                );
                self.emit(
                    &state,
                    EventType::InternalError,
                    json!({
                        "objective_id": current.as_str(),
                        "message": "objective revisited during walk; graph cycle slipped past validation",
                    }),
                );
                break EndReason::InternalError;
            }
            let Some(objective) = graph.objective(&current).cloned() else {
                error!(
                    trace_id = %state.trace_id,
                    objective_id = %current,
                    "walk reached undeclared objective; aborting conversation"
                );
                self.emit(
                    &state,
                    EventType::InternalError,
                    json!({
                        "objective_id": current.as_str(),
                        "message": "walk reached an objective missing from the graph",
                    }),
                );
                break EndReason::InternalError;
            };

            state.current_objective = Some(current.clone());
            let result = self.execute_objective(&mut state, &objective).await;
            let transition = resolve_transition(&objective, &result);

            state.mark(&current, transition.mark);
            if transition.emit_failed {
                if let AttemptResult::Failed { error, attempts } = &result {
                    self.emit(
                        &state,
                        EventType::ObjectiveFailed,
                        json!({
                            "objective_id": current.as_str(),
                            "error_code": error.code,
                            "error_message": error.message,
                            "attempts": attempts,
                        }),
                    );
                }
            }
            if let Some(skip_reason) = transition.skip_reason {
                self.emit(
                    &state,
                    EventType::ObjectiveSkipped,
                    json!({
                        "objective_id": current.as_str(),
                        "reason": skip_reason.as_str(),
                    }),
                );
            }

            match transition.next {
                Hop::Objective(next) => current = next,
                Hop::End(reason) => break reason,
            }
        };

        self.end_conversation(state, reason)
    }

    /// The bounded retry loop for one objective. Intermediate attempts are
    /// warn-logged only; the single terminal outcome is what reaches the
    /// event stream.
    async fn execute_objective(
        &self,
        state: &mut ConversationState,
        objective: &Objective,
    ) -> AttemptResult {
        state.instance_mut(&objective.id).state = ObjectiveState::InProgress;
        self.emit(
            state,
            EventType::ObjectiveStarted,
            json!({
                "objective_id": objective.id.as_str(),
                "primitive_type": objective.primitive_type,
                "purpose": objective.purpose,
                "required": objective.required,
            }),
        );

        let max_retries = objective.max_retries.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            state.instance_mut(&objective.id).attempts = attempt;

            let request = PrimitiveRequest {
                primitive_type: objective.primitive_type.clone(),
                conversation_id: state.conversation_id.clone(),
                trace_id: state.trace_id.clone(),
                purpose: objective.purpose.clone(),
                metadata: BTreeMap::from([
                    ("objective_id".to_owned(), objective.id.0.clone()),
                    ("attempt".to_owned(), attempt.to_string()),
                ]),
            };
            let outcome = self.client.execute(request).await;

            if outcome.success {
                let data = outcome.data.clone();
                let instance = state.instance_mut(&objective.id);
                instance.captured_data = data.clone();
                self.emit(
                    state,
                    EventType::ObjectiveCompleted,
                    json!({
                        "objective_id": objective.id.as_str(),
                        "data": data,
                        "attempts": attempt,
                    }),
                );
                return AttemptResult::Succeeded { data };
            }

            let error = outcome.error_or_unknown();
            if attempt >= max_retries {
                state.instance_mut(&objective.id).error = Some(error.clone());
                return AttemptResult::Failed { error, attempts: attempt };
            }
            warn!(
                trace_id = %state.trace_id,
                objective_id = %objective.id,
                attempt,
                max_retries,
                error = %error,
                "objective attempt failed; retrying"
            );
        }
    }

    fn end_conversation(
        &self,
        mut state: ConversationState,
        reason: EndReason,
    ) -> ConversationSummary {
        state.ended_at = Some(Utc::now());
        let duration_ms = state.duration_ms().unwrap_or(0);

        let mut draft = EventDraft::new(
            EventType::ConversationEnded,
            state.tenant_id.clone(),
            state.conversation_id.clone(),
            json!({
                "reason": reason.as_str(),
                "completed": ids(&state.completed),
                "failed": ids(&state.failed),
                "skipped": ids(&state.skipped),
                "duration_ms": duration_ms,
            }),
        )
        .with_trace(state.trace_id.clone());
        if let EndReason::Failed { escalation } = &reason {
            draft = draft.with_metadata("escalation", escalation.as_str());
        }
        self.bus.emit(draft);

        info!(
            trace_id = %state.trace_id,
            reason = reason.as_str(),
            duration_ms,
            "conversation ended"
        );

        // The in-memory state dies with this summary; the event log is the
        // authoritative record from here on.
        ConversationSummary {
            trace_id: state.trace_id,
            reason,
            completed: state.completed,
            failed: state.failed,
            skipped: state.skipped,
            duration_ms,
        }
    }

    fn emit(&self, state: &ConversationState, event_type: EventType, data: serde_json::Value) {
        self.bus.emit(
            EventDraft::new(
                event_type,
                state.tenant_id.clone(),
                state.conversation_id.clone(),
                data,
            )
            .with_trace(state.trace_id.clone()),
        );
    }
}

#[derive(Clone, Debug)]
struct StartMetadata {
    locale: String,
    objective_count: usize,
    schema_version: String,
}

impl StartMetadata {
    fn from_config(config: &GraphConfig) -> Self {
        Self {
            locale: config.locale.clone(),
            objective_count: config.objective_count(),
            schema_version: config.schema_version.clone(),
        }
    }
}

fn ids(set: &BTreeSet<ObjectiveId>) -> Vec<&str> {
    set.iter().map(ObjectiveId::as_str).collect()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use serde_json::json;

    use voxflow_core::config::BusConfig;
    use voxflow_core::{
        ConversationId, EndReason, EscalationPolicy, EventType, GraphConfig, Objective,
        ObjectiveId, PrimitiveError, PrimitiveOutcome, Sanitizer, TenantId, ValidationCode,
    };

    use crate::bus::{EventBus, InMemoryEventStore};
    use crate::client::{
        ClientOptions, ExecutionClient, ExecutionTransport, ScriptedTransport,
        StubExecutionTransport,
    };

    use super::Orchestrator;

    fn orchestrator(transport: Arc<dyn ExecutionTransport>) -> Orchestrator {
        let bus = EventBus::new(
            Arc::new(InMemoryEventStore::new()),
            Sanitizer::default(),
            BusConfig { flush_interval_secs: 3600, flush_threshold: 1000, listener_queue_depth: 16 },
        );
        let client = Arc::new(ExecutionClient::new(
            transport,
            ClientOptions { timeout: Duration::from_secs(5), ..ClientOptions::default() },
        ));
        Orchestrator::new(bus, client)
    }

    fn objective(
        id: &str,
        required: bool,
        max_retries: u32,
        escalation: EscalationPolicy,
        on_success: Option<&str>,
        on_failure: Option<&str>,
    ) -> Objective {
        Objective {
            id: ObjectiveId::new(id),
            primitive_type: format!("capture_{id}"),
            purpose: format!("capture {id}"),
            required,
            max_retries,
            on_success: on_success.map(str::to_owned),
            on_failure: on_failure.map(str::to_owned),
            escalation,
        }
    }

    fn config(root: &str, objectives: Vec<Objective>) -> GraphConfig {
        GraphConfig {
            tenant_id: "t-100".to_owned(),
            locale: "en-US".to_owned(),
            schema_version: "1.0".to_owned(),
            root: ObjectiveId::new(root),
            objectives,
        }
    }

    fn success(data: serde_json::Value) -> Result<PrimitiveOutcome, crate::client::TransportError> {
        Ok(PrimitiveOutcome::succeeded(Some(data)))
    }

    fn failure(code: &str) -> Result<PrimitiveOutcome, crate::client::TransportError> {
        Ok(PrimitiveOutcome::failed(PrimitiveError::new(code, "primitive failed")))
    }

    #[tokio::test]
    async fn two_objective_happy_path_emits_the_full_lifecycle_in_order() {
        let transport = ScriptedTransport::new(vec![
            success(json!({"value": "captured"})),
            success(json!({"value": "captured"})),
        ]);
        let engine = orchestrator(Arc::new(transport));
        let graph = config(
            "email",
            vec![
                objective("email", true, 3, EscalationPolicy::Retry, Some("phone"), None),
                objective("phone", true, 3, EscalationPolicy::Retry, Some("end"), None),
            ],
        );

        let summary = engine
            .run_conversation(
                TenantId("t-100".to_owned()),
                ConversationId("c-1".to_owned()),
                &graph,
                None,
            )
            .await
            .expect("valid graph runs");

        assert_eq!(summary.reason, EndReason::Completed);
        assert_eq!(summary.completed.len(), 2);

        let events = engine.bus().replay(&summary.trace_id).await.expect("replay");
        let types: Vec<EventType> = events.iter().map(|event| event.event_type).collect();
        assert_eq!(
            types,
            vec![
                EventType::ConversationStarted,
                EventType::ObjectiveStarted,
                EventType::ObjectiveCompleted,
                EventType::ObjectiveStarted,
                EventType::ObjectiveCompleted,
                EventType::ConversationEnded,
            ]
        );
        let sequences: Vec<u64> = events.iter().map(|event| event.sequence_number).collect();
        assert_eq!(sequences, vec![1, 2, 3, 4, 5, 6]);
        assert_eq!(events[1].data["objective_id"], "email");
        assert_eq!(events[3].data["objective_id"], "phone");
        assert_eq!(events[5].data["reason"], "completed");
    }

    #[tokio::test]
    async fn required_failure_with_abort_ends_failed_after_one_attempt() {
        let transport = ScriptedTransport::new(vec![failure("NO_ANSWER")]);
        let engine = orchestrator(Arc::new(transport));
        let graph = config(
            "email",
            vec![objective("email", true, 1, EscalationPolicy::Abort, Some("end"), None)],
        );

        let summary = engine
            .run_conversation(
                TenantId("t-100".to_owned()),
                ConversationId("c-2".to_owned()),
                &graph,
                None,
            )
            .await
            .expect("valid graph runs");

        assert_eq!(summary.reason, EndReason::Failed { escalation: EscalationPolicy::Abort });
        assert!(summary.failed.contains(&ObjectiveId::new("email")));

        let events = engine.bus().replay(&summary.trace_id).await.expect("replay");
        let types: Vec<EventType> = events.iter().map(|event| event.event_type).collect();
        assert_eq!(
            types,
            vec![
                EventType::ConversationStarted,
                EventType::ObjectiveStarted,
                EventType::ObjectiveFailed,
                EventType::ConversationEnded,
            ]
        );
        assert_eq!(events[2].data["attempts"], 1);
        assert_eq!(events[3].data["reason"], "failed");
        assert_eq!(events[3].metadata.get("escalation").map(String::as_str), Some("abort"));
    }

    #[tokio::test]
    async fn always_failing_objective_is_attempted_exactly_max_retries_times() {
        let transport = ScriptedTransport::new(vec![
            failure("NO_ANSWER"),
            failure("NO_ANSWER"),
            failure("NO_ANSWER"),
        ]);
        let engine = orchestrator(Arc::new(transport.clone()));
        let graph = config(
            "email",
            vec![objective("email", true, 3, EscalationPolicy::Abort, Some("end"), None)],
        );

        let summary = engine
            .run_conversation(
                TenantId("t-100".to_owned()),
                ConversationId("c-3".to_owned()),
                &graph,
                None,
            )
            .await
            .expect("valid graph runs");

        assert_eq!(transport.remaining(), 0, "exactly max_retries calls reach the service");
        let events = engine.bus().replay(&summary.trace_id).await.expect("replay");
        let failed = events
            .iter()
            .find(|event| event.event_type == EventType::ObjectiveFailed)
            .expect("failure event");
        assert_eq!(failed.data["attempts"], 3);
    }

    #[tokio::test]
    async fn retry_succeeds_before_the_bound_and_reports_the_winning_attempt() {
        let transport = ScriptedTransport::new(vec![
            failure("NO_ANSWER"),
            success(json!({"value": "captured"})),
        ]);
        let engine = orchestrator(Arc::new(transport));
        let graph = config(
            "email",
            vec![objective("email", true, 3, EscalationPolicy::Abort, Some("end"), None)],
        );

        let summary = engine
            .run_conversation(
                TenantId("t-100".to_owned()),
                ConversationId("c-4".to_owned()),
                &graph,
                None,
            )
            .await
            .expect("valid graph runs");

        assert_eq!(summary.reason, EndReason::Completed);
        let events = engine.bus().replay(&summary.trace_id).await.expect("replay");
        let completed = events
            .iter()
            .find(|event| event.event_type == EventType::ObjectiveCompleted)
            .expect("completion event");
        assert_eq!(completed.data["attempts"], 2);
        // Intermediate failed attempts are not separately event-logged.
        assert!(!events.iter().any(|event| event.event_type == EventType::ObjectiveFailed));
    }

    #[tokio::test]
    async fn non_required_failure_is_skipped_and_the_walk_continues() {
        let transport = ScriptedTransport::new(vec![
            failure("NO_ANSWER"),
            success(json!({"value": "captured"})),
        ]);
        let engine = orchestrator(Arc::new(transport));
        let graph = config(
            "survey",
            vec![
                objective("survey", false, 1, EscalationPolicy::Retry, Some("email"), None),
                objective("email", true, 3, EscalationPolicy::Retry, Some("end"), None),
            ],
        );

        let summary = engine
            .run_conversation(
                TenantId("t-100".to_owned()),
                ConversationId("c-5".to_owned()),
                &graph,
                None,
            )
            .await
            .expect("valid graph runs");

        assert_eq!(summary.reason, EndReason::Completed);
        assert!(summary.skipped.contains(&ObjectiveId::new("survey")));
        assert!(summary.completed.contains(&ObjectiveId::new("email")));

        let events = engine.bus().replay(&summary.trace_id).await.expect("replay");
        let skipped = events
            .iter()
            .find(|event| event.event_type == EventType::ObjectiveSkipped)
            .expect("skip event");
        assert_eq!(skipped.data["reason"], "non_required_failure");
        assert!(!events.iter().any(|event| event.event_type == EventType::ObjectiveFailed));
    }

    #[tokio::test]
    async fn default_escalation_records_the_failure_and_continues_on_the_failure_edge() {
        let transport = ScriptedTransport::new(vec![
            failure("NO_ANSWER"),
            success(json!({"value": "captured"})),
        ]);
        let engine = orchestrator(Arc::new(transport));
        let graph = config(
            "email",
            vec![
                objective("email", true, 1, EscalationPolicy::Retry, Some("end"), Some("phone")),
                objective("phone", true, 3, EscalationPolicy::Retry, Some("end"), None),
            ],
        );

        let summary = engine
            .run_conversation(
                TenantId("t-100".to_owned()),
                ConversationId("c-6".to_owned()),
                &graph,
                None,
            )
            .await
            .expect("valid graph runs");

        // The open-question asymmetry: walk continued, conversation ended
        // completed, but email stays counted as failed.
        assert_eq!(summary.reason, EndReason::Completed);
        assert!(summary.failed.contains(&ObjectiveId::new("email")));
        assert!(summary.completed.contains(&ObjectiveId::new("phone")));
    }

    #[tokio::test]
    async fn escalation_skip_re_marks_the_objective_and_emits_both_events() {
        let transport = ScriptedTransport::new(vec![
            failure("NO_ANSWER"),
            success(json!({"value": "captured"})),
        ]);
        let engine = orchestrator(Arc::new(transport));
        let graph = config(
            "email",
            vec![
                objective("email", true, 1, EscalationPolicy::Skip, Some("end"), Some("phone")),
                objective("phone", true, 3, EscalationPolicy::Retry, Some("end"), None),
            ],
        );

        let summary = engine
            .run_conversation(
                TenantId("t-100".to_owned()),
                ConversationId("c-7".to_owned()),
                &graph,
                None,
            )
            .await
            .expect("valid graph runs");

        assert!(summary.skipped.contains(&ObjectiveId::new("email")));
        assert!(!summary.failed.contains(&ObjectiveId::new("email")));

        let events = engine.bus().replay(&summary.trace_id).await.expect("replay");
        assert!(events.iter().any(|event| event.event_type == EventType::ObjectiveFailed));
        let skipped = events
            .iter()
            .find(|event| event.event_type == EventType::ObjectiveSkipped)
            .expect("skip event");
        assert_eq!(skipped.data["reason"], "escalation_skip");
    }

    #[tokio::test]
    async fn cyclic_graph_is_rejected_before_any_event_is_emitted() {
        let engine = orchestrator(Arc::new(StubExecutionTransport::default()));
        let graph = config(
            "a",
            vec![
                objective("a", true, 3, EscalationPolicy::Retry, Some("b"), None),
                objective("b", true, 3, EscalationPolicy::Retry, Some("a"), None),
            ],
        );

        let error = engine
            .start_conversation(
                TenantId("t-100".to_owned()),
                ConversationId("c-8".to_owned()),
                &graph,
                None,
            )
            .expect_err("cycle must be rejected");

        let codes: Vec<ValidationCode> =
            error.validation_errors().iter().map(|failure| failure.code).collect();
        assert!(codes.contains(&ValidationCode::CycleDetected));
    }

    #[tokio::test]
    async fn runtime_cycle_guard_aborts_the_conversation_with_an_internal_error() {
        use voxflow_core::ObjectiveGraph;

        // Bypass validation the way a stale config source would.
        let transport = StubExecutionTransport::default();
        let engine = orchestrator(Arc::new(transport));
        let graph = ObjectiveGraph::new_unchecked(
            ObjectiveId::new("a"),
            [
                (
                    ObjectiveId::new("a"),
                    objective("a", true, 3, EscalationPolicy::Retry, Some("b"), None),
                ),
                (
                    ObjectiveId::new("b"),
                    objective("b", true, 3, EscalationPolicy::Retry, Some("a"), None),
                ),
            ]
            .into_iter()
            .collect(),
        );
        let state = voxflow_core::ConversationState::new(
            TenantId("t-100".to_owned()),
            ConversationId("c-9".to_owned()),
            voxflow_core::TraceId::generate(),
        );
        let trace = state.trace_id.clone();

        let summary = engine
            .drive(
                state,
                graph,
                super::StartMetadata {
                    locale: "en-US".to_owned(),
                    objective_count: 2,
                    schema_version: "1.0".to_owned(),
                },
            )
            .await;

        assert_eq!(summary.reason, EndReason::InternalError);
        let events = engine.bus().replay(&trace).await.expect("replay");
        assert!(events.iter().any(|event| event.event_type == EventType::InternalError));
        let ended = events.last().expect("terminal event");
        assert_eq!(ended.event_type, EventType::ConversationEnded);
        assert_eq!(ended.data["reason"], "internal_error");
    }

    #[tokio::test]
    async fn start_conversation_returns_the_trace_and_progress_arrives_via_events() {
        let engine = orchestrator(Arc::new(StubExecutionTransport::default()));
        let graph = config(
            "email",
            vec![objective("email", true, 3, EscalationPolicy::Retry, Some("end"), None)],
        );

        let trace = engine
            .start_conversation(
                TenantId("t-100".to_owned()),
                ConversationId("c-10".to_owned()),
                &graph,
                None,
            )
            .expect("starts");

        // The walk runs on its own task; poll replay until terminal.
        let mut events = Vec::new();
        for _ in 0..50 {
            events = engine.bus().replay(&trace).await.expect("replay");
            if events.last().map(|event| event.event_type) == Some(EventType::ConversationEnded) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(
            events.last().map(|event| event.event_type),
            Some(EventType::ConversationEnded)
        );
    }

    #[tokio::test]
    async fn replayed_stream_folds_back_to_the_terminal_state() {
        let transport = ScriptedTransport::new(vec![
            success(json!({"value": "captured"})),
            failure("NO_ANSWER"),
        ]);
        let engine = orchestrator(Arc::new(transport));
        let graph = config(
            "email",
            vec![
                objective("email", true, 3, EscalationPolicy::Retry, Some("phone"), None),
                objective("phone", true, 1, EscalationPolicy::Abort, Some("end"), None),
            ],
        );

        let summary = engine
            .run_conversation(
                TenantId("t-100".to_owned()),
                ConversationId("c-12".to_owned()),
                &graph,
                None,
            )
            .await
            .expect("valid graph runs");

        let events = engine.bus().replay(&summary.trace_id).await.expect("replay");
        let folded =
            voxflow_core::ConversationState::from_events(&events).expect("non-empty stream");

        assert_eq!(folded.completed, summary.completed);
        assert_eq!(folded.failed, summary.failed);
        assert_eq!(folded.skipped, summary.skipped);
        assert!(folded.ended_at.is_some());
        assert_eq!(
            folded.instances[&ObjectiveId::new("phone")].error.as_ref().map(|e| e.code.as_str()),
            Some("NO_ANSWER")
        );
    }

    #[tokio::test]
    async fn captured_pii_is_sanitized_in_the_event_stream() {
        let transport =
            ScriptedTransport::new(vec![success(json!({"email": "jane@example.com"}))]);
        let engine = orchestrator(Arc::new(transport));
        let graph = config(
            "email",
            vec![objective("email", true, 3, EscalationPolicy::Retry, Some("end"), None)],
        );

        let summary = engine
            .run_conversation(
                TenantId("t-100".to_owned()),
                ConversationId("c-11".to_owned()),
                &graph,
                None,
            )
            .await
            .expect("valid graph runs");

        let events = engine.bus().replay(&summary.trace_id).await.expect("replay");
        let completed = events
            .iter()
            .find(|event| event.event_type == EventType::ObjectiveCompleted)
            .expect("completion event");
        assert_eq!(completed.data["data"]["email"], "<EMAIL>");
    }
}
