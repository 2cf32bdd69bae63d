use std::fs;
use std::path::Path;
use std::sync::Arc;

use serde_json::json;

use voxflow_core::config::{EngineConfig, LoadOptions};
use voxflow_core::{ConversationId, GraphConfig, Sanitizer, TenantId};
use voxflow_engine::{
    ClientOptions, EventBus, ExecutionClient, InMemoryEventStore, Orchestrator,
    StubExecutionTransport,
};

use crate::commands::CommandResult;

/// Runs one conversation against an in-memory bus and a stubbed execution
/// service, then prints the replayed event stream. `--fail` marks
/// primitive types that should always fail, for exercising escalation
/// paths without a live service.
pub fn run(graph_path: &Path, failing_primitives: Vec<String>) -> CommandResult {
    let raw = match fs::read_to_string(graph_path) {
        Ok(raw) => raw,
        Err(error) => {
            return CommandResult::failure(
                "simulate",
                "read_graph",
                format!("could not read `{}`: {error}", graph_path.display()),
                2,
            );
        }
    };
    let graph: GraphConfig = match serde_json::from_str(&raw) {
        Ok(graph) => graph,
        Err(error) => {
            return CommandResult::failure(
                "simulate",
                "parse_graph",
                format!("could not parse `{}`: {error}", graph_path.display()),
                2,
            );
        }
    };

    let config = match EngineConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "simulate",
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            );
        }
    };

    let runtime = match crate::commands::runtime() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                "simulate",
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                3,
            );
        }
    };

    runtime.block_on(async move {
        let bus = EventBus::new(
            Arc::new(InMemoryEventStore::new()),
            Sanitizer::new(config.sanitizer.critical_fields.clone()),
            config.bus.clone(),
        );
        let client = Arc::new(ExecutionClient::new(
            Arc::new(StubExecutionTransport::new(failing_primitives)),
            ClientOptions::from_config(&config.execution),
        ));
        let orchestrator = Orchestrator::new(bus.clone(), client);

        let tenant = TenantId(graph.tenant_id.clone());
        let conversation = ConversationId(format!("sim-{}", uuid_suffix()));

        let summary = match orchestrator
            .run_conversation(tenant, conversation, &graph, None)
            .await
        {
            Ok(summary) => summary,
            Err(error) => {
                let errors = error.validation_errors().to_vec();
                let output = serde_json::to_string_pretty(&json!({
                    "command": "simulate",
                    "status": "invalid_graph",
                    "errors": errors,
                }))
                .unwrap_or_else(|error| error.to_string());
                return CommandResult::with_output(1, output);
            }
        };

        let events = match bus.replay(&summary.trace_id).await {
            Ok(events) => events,
            Err(error) => {
                return CommandResult::failure(
                    "simulate",
                    "replay",
                    format!("replay failed after simulation: {error}"),
                    4,
                );
            }
        };

        let output = serde_json::to_string_pretty(&json!({
            "command": "simulate",
            "status": "ok",
            "trace_id": summary.trace_id.as_str(),
            "reason": summary.reason.as_str(),
            "completed": summary.completed,
            "failed": summary.failed,
            "skipped": summary.skipped,
            "duration_ms": summary.duration_ms,
            "events": events,
        }))
        .unwrap_or_else(|error| error.to_string());

        CommandResult::with_output(0, output)
    })
}

fn uuid_suffix() -> String {
    voxflow_core::uuid::Uuid::new_v4().to_string()[..8].to_string()
}
