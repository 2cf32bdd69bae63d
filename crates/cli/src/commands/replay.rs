use serde_json::json;

use voxflow_core::config::{EngineConfig, LoadOptions};
use voxflow_core::{ApplicationError, EventStore, TraceId};
use voxflow_db::{connect, SqlEventLogRepository};

use crate::commands::CommandResult;

/// Prints every durably stored event for a trace, in sequence order, the
/// audit/debug view of one conversation.
pub fn run(trace_id: &str) -> CommandResult {
    let config = match EngineConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "replay",
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
                "replay",
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                3,
            );
        }
    };

    runtime.block_on(async move {
        let pool = match connect(&config.database).await {
            Ok(pool) => pool,
            Err(error) => {
                return CommandResult::failure(
                    "replay",
                    "db_connectivity",
                    format!("could not open event store: {error}"),
                    4,
                );
            }
        };

        let repository = SqlEventLogRepository::new(pool);
        let trace = TraceId(trace_id.to_owned());
        match repository.events_for_trace(&trace).await {
            Ok(events) => {
                let output = serde_json::to_string_pretty(&json!({
                    "command": "replay",
                    "status": "ok",
                    "trace_id": trace_id,
                    "event_count": events.len(),
                    "events": events,
                }))
                .unwrap_or_else(|error| error.to_string());
                CommandResult::with_output(0, output)
            }
            Err(error) => {
                let error = ApplicationError::from(error);
                CommandResult::failure("replay", "event_lookup", error.to_string(), 5)
            }
        }
    })
}
