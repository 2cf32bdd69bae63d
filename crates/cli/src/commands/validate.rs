use std::fs;
use std::path::Path;

use serde::Serialize;
use serde_json::json;

use voxflow_core::{GraphConfig, GraphValidationError, GraphValidator};

use crate::commands::CommandResult;

#[derive(Debug, Serialize)]
struct ValidateOutcome {
    command: &'static str,
    status: String,
    graph: String,
    objective_count: usize,
    errors: Vec<GraphValidationError>,
}

pub fn run(graph_path: &Path) -> CommandResult {
    let raw = match fs::read_to_string(graph_path) {
        Ok(raw) => raw,
        Err(error) => {
            return CommandResult::failure(
                "validate",
                "read_graph",
                format!("could not read `{}`: {error}", graph_path.display()),
                2,
            );
        }
    };

    let config: GraphConfig = match serde_json::from_str(&raw) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "validate",
                "parse_graph",
                format!("could not parse `{}`: {error}", graph_path.display()),
                2,
            );
        }
    };

    let (status, errors, exit_code) = match GraphValidator::new().validate(&config) {
        Ok(_graph) => ("valid".to_string(), Vec::new(), 0),
        Err(errors) => ("invalid".to_string(), errors, 1),
    };

    let outcome = ValidateOutcome {
        command: "validate",
        status,
        graph: graph_path.display().to_string(),
        objective_count: config.objective_count(),
        errors,
    };
    let output = serde_json::to_string_pretty(&outcome)
        .unwrap_or_else(|error| json!({"command": "validate", "status": "error", "message": error.to_string()}).to_string());

    CommandResult::with_output(exit_code, output)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::run;

    #[test]
    fn valid_graph_reports_valid_with_exit_zero() {
        let mut file = tempfile::NamedTempFile::new().expect("graph file");
        write!(
            file,
            r#"{{
                "tenant_id": "t-100",
                "locale": "en-US",
                "schema_version": "1.0",
                "root": "email",
                "objectives": [
                    {{"id": "email", "primitive_type": "capture_email", "purpose": "capture an email address", "on_success": "end"}}
                ]
            }}"#
        )
        .expect("write graph");

        let result = run(file.path());
        assert_eq!(result.exit_code, 0);
        assert!(result.output.contains("\"status\": \"valid\""));
    }

    #[test]
    fn cyclic_graph_reports_cycle_detected_with_exit_one() {
        let mut file = tempfile::NamedTempFile::new().expect("graph file");
        write!(
            file,
            r#"{{
                "tenant_id": "t-100",
                "locale": "en-US",
                "schema_version": "1.0",
                "root": "a",
                "objectives": [
                    {{"id": "a", "primitive_type": "capture_a", "purpose": "a", "on_success": "b"}},
                    {{"id": "b", "primitive_type": "capture_b", "purpose": "b", "on_success": "a"}}
                ]
            }}"#
        )
        .expect("write graph");

        let result = run(file.path());
        assert_eq!(result.exit_code, 1);
        assert!(result.output.contains("CYCLE_DETECTED"));
    }

    #[test]
    fn missing_file_is_a_read_failure() {
        let result = run(std::path::Path::new("/definitely/not/here.json"));
        assert_eq!(result.exit_code, 2);
        assert!(result.output.contains("read_graph"));
    }
}
