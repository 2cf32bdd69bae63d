use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::conversation::{ConversationId, TraceId};

/// Request sent to the primitive execution service for one objective
/// attempt.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrimitiveRequest {
    pub primitive_type: String,
    pub conversation_id: ConversationId,
    pub trace_id: TraceId,
    pub purpose: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
}

/// Structured failure reported by the execution service or synthesized by
/// the client's fault-isolation layer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrimitiveError {
    pub code: String,
    pub message: String,
}

impl PrimitiveError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self { code: code.into(), message: message.into() }
    }
}

impl std::fmt::Display for PrimitiveError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

/// Result of one primitive execution. `success: false` always carries an
/// `error`; `data` is only meaningful on success.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrimitiveOutcome {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<PrimitiveError>,
}

impl PrimitiveOutcome {
    pub fn succeeded(data: Option<serde_json::Value>) -> Self {
        Self { success: true, data, error: None }
    }

    pub fn failed(error: PrimitiveError) -> Self {
        Self { success: false, data: None, error: Some(error) }
    }

    /// The failure, or a placeholder when a misbehaving service reported
    /// `success: false` without one.
    pub fn error_or_unknown(&self) -> PrimitiveError {
        self.error.clone().unwrap_or_else(|| {
            PrimitiveError::new("UNKNOWN", "execution service reported failure without detail")
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{PrimitiveError, PrimitiveOutcome};

    #[test]
    fn outcome_without_error_detail_gets_a_placeholder() {
        let outcome = PrimitiveOutcome { success: false, data: None, error: None };
        assert_eq!(outcome.error_or_unknown().code, "UNKNOWN");
    }

    #[test]
    fn outcome_round_trips_service_wire_shape() {
        let outcome: PrimitiveOutcome = serde_json::from_str(
            r#"{"success": false, "error": {"code": "NO_ANSWER", "message": "caller hung up"}}"#,
        )
        .expect("service response");

        assert!(!outcome.success);
        assert_eq!(
            outcome.error,
            Some(PrimitiveError::new("NO_ANSWER", "caller hung up"))
        );
    }
}
