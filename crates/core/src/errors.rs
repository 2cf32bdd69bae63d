use thiserror::Error;

use crate::store::StoreError;
use crate::validator::GraphValidationError;

/// Failures surfaced by the orchestration boundary itself. Objective-level
/// execution failures are never represented here; those are recovered
/// inside the engine and reported through the event stream.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum OrchestrationError {
    #[error("graph validation failed with {} error(s)", .0.len())]
    InvalidGraph(Vec<GraphValidationError>),
}

impl OrchestrationError {
    pub fn validation_errors(&self) -> &[GraphValidationError] {
        match self {
            Self::InvalidGraph(errors) => errors,
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Orchestration(#[from] OrchestrationError),
    #[error(transparent)]
    Persistence(#[from] StoreError),
    #[error("integration failure: {0}")]
    Integration(String),
    #[error("configuration failure: {0}")]
    Configuration(String),
}

#[cfg(test)]
mod tests {
    use super::{ApplicationError, OrchestrationError};
    use crate::validator::{GraphValidationError, ValidationCode};

    #[test]
    fn invalid_graph_reports_error_count() {
        let error = OrchestrationError::InvalidGraph(vec![GraphValidationError {
            code: ValidationCode::MissingRoot,
            path: "root".to_owned(),
            message: "root objective `a` is not declared in the graph".to_owned(),
            identifiers: Vec::new(),
        }]);

        assert_eq!(error.to_string(), "graph validation failed with 1 error(s)");
        assert_eq!(error.validation_errors().len(), 1);

        let application = ApplicationError::from(error);
        assert!(matches!(application, ApplicationError::Orchestration(_)));
    }
}
