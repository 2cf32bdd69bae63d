//! Static validation of objective-graph configuration documents.
//!
//! Configuration errors are caught entirely here, before a graph may drive
//! any conversation; the engine's runtime visited-set guard only covers
//! graphs that bypassed validation (stale or untrusted config sources).

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::graph::{GraphConfig, ObjectiveGraph, SUPPORTED_SCHEMA_VERSION};
use crate::domain::objective::{Objective, ObjectiveId};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValidationCode {
    SchemaVersionMismatch,
    MissingRoot,
    DuplicateObjective,
    InvalidType,
    InvalidRetryLimit,
    DanglingReference,
    CycleDetected,
    UnreachableObjective,
}

impl ValidationCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SchemaVersionMismatch => "SCHEMA_VERSION_MISMATCH",
            Self::MissingRoot => "MISSING_ROOT",
            Self::DuplicateObjective => "DUPLICATE_OBJECTIVE",
            Self::InvalidType => "INVALID_TYPE",
            Self::InvalidRetryLimit => "INVALID_RETRY_LIMIT",
            Self::DanglingReference => "DANGLING_REFERENCE",
            Self::CycleDetected => "CYCLE_DETECTED",
            Self::UnreachableObjective => "UNREACHABLE_OBJECTIVE",
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq, Serialize, Deserialize)]
#[error("{} at `{path}`: {message}", .code.as_str())]
pub struct GraphValidationError {
    pub code: ValidationCode,
    pub path: String,
    pub message: String,
    /// Identifiers involved in the failure; for `CYCLE_DETECTED` these are
    /// the objective ids forming the cycle, sorted.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub identifiers: Vec<String>,
}

impl GraphValidationError {
    fn new(code: ValidationCode, path: impl Into<String>, message: impl Into<String>) -> Self {
        Self { code, path: path.into(), message: message.into(), identifiers: Vec::new() }
    }

    fn with_identifiers(mut self, identifiers: Vec<String>) -> Self {
        self.identifiers = identifiers;
        self
    }
}

/// Pure, stateless validator for graph configuration documents.
#[derive(Clone, Copy, Debug, Default)]
pub struct GraphValidator;

impl GraphValidator {
    pub fn new() -> Self {
        Self
    }

    /// Returns a validated graph or every validation failure found.
    /// Structural errors (version, duplicates, dangling references) are
    /// all accumulated; cycle and reachability analysis only run once the
    /// reference structure is sound.
    pub fn validate(&self, config: &GraphConfig) -> Result<ObjectiveGraph, Vec<GraphValidationError>> {
        let mut errors = Vec::new();

        if config.schema_version != SUPPORTED_SCHEMA_VERSION {
            errors.push(GraphValidationError::new(
                ValidationCode::SchemaVersionMismatch,
                "schema_version",
                format!(
                    "document version `{}` does not match supported version `{}`",
                    config.schema_version, SUPPORTED_SCHEMA_VERSION
                ),
            ));
        }

        let mut objectives: BTreeMap<ObjectiveId, Objective> = BTreeMap::new();
        for (index, objective) in config.objectives.iter().enumerate() {
            let path = format!("objectives.{}", objective.id);

            if objective.primitive_type.trim().is_empty() {
                errors.push(GraphValidationError::new(
                    ValidationCode::InvalidType,
                    format!("{path}.primitive_type"),
                    "primitive type tag must not be empty",
                ));
            }
            if objective.max_retries == 0 {
                errors.push(GraphValidationError::new(
                    ValidationCode::InvalidRetryLimit,
                    format!("{path}.max_retries"),
                    "retry limit must be at least 1",
                ));
            }
            if objectives.insert(objective.id.clone(), objective.clone()).is_some() {
                errors.push(GraphValidationError::new(
                    ValidationCode::DuplicateObjective,
                    format!("objectives[{index}].id"),
                    format!("objective `{}` is declared more than once", objective.id),
                ));
            }
        }

        if !objectives.contains_key(&config.root) {
            errors.push(GraphValidationError::new(
                ValidationCode::MissingRoot,
                "root",
                format!("root objective `{}` is not declared in the graph", config.root),
            ));
        }

        let mut references_resolve = true;
        for (id, objective) in &objectives {
            for (field, edge) in
                [("on_success", objective.success_edge()), ("on_failure", objective.failure_edge())]
            {
                if let Some(target) = edge {
                    if !objectives.contains_key(&ObjectiveId::new(target)) {
                        references_resolve = false;
                        errors.push(GraphValidationError::new(
                            ValidationCode::DanglingReference,
                            format!("objectives.{id}.{field}"),
                            format!("edge targets undeclared objective `{target}`"),
                        ));
                    }
                }
            }
        }

        if references_resolve && objectives.contains_key(&config.root) {
            errors.extend(detect_cycles(&objectives));
            errors.extend(check_reachability(&config.root, &objectives));
        }

        if errors.is_empty() {
            Ok(ObjectiveGraph::new_unchecked(config.root.clone(), objectives))
        } else {
            Err(errors)
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum VisitMark {
    OnStack,
    Done,
}

/// Depth-first traversal over the `on_success`/`on_failure` edge relation;
/// any edge into a node currently on the stack is a cycle. Edges to the
/// terminal sentinel or to undeclared ids were already filtered out.
fn detect_cycles(
    objectives: &BTreeMap<ObjectiveId, Objective>,
) -> Vec<GraphValidationError> {
    let mut errors = Vec::new();
    let mut marks: HashMap<&ObjectiveId, VisitMark> = HashMap::new();
    let mut reported: BTreeSet<Vec<String>> = BTreeSet::new();

    for start in objectives.keys() {
        if marks.contains_key(start) {
            continue;
        }
        let mut stack: Vec<&ObjectiveId> = Vec::new();
        visit(start, objectives, &mut marks, &mut stack, &mut reported, &mut errors);
    }

    errors
}

fn visit<'graph>(
    id: &'graph ObjectiveId,
    objectives: &'graph BTreeMap<ObjectiveId, Objective>,
    marks: &mut HashMap<&'graph ObjectiveId, VisitMark>,
    stack: &mut Vec<&'graph ObjectiveId>,
    reported: &mut BTreeSet<Vec<String>>,
    errors: &mut Vec<GraphValidationError>,
) {
    marks.insert(id, VisitMark::OnStack);
    stack.push(id);

    let objective = &objectives[id];
    for edge in [objective.success_edge(), objective.failure_edge()].into_iter().flatten() {
        let Some((target, _)) = objectives.get_key_value(&ObjectiveId::new(edge)) else {
            continue;
        };
        match marks.get(target).copied() {
            Some(VisitMark::OnStack) => {
                let cycle_start = stack
                    .iter()
                    .position(|entry| *entry == target)
                    .unwrap_or(0);
                let mut cycle: Vec<String> =
                    stack[cycle_start..].iter().map(|entry| entry.0.clone()).collect();
                cycle.sort();
                if reported.insert(cycle.clone()) {
                    errors.push(
                        GraphValidationError::new(
                            ValidationCode::CycleDetected,
                            format!("objectives.{id}"),
                            format!("objectives form a cycle: {}", cycle.join(" -> ")),
                        )
                        .with_identifiers(cycle),
                    );
                }
            }
            Some(VisitMark::Done) => {}
            None => visit(target, objectives, marks, stack, reported, errors),
        }
    }

    stack.pop();
    marks.insert(id, VisitMark::Done);
}

fn check_reachability(
    root: &ObjectiveId,
    objectives: &BTreeMap<ObjectiveId, Objective>,
) -> Vec<GraphValidationError> {
    let mut reachable: BTreeSet<&ObjectiveId> = BTreeSet::new();
    let mut frontier = vec![root];

    while let Some(id) = frontier.pop() {
        let Some((id, objective)) = objectives.get_key_value(id) else {
            continue;
        };
        if !reachable.insert(id) {
            continue;
        }
        for edge in [objective.success_edge(), objective.failure_edge()].into_iter().flatten() {
            if let Some((target, _)) = objectives.get_key_value(&ObjectiveId::new(edge)) {
                frontier.push(target);
            }
        }
    }

    objectives
        .keys()
        .filter(|id| !reachable.contains(id))
        .map(|id| {
            GraphValidationError::new(
                ValidationCode::UnreachableObjective,
                format!("objectives.{id}"),
                format!("objective `{id}` is not reachable from root `{root}`"),
            )
        })
        .collect()
}
