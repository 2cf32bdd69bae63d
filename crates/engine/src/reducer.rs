//! Pure transition logic for the graph walk.
//!
//! The orchestrator feeds each objective's terminal attempt result through
//! `resolve_transition` and applies whatever comes back; the entire
//! escalation table lives here as a pure function so the walk policy can
//! be tested with scripted results and no concurrency.

use voxflow_core::{
    EndReason, EscalationPolicy, Objective, ObjectiveId, ObjectiveState, PrimitiveError,
};

/// Terminal result of one objective's bounded retry loop.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AttemptResult {
    Succeeded { data: Option<serde_json::Value> },
    Failed { error: PrimitiveError, attempts: u32 },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Hop {
    Objective(ObjectiveId),
    End(EndReason),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SkipReason {
    NonRequiredFailure,
    EscalationSkip,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NonRequiredFailure => "non_required_failure",
            Self::EscalationSkip => "escalation_skip",
        }
    }
}

/// What the walk does after an objective reaches a terminal attempt
/// result: how to mark it, which events to emit, and where to go next.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Transition {
    pub mark: ObjectiveState,
    pub emit_failed: bool,
    pub skip_reason: Option<SkipReason>,
    pub next: Hop,
}

pub fn resolve_transition(objective: &Objective, result: &AttemptResult) -> Transition {
    match result {
        AttemptResult::Succeeded { .. } => Transition {
            mark: ObjectiveState::Completed,
            emit_failed: false,
            skip_reason: None,
            next: follow(objective.success_edge()),
        },
        AttemptResult::Failed { .. } if objective.required => match objective.escalation {
            EscalationPolicy::Transfer | EscalationPolicy::Abort => Transition {
                mark: ObjectiveState::Failed,
                emit_failed: true,
                skip_reason: None,
                next: Hop::End(EndReason::Failed { escalation: objective.escalation }),
            },
            EscalationPolicy::Skip => Transition {
                mark: ObjectiveState::Skipped,
                emit_failed: true,
                skip_reason: Some(SkipReason::EscalationSkip),
                next: follow(objective.failure_edge()),
            },
            // Default: the failure is recorded but the walk continues along
            // the failure edge; the objective stays counted as failed.
            EscalationPolicy::Retry => Transition {
                mark: ObjectiveState::Failed,
                emit_failed: true,
                skip_reason: None,
                next: follow(objective.failure_edge()),
            },
        },
        AttemptResult::Failed { .. } => Transition {
            mark: ObjectiveState::Skipped,
            emit_failed: false,
            skip_reason: Some(SkipReason::NonRequiredFailure),
            next: follow(objective.success_edge().or(objective.failure_edge())),
        },
    }
}

fn follow(edge: Option<&str>) -> Hop {
    match edge {
        Some(target) => Hop::Objective(ObjectiveId::new(target)),
        None => Hop::End(EndReason::Completed),
    }
}
