use serde::{Deserialize, Serialize};

/// Edge value that terminates the walk instead of naming another objective.
pub const TERMINAL_SENTINEL: &str = "end";

fn default_max_retries() -> u32 {
    3
}

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ObjectiveId(pub String);

impl ObjectiveId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ObjectiveId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Action taken when a required objective exhausts its retries.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationPolicy {
    #[default]
    Retry,
    Skip,
    Transfer,
    Abort,
}

impl EscalationPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Retry => "retry",
            Self::Skip => "skip",
            Self::Transfer => "transfer",
            Self::Abort => "abort",
        }
    }
}

/// One declarative unit of work in a conversation graph, immutable once a
/// conversation starts.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Objective {
    pub id: ObjectiveId,
    pub primitive_type: String,
    pub purpose: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default)]
    pub on_success: Option<String>,
    #[serde(default)]
    pub on_failure: Option<String>,
    #[serde(default)]
    pub escalation: EscalationPolicy,
}

impl Objective {
    /// The success edge, `None` when absent or pointing at the terminal
    /// sentinel.
    pub fn success_edge(&self) -> Option<&str> {
        resolve_edge(self.on_success.as_deref())
    }

    /// The failure edge, `None` when absent or pointing at the terminal
    /// sentinel.
    pub fn failure_edge(&self) -> Option<&str> {
        resolve_edge(self.on_failure.as_deref())
    }
}

fn resolve_edge(edge: Option<&str>) -> Option<&str> {
    match edge {
        Some(target) if target != TERMINAL_SENTINEL => Some(target),
        _ => None,
    }
}
