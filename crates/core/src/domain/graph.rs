use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::objective::{Objective, ObjectiveId};

/// Schema version this engine build accepts; any other tag is rejected at
/// validation time.
pub const SUPPORTED_SCHEMA_VERSION: &str = "1.0";

/// Graph configuration document as authored by the external dashboard
/// layer. Unknown fields are tolerated; the authoring layer evolves
/// independently.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphConfig {
    pub tenant_id: String,
    pub locale: String,
    pub schema_version: String,
    pub root: ObjectiveId,
    pub objectives: Vec<Objective>,
}

impl GraphConfig {
    pub fn objective_count(&self) -> usize {
        self.objectives.len()
    }
}

/// A validated objective graph: a root plus an id-keyed objective map whose
/// transition relation is acyclic. Built through `GraphValidator::validate`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObjectiveGraph {
    root: ObjectiveId,
    objectives: BTreeMap<ObjectiveId, Objective>,
}

impl ObjectiveGraph {
    /// Assembles a graph without running validation. The engine's runtime
    /// visited-set guard is the only protection for graphs built this way;
    /// production callers go through the validator.
    pub fn new_unchecked(root: ObjectiveId, objectives: BTreeMap<ObjectiveId, Objective>) -> Self {
        Self { root, objectives }
    }

    pub fn root(&self) -> &ObjectiveId {
        &self.root
    }

    pub fn objective(&self, id: &ObjectiveId) -> Option<&Objective> {
        self.objectives.get(id)
    }

    pub fn len(&self) -> usize {
        self.objectives.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objectives.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ObjectiveId, &Objective)> {
        self.objectives.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::GraphConfig;

    #[test]
    fn parses_an_authored_document() {
        let config: GraphConfig = serde_json::from_str(
            r#"{
                "tenant_id": "t-100",
                "locale": "en-US",
                "schema_version": "1.0",
                "root": "email",
                "objectives": [
                    {
                        "id": "email",
                        "primitive_type": "capture_email",
                        "purpose": "capture an email address",
                        "required": true,
                        "on_success": "phone"
                    },
                    {
                        "id": "phone",
                        "primitive_type": "capture_phone",
                        "purpose": "capture a phone number",
                        "on_success": "end"
                    }
                ]
            }"#,
        )
        .expect("well-formed config document");

        assert_eq!(config.objective_count(), 2);
        assert_eq!(config.root.as_str(), "email");
        assert_eq!(config.objectives[0].success_edge(), Some("phone"));
        assert_eq!(config.objectives[1].success_edge(), None);
    }
}
