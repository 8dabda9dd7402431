//! Schema classification: entrypoint vs dependency, fully vs partially resolved

use serde::Serialize;
use std::collections::{HashMap, HashSet};

use super::Repository;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemaRole {
    /// Listed as an entry file
    Entrypoint,
    /// Reached only through a directive
    Dependency,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionState {
    FullyResolved,
    /// At least one directive did not resolve
    PartiallyResolved,
}

#[derive(Debug, Clone, Serialize)]
pub struct SchemaClassification {
    pub location: String,
    pub role: SchemaRole,
    pub state: ResolutionState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_namespace: Option<String>,
    pub declarations: usize,
    /// Hints of the directives that failed
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub unresolved: Vec<String>,
}

impl SchemaClassification {
    pub fn is_entrypoint(&self) -> bool {
        self.role == SchemaRole::Entrypoint
    }

    pub fn is_fully_resolved(&self) -> bool {
        self.state == ResolutionState::FullyResolved
    }
}

impl Repository {
    /// Classify every document in discovery order
    pub fn classify_schemas(&self) -> Vec<SchemaClassification> {
        let entries: HashSet<&str> = self.files.iter().map(String::as_str).collect();
        let mut failures: HashMap<&str, Vec<String>> = HashMap::new();
        for directive in &self.unresolved {
            failures
                .entry(directive.from.as_str())
                .or_default()
                .push(directive.hint.clone());
        }

        self.documents
            .iter()
            .map(|document| {
                let unresolved = failures.remove(document.location()).unwrap_or_default();
                SchemaClassification {
                    location: document.location().to_string(),
                    role: if entries.contains(document.location()) {
                        SchemaRole::Entrypoint
                    } else {
                        SchemaRole::Dependency
                    },
                    state: if unresolved.is_empty() {
                        ResolutionState::FullyResolved
                    } else {
                        ResolutionState::PartiallyResolved
                    },
                    target_namespace: document.target_namespace().map(String::from),
                    declarations: document.declarations().len(),
                    unresolved,
                }
            })
            .collect()
    }
}
