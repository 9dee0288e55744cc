//! Startup validation for configuration and the transition graph.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::config::ServiceConfig;
use crate::graph::TransitionGraph;
use crate::state::JobState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationLevel {
    Error,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub level: ValidationLevel,
    pub code: &'static str,
    pub message: String,
}

pub trait Validate {
    fn validate(&self) -> Vec<ValidationIssue>;
}

impl Validate for ServiceConfig {
    fn validate(&self) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();

        if self.guards.timeout_ms == 0 {
            issues.push(ValidationIssue {
                level: ValidationLevel::Error,
                code: "guards.timeout.zero",
                message: "guard timeout must be greater than zero; every guard would fail closed"
                    .to_string(),
            });
        }

        if self.web.bind.trim().is_empty() {
            issues.push(ValidationIssue {
                level: ValidationLevel::Error,
                code: "web.bind.empty",
                message: "web bind address must not be empty".to_string(),
            });
        }

        if self.storage.sqlite_path.as_os_str().is_empty() {
            issues.push(ValidationIssue {
                level: ValidationLevel::Error,
                code: "storage.sqlite_path.empty",
                message: "sqlite path must not be empty".to_string(),
            });
        }

        let urls = [
            ("collaborators.crew_base_url", &self.collaborators.crew_base_url),
            ("collaborators.forms_base_url", &self.collaborators.forms_base_url),
            (
                "collaborators.billing_base_url",
                &self.collaborators.billing_base_url,
            ),
        ];
        for (code, url) in urls {
            if url.is_none() {
                issues.push(ValidationIssue {
                    level: ValidationLevel::Warning,
                    code,
                    message: format!("{code} is not set; guards backed by it will fail closed"),
                });
            }
        }

        issues
    }
}

impl Validate for TransitionGraph {
    fn validate(&self) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();

        for state in JobState::ALL {
            if state.is_terminal() && !self.outgoing_edges(state).is_empty() {
                issues.push(ValidationIssue {
                    level: ValidationLevel::Error,
                    code: "graph.terminal.outgoing",
                    message: format!("terminal state {state} has outgoing edges"),
                });
            }
        }

        if self.edges().iter().any(|e| e.to == JobState::Pending) {
            issues.push(ValidationIssue {
                level: ValidationLevel::Error,
                code: "graph.pending.incoming",
                message: "pending must be the sole initial state with no incoming edges"
                    .to_string(),
            });
        }

        let mut seen = HashSet::new();
        for e in self.edges() {
            if !seen.insert((e.from, e.to)) {
                issues.push(ValidationIssue {
                    level: ValidationLevel::Error,
                    code: "graph.edge.duplicate",
                    message: format!("edge {} -> {} declared more than once", e.from, e.to),
                });
            }
            if e.from == e.to {
                issues.push(ValidationIssue {
                    level: ValidationLevel::Error,
                    code: "graph.edge.self_loop",
                    message: format!("self-loop declared on {}", e.from),
                });
            }
        }

        for state in JobState::ALL {
            let holdable = self.is_valid_edge(state, JobState::OnHold);
            let resumable = self.is_valid_edge(JobState::OnHold, state);
            if holdable != resumable {
                issues.push(ValidationIssue {
                    level: ValidationLevel::Error,
                    code: "graph.hold.asymmetric",
                    message: format!("hold edges for {state} are not symmetric"),
                });
            }
        }

        issues
    }
}
