//! Declarative transition graph registry.
//!
//! The graph is configuration, not runtime data: it is declared once at
//! process start and never mutated, so edge/guard coverage is checkable by
//! static tests over the registry alone.

use serde::{Deserialize, Serialize};

use crate::state::JobState;

/// A named precondition gating an edge. Evaluation lives in the daemon
/// crate; the registry only binds names to edges so the advisory listing
/// path and the enforcement path share one definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GuardName {
    CrewAssigned,
    CrewCheckedIn,
    RequiredFormsComplete,
    SignatureCaptured,
    LineItemsFinalized,
    PaymentRecorded,
}

impl GuardName {
    pub fn as_str(self) -> &'static str {
        match self {
            GuardName::CrewAssigned => "crew_assigned",
            GuardName::CrewCheckedIn => "crew_checked_in",
            GuardName::RequiredFormsComplete => "required_forms_complete",
            GuardName::SignatureCaptured => "signature_captured",
            GuardName::LineItemsFinalized => "line_items_finalized",
            GuardName::PaymentRecorded => "payment_recorded",
        }
    }

    /// The reason surfaced to callers when the precondition is unmet.
    pub fn failure_reason(self) -> &'static str {
        match self {
            GuardName::CrewAssigned => "Crew not assigned",
            GuardName::CrewCheckedIn => "Crew not checked in",
            GuardName::RequiredFormsComplete => "Required job forms not completed",
            GuardName::SignatureCaptured => "Customer signature not captured",
            GuardName::LineItemsFinalized => "Invoice line items not finalized",
            GuardName::PaymentRecorded => "Payment not recorded",
        }
    }

    /// The fail-closed reason used when the collaborator backing this guard
    /// cannot be reached or does not answer in time.
    pub fn unverified_reason(self) -> String {
        let subject = match self {
            GuardName::CrewAssigned => "Crew assignment",
            GuardName::CrewCheckedIn => "Crew check-in",
            GuardName::RequiredFormsComplete => "Form completion",
            GuardName::SignatureCaptured => "Signature capture",
            GuardName::LineItemsFinalized => "Line item status",
            GuardName::PaymentRecorded => "Payment status",
        };
        format!("{subject} could not be verified")
    }
}

impl std::fmt::Display for GuardName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A declared, directed, guarded transition between two states.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    pub from: JobState,
    pub to: JobState,
    pub guards: Vec<GuardName>,
}

/// The closed edge table. Immutable after construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionGraph {
    edges: Vec<Edge>,
}

impl TransitionGraph {
    /// The standard field-service lifecycle graph.
    ///
    /// ```text
    /// pending → scheduled → en_route → on_site → in_progress
    ///         → completed → invoiced → paid
    /// ```
    /// with `on_hold` reachable from (and returning to) every active state,
    /// and `cancelled` reachable from every non-terminal state.
    pub fn standard() -> Self {
        use GuardName::*;
        use JobState::*;

        let mut edges = vec![
            edge(Pending, Scheduled, vec![]),
            edge(Scheduled, EnRoute, vec![CrewAssigned]),
            edge(EnRoute, OnSite, vec![]),
            edge(OnSite, InProgress, vec![CrewCheckedIn]),
            edge(InProgress, Completed, vec![RequiredFormsComplete, SignatureCaptured]),
            edge(Completed, Invoiced, vec![LineItemsFinalized]),
            edge(Invoiced, Paid, vec![PaymentRecorded]),
        ];

        // Hold edges carry no guards; a held job resumes the state it was
        // held from (the engine narrows the return edge using the log).
        for state in JobState::ALL {
            if state.is_active() {
                edges.push(edge(state, OnHold, vec![]));
                edges.push(edge(OnHold, state, vec![]));
            }
        }

        for state in JobState::ALL {
            if !state.is_terminal() {
                edges.push(edge(state, Cancelled, vec![]));
            }
        }

        Self { edges }
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// All declared edges out of `from`, in declaration order.
    pub fn outgoing_edges(&self, from: JobState) -> Vec<&Edge> {
        self.edges.iter().filter(|e| e.from == from).collect()
    }

    pub fn edge(&self, from: JobState, to: JobState) -> Option<&Edge> {
        self.edges.iter().find(|e| e.from == from && e.to == to)
    }

    pub fn is_valid_edge(&self, from: JobState, to: JobState) -> bool {
        self.edge(from, to).is_some()
    }
}

fn edge(from: JobState, to: JobState, guards: Vec<GuardName>) -> Edge {
    Edge { from, to, guards }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn graph() -> TransitionGraph {
        TransitionGraph::standard()
    }

    #[test]
    fn happy_path_edges_are_declared_in_order() {
        use JobState::*;
        let g = graph();
        let path = [
            Pending, Scheduled, EnRoute, OnSite, InProgress, Completed, Invoiced, Paid,
        ];
        for pair in path.windows(2) {
            assert!(g.is_valid_edge(pair[0], pair[1]), "{} -> {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn terminal_states_have_no_outgoing_edges() {
        let g = graph();
        assert!(g.outgoing_edges(JobState::Paid).is_empty());
        assert!(g.outgoing_edges(JobState::Cancelled).is_empty());
    }

    #[test]
    fn cancel_is_reachable_from_every_non_terminal_state() {
        let g = graph();
        for state in JobState::ALL {
            if state.is_terminal() {
                assert!(!g.is_valid_edge(state, JobState::Cancelled));
            } else {
                assert!(g.is_valid_edge(state, JobState::Cancelled), "{state}");
            }
        }
    }

    #[test]
    fn hold_edges_are_symmetric_over_active_states() {
        let g = graph();
        for state in JobState::ALL {
            let to_hold = g.is_valid_edge(state, JobState::OnHold);
            let from_hold = g.is_valid_edge(JobState::OnHold, state);
            if state.is_active() {
                assert!(to_hold && from_hold, "{state}");
            } else if state != JobState::Cancelled {
                assert!(!to_hold, "{state} should not be holdable");
                assert!(!from_hold, "{state} should not be resumable");
            }
        }
    }

    #[test]
    fn pending_has_no_incoming_edges() {
        let g = graph();
        assert!(g.edges().iter().all(|e| e.to != JobState::Pending));
    }

    #[test]
    fn no_duplicate_edges_declared() {
        let g = graph();
        let mut seen = HashSet::new();
        for e in g.edges() {
            assert!(seen.insert((e.from, e.to)), "duplicate edge {} -> {}", e.from, e.to);
        }
    }

    #[test]
    fn guard_bindings_match_the_lifecycle_contract() {
        use JobState::*;
        let g = graph();
        assert_eq!(g.edge(Pending, Scheduled).unwrap().guards, vec![]);
        assert_eq!(
            g.edge(Scheduled, EnRoute).unwrap().guards,
            vec![GuardName::CrewAssigned]
        );
        assert_eq!(
            g.edge(OnSite, InProgress).unwrap().guards,
            vec![GuardName::CrewCheckedIn]
        );
        assert_eq!(
            g.edge(InProgress, Completed).unwrap().guards,
            vec![GuardName::RequiredFormsComplete, GuardName::SignatureCaptured]
        );
        assert_eq!(
            g.edge(Completed, Invoiced).unwrap().guards,
            vec![GuardName::LineItemsFinalized]
        );
        assert_eq!(
            g.edge(Invoiced, Paid).unwrap().guards,
            vec![GuardName::PaymentRecorded]
        );
    }

    #[test]
    fn hold_and_cancel_edges_carry_no_guards() {
        let g = graph();
        for e in g.edges() {
            if e.to == JobState::OnHold || e.from == JobState::OnHold || e.to == JobState::Cancelled
            {
                assert!(e.guards.is_empty(), "{} -> {}", e.from, e.to);
            }
        }
    }

    #[test]
    fn every_non_terminal_state_reaches_a_terminal_state() {
        let g = graph();
        for start in JobState::ALL {
            if start.is_terminal() {
                continue;
            }
            let mut frontier = vec![start];
            let mut visited = HashSet::new();
            let mut reached_terminal = false;
            while let Some(state) = frontier.pop() {
                if !visited.insert(state) {
                    continue;
                }
                if state.is_terminal() {
                    reached_terminal = true;
                    break;
                }
                for e in g.outgoing_edges(state) {
                    frontier.push(e.to);
                }
            }
            assert!(reached_terminal, "{start} cannot reach a terminal state");
        }
    }

    #[test]
    fn guard_name_reasons_are_distinct_and_non_empty() {
        let guards = [
            GuardName::CrewAssigned,
            GuardName::CrewCheckedIn,
            GuardName::RequiredFormsComplete,
            GuardName::SignatureCaptured,
            GuardName::LineItemsFinalized,
            GuardName::PaymentRecorded,
        ];
        let reasons: HashSet<&str> = guards.iter().map(|g| g.failure_reason()).collect();
        assert_eq!(reasons.len(), guards.len());
        for g in guards {
            assert!(g.unverified_reason().contains("could not be verified"));
        }
    }
}
