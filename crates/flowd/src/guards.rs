//! Guard evaluation against collaborator lookups.
//!
//! One guard definition serves both the advisory listing path and the
//! enforcement path, so what the UI shows as allowed and what the engine
//! enforces cannot drift. Every collaborator call is bounded by a timeout;
//! an unverifiable precondition is a failed one (fail-closed), because an
//! unreachable billing service must never let a job be marked paid.

use std::future::Future;
use std::time::Duration;

use flow_core::graph::GuardName;
use flow_core::types::JobId;
use tracing::warn;

use crate::collaborators::{CollaboratorError, Collaborators};

/// The result of evaluating one guard for one job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuardOutcome {
    pub guard: GuardName,
    pub pass: bool,
    /// Present when `pass` is false; human-readable blocking reason.
    pub reason: Option<String>,
}

impl GuardOutcome {
    fn pass(guard: GuardName) -> Self {
        Self {
            guard,
            pass: true,
            reason: None,
        }
    }

    fn fail(guard: GuardName, reason: String) -> Self {
        Self {
            guard,
            pass: false,
            reason: Some(reason),
        }
    }
}

pub struct GuardEvaluator {
    collaborators: Collaborators,
    timeout: Duration,
}

impl GuardEvaluator {
    pub fn new(collaborators: Collaborators, timeout: Duration) -> Self {
        Self {
            collaborators,
            timeout,
        }
    }

    /// Evaluate one named guard. Never errors: collaborator faults and
    /// timeouts become failed outcomes with the fail-closed reason.
    pub async fn evaluate(&self, guard: GuardName, job_id: &JobId) -> GuardOutcome {
        match guard {
            GuardName::CrewAssigned => {
                self.check(guard, job_id, self.collaborators.crew.is_crew_assigned(job_id))
                    .await
            }
            GuardName::CrewCheckedIn => {
                self.check(guard, job_id, self.collaborators.crew.is_crew_checked_in(job_id))
                    .await
            }
            GuardName::RequiredFormsComplete => {
                self.check(
                    guard,
                    job_id,
                    self.collaborators.forms.are_required_forms_complete(job_id),
                )
                .await
            }
            GuardName::SignatureCaptured => self.check_signature(job_id).await,
            GuardName::LineItemsFinalized => {
                self.check(
                    guard,
                    job_id,
                    self.collaborators.billing.are_line_items_finalized(job_id),
                )
                .await
            }
            GuardName::PaymentRecorded => {
                self.check(
                    guard,
                    job_id,
                    self.collaborators.billing.is_payment_recorded(job_id),
                )
                .await
            }
        }
    }

    /// Evaluate an edge's guard list as a logical AND, returning every
    /// failing guard's reason so callers can render a complete checklist.
    pub async fn blocked_reasons(&self, guards: &[GuardName], job_id: &JobId) -> Vec<String> {
        let mut reasons = Vec::new();
        for &guard in guards {
            let outcome = self.evaluate(guard, job_id).await;
            if let Some(reason) = outcome.reason {
                if !reasons.contains(&reason) {
                    reasons.push(reason);
                }
            }
        }
        reasons
    }

    async fn check(
        &self,
        guard: GuardName,
        job_id: &JobId,
        lookup: impl Future<Output = Result<bool, CollaboratorError>>,
    ) -> GuardOutcome {
        match self.bounded(job_id, guard, lookup).await {
            Some(true) => GuardOutcome::pass(guard),
            Some(false) => GuardOutcome::fail(guard, guard.failure_reason().to_string()),
            None => GuardOutcome::fail(guard, guard.unverified_reason()),
        }
    }

    /// Signature capture is conditional: only enforced when the job's
    /// template mandates a signature. Both lookups are fail-closed.
    async fn check_signature(&self, job_id: &JobId) -> GuardOutcome {
        let guard = GuardName::SignatureCaptured;
        let required = self
            .bounded(job_id, guard, self.collaborators.forms.is_signature_required(job_id))
            .await;
        match required {
            Some(false) => GuardOutcome::pass(guard),
            Some(true) => {
                self.check(guard, job_id, self.collaborators.forms.is_signature_captured(job_id))
                    .await
            }
            None => GuardOutcome::fail(guard, guard.unverified_reason()),
        }
    }

    /// Run a collaborator lookup under the configured timeout. Returns
    /// `None` when the answer is unknown (error or timeout).
    async fn bounded(
        &self,
        job_id: &JobId,
        guard: GuardName,
        lookup: impl Future<Output = Result<bool, CollaboratorError>>,
    ) -> Option<bool> {
        match tokio::time::timeout(self.timeout, lookup).await {
            Ok(Ok(value)) => Some(value),
            Ok(Err(err)) => {
                warn!(%job_id, %guard, error = %err, "collaborator lookup failed; failing closed");
                None
            }
            Err(_) => {
                warn!(%job_id, %guard, timeout_ms = self.timeout.as_millis() as u64,
                    "collaborator lookup timed out; failing closed");
                None
            }
        }
    }
}
