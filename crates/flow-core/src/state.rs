//! The closed set of job lifecycle states.

use serde::{Deserialize, Serialize};

/// A stage in a field-service job's lifecycle.
///
/// `Pending` is the sole initial state. `Paid` and `Cancelled` are terminal.
/// `OnHold` is a side-state reachable from any active state; a held job
/// resumes the state it was held from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Pending,
    Scheduled,
    EnRoute,
    OnSite,
    InProgress,
    OnHold,
    Completed,
    Invoiced,
    Paid,
    Cancelled,
}

impl JobState {
    /// Every declared state, in lifecycle order.
    pub const ALL: [JobState; 10] = [
        JobState::Pending,
        JobState::Scheduled,
        JobState::EnRoute,
        JobState::OnSite,
        JobState::InProgress,
        JobState::OnHold,
        JobState::Completed,
        JobState::Invoiced,
        JobState::Paid,
        JobState::Cancelled,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            JobState::Pending => "pending",
            JobState::Scheduled => "scheduled",
            JobState::EnRoute => "en_route",
            JobState::OnSite => "on_site",
            JobState::InProgress => "in_progress",
            JobState::OnHold => "on_hold",
            JobState::Completed => "completed",
            JobState::Invoiced => "invoiced",
            JobState::Paid => "paid",
            JobState::Cancelled => "cancelled",
        }
    }

    /// Returns true if the job can never leave this state.
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Paid | JobState::Cancelled)
    }

    /// Returns true for the working states a job can be held from.
    pub fn is_active(self) -> bool {
        matches!(
            self,
            JobState::Scheduled | JobState::EnRoute | JobState::OnSite | JobState::InProgress
        )
    }
}

impl std::str::FromStr for JobState {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "pending" => Ok(JobState::Pending),
            "scheduled" => Ok(JobState::Scheduled),
            "en_route" => Ok(JobState::EnRoute),
            "on_site" => Ok(JobState::OnSite),
            "in_progress" => Ok(JobState::InProgress),
            "on_hold" => Ok(JobState::OnHold),
            "completed" => Ok(JobState::Completed),
            "invoiced" => Ok(JobState::Invoiced),
            "paid" => Ok(JobState::Paid),
            "cancelled" => Ok(JobState::Cancelled),
            other => Err(format!(
                "invalid job state '{other}'. valid values: pending, scheduled, en_route, \
                 on_site, in_progress, on_hold, completed, invoiced, paid, cancelled"
            )),
        }
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
