//! Wire types for the lifecycle HTTP API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use flow_core::state::JobState;
use flow_core::types::{ChangeSource, Job, TransitionRecord};
use flowd::engine::{TransitionEvent, TransitionOption};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobView {
    pub job_id: String,
    pub state: JobState,
    pub state_version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Job> for JobView {
    fn from(job: &Job) -> Self {
        Self {
            job_id: job.id.0.clone(),
            state: job.current_state,
            state_version: job.state_version,
            created_at: job.created_at,
            updated_at: job.updated_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobListResponse {
    pub jobs: Vec<JobView>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobDetailResponse {
    pub job: JobView,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct CreateJobRequest {
    pub job_id: Option<String>,
}

/// Body of `POST /api/jobs/{job_id}/transition`. Attribution (actor,
/// source) travels in headers, not the body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionRequestBody {
    pub to_state: JobState,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    /// Optimistic concurrency token; the state version the caller last saw.
    #[serde(default)]
    pub expected_version: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionResponse {
    pub job_id: String,
    pub state: JobState,
    pub state_version: i64,
    pub record: TransitionRecord,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionOptionView {
    pub to_state: JobState,
    pub allowed: bool,
    pub blocked_reasons: Vec<String>,
}

impl From<&TransitionOption> for TransitionOptionView {
    fn from(option: &TransitionOption) -> Self {
        Self {
            to_state: option.to_state,
            allowed: option.allowed,
            blocked_reasons: option.blocked_reasons.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllowedTransitionsResponse {
    pub job_id: String,
    pub current_state: JobState,
    pub transitions: Vec<TransitionOptionView>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryResponse {
    pub job_id: String,
    pub current_state: JobState,
    pub records: Vec<TransitionRecord>,
}

/// SSE event name for a broadcast transition.
pub fn web_event_name(event: &TransitionEvent) -> &'static str {
    if event.from_state.is_none() {
        "job_created"
    } else {
        "transition_applied"
    }
}

/// Default change source for HTTP callers that do not set the header.
pub fn default_web_change_source() -> ChangeSource {
    ChangeSource::Api
}
