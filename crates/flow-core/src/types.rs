//! Core types for the job lifecycle engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::state::JobState;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
pub struct JobId(pub String);

impl JobId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for JobId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordId(pub String);

impl RecordId {
    /// Deterministic per-job record id: `<job>#<seq>`.
    pub fn for_seq(job_id: &JobId, seq: i64) -> Self {
        Self(format!("{job_id}#{seq}"))
    }
}

impl std::fmt::Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Who triggered a transition. Attribution metadata only: guards are
/// enforced identically for every source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ChangeSource {
    #[default]
    Manual,
    Automation,
    Api,
}

impl ChangeSource {
    pub fn as_str(self) -> &'static str {
        match self {
            ChangeSource::Manual => "manual",
            ChangeSource::Automation => "automation",
            ChangeSource::Api => "api",
        }
    }
}

impl std::str::FromStr for ChangeSource {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "manual" => Ok(ChangeSource::Manual),
            "automation" => Ok(ChangeSource::Automation),
            "api" => Ok(ChangeSource::Api),
            other => Err(format!(
                "invalid change source '{other}'. valid values: manual, automation, api"
            )),
        }
    }
}

impl std::fmt::Display for ChangeSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The identity a transition is attributed to. Always resolved by the
/// calling layer; the engine never fabricates a default actor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: String,
    pub role: String,
}

impl Actor {
    pub fn new(id: impl Into<String>, role: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role: role.into(),
        }
    }
}

/// The lifecycle pointer for a job. The job record itself (customer, site,
/// quote, ...) is owned elsewhere; this engine owns only the state pointer
/// and its version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub current_state: JobState,
    /// Incremented by exactly 1 per successful transition; the optimistic
    /// concurrency token.
    pub state_version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// A freshly created job: `pending`, version 0.
    pub fn new(id: JobId, at: DateTime<Utc>) -> Self {
        Self {
            id,
            current_state: JobState::Pending,
            state_version: 0,
            created_at: at,
            updated_at: at,
        }
    }
}

/// Well-known metadata keys for transition records. The metadata map is a
/// bounded key/value store, not an open schema; producers should stick to
/// these keys so records stay machine-parseable.
pub mod metadata_keys {
    /// Set on hold records: the state the job was held from.
    pub const HELD_FROM: &str = "held_from";
    /// Set by automation sources: the rule that fired.
    pub const AUTOMATION_RULE: &str = "automation_rule";
    /// Set by api sources: the integration client identifier.
    pub const API_CLIENT: &str = "api_client";
    /// Reference to a captured signature artifact.
    pub const SIGNATURE_REF: &str = "signature_ref";
}

/// Upper bounds on the metadata map, enforced at the engine boundary.
pub const MAX_METADATA_ENTRIES: usize = 16;
pub const MAX_METADATA_VALUE_LEN: usize = 256;

/// One immutable entry in a job's audit trail.
///
/// `from_state` is `None` only for the synthetic creation record (seq 0).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub id: RecordId,
    pub job_id: JobId,
    /// Dense per-job sequence; equals the job's `state_version` after this
    /// record was applied.
    pub seq: i64,
    pub from_state: Option<JobState>,
    pub to_state: JobState,
    pub changed_by: Option<String>,
    pub changed_by_role: Option<String>,
    pub change_source: ChangeSource,
    pub reason: Option<String>,
    pub notes: Option<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    pub created_at: DateTime<Utc>,
}

impl TransitionRecord {
    /// The synthetic record written when a job is created.
    pub fn creation(
        job_id: JobId,
        actor: Option<&Actor>,
        change_source: ChangeSource,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: RecordId::for_seq(&job_id, 0),
            job_id,
            seq: 0,
            from_state: None,
            to_state: JobState::Pending,
            changed_by: actor.map(|a| a.id.clone()),
            changed_by_role: actor.map(|a| a.role.clone()),
            change_source,
            reason: None,
            notes: None,
            metadata: BTreeMap::new(),
            created_at: at,
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ReplayError {
    #[error("empty transition log")]
    EmptyLog,
    #[error("first record (seq {seq}) is not a creation record")]
    MissingCreation { seq: i64 },
    #[error("broken chain at seq {seq}: record leaves {expected} but claims from {actual}")]
    BrokenChain {
        seq: i64,
        expected: JobState,
        actual: JobState,
    },
    #[error("non-dense sequence at seq {seq}: expected {expected}")]
    SequenceGap { seq: i64, expected: i64 },
}

/// Replay a job's records in order and reconstruct its current state.
///
/// The authoritative check behind the no-drift invariant: the result must
/// equal the job's live `current_state` at all times.
pub fn replay(records: &[TransitionRecord]) -> Result<JobState, ReplayError> {
    let first = records.first().ok_or(ReplayError::EmptyLog)?;
    if first.seq != 0 || first.from_state.is_some() {
        return Err(ReplayError::MissingCreation { seq: first.seq });
    }

    let mut current = first.to_state;
    let mut expected_seq = 1;
    for record in &records[1..] {
        if record.seq != expected_seq {
            return Err(ReplayError::SequenceGap {
                seq: record.seq,
                expected: expected_seq,
            });
        }
        match record.from_state {
            Some(from) if from == current => {}
            Some(from) => {
                return Err(ReplayError::BrokenChain {
                    seq: record.seq,
                    expected: current,
                    actual: from,
                })
            }
            None => return Err(ReplayError::MissingCreation { seq: record.seq }),
        }
        current = record.to_state;
        expected_seq += 1;
    }
    Ok(current)
}
