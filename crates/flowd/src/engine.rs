//! The transition engine: validates and applies lifecycle transitions.
//!
//! `list_allowed_transitions` is an advisory, non-mutating read and may be
//! stale by the time a transition is applied. `apply_transition` re-reads
//! the live job, re-validates the edge and guards, and commits the audit
//! record and the pointer update in one atomic unit; a compare-and-set on
//! `state_version` guarantees at most one successful transition per job at
//! a time. No failure mode here is fatal to the process.

use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{info, warn};

use flow_core::graph::TransitionGraph;
use flow_core::state::JobState;
use flow_core::types::{
    Actor, ChangeSource, Job, JobId, RecordId, TransitionRecord, metadata_keys,
    MAX_METADATA_ENTRIES, MAX_METADATA_VALUE_LEN,
};

use crate::audit_mirror::JsonlAuditMirror;
use crate::guards::GuardEvaluator;
use crate::store::{CommitOutcome, SqliteStore, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum TransitionError {
    #[error("job {job_id} not found")]
    JobNotFound { job_id: JobId },
    #[error("invalid job state transition: {from} -> {to}")]
    InvalidTransition { from: JobState, to: JobState },
    #[error("transition blocked: {}", reasons.join("; "))]
    GuardFailed { reasons: Vec<String> },
    #[error("concurrent modification: expected version {expected}, live version {actual}")]
    ConcurrentModification { expected: i64, actual: i64 },
    #[error("invalid request: {message}")]
    InvalidRequest { message: String },
    #[error("store error: {source}")]
    Store {
        #[from]
        source: StoreError,
    },
}

/// A request to create a job. The engine never fabricates an actor; callers
/// pass one when the creation should be attributed.
#[derive(Debug, Clone, Default)]
pub struct NewJobRequest {
    pub id: Option<JobId>,
    pub actor: Option<Actor>,
    pub change_source: ChangeSource,
}

/// A request to move a job to a new state.
#[derive(Debug, Clone)]
pub struct TransitionRequest {
    pub to_state: JobState,
    pub actor: Actor,
    pub change_source: ChangeSource,
    pub reason: Option<String>,
    pub notes: Option<String>,
    pub metadata: BTreeMap<String, String>,
    /// When set, the apply fails with `ConcurrentModification` before any
    /// guard evaluation if the live version differs.
    pub expected_version: Option<i64>,
}

impl TransitionRequest {
    pub fn manual(to_state: JobState, actor: Actor) -> Self {
        Self {
            to_state,
            actor,
            change_source: ChangeSource::Manual,
            reason: None,
            notes: None,
            metadata: BTreeMap::new(),
            expected_version: None,
        }
    }
}

/// One entry of the advisory listing: a declared edge out of the job's
/// current state, with the checklist of reasons if it is blocked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionOption {
    pub to_state: JobState,
    pub allowed: bool,
    pub blocked_reasons: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedTransition {
    pub job_id: JobId,
    pub new_state: JobState,
    pub new_version: i64,
    pub record: TransitionRecord,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobHistory {
    pub current_state: JobState,
    pub records: Vec<TransitionRecord>,
}

/// Broadcast payload for applied transitions (SSE feed, local observers).
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct TransitionEvent {
    pub at: chrono::DateTime<Utc>,
    pub job_id: JobId,
    pub from_state: Option<JobState>,
    pub to_state: JobState,
    pub seq: i64,
    pub change_source: ChangeSource,
}

pub struct TransitionEngine {
    store: Arc<SqliteStore>,
    graph: TransitionGraph,
    evaluator: GuardEvaluator,
    mirror: Option<JsonlAuditMirror>,
    events_tx: broadcast::Sender<TransitionEvent>,
}

impl TransitionEngine {
    pub fn new(
        store: Arc<SqliteStore>,
        graph: TransitionGraph,
        evaluator: GuardEvaluator,
        mirror: Option<JsonlAuditMirror>,
    ) -> Self {
        let (events_tx, _) = broadcast::channel(1024);
        Self {
            store,
            graph,
            evaluator,
            mirror,
            events_tx,
        }
    }

    pub fn graph(&self) -> &TransitionGraph {
        &self.graph
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TransitionEvent> {
        self.events_tx.subscribe()
    }

    /// Create a job at `pending`, version 0, with its synthetic creation
    /// record written in the same transaction.
    pub fn create_job(&self, request: NewJobRequest) -> Result<Job, TransitionError> {
        let now = Utc::now();
        let id = request.id.unwrap_or_else(|| {
            JobId::new(format!(
                "JOB-{}",
                now.timestamp_nanos_opt().unwrap_or_default()
            ))
        });
        let job = Job::new(id.clone(), now);
        let creation = TransitionRecord::creation(
            id.clone(),
            request.actor.as_ref(),
            request.change_source,
            now,
        );

        match self.store.create_job(&job, &creation) {
            Ok(()) => {}
            Err(StoreError::JobExists { job_id }) => {
                return Err(TransitionError::InvalidRequest {
                    message: format!("job {job_id} already exists"),
                })
            }
            Err(err) => return Err(err.into()),
        }

        self.mirror_record(&creation);
        self.emit(&creation);
        info!(job_id = %job.id, "job created");
        Ok(job)
    }

    /// Enumerate the declared edges out of the job's current state and
    /// evaluate each edge's guards. Advisory only: the result may be stale
    /// by the time a transition is applied.
    pub async fn list_allowed_transitions(
        &self,
        job_id: &JobId,
    ) -> Result<Vec<TransitionOption>, TransitionError> {
        let job = self.load(job_id)?;
        let resume_target = self.resume_target(&job)?;

        let mut options = Vec::new();
        for edge in self.graph.outgoing_edges(job.current_state) {
            if !self.hold_return_allowed(&job, edge.to, resume_target) {
                continue;
            }
            let blocked_reasons = self.evaluator.blocked_reasons(&edge.guards, job_id).await;
            options.push(TransitionOption {
                to_state: edge.to,
                allowed: blocked_reasons.is_empty(),
                blocked_reasons,
            });
        }
        Ok(options)
    }

    /// Validate and apply a transition against the live job state.
    ///
    /// Any error leaves the job untouched: no new audit record, no pointer
    /// change, no version change.
    pub async fn apply_transition(
        &self,
        job_id: &JobId,
        request: TransitionRequest,
    ) -> Result<AppliedTransition, TransitionError> {
        validate_metadata(&request.metadata)?;

        let job = self.load(job_id)?;

        // Stale-snapshot detection comes before guard evaluation so callers
        // racing on old listing output refetch instead of burning
        // collaborator calls.
        if let Some(expected) = request.expected_version {
            if expected != job.state_version {
                return Err(TransitionError::ConcurrentModification {
                    expected,
                    actual: job.state_version,
                });
            }
        }

        let from = job.current_state;
        let to = request.to_state;
        let Some(edge) = self.graph.edge(from, to) else {
            return Err(TransitionError::InvalidTransition { from, to });
        };

        // A held job may only resume the state it was held from.
        let resume_target = self.resume_target(&job)?;
        if !self.hold_return_allowed(&job, to, resume_target) {
            return Err(TransitionError::InvalidTransition { from, to });
        }

        let reasons = self.evaluator.blocked_reasons(&edge.guards, job_id).await;
        if !reasons.is_empty() {
            return Err(TransitionError::GuardFailed { reasons });
        }

        let seq = job.state_version + 1;
        let mut metadata = request.metadata;
        if to == JobState::OnHold {
            metadata.insert(metadata_keys::HELD_FROM.to_string(), from.as_str().to_string());
        }
        let now = Utc::now();
        let record = TransitionRecord {
            id: RecordId::for_seq(job_id, seq),
            job_id: job_id.clone(),
            seq,
            from_state: Some(from),
            to_state: to,
            changed_by: Some(request.actor.id),
            changed_by_role: Some(request.actor.role),
            change_source: request.change_source,
            reason: request.reason,
            notes: request.notes,
            metadata,
            created_at: now,
        };

        match self
            .store
            .commit_transition(job_id, job.state_version, to, now, &record)?
        {
            CommitOutcome::Applied { new_version } => {
                self.mirror_record(&record);
                self.emit(&record);
                info!(%job_id, %from, %to, new_version, source = %record.change_source,
                    "transition applied");
                Ok(AppliedTransition {
                    job_id: job_id.clone(),
                    new_state: to,
                    new_version,
                    record,
                })
            }
            CommitOutcome::VersionMismatch { actual } => {
                Err(TransitionError::ConcurrentModification {
                    expected: job.state_version,
                    actual,
                })
            }
        }
    }

    /// A job's current state plus its full ordered audit trail.
    pub fn get_history(&self, job_id: &JobId) -> Result<JobHistory, TransitionError> {
        let job = self.load(job_id)?;
        let records = self.store.list_transitions(job_id)?;
        Ok(JobHistory {
            current_state: job.current_state,
            records,
        })
    }

    pub fn get_job(&self, job_id: &JobId) -> Result<Job, TransitionError> {
        self.load(job_id)
    }

    pub fn list_jobs(&self) -> Result<Vec<Job>, TransitionError> {
        Ok(self.store.list_jobs()?)
    }

    pub fn list_jobs_by_state(&self, state: JobState) -> Result<Vec<Job>, TransitionError> {
        Ok(self.store.list_jobs_by_state(state)?)
    }

    fn load(&self, job_id: &JobId) -> Result<Job, TransitionError> {
        self.store
            .load_job(job_id)?
            .ok_or_else(|| TransitionError::JobNotFound {
                job_id: job_id.clone(),
            })
    }

    /// For a held job, the state it was held from (the `from_state` of the
    /// hold record, which is necessarily the last record).
    fn resume_target(&self, job: &Job) -> Result<Option<JobState>, TransitionError> {
        if job.current_state != JobState::OnHold {
            return Ok(None);
        }
        Ok(self
            .store
            .last_transition(&job.id)?
            .and_then(|record| record.from_state))
    }

    fn hold_return_allowed(
        &self,
        job: &Job,
        to: JobState,
        resume_target: Option<JobState>,
    ) -> bool {
        if job.current_state != JobState::OnHold || to == JobState::Cancelled {
            return true;
        }
        resume_target == Some(to)
    }

    fn mirror_record(&self, record: &TransitionRecord) {
        if let Some(mirror) = &self.mirror {
            if let Err(err) = mirror.append(record) {
                warn!(job_id = %record.job_id, error = %err, "audit mirror append failed");
            }
        }
    }

    fn emit(&self, record: &TransitionRecord) {
        let _ = self.events_tx.send(TransitionEvent {
            at: record.created_at,
            job_id: record.job_id.clone(),
            from_state: record.from_state,
            to_state: record.to_state,
            seq: record.seq,
            change_source: record.change_source,
        });
    }
}

fn validate_metadata(metadata: &BTreeMap<String, String>) -> Result<(), TransitionError> {
    if metadata.len() > MAX_METADATA_ENTRIES {
        return Err(TransitionError::InvalidRequest {
            message: format!(
                "metadata has {} entries; at most {MAX_METADATA_ENTRIES} allowed",
                metadata.len()
            ),
        });
    }
    for (key, value) in metadata {
        if key.is_empty() {
            return Err(TransitionError::InvalidRequest {
                message: "metadata keys must not be empty".to_string(),
            });
        }
        if value.len() > MAX_METADATA_VALUE_LEN {
            return Err(TransitionError::InvalidRequest {
                message: format!(
                    "metadata value for '{key}' exceeds {MAX_METADATA_VALUE_LEN} bytes"
                ),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::fakes::{FakeAnswer, InMemoryCollaborators};
    use crate::collaborators::Collaborators;
    use flow_core::types::replay;
    use std::time::Duration;

    fn mk_engine(fake: Arc<InMemoryCollaborators>) -> TransitionEngine {
        let store = Arc::new(SqliteStore::open_in_memory().expect("store"));
        store.migrate().expect("migrate");
        let evaluator = GuardEvaluator::new(
            Collaborators::from_fake(fake),
            Duration::from_millis(100),
        );
        TransitionEngine::new(store, TransitionGraph::standard(), evaluator, None)
    }

    fn dispatcher() -> Actor {
        Actor::new("U1", "dispatcher")
    }

    fn create(engine: &TransitionEngine, id: &str) -> JobId {
        let job = engine
            .create_job(NewJobRequest {
                id: Some(JobId::new(id)),
                actor: Some(dispatcher()),
                change_source: ChangeSource::Manual,
            })
            .expect("create job");
        job.id
    }

    async fn walk(engine: &TransitionEngine, job_id: &JobId, states: &[JobState]) {
        for &state in states {
            engine
                .apply_transition(job_id, TransitionRequest::manual(state, dispatcher()))
                .await
                .unwrap_or_else(|err| panic!("walk to {state}: {err}"));
        }
    }

    #[tokio::test]
    async fn create_job_starts_pending_with_creation_record() {
        let engine = mk_engine(Arc::new(InMemoryCollaborators::allow_all()));
        let job_id = create(&engine, "J1");

        let job = engine.get_job(&job_id).expect("job");
        assert_eq!(job.current_state, JobState::Pending);
        assert_eq!(job.state_version, 0);

        let history = engine.get_history(&job_id).expect("history");
        assert_eq!(history.records.len(), 1);
        assert_eq!(history.records[0].from_state, None);
        assert_eq!(history.records[0].changed_by.as_deref(), Some("U1"));
    }

    #[tokio::test]
    async fn create_job_rejects_duplicate_id() {
        let engine = mk_engine(Arc::new(InMemoryCollaborators::allow_all()));
        create(&engine, "J1");
        let err = engine
            .create_job(NewJobRequest {
                id: Some(JobId::new("J1")),
                actor: None,
                change_source: ChangeSource::Api,
            })
            .expect_err("duplicate");
        assert!(matches!(err, TransitionError::InvalidRequest { .. }));
    }

    #[tokio::test]
    async fn unguarded_transition_applies_and_increments_version() {
        let engine = mk_engine(Arc::new(InMemoryCollaborators::deny_all()));
        let job_id = create(&engine, "J1");

        let applied = engine
            .apply_transition(
                &job_id,
                TransitionRequest::manual(JobState::Scheduled, dispatcher()),
            )
            .await
            .expect("apply");
        assert_eq!(applied.new_state, JobState::Scheduled);
        assert_eq!(applied.new_version, 1);
        assert_eq!(applied.record.seq, 1);
    }

    #[tokio::test]
    async fn invalid_edge_is_rejected_without_side_effects() {
        let engine = mk_engine(Arc::new(InMemoryCollaborators::allow_all()));
        let job_id = create(&engine, "J1");

        let err = engine
            .apply_transition(&job_id, TransitionRequest::manual(JobState::Paid, dispatcher()))
            .await
            .expect_err("invalid edge");
        assert!(matches!(
            err,
            TransitionError::InvalidTransition {
                from: JobState::Pending,
                to: JobState::Paid,
            }
        ));

        let history = engine.get_history(&job_id).expect("history");
        assert_eq!(history.current_state, JobState::Pending);
        assert_eq!(history.records.len(), 1);
    }

    #[tokio::test]
    async fn listing_and_enforcement_agree_on_blocked_edge() {
        // Scenario A: scheduled job, no crew assigned.
        let fake = Arc::new(InMemoryCollaborators::deny_all());
        let engine = mk_engine(fake);
        let job_id = create(&engine, "J1");
        walk(&engine, &job_id, &[JobState::Scheduled]).await;

        let options = engine
            .list_allowed_transitions(&job_id)
            .await
            .expect("list");
        let en_route = options
            .iter()
            .find(|o| o.to_state == JobState::EnRoute)
            .expect("en_route option");
        assert!(!en_route.allowed);
        assert_eq!(en_route.blocked_reasons, vec!["Crew not assigned".to_string()]);

        // Hold and cancel edges are unguarded and allowed.
        let hold = options
            .iter()
            .find(|o| o.to_state == JobState::OnHold)
            .expect("hold option");
        assert!(hold.allowed);

        let err = engine
            .apply_transition(
                &job_id,
                TransitionRequest::manual(JobState::EnRoute, dispatcher()),
            )
            .await
            .expect_err("blocked");
        match err {
            TransitionError::GuardFailed { reasons } => {
                assert_eq!(reasons, vec!["Crew not assigned".to_string()]);
            }
            other => panic!("expected GuardFailed, got {other}"),
        }
    }

    #[tokio::test]
    async fn listing_omits_edges_not_declared_from_current_state() {
        let engine = mk_engine(Arc::new(InMemoryCollaborators::allow_all()));
        let job_id = create(&engine, "J1");

        let options = engine
            .list_allowed_transitions(&job_id)
            .await
            .expect("list");
        let targets: Vec<JobState> = options.iter().map(|o| o.to_state).collect();
        // One entry per declared edge from pending, nothing else.
        assert_eq!(targets, vec![JobState::Scheduled, JobState::Cancelled]);
    }

    #[tokio::test]
    async fn checked_in_crew_unlocks_work_start() {
        // Scenario B.
        let engine = mk_engine(Arc::new(InMemoryCollaborators::allow_all()));
        let job_id = create(&engine, "J1");
        walk(
            &engine,
            &job_id,
            &[JobState::Scheduled, JobState::EnRoute, JobState::OnSite],
        )
        .await;

        let before = engine.get_job(&job_id).expect("job").state_version;
        let applied = engine
            .apply_transition(
                &job_id,
                TransitionRequest::manual(JobState::InProgress, dispatcher()),
            )
            .await
            .expect("apply");
        assert_eq!(applied.new_version, before + 1);

        let history = engine.get_history(&job_id).expect("history");
        let last = history.records.last().expect("record");
        assert_eq!(last.from_state, Some(JobState::OnSite));
        assert_eq!(last.to_state, JobState::InProgress);
        assert_eq!(last.change_source, ChangeSource::Manual);
    }

    #[tokio::test]
    async fn incomplete_forms_block_completion_and_leave_history_untouched() {
        // Scenario C.
        let fake = Arc::new(InMemoryCollaborators::allow_all());
        let engine = mk_engine(fake.clone());
        let job_id = create(&engine, "J1");
        walk(
            &engine,
            &job_id,
            &[
                JobState::Scheduled,
                JobState::EnRoute,
                JobState::OnSite,
                JobState::InProgress,
            ],
        )
        .await;

        fake.set_forms_complete(FakeAnswer::Value(false));
        let before = engine.get_history(&job_id).expect("history");

        let err = engine
            .apply_transition(
                &job_id,
                TransitionRequest::manual(JobState::Completed, dispatcher()),
            )
            .await
            .expect_err("blocked");
        match err {
            TransitionError::GuardFailed { reasons } => assert!(!reasons.is_empty()),
            other => panic!("expected GuardFailed, got {other}"),
        }

        let after = engine.get_history(&job_id).expect("history");
        assert_eq!(after, before);
    }

    #[tokio::test]
    async fn paid_is_terminal_and_cannot_be_applied_twice() {
        // Scenario D.
        let engine = mk_engine(Arc::new(InMemoryCollaborators::allow_all()));
        let job_id = create(&engine, "J1");
        walk(
            &engine,
            &job_id,
            &[
                JobState::Scheduled,
                JobState::EnRoute,
                JobState::OnSite,
                JobState::InProgress,
                JobState::Completed,
                JobState::Invoiced,
                JobState::Paid,
            ],
        )
        .await;

        let err = engine
            .apply_transition(&job_id, TransitionRequest::manual(JobState::Paid, dispatcher()))
            .await
            .expect_err("second paid");
        assert!(matches!(err, TransitionError::InvalidTransition { .. }));
        assert!(engine
            .list_allowed_transitions(&job_id)
            .await
            .expect("list")
            .is_empty());
    }

    #[tokio::test]
    async fn stale_expected_version_fails_before_guard_evaluation() {
        let fake = Arc::new(InMemoryCollaborators::allow_all());
        let engine = mk_engine(fake.clone());
        let job_id = create(&engine, "J1");
        walk(&engine, &job_id, &[JobState::Scheduled]).await;

        // Collaborators now error; a guard evaluation would surface the
        // fail-closed reason instead of a version conflict.
        fake.set_crew_assigned(FakeAnswer::Fail);

        let mut request = TransitionRequest::manual(JobState::EnRoute, dispatcher());
        request.expected_version = Some(0);
        let err = engine
            .apply_transition(&job_id, request)
            .await
            .expect_err("stale version");
        assert!(matches!(
            err,
            TransitionError::ConcurrentModification {
                expected: 0,
                actual: 1,
            }
        ));
    }

    #[tokio::test]
    async fn concurrent_applies_with_same_expected_version_race_to_one_winner() {
        let engine = Arc::new(mk_engine(Arc::new(InMemoryCollaborators::allow_all())));
        let job_id = create(&engine, "J1");
        walk(&engine, &job_id, &[JobState::Scheduled]).await;

        // Two different valid, unguarded edges from scheduled.
        let mut hold = TransitionRequest::manual(JobState::OnHold, dispatcher());
        hold.expected_version = Some(1);
        let mut cancel = TransitionRequest::manual(JobState::Cancelled, dispatcher());
        cancel.expected_version = Some(1);

        let (a, b) = tokio::join!(
            engine.apply_transition(&job_id, hold),
            engine.apply_transition(&job_id, cancel),
        );

        let successes = [a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count();
        assert_eq!(successes, 1, "exactly one concurrent apply must win");
        for result in [a, b] {
            if let Err(err) = result {
                assert!(matches!(err, TransitionError::ConcurrentModification { .. }));
            }
        }

        let history = engine.get_history(&job_id).expect("history");
        assert_eq!(history.records.len(), 3);
        assert_eq!(engine.get_job(&job_id).expect("job").state_version, 2);
    }

    #[tokio::test]
    async fn held_job_resumes_only_the_state_it_was_held_from() {
        let engine = mk_engine(Arc::new(InMemoryCollaborators::allow_all()));
        let job_id = create(&engine, "J1");
        walk(
            &engine,
            &job_id,
            &[JobState::Scheduled, JobState::EnRoute, JobState::OnHold],
        )
        .await;

        let hold_record = engine
            .get_history(&job_id)
            .expect("history")
            .records
            .last()
            .cloned()
            .expect("hold record");
        assert_eq!(
            hold_record.metadata.get(metadata_keys::HELD_FROM).map(String::as_str),
            Some("en_route")
        );

        let options = engine
            .list_allowed_transitions(&job_id)
            .await
            .expect("list");
        let targets: Vec<JobState> = options.iter().map(|o| o.to_state).collect();
        assert_eq!(targets, vec![JobState::EnRoute, JobState::Cancelled]);

        let err = engine
            .apply_transition(
                &job_id,
                TransitionRequest::manual(JobState::Scheduled, dispatcher()),
            )
            .await
            .expect_err("wrong resume target");
        assert!(matches!(err, TransitionError::InvalidTransition { .. }));

        engine
            .apply_transition(
                &job_id,
                TransitionRequest::manual(JobState::EnRoute, dispatcher()),
            )
            .await
            .expect("resume");
        assert_eq!(
            engine.get_job(&job_id).expect("job").current_state,
            JobState::EnRoute
        );
    }

    #[tokio::test]
    async fn replay_of_history_matches_live_state() {
        let engine = mk_engine(Arc::new(InMemoryCollaborators::allow_all()));
        let job_id = create(&engine, "J1");
        walk(
            &engine,
            &job_id,
            &[
                JobState::Scheduled,
                JobState::OnHold,
                JobState::Scheduled,
                JobState::EnRoute,
                JobState::OnSite,
                JobState::InProgress,
                JobState::Completed,
                JobState::Invoiced,
                JobState::Paid,
            ],
        )
        .await;

        let history = engine.get_history(&job_id).expect("history");
        let replayed = replay(&history.records).expect("replay");
        assert_eq!(replayed, history.current_state);
        assert_eq!(replayed, JobState::Paid);
    }

    #[tokio::test]
    async fn oversized_metadata_is_rejected_before_anything_runs() {
        let engine = mk_engine(Arc::new(InMemoryCollaborators::allow_all()));
        let job_id = create(&engine, "J1");

        let mut request = TransitionRequest::manual(JobState::Scheduled, dispatcher());
        for i in 0..(MAX_METADATA_ENTRIES + 1) {
            request.metadata.insert(format!("k{i}"), "v".to_string());
        }
        let err = engine
            .apply_transition(&job_id, request)
            .await
            .expect_err("metadata bound");
        assert!(matches!(err, TransitionError::InvalidRequest { .. }));
        assert_eq!(engine.get_history(&job_id).expect("history").records.len(), 1);
    }

    #[tokio::test]
    async fn unknown_job_reports_not_found() {
        let engine = mk_engine(Arc::new(InMemoryCollaborators::allow_all()));
        let err = engine
            .list_allowed_transitions(&JobId::new("NOPE"))
            .await
            .expect_err("missing job");
        assert!(matches!(err, TransitionError::JobNotFound { .. }));
    }

    #[tokio::test]
    async fn applied_transitions_are_broadcast() {
        let engine = mk_engine(Arc::new(InMemoryCollaborators::allow_all()));
        let mut rx = engine.subscribe();
        let job_id = create(&engine, "J1");
        walk(&engine, &job_id, &[JobState::Scheduled]).await;

        let creation = rx.recv().await.expect("creation event");
        assert_eq!(creation.from_state, None);
        assert_eq!(creation.to_state, JobState::Pending);

        let event = rx.recv().await.expect("transition event");
        assert_eq!(event.from_state, Some(JobState::Pending));
        assert_eq!(event.to_state, JobState::Scheduled);
        assert_eq!(event.seq, 1);
    }
}
