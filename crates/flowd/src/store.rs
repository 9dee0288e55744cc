//! SQLite-backed job pointers and the append-only transition log.
//!
//! The `transitions` table is the authoritative audit trail. The store
//! exposes append (inside the commit transaction only) and ordered reads;
//! there is deliberately no update or delete path for transition rows, so
//! immutability is enforced at the interface, not by convention.

use chrono::{DateTime, Utc};
use flow_core::state::JobState;
use flow_core::types::{Job, JobId, TransitionRecord};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("sqlite error: {source}")]
    Sql {
        #[from]
        source: rusqlite::Error,
    },
    #[error("json serialization error: {source}")]
    Json {
        #[from]
        source: serde_json::Error,
    },
    #[error("job {job_id} already exists")]
    JobExists { job_id: JobId },
    #[error("store mutex poisoned")]
    Poisoned,
}

/// Outcome of the transactional commit: either the transition applied, or
/// the compare-and-set on `state_version` missed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    Applied { new_version: i64 },
    VersionMismatch { actual: i64 },
}

#[derive(Debug)]
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn migrate(&self) -> Result<(), StoreError> {
        let conn = self.lock()?;
        conn.execute_batch(
            r#"
CREATE TABLE IF NOT EXISTS jobs (
    job_id TEXT PRIMARY KEY,
    current_state TEXT NOT NULL,
    state_version INTEGER NOT NULL,
    payload_json TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_jobs_state ON jobs(current_state);

CREATE TABLE IF NOT EXISTS transitions (
    record_id TEXT PRIMARY KEY,
    job_id TEXT NOT NULL,
    seq INTEGER NOT NULL,
    from_state TEXT,
    to_state TEXT NOT NULL,
    change_source TEXT NOT NULL,
    payload_json TEXT NOT NULL,
    created_at TEXT NOT NULL,
    UNIQUE (job_id, seq)
);

CREATE INDEX IF NOT EXISTS idx_transitions_job_seq ON transitions(job_id, seq);
"#,
        )?;
        Ok(())
    }

    /// Insert a new job and its synthetic creation record in one transaction.
    pub fn create_job(&self, job: &Job, creation: &TransitionRecord) -> Result<(), StoreError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let exists: Option<i64> = tx
            .query_row(
                "SELECT 1 FROM jobs WHERE job_id = ?1",
                params![job.id.0],
                |row| row.get(0),
            )
            .optional()?;
        if exists.is_some() {
            return Err(StoreError::JobExists {
                job_id: job.id.clone(),
            });
        }

        let payload = serde_json::to_string(job)?;
        tx.execute(
            r#"
INSERT INTO jobs (job_id, current_state, state_version, payload_json, created_at, updated_at)
VALUES (?1, ?2, ?3, ?4, ?5, ?6)
"#,
            params![
                job.id.0,
                job.current_state.as_str(),
                job.state_version,
                payload,
                job.created_at.to_rfc3339(),
                job.updated_at.to_rfc3339(),
            ],
        )?;
        insert_transition(&tx, creation)?;
        tx.commit()?;
        Ok(())
    }

    pub fn load_job(&self, job_id: &JobId) -> Result<Option<Job>, StoreError> {
        let conn = self.lock()?;
        let payload: Option<String> = conn
            .query_row(
                "SELECT payload_json FROM jobs WHERE job_id = ?1",
                params![job_id.0],
                |row| row.get(0),
            )
            .optional()?;
        payload
            .map(|value| serde_json::from_str::<Job>(&value))
            .transpose()
            .map_err(StoreError::from)
    }

    pub fn list_jobs(&self) -> Result<Vec<Job>, StoreError> {
        let conn = self.lock()?;
        let mut stmt =
            conn.prepare("SELECT payload_json FROM jobs ORDER BY updated_at DESC, job_id ASC")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut jobs = Vec::new();
        for row in rows {
            let payload = row?;
            jobs.push(serde_json::from_str::<Job>(&payload)?);
        }
        Ok(jobs)
    }

    pub fn list_jobs_by_state(&self, state: JobState) -> Result<Vec<Job>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT payload_json FROM jobs WHERE current_state = ?1 ORDER BY updated_at DESC, job_id ASC",
        )?;
        let rows = stmt.query_map(params![state.as_str()], |row| row.get::<_, String>(0))?;
        let mut jobs = Vec::new();
        for row in rows {
            let payload = row?;
            jobs.push(serde_json::from_str::<Job>(&payload)?);
        }
        Ok(jobs)
    }

    /// Atomically apply one transition: compare-and-set on `state_version`,
    /// append the audit record, and advance the job pointer. Both writes
    /// succeed or neither does.
    ///
    /// Returns `VersionMismatch` without side effects if another caller
    /// committed first.
    pub fn commit_transition(
        &self,
        job_id: &JobId,
        expected_version: i64,
        to_state: JobState,
        updated_at: DateTime<Utc>,
        record: &TransitionRecord,
    ) -> Result<CommitOutcome, StoreError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let changed = tx.execute(
            r#"
UPDATE jobs
SET current_state = ?1, state_version = state_version + 1, updated_at = ?2,
    payload_json = json_set(payload_json,
        '$.current_state', ?3,
        '$.state_version', state_version + 1,
        '$.updated_at', ?2)
WHERE job_id = ?4 AND state_version = ?5
"#,
            params![
                to_state.as_str(),
                updated_at.to_rfc3339(),
                to_state.as_str(),
                job_id.0,
                expected_version,
            ],
        )?;

        if changed == 0 {
            let actual: i64 = tx.query_row(
                "SELECT state_version FROM jobs WHERE job_id = ?1",
                params![job_id.0],
                |row| row.get(0),
            )?;
            // Nothing written; drop the transaction.
            return Ok(CommitOutcome::VersionMismatch { actual });
        }

        insert_transition(&tx, record)?;
        tx.commit()?;
        Ok(CommitOutcome::Applied {
            new_version: expected_version + 1,
        })
    }

    /// A job's full audit trail, ordered by the dense per-job sequence.
    pub fn list_transitions(&self, job_id: &JobId) -> Result<Vec<TransitionRecord>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT payload_json FROM transitions WHERE job_id = ?1 ORDER BY seq ASC",
        )?;
        let rows = stmt.query_map(params![job_id.0], |row| row.get::<_, String>(0))?;
        let mut records = Vec::new();
        for row in rows {
            let payload = row?;
            records.push(serde_json::from_str::<TransitionRecord>(&payload)?);
        }
        Ok(records)
    }

    pub fn last_transition(&self, job_id: &JobId) -> Result<Option<TransitionRecord>, StoreError> {
        let conn = self.lock()?;
        let payload: Option<String> = conn
            .query_row(
                "SELECT payload_json FROM transitions WHERE job_id = ?1 ORDER BY seq DESC LIMIT 1",
                params![job_id.0],
                |row| row.get(0),
            )
            .optional()?;
        payload
            .map(|value| serde_json::from_str::<TransitionRecord>(&value))
            .transpose()
            .map_err(StoreError::from)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }
}

fn insert_transition(
    tx: &rusqlite::Transaction<'_>,
    record: &TransitionRecord,
) -> Result<(), StoreError> {
    let payload = serde_json::to_string(record)?;
    tx.execute(
        r#"
INSERT INTO transitions (record_id, job_id, seq, from_state, to_state, change_source, payload_json, created_at)
VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
"#,
        params![
            record.id.0,
            record.job_id.0,
            record.seq,
            record.from_state.map(|s| s.as_str()),
            record.to_state.as_str(),
            record.change_source.as_str(),
            payload,
            record.created_at.to_rfc3339(),
        ],
    )?;
    Ok(())
}
