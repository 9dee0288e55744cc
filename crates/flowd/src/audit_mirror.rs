//! Best-effort JSONL mirror of the audit trail.
//!
//! The SQLite `transitions` table is authoritative; this mirror exists so
//! operators can tail a job's history (or the global stream) with standard
//! text tooling. Writes happen after a successful commit and a failure here
//! never fails the transition.

use flow_core::types::TransitionRecord;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum AuditMirrorError {
    #[error("failed to create mirror directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to serialize transition record: {source}")]
    Serialize {
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to append to mirror file {path}: {source}")]
    Append {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JsonlAuditMirror {
    pub root: PathBuf,
    pub global_file: PathBuf,
    pub job_dir: PathBuf,
}

impl JsonlAuditMirror {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let global_file = root.join("global.jsonl");
        let job_dir = root.join("jobs");
        Self {
            root,
            global_file,
            job_dir,
        }
    }

    pub fn ensure_layout(&self) -> Result<(), AuditMirrorError> {
        fs::create_dir_all(&self.root).map_err(|source| AuditMirrorError::CreateDir {
            path: self.root.clone(),
            source,
        })?;
        fs::create_dir_all(&self.job_dir).map_err(|source| AuditMirrorError::CreateDir {
            path: self.job_dir.clone(),
            source,
        })?;
        Ok(())
    }

    /// Append a record to the global stream and the job's own file.
    pub fn append(&self, record: &TransitionRecord) -> Result<(), AuditMirrorError> {
        self.ensure_layout()?;
        append_json_line(&self.global_file, record)?;
        append_json_line(&self.job_log_path(record.job_id.as_ref()), record)?;
        Ok(())
    }

    pub fn job_log_path(&self, job_id: &str) -> PathBuf {
        self.job_dir.join(format!("{job_id}.jsonl"))
    }

    pub fn global_log_path(&self) -> &Path {
        self.global_file.as_path()
    }
}

fn append_json_line(path: &Path, record: &TransitionRecord) -> Result<(), AuditMirrorError> {
    let line =
        serde_json::to_string(record).map_err(|source| AuditMirrorError::Serialize { source })?;
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|source| AuditMirrorError::Append {
            path: path.to_path_buf(),
            source,
        })?;

    file.write_all(line.as_bytes())
        .map_err(|source| AuditMirrorError::Append {
            path: path.to_path_buf(),
            source,
        })?;
    file.write_all(b"\n")
        .map_err(|source| AuditMirrorError::Append {
            path: path.to_path_buf(),
            source,
        })?;
    Ok(())
}
