//! clap-based command-line interface for the lifecycle engine.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use flow_core::config::{load_service_config, ServiceConfig};
use flow_core::graph::TransitionGraph;
use flow_core::state::JobState;
use flow_core::types::{ChangeSource, JobId};
use flow_core::validation::{Validate, ValidationLevel};

use crate::actor::resolve_cli_actor;
use crate::audit_mirror::JsonlAuditMirror;
use crate::collaborators::Collaborators;
use crate::engine::{NewJobRequest, TransitionEngine, TransitionRequest};
use crate::guards::GuardEvaluator;
use crate::store::SqliteStore;

pub const DEFAULT_CONFIG_PATH: &str = ".fieldflow/config.toml";

#[derive(Debug, Parser)]
#[command(name = "fieldflow", version, about = "Field-service job lifecycle engine")]
pub struct Cli {
    /// Path to the service configuration file.
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Create the storage layout and run migrations.
    Init,

    /// Create a job at `pending`.
    CreateJob {
        /// Explicit job id; generated when omitted.
        #[arg(long)]
        id: Option<String>,

        /// Actor id the creation is attributed to (defaults to $USER).
        #[arg(long)]
        actor: Option<String>,

        /// Actor role (defaults to "operator").
        #[arg(long)]
        role: Option<String>,
    },

    /// List jobs, optionally filtered by state.
    List {
        #[arg(long)]
        state: Option<JobState>,
    },

    /// Show one job's current state and version.
    Show { job_id: String },

    /// List the transitions allowed from a job's current state, with
    /// blocking reasons for the ones that are not.
    Allowed { job_id: String },

    /// Apply a transition to a job.
    Transition {
        job_id: String,
        to_state: JobState,

        /// Actor id the transition is attributed to (defaults to $USER).
        #[arg(long)]
        actor: Option<String>,

        /// Actor role (defaults to "operator").
        #[arg(long)]
        role: Option<String>,

        /// Attribution source: manual, automation, or api.
        #[arg(long, default_value = "manual")]
        source: ChangeSource,

        /// Free-form reason recorded on the audit entry.
        #[arg(long)]
        reason: Option<String>,

        /// Free-form notes recorded on the audit entry.
        #[arg(long)]
        notes: Option<String>,

        /// Metadata entries as key=value; repeatable.
        #[arg(long = "meta")]
        metadata: Vec<String>,

        /// Fail if the job's live version differs (optimistic concurrency).
        #[arg(long)]
        expected_version: Option<i64>,
    },

    /// Print a job's full audit trail.
    History { job_id: String },
}

pub async fn run(cli: Cli) -> Result<()> {
    let config = load_checked_config(&cli.config)?;

    match cli.command {
        Command::Init => {
            let engine = open_engine(&config)?;
            drop(engine);
            println!(
                "initialized storage at {}",
                config.storage.sqlite_path.display()
            );
            Ok(())
        }
        Command::CreateJob { id, actor, role } => {
            let engine = open_engine(&config)?;
            let job = engine.create_job(NewJobRequest {
                id: id.map(JobId::new),
                actor: Some(resolve_cli_actor(actor, role)),
                change_source: ChangeSource::Manual,
            })?;
            println!("{} {} v{}", job.id, job.current_state, job.state_version);
            Ok(())
        }
        Command::List { state } => {
            let engine = open_engine(&config)?;
            let jobs = match state {
                Some(state) => engine.list_jobs_by_state(state)?,
                None => engine.list_jobs()?,
            };
            for job in jobs {
                println!(
                    "{}\t{}\tv{}\t{}",
                    job.id, job.current_state, job.state_version, job.updated_at
                );
            }
            Ok(())
        }
        Command::Show { job_id } => {
            let engine = open_engine(&config)?;
            let job = engine.get_job(&JobId::new(job_id))?;
            println!("id:       {}", job.id);
            println!("state:    {}", job.current_state);
            println!("version:  {}", job.state_version);
            println!("created:  {}", job.created_at);
            println!("updated:  {}", job.updated_at);
            Ok(())
        }
        Command::Allowed { job_id } => {
            let engine = open_engine(&config)?;
            let options = engine
                .list_allowed_transitions(&JobId::new(job_id))
                .await?;
            if options.is_empty() {
                println!("(terminal state: no transitions)");
            }
            for option in options {
                if option.allowed {
                    println!("-> {}", option.to_state);
                } else {
                    println!("-> {} BLOCKED: {}", option.to_state, option.blocked_reasons.join("; "));
                }
            }
            Ok(())
        }
        Command::Transition {
            job_id,
            to_state,
            actor,
            role,
            source,
            reason,
            notes,
            metadata,
            expected_version,
        } => {
            let engine = open_engine(&config)?;
            let request = TransitionRequest {
                to_state,
                actor: resolve_cli_actor(actor, role),
                change_source: source,
                reason,
                notes,
                metadata: parse_metadata(&metadata)?,
                expected_version,
            };
            let applied = engine
                .apply_transition(&JobId::new(job_id), request)
                .await?;
            println!(
                "{} -> {} v{}",
                applied.job_id, applied.new_state, applied.new_version
            );
            Ok(())
        }
        Command::History { job_id } => {
            let engine = open_engine(&config)?;
            let history = engine.get_history(&JobId::new(job_id))?;
            println!("current state: {}", history.current_state);
            for record in history.records {
                let from = record
                    .from_state
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| "(created)".to_string());
                let who = record.changed_by.as_deref().unwrap_or("-");
                println!(
                    "#{} {} -> {} by {} ({}) at {}",
                    record.seq, from, record.to_state, who, record.change_source, record.created_at
                );
            }
            Ok(())
        }
    }
}

/// Load the config and gate on validation: errors abort, warnings log.
pub fn load_checked_config(path: &PathBuf) -> Result<ServiceConfig> {
    let config = load_service_config(path)
        .with_context(|| format!("failed to load config from {}", path.display()))?;
    let issues = config.validate();
    for issue in &issues {
        match issue.level {
            ValidationLevel::Error => {
                tracing::error!(code = issue.code, "{}", issue.message);
            }
            ValidationLevel::Warning => {
                tracing::warn!(code = issue.code, "{}", issue.message);
            }
        }
    }
    if issues.iter().any(|i| i.level == ValidationLevel::Error) {
        bail!("configuration is invalid; aborting");
    }
    Ok(config)
}

/// Open the store, wire collaborators and the audit mirror, and build the
/// engine. Shared by the CLI and the web server.
pub fn open_engine(config: &ServiceConfig) -> Result<TransitionEngine> {
    let sqlite_path = &config.storage.sqlite_path;
    if let Some(parent) = sqlite_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
    }

    let store = Arc::new(SqliteStore::open(&sqlite_path)?);
    store.migrate()?;

    let timeout = Duration::from_millis(config.guards.timeout_ms);
    let collaborators = Collaborators::from_config(&config.collaborators, timeout)
        .context("failed to build collaborator clients")?;
    let evaluator = GuardEvaluator::new(collaborators, timeout);

    let mirror = JsonlAuditMirror::new(&config.storage.audit_mirror_root);
    mirror.ensure_layout()?;

    Ok(TransitionEngine::new(
        store,
        TransitionGraph::standard(),
        evaluator,
        Some(mirror),
    ))
}

fn parse_metadata(entries: &[String]) -> Result<std::collections::BTreeMap<String, String>> {
    let mut metadata = std::collections::BTreeMap::new();
    for entry in entries {
        let Some((key, value)) = entry.split_once('=') else {
            bail!("invalid metadata entry '{entry}': expected key=value");
        };
        if key.trim().is_empty() {
            bail!("invalid metadata entry '{entry}': empty key");
        }
        metadata.insert(key.trim().to_string(), value.to_string());
    }
    Ok(metadata)
}
