//! Service configuration loaded from TOML.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file at {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Top-level service configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceConfig {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub web: WebConfig,
    #[serde(default)]
    pub guards: GuardConfig,
    #[serde(default)]
    pub collaborators: CollaboratorConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            storage: StorageConfig::default(),
            web: WebConfig::default(),
            guards: GuardConfig::default(),
            collaborators: CollaboratorConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// SQLite database holding job pointers and the audit log.
    pub sqlite_path: PathBuf,
    /// Root directory for the best-effort JSONL audit mirror.
    pub audit_mirror_root: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            sqlite_path: PathBuf::from(".fieldflow/state.sqlite"),
            audit_mirror_root: PathBuf::from(".fieldflow/audit"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebConfig {
    pub bind: String,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:9480".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuardConfig {
    /// Per-guard collaborator call budget. A call that exceeds it counts as
    /// an unverifiable precondition (fail-closed).
    pub timeout_ms: u64,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self { timeout_ms: 3_000 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct CollaboratorConfig {
    pub crew_base_url: Option<String>,
    pub forms_base_url: Option<String>,
    pub billing_base_url: Option<String>,
}

/// Load a [`ServiceConfig`] from a TOML file. A missing file yields the
/// defaults so `fieldflow init` works in a fresh checkout.
pub fn load_service_config(path: &Path) -> Result<ServiceConfig, ConfigError> {
    if !path.exists() {
        return Ok(ServiceConfig::default());
    }
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse_service_config(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

pub fn parse_service_config(content: &str) -> Result<ServiceConfig, toml::de::Error> {
    toml::from_str(content)
}
