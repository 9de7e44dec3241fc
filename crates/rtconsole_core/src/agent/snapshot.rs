//! Offline agent backed by a captured runtime snapshot.
//!
//! Snapshots are read-only: extension execution and component lifecycle
//! calls report `Unsupported`.

use crate::agent::{Agent, AgentError, AgentResult, ComponentRef};
use crate::marshal::PropertyMap;
use log::{error, info};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

/// One component as it was when the snapshot was captured.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotComponent {
    pub id: String,
    pub state: String,
    #[serde(default)]
    pub location: Option<String>,
}

/// Persisted runtime capture.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeSnapshot {
    pub framework: String,
    #[serde(default)]
    pub captured_at_ms: Option<i64>,
    #[serde(default)]
    pub components: Vec<SnapshotComponent>,
}

#[derive(Debug)]
pub enum SnapshotError {
    Io { path: PathBuf, source: std::io::Error },
    Parse { path: PathBuf, source: serde_json::Error },
}

impl Display for SnapshotError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "failed to read snapshot `{}`: {source}", path.display())
            }
            Self::Parse { path, source } => {
                write!(f, "failed to parse snapshot `{}`: {source}", path.display())
            }
        }
    }
}

impl Error for SnapshotError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Parse { source, .. } => Some(source),
        }
    }
}

/// Read-only agent answering from a [`RuntimeSnapshot`].
#[derive(Debug, Clone)]
pub struct SnapshotAgent {
    snapshot: RuntimeSnapshot,
}

impl SnapshotAgent {
    pub fn new(snapshot: RuntimeSnapshot) -> Self {
        Self { snapshot }
    }

    /// Loads a JSON snapshot file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SnapshotError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| {
            error!(
                "event=snapshot_load module=snapshot status=error error_code=io path={}",
                path.display()
            );
            SnapshotError::Io {
                path: path.to_path_buf(),
                source,
            }
        })?;
        let snapshot: RuntimeSnapshot =
            serde_json::from_str(&raw).map_err(|source| SnapshotError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        info!(
            "event=snapshot_load module=snapshot status=ok components={}",
            snapshot.components.len()
        );
        Ok(Self { snapshot })
    }

    pub fn snapshot(&self) -> &RuntimeSnapshot {
        &self.snapshot
    }
}

fn unsupported(operation: &str) -> AgentError {
    AgentError::Unsupported {
        operation: operation.to_string(),
    }
}

impl Agent for SnapshotAgent {
    fn execute_extension(&self, _name: &str, _context: &PropertyMap) -> AgentResult<PropertyMap> {
        Err(unsupported("execute_extension"))
    }

    fn extension_names(&self) -> AgentResult<Vec<String>> {
        Ok(Vec::new())
    }

    fn install_component(&self, _component: &ComponentRef) -> AgentResult<()> {
        Err(unsupported("install_component"))
    }

    fn uninstall_component(&self, _component_id: &str) -> AgentResult<()> {
        Err(unsupported("uninstall_component"))
    }
}
