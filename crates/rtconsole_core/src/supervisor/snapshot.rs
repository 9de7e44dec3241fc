//! Offline snapshot supervisor.

use crate::agent::{Agent, SnapshotAgent};
use crate::supervisor::{Supervisor, SupervisorCategory, SupervisorError};
use log::info;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Default)]
struct SnapshotState {
    source: Option<PathBuf>,
    agent: Option<Arc<SnapshotAgent>>,
}

/// Serves a read-only agent loaded from a snapshot file.
///
/// The source path is cleared on stop; a new activation needs a new source.
#[derive(Default)]
pub struct SnapshotSupervisor {
    state: Mutex<SnapshotState>,
}

impl SnapshotSupervisor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_source(path: impl Into<PathBuf>) -> Self {
        let supervisor = Self::default();
        supervisor.set_source(path);
        supervisor
    }

    /// Sets the snapshot file read on the next start.
    pub fn set_source(&self, path: impl Into<PathBuf>) {
        self.state.lock().source = Some(path.into());
    }

    pub fn source(&self) -> Option<PathBuf> {
        self.state.lock().source.clone()
    }

    pub fn snapshot_agent(&self) -> Option<Arc<SnapshotAgent>> {
        self.state.lock().agent.clone()
    }
}

fn load(path: &Path) -> Result<Arc<SnapshotAgent>, SupervisorError> {
    Ok(Arc::new(SnapshotAgent::load(path)?))
}

impl Supervisor for SnapshotSupervisor {
    fn category(&self) -> SupervisorCategory {
        SupervisorCategory::Snapshot
    }

    fn start(&self) -> Result<(), SupervisorError> {
        let mut state = self.state.lock();
        let path = state
            .source
            .clone()
            .ok_or(SupervisorError::MissingSnapshotSource)?;
        state.agent = Some(load(&path)?);
        info!(
            "event=snapshot_start module=supervisor status=ok path={}",
            path.display()
        );
        Ok(())
    }

    fn stop(&self) {
        let mut state = self.state.lock();
        state.agent = None;
        state.source = None;
    }

    fn is_running(&self) -> bool {
        self.state.lock().agent.is_some()
    }

    fn agent(&self) -> Option<Arc<dyn Agent>> {
        self.snapshot_agent().map(|agent| agent as Arc<dyn Agent>)
    }
}
