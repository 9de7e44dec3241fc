//! Managed runtime seam used for component installation.

use crate::agent::ComponentRef;
use log::info;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Component lifecycle operations of the managed runtime.
pub trait ComponentRuntime: Send + Sync {
    fn install(&self, component: &ComponentRef) -> Result<(), RuntimeError>;
    fn uninstall(&self, component_id: &str) -> Result<(), RuntimeError>;
}

/// Runtime-side failure for one component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeError {
    pub component_id: String,
    pub message: String,
}

impl RuntimeError {
    pub fn new(component_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            component_id: component_id.into(),
            message: message.into(),
        }
    }
}

impl Display for RuntimeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "component `{}` failed: {}", self.component_id, self.message)
    }
}

impl Error for RuntimeError {}

/// Runtime that only tracks installed components in memory.
///
/// Reinstalling an id replaces its location.
#[derive(Debug, Default)]
pub struct InMemoryRuntime {
    installed: Mutex<BTreeMap<String, ComponentRef>>,
}

impl InMemoryRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns installed component ids, sorted.
    pub fn installed_ids(&self) -> Vec<String> {
        self.installed.lock().keys().cloned().collect()
    }
}

impl ComponentRuntime for InMemoryRuntime {
    fn install(&self, component: &ComponentRef) -> Result<(), RuntimeError> {
        if component.location.trim().is_empty() {
            return Err(RuntimeError::new(&component.id, "component location is empty"));
        }
        self.installed
            .lock()
            .insert(component.id.clone(), component.clone());
        info!(
            "event=component_install module=runtime status=ok component_id={}",
            component.id
        );
        Ok(())
    }

    fn uninstall(&self, component_id: &str) -> Result<(), RuntimeError> {
        match self.installed.lock().remove(component_id) {
            Some(_) => Ok(()),
            None => Err(RuntimeError::new(component_id, "component is not installed")),
        }
    }
}
