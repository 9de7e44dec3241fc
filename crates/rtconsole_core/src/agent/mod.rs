//! Agent contracts: the runtime-side endpoint and its console-side proxies.
//!
//! # Responsibility
//! - Define the `Agent` seam every supervisor hands out to the console.
//! - Host the in-process endpoint, the RPC wire envelope and the offline
//!   snapshot agent.
//!
//! # Invariants
//! - Every `Agent` method is a synchronous call on the caller's thread.
//! - Extension failures keep their typed `ExtensionError` across the wire.

pub mod endpoint;
pub mod remote;
pub mod runtime;
pub mod snapshot;
pub mod wire;

use crate::extension::ExtensionError;
use crate::marshal::PropertyMap;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

pub use endpoint::AgentEndpoint;
pub use remote::{LoopbackTransport, RemoteAgent, Transport, TransportError};
pub use runtime::{ComponentRuntime, InMemoryRuntime, RuntimeError};
pub use snapshot::{RuntimeSnapshot, SnapshotAgent, SnapshotComponent, SnapshotError};

pub type AgentResult<T> = Result<T, AgentError>;

/// Installable runtime component reference (for example one bundle).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentRef {
    pub id: String,
    pub location: String,
}

/// Operations the console performs against one managed runtime.
pub trait Agent: Send + Sync {
    /// Resolves `name` and executes it with an untyped context.
    fn execute_extension(&self, name: &str, context: &PropertyMap) -> AgentResult<PropertyMap>;

    /// Returns the extension names currently bound, sorted.
    fn extension_names(&self) -> AgentResult<Vec<String>>;

    fn install_component(&self, component: &ComponentRef) -> AgentResult<()>;

    fn uninstall_component(&self, component_id: &str) -> AgentResult<()>;
}

/// Failure of one agent call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentError {
    Extension(ExtensionError),
    Runtime(RuntimeError),
    Transport(TransportError),
    /// Agent kind cannot perform `operation` (e.g. snapshots are read-only).
    Unsupported { operation: String },
}

impl Display for AgentError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Extension(err) => write!(f, "{err}"),
            Self::Runtime(err) => write!(f, "{err}"),
            Self::Transport(err) => write!(f, "{err}"),
            Self::Unsupported { operation } => {
                write!(f, "operation not supported by this agent: {operation}")
            }
        }
    }
}

impl Error for AgentError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Extension(err) => Some(err),
            Self::Runtime(err) => Some(err),
            Self::Transport(err) => Some(err),
            Self::Unsupported { .. } => None,
        }
    }
}

impl From<ExtensionError> for AgentError {
    fn from(value: ExtensionError) -> Self {
        Self::Extension(value)
    }
}

impl From<RuntimeError> for AgentError {
    fn from(value: RuntimeError) -> Self {
        Self::Runtime(value)
    }
}

impl From<TransportError> for AgentError {
    fn from(value: TransportError) -> Self {
        Self::Transport(value)
    }
}
