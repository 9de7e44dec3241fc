//! Connection strategies ("supervisors") and their condition-driven selection.
//!
//! # Responsibility
//! - Define the supervisor categories and the `Supervisor` lifecycle seam.
//! - Gate each supervisor on its category's capability condition.
//!
//! # Invariants
//! - The factory never calls a supervisor directly; supervisors start and
//!   stop only through [`SupervisorGate`] observing the condition bus.

pub mod factory;
pub mod rpc;
pub mod snapshot;

use crate::agent::{Agent, AgentError, SnapshotError};
use crate::condition::{ConditionBus, ConditionListener, SubscriptionId};
use log::{error, info};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

pub use factory::SupervisorFactory;
pub use rpc::RpcSupervisor;
pub use snapshot::SnapshotSupervisor;

/// Condition id published while the live RPC category is active.
pub const CONDITION_ID_LIVE_RPC: &str = "rpc-agent";
/// Condition id published while the snapshot category is active.
pub const CONDITION_ID_SNAPSHOT: &str = "snapshot-agent";

/// Mutually independent supervisor slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SupervisorCategory {
    LiveRpc,
    Snapshot,
}

impl SupervisorCategory {
    pub const ALL: [SupervisorCategory; 2] = [Self::LiveRpc, Self::Snapshot];

    pub fn condition_id(self) -> &'static str {
        match self {
            Self::LiveRpc => CONDITION_ID_LIVE_RPC,
            Self::Snapshot => CONDITION_ID_SNAPSHOT,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::LiveRpc => "live_rpc",
            Self::Snapshot => "snapshot",
        }
    }

    pub(crate) fn slot_index(self) -> usize {
        match self {
            Self::LiveRpc => 0,
            Self::Snapshot => 1,
        }
    }
}

impl Display for SupervisorCategory {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Connection strategy for observing and controlling one runtime.
pub trait Supervisor: Send + Sync {
    fn category(&self) -> SupervisorCategory;

    /// Called when the category condition is published.
    fn start(&self) -> Result<(), SupervisorError>;

    /// Called when the category condition is retracted. Must be idempotent.
    fn stop(&self);

    fn is_running(&self) -> bool;

    /// Agent handle, once the supervisor is running and connected.
    fn agent(&self) -> Option<Arc<dyn Agent>>;
}

#[derive(Debug)]
pub enum SupervisorError {
    NotRunning(SupervisorCategory),
    MissingSnapshotSource,
    Snapshot(SnapshotError),
    Connect(AgentError),
}

impl Display for SupervisorError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotRunning(category) => write!(f, "supervisor `{category}` is not running"),
            Self::MissingSnapshotSource => write!(f, "no snapshot source configured"),
            Self::Snapshot(err) => write!(f, "{err}"),
            Self::Connect(err) => write!(f, "agent connection failed: {err}"),
        }
    }
}

impl Error for SupervisorError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::NotRunning(_) | Self::MissingSnapshotSource => None,
            Self::Snapshot(err) => Some(err),
            Self::Connect(err) => Some(err),
        }
    }
}

impl From<SnapshotError> for SupervisorError {
    fn from(value: SnapshotError) -> Self {
        Self::Snapshot(value)
    }
}

/// Binds one supervisor to its category condition.
pub struct SupervisorGate {
    supervisor: Arc<dyn Supervisor>,
}

impl SupervisorGate {
    /// Subscribes `supervisor` to `bus`; it starts immediately when its
    /// condition is already published.
    pub fn bind(bus: &ConditionBus, supervisor: Arc<dyn Supervisor>) -> SubscriptionId {
        bus.subscribe(Arc::new(Self { supervisor }))
    }

    fn matches(&self, condition_id: &str) -> bool {
        self.supervisor.category().condition_id() == condition_id
    }
}

impl ConditionListener for SupervisorGate {
    fn condition_published(&self, condition_id: &str) {
        if !self.matches(condition_id) {
            return;
        }
        let category = self.supervisor.category();
        match self.supervisor.start() {
            Ok(()) => info!("event=supervisor_start module=supervisor status=ok category={category}"),
            Err(err) => error!(
                "event=supervisor_start module=supervisor status=error category={category} error={err}"
            ),
        }
    }

    fn condition_retracted(&self, condition_id: &str) {
        if !self.matches(condition_id) {
            return;
        }
        self.supervisor.stop();
        info!(
            "event=supervisor_stop module=supervisor status=ok category={}",
            self.supervisor.category()
        );
    }
}
