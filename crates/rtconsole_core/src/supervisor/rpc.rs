//! Live RPC supervisor.

use crate::agent::{Agent, RemoteAgent, Transport};
use crate::supervisor::{Supervisor, SupervisorCategory, SupervisorError};
use log::{error, info};
use parking_lot::Mutex;
use std::sync::Arc;

#[derive(Default)]
struct RpcState {
    running: bool,
    agent: Option<Arc<RemoteAgent>>,
}

/// Supervises one runtime over a frame transport.
///
/// Connecting is only allowed while the live RPC condition holds the
/// supervisor running; stopping drops the connection.
#[derive(Default)]
pub struct RpcSupervisor {
    state: Mutex<RpcState>,
}

impl RpcSupervisor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attaches `transport` and probes it with an extension listing.
    pub fn connect(&self, transport: Arc<dyn Transport>) -> Result<Vec<String>, SupervisorError> {
        if !self.state.lock().running {
            return Err(SupervisorError::NotRunning(SupervisorCategory::LiveRpc));
        }

        let agent = Arc::new(RemoteAgent::new(transport));
        let names = agent.extension_names().map_err(|err| {
            error!("event=rpc_connect module=supervisor status=error error={err}");
            SupervisorError::Connect(err)
        })?;

        let mut state = self.state.lock();
        // stop() may have raced the probe
        if !state.running {
            return Err(SupervisorError::NotRunning(SupervisorCategory::LiveRpc));
        }
        state.agent = Some(agent);
        info!(
            "event=rpc_connect module=supervisor status=ok extensions={}",
            names.len()
        );
        Ok(names)
    }

    pub fn disconnect(&self) {
        if self.state.lock().agent.take().is_some() {
            info!("event=rpc_disconnect module=supervisor status=ok");
        }
    }

    pub fn is_connected(&self) -> bool {
        self.state.lock().agent.is_some()
    }
}

impl Supervisor for RpcSupervisor {
    fn category(&self) -> SupervisorCategory {
        SupervisorCategory::LiveRpc
    }

    fn start(&self) -> Result<(), SupervisorError> {
        self.state.lock().running = true;
        Ok(())
    }

    fn stop(&self) {
        let mut state = self.state.lock();
        state.running = false;
        state.agent = None;
    }

    fn is_running(&self) -> bool {
        self.state.lock().running
    }

    fn agent(&self) -> Option<Arc<dyn Agent>> {
        self.state
            .lock()
            .agent
            .clone()
            .map(|agent| agent as Arc<dyn Agent>)
    }
}

#[cfg(test)]
mod tests {
    use super::RpcSupervisor;
    use crate::agent::{AgentEndpoint, InMemoryRuntime, LoopbackTransport};
    use crate::extension::ExtensionRegistry;
    use crate::supervisor::{Supervisor, SupervisorError};
    use std::sync::Arc;

    fn loopback() -> Arc<LoopbackTransport> {
        let endpoint = AgentEndpoint::new(
            Arc::new(ExtensionRegistry::new()),
            Arc::new(InMemoryRuntime::new()),
        );
        Arc::new(LoopbackTransport::new(Arc::new(endpoint)))
    }

    #[test]
    fn connect_requires_running_supervisor() {
        let supervisor = RpcSupervisor::new();
        let err = supervisor.connect(loopback()).expect_err("not started yet");
        assert!(matches!(err, SupervisorError::NotRunning(_)));
        assert!(supervisor.agent().is_none());
    }

    #[test]
    fn stop_drops_connection() {
        let supervisor = RpcSupervisor::new();
        supervisor.start().expect("start");
        let names = supervisor.connect(loopback()).expect("connect");
        assert!(names.is_empty());
        assert!(supervisor.is_connected());
        assert!(supervisor.agent().is_some());

        supervisor.stop();
        assert!(!supervisor.is_running());
        assert!(supervisor.agent().is_none());
    }
}
