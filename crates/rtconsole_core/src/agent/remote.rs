//! Console-side proxy for an agent reached over a transport.

use crate::agent::endpoint::AgentEndpoint;
use crate::agent::wire::{
    decode_response, encode_request, WireFailure, WireRequest, WireResponse,
};
use crate::agent::{Agent, AgentError, AgentResult, ComponentRef};
use crate::marshal::PropertyMap;
use log::{debug, error};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

/// Request/response byte channel to one agent.
///
/// Implementations own connection setup, framing and timeouts.
pub trait Transport: Send + Sync {
    fn round_trip(&self, frame: &[u8]) -> Result<Vec<u8>, TransportError>;
}

/// Transport or envelope failure between console and agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    Disconnected,
    Io(String),
    Codec(String),
    /// Agent replied with a response shape that does not answer the request.
    UnexpectedResponse(&'static str),
    /// Agent could not decode the frame we sent.
    Rejected(String),
}

impl Display for TransportError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "agent transport is disconnected"),
            Self::Io(message) => write!(f, "agent transport i/o failed: {message}"),
            Self::Codec(message) => write!(f, "agent frame codec failed: {message}"),
            Self::UnexpectedResponse(expected) => {
                write!(f, "agent returned an unexpected response, expected {expected}")
            }
            Self::Rejected(message) => write!(f, "agent rejected request frame: {message}"),
        }
    }
}

impl Error for TransportError {}

impl From<serde_json::Error> for TransportError {
    fn from(value: serde_json::Error) -> Self {
        Self::Codec(value.to_string())
    }
}

/// `Agent` implementation that encodes every call as a wire request.
pub struct RemoteAgent {
    transport: Arc<dyn Transport>,
}

impl RemoteAgent {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    fn call(&self, request: &WireRequest) -> AgentResult<WireResponse> {
        let frame = encode_request(request).map_err(TransportError::from)?;
        let reply = self.transport.round_trip(&frame).map_err(|err| {
            error!("event=rpc_call module=remote status=error error={err}");
            err
        })?;
        let response = decode_response(&reply).map_err(TransportError::from)?;
        match response {
            WireResponse::Failure { failure } => Err(failure_to_agent_error(failure)),
            other => {
                debug!("event=rpc_call module=remote status=ok");
                Ok(other)
            }
        }
    }
}

fn failure_to_agent_error(failure: WireFailure) -> AgentError {
    match failure {
        WireFailure::Extension { error } => AgentError::Extension(error),
        WireFailure::Runtime { error } => AgentError::Runtime(error),
        WireFailure::Unsupported { operation } => AgentError::Unsupported { operation },
        WireFailure::Malformed { message } => {
            AgentError::Transport(TransportError::Rejected(message))
        }
    }
}

impl Agent for RemoteAgent {
    fn execute_extension(&self, name: &str, context: &PropertyMap) -> AgentResult<PropertyMap> {
        let request = WireRequest::ExecuteExtension {
            name: name.to_string(),
            context: context.clone(),
        };
        match self.call(&request)? {
            WireResponse::Properties { properties } => Ok(properties),
            _ => Err(TransportError::UnexpectedResponse("properties").into()),
        }
    }

    fn extension_names(&self) -> AgentResult<Vec<String>> {
        match self.call(&WireRequest::ListExtensions)? {
            WireResponse::Names { names } => Ok(names),
            _ => Err(TransportError::UnexpectedResponse("names").into()),
        }
    }

    fn install_component(&self, component: &ComponentRef) -> AgentResult<()> {
        let request = WireRequest::InstallComponent {
            component: component.clone(),
        };
        match self.call(&request)? {
            WireResponse::Done => Ok(()),
            _ => Err(TransportError::UnexpectedResponse("done").into()),
        }
    }

    fn uninstall_component(&self, component_id: &str) -> AgentResult<()> {
        let request = WireRequest::UninstallComponent {
            component_id: component_id.to_string(),
        };
        match self.call(&request)? {
            WireResponse::Done => Ok(()),
            _ => Err(TransportError::UnexpectedResponse("done").into()),
        }
    }
}

/// Transport that hands frames straight to an in-process endpoint.
///
/// Used for local connections and tests; frames still go through the JSON
/// codec so behavior matches a socket transport.
pub struct LoopbackTransport {
    endpoint: Arc<AgentEndpoint>,
}

impl LoopbackTransport {
    pub fn new(endpoint: Arc<AgentEndpoint>) -> Self {
        Self { endpoint }
    }
}

impl Transport for LoopbackTransport {
    fn round_trip(&self, frame: &[u8]) -> Result<Vec<u8>, TransportError> {
        self.endpoint.handle_frame(frame).map_err(TransportError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::{LoopbackTransport, RemoteAgent, Transport, TransportError};
    use crate::agent::endpoint::AgentEndpoint;
    use crate::agent::runtime::InMemoryRuntime;
    use crate::agent::{Agent, AgentError, ComponentRef};
    use crate::extension::{ExtensionError, ExtensionRegistry};
    use crate::marshal::PropertyMap;
    use std::sync::Arc;

    struct ClosedTransport;

    impl Transport for ClosedTransport {
        fn round_trip(&self, _frame: &[u8]) -> Result<Vec<u8>, TransportError> {
            Err(TransportError::Disconnected)
        }
    }

    struct GarbageTransport;

    impl Transport for GarbageTransport {
        fn round_trip(&self, _frame: &[u8]) -> Result<Vec<u8>, TransportError> {
            Ok(br#"{"status":"done"}"#.to_vec())
        }
    }

    fn loopback() -> (RemoteAgent, Arc<InMemoryRuntime>) {
        let runtime = Arc::new(InMemoryRuntime::new());
        let endpoint = Arc::new(AgentEndpoint::new(
            Arc::new(ExtensionRegistry::new()),
            runtime.clone(),
        ));
        (
            RemoteAgent::new(Arc::new(LoopbackTransport::new(endpoint))),
            runtime,
        )
    }

    #[test]
    fn not_found_survives_the_wire() {
        let (agent, _) = loopback();
        let err = agent
            .execute_extension("ghost", &PropertyMap::new())
            .expect_err("unknown extension must fail");
        assert_eq!(
            err,
            AgentError::Extension(ExtensionError::NotFound {
                name: "ghost".to_string()
            })
        );
    }

    #[test]
    fn component_calls_reach_the_runtime() {
        let (agent, runtime) = loopback();
        agent
            .install_component(&ComponentRef {
                id: "org.example.a".to_string(),
                location: "file:/a.jar".to_string(),
            })
            .expect("remote install");
        assert_eq!(runtime.installed_ids(), vec!["org.example.a"]);

        let err = agent
            .uninstall_component("org.example.missing")
            .expect_err("unknown component must fail");
        assert!(matches!(err, AgentError::Runtime(_)));
    }

    #[test]
    fn surfaces_transport_failures() {
        let agent = RemoteAgent::new(Arc::new(ClosedTransport));
        let err = agent.extension_names().expect_err("closed transport");
        assert_eq!(err, AgentError::Transport(TransportError::Disconnected));
    }

    #[test]
    fn rejects_mismatched_response_shape() {
        let agent = RemoteAgent::new(Arc::new(GarbageTransport));
        let err = agent
            .execute_extension("anything", &PropertyMap::new())
            .expect_err("done is not a properties reply");
        assert_eq!(
            err,
            AgentError::Transport(TransportError::UnexpectedResponse("properties"))
        );
    }
}
