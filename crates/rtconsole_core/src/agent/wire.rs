//! JSON request/response envelopes exchanged between console and agent.
//!
//! Framing (how bytes are delimited on a socket or topic) belongs to the
//! transport; this module only fixes the payload shape.

use crate::agent::runtime::RuntimeError;
use crate::agent::{AgentError, ComponentRef};
use crate::extension::ExtensionError;
use crate::marshal::PropertyMap;
use serde::{Deserialize, Serialize};

/// One console-to-agent call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum WireRequest {
    ExecuteExtension { name: String, context: PropertyMap },
    ListExtensions,
    InstallComponent { component: ComponentRef },
    UninstallComponent { component_id: String },
}

/// Agent reply to one [`WireRequest`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum WireResponse {
    Properties { properties: PropertyMap },
    Names { names: Vec<String> },
    Done,
    Failure { failure: WireFailure },
}

/// Typed failure carried inside [`WireResponse::Failure`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WireFailure {
    Extension { error: ExtensionError },
    Runtime { error: RuntimeError },
    Unsupported { operation: String },
    /// The agent could not decode the request frame.
    Malformed { message: String },
}

impl WireFailure {
    /// Maps an agent-side error to its wire form.
    ///
    /// Transport errors never originate on the agent side; they are reported
    /// as malformed to keep the mapping total.
    pub fn from_agent_error(err: AgentError) -> Self {
        match err {
            AgentError::Extension(error) => Self::Extension { error },
            AgentError::Runtime(error) => Self::Runtime { error },
            AgentError::Unsupported { operation } => Self::Unsupported { operation },
            AgentError::Transport(error) => Self::Malformed {
                message: error.to_string(),
            },
        }
    }
}

pub fn encode_request(request: &WireRequest) -> serde_json::Result<Vec<u8>> {
    serde_json::to_vec(request)
}

pub fn decode_request(frame: &[u8]) -> serde_json::Result<WireRequest> {
    serde_json::from_slice(frame)
}

pub fn encode_response(response: &WireResponse) -> serde_json::Result<Vec<u8>> {
    serde_json::to_vec(response)
}

pub fn decode_response(frame: &[u8]) -> serde_json::Result<WireResponse> {
    serde_json::from_slice(frame)
}
