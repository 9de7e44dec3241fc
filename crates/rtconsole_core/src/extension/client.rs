//! Typed invocation helper for console callers.

use crate::agent::{Agent, AgentError};
use crate::marshal::{from_properties, to_properties, ConversionError, Record};
use log::error;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Stage at which a typed invocation failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvocationFailure {
    /// Caller context could not be marshalled.
    ContextMarshal(ConversionError),
    /// Agent call failed (lookup, agent-side conversion or transport).
    Agent(AgentError),
    /// Agent result does not fit the caller's expected result type.
    ResultUnmarshal(ConversionError),
}

/// Single error surfaced by [`execute_extension`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvocationError {
    pub extension: String,
    pub failure: InvocationFailure,
}

impl InvocationError {
    fn new(extension: &str, failure: InvocationFailure) -> Self {
        Self {
            extension: extension.to_string(),
            failure,
        }
    }
}

impl Display for InvocationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let stage = match &self.failure {
            InvocationFailure::ContextMarshal(_) => "context marshal",
            InvocationFailure::Agent(_) => "agent call",
            InvocationFailure::ResultUnmarshal(_) => "result unmarshal",
        };
        write!(
            f,
            "invocation of extension `{}` failed at {stage}",
            self.extension
        )
    }
}

impl Error for InvocationError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match &self.failure {
            InvocationFailure::ContextMarshal(err) | InvocationFailure::ResultUnmarshal(err) => {
                Some(err)
            }
            InvocationFailure::Agent(err) => Some(err),
        }
    }
}

/// Marshals `context`, executes extension `name` on `agent`, and unmarshals
/// the reply into `R`.
///
/// Stateless; safe to call concurrently against a shared agent.
pub fn execute_extension<C: Record, R: Record>(
    agent: &dyn Agent,
    name: &str,
    context: &C,
) -> Result<R, InvocationError> {
    let failed = |failure: InvocationFailure| {
        let err = InvocationError::new(name, failure);
        error!(
            "event=extension_invoke module=client status=error name={} error={}",
            name,
            err.source().map_or_else(|| err.to_string(), ToString::to_string)
        );
        err
    };

    let properties =
        to_properties(context).map_err(|err| failed(InvocationFailure::ContextMarshal(err)))?;
    let reply = agent
        .execute_extension(name, &properties)
        .map_err(|err| failed(InvocationFailure::Agent(err)))?;
    from_properties::<R>(&reply).map_err(|err| failed(InvocationFailure::ResultUnmarshal(err)))
}
