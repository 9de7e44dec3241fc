//! Core of the runtime management console.
//!
//! Typed extension invocation over property maps, condition-driven supervisor
//! selection, and feature installation against a managed component runtime.

pub mod agent;
pub mod condition;
pub mod config;
pub mod db;
pub mod extension;
pub mod feature;
pub mod logging;
pub mod marshal;
pub mod supervisor;

pub use agent::{
    Agent, AgentEndpoint, AgentError, AgentResult, ComponentRef, ComponentRuntime,
    InMemoryRuntime, LoopbackTransport, RemoteAgent, SnapshotAgent, Transport, TransportError,
};
pub use condition::{ConditionBus, ConditionListener, ConditionRegistration, SubscriptionId};
pub use config::{ConfigError, ConsoleConfig};
pub use extension::{
    execute_extension, Extension, ExtensionDescriptor, ExtensionError, ExtensionProvider,
    ExtensionRegistry, InvocationError, InvocationFailure, RegistryError,
};
pub use feature::{
    FeatureDescriptor, FeatureError, FeatureInstaller, FeatureListener, FeatureStatus,
    FeatureStore,
};
pub use logging::{default_log_level, init_logging, logging_status, LoggingError};
pub use marshal::{
    from_properties, to_properties, ConversionError, FieldSpec, PropertyMap, PropertyValue,
    Record, ScalarKind,
};
pub use supervisor::{
    RpcSupervisor, SnapshotSupervisor, Supervisor, SupervisorCategory, SupervisorError,
    SupervisorFactory, SupervisorGate,
};

/// Health check for embedding hosts.
pub fn ping() -> &'static str {
    "pong"
}

pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::{core_version, ping};

    #[test]
    fn ping_returns_pong() {
        assert_eq!(ping(), "pong");
    }

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
