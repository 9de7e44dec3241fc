//! Runtime-side agent endpoint.
//!
//! # Responsibility
//! - Resolve extension names in the registry and run the typed invocation.
//! - Forward component lifecycle calls to the managed runtime.
//! - Serve wire requests for remote consoles.
//!
//! # Invariants
//! - An extension never sees a partially-built context.
//! - Lookup failures leave registry state untouched.

use crate::agent::runtime::ComponentRuntime;
use crate::agent::wire::{
    decode_request, encode_response, WireFailure, WireRequest, WireResponse,
};
use crate::agent::{Agent, AgentResult, ComponentRef};
use crate::extension::{ExtensionDescriptor, ExtensionError, ExtensionRegistry};
use crate::marshal::PropertyMap;
use log::{error, info, warn};
use std::sync::Arc;
use std::time::Instant;

/// In-process agent bound to one registry and one managed runtime.
pub struct AgentEndpoint {
    registry: Arc<ExtensionRegistry>,
    runtime: Arc<dyn ComponentRuntime>,
}

impl AgentEndpoint {
    pub fn new(registry: Arc<ExtensionRegistry>, runtime: Arc<dyn ComponentRuntime>) -> Self {
        Self { registry, runtime }
    }

    pub fn registry(&self) -> &Arc<ExtensionRegistry> {
        &self.registry
    }

    /// Descriptors of every bound extension, sorted by name.
    pub fn extensions(&self) -> Vec<ExtensionDescriptor> {
        self.registry.descriptors()
    }

    /// Executes extension `name` with an untyped `context`.
    ///
    /// # Errors
    /// - `NotFound` when no extension is bound to `name`.
    /// - `ContextConversion` when `context` does not fit the declared context
    ///   type; the extension is not invoked.
    /// - `ResultConversion` when the typed result cannot be marshalled.
    pub fn execute_extension(
        &self,
        name: &str,
        context: &PropertyMap,
    ) -> Result<PropertyMap, ExtensionError> {
        let started_at = Instant::now();
        let Some(handler) = self.registry.lookup(name) else {
            warn!("event=extension_execute module=agent status=error error_code=not_found name={name}");
            return Err(ExtensionError::NotFound {
                name: name.to_string(),
            });
        };

        match handler.invoke(context) {
            Ok(result) => {
                info!(
                    "event=extension_execute module=agent status=ok name={} duration_ms={}",
                    name,
                    started_at.elapsed().as_millis()
                );
                Ok(result)
            }
            Err(err) => {
                error!(
                    "event=extension_execute module=agent status=error name={} duration_ms={} error_code={} error={}",
                    name,
                    started_at.elapsed().as_millis(),
                    err.code(),
                    err
                );
                Err(err)
            }
        }
    }

    /// Serves one decoded wire request.
    pub fn dispatch(&self, request: WireRequest) -> WireResponse {
        let outcome: AgentResult<WireResponse> = match request {
            WireRequest::ExecuteExtension { name, context } => self
                .execute_extension(&name, &context)
                .map(|properties| WireResponse::Properties { properties })
                .map_err(Into::into),
            WireRequest::ListExtensions => self
                .extension_names()
                .map(|names| WireResponse::Names { names }),
            WireRequest::InstallComponent { component } => self
                .install_component(&component)
                .map(|()| WireResponse::Done),
            WireRequest::UninstallComponent { component_id } => self
                .uninstall_component(&component_id)
                .map(|()| WireResponse::Done),
        };

        outcome.unwrap_or_else(|err| WireResponse::Failure {
            failure: WireFailure::from_agent_error(err),
        })
    }

    /// Decodes a request frame, dispatches it and encodes the reply.
    pub fn handle_frame(&self, frame: &[u8]) -> serde_json::Result<Vec<u8>> {
        let response = match decode_request(frame) {
            Ok(request) => self.dispatch(request),
            Err(err) => {
                warn!("event=wire_decode module=agent status=error error={err}");
                WireResponse::Failure {
                    failure: WireFailure::Malformed {
                        message: err.to_string(),
                    },
                }
            }
        };
        encode_response(&response)
    }
}

impl Agent for AgentEndpoint {
    fn execute_extension(&self, name: &str, context: &PropertyMap) -> AgentResult<PropertyMap> {
        AgentEndpoint::execute_extension(self, name, context).map_err(Into::into)
    }

    fn extension_names(&self) -> AgentResult<Vec<String>> {
        Ok(self.registry.names())
    }

    fn install_component(&self, component: &ComponentRef) -> AgentResult<()> {
        self.runtime.install(component).map_err(|err| {
            error!(
                "event=component_install module=agent status=error component_id={} error={}",
                component.id, err.message
            );
            err.into()
        })
    }

    fn uninstall_component(&self, component_id: &str) -> AgentResult<()> {
        self.runtime.uninstall(component_id).map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::AgentEndpoint;
    use crate::agent::runtime::InMemoryRuntime;
    use crate::agent::wire::{decode_response, WireFailure, WireResponse};
    use crate::agent::{Agent, AgentError, ComponentRef};
    use crate::extension::{Extension, ExtensionError, ExtensionRegistry};
    use crate::marshal::{
        ConversionResult, FieldReader, FieldSpec, FieldWriter, PropertyMap, PropertyValue,
        Record, ScalarKind,
    };
    use std::sync::Arc;

    struct Flag {
        on: bool,
    }

    impl Record for Flag {
        const SCHEMA: &'static [FieldSpec] = &[FieldSpec::required("on", ScalarKind::Bool)];

        fn write_fields(&self, writer: &mut FieldWriter) {
            writer.put("on", self.on);
        }

        fn read_fields(reader: &FieldReader<'_>) -> ConversionResult<Self> {
            Ok(Self {
                on: reader.get("on")?,
            })
        }
    }

    struct Toggle;

    impl Extension for Toggle {
        type Context = Flag;
        type Result = Flag;

        fn name(&self) -> &str {
            "toggle"
        }

        fn execute(&self, context: Flag) -> Flag {
            Flag { on: !context.on }
        }
    }

    fn endpoint() -> AgentEndpoint {
        let registry = ExtensionRegistry::new();
        registry.register(Toggle).expect("register toggle");
        AgentEndpoint::new(Arc::new(registry), Arc::new(InMemoryRuntime::new()))
    }

    #[test]
    fn executes_registered_extension() {
        let mut context = PropertyMap::new();
        context.insert("on".to_string(), PropertyValue::Bool(false));
        let result = endpoint()
            .execute_extension("toggle", &context)
            .expect("toggle runs");
        assert_eq!(result["on"], PropertyValue::Bool(true));
    }

    #[test]
    fn agent_trait_wraps_extension_errors() {
        let err = Agent::execute_extension(&endpoint(), "ghost", &PropertyMap::new())
            .expect_err("unknown name must fail");
        assert_eq!(
            err,
            AgentError::Extension(ExtensionError::NotFound {
                name: "ghost".to_string()
            })
        );
    }

    #[test]
    fn answers_malformed_frames_with_failure() {
        let reply = endpoint().handle_frame(b"not json").expect("reply encodes");
        let response = decode_response(&reply).expect("reply decodes");
        assert!(matches!(
            response,
            WireResponse::Failure {
                failure: WireFailure::Malformed { .. }
            }
        ));
    }

    #[test]
    fn forwards_component_install_to_runtime() {
        let runtime = Arc::new(InMemoryRuntime::new());
        let endpoint = AgentEndpoint::new(Arc::new(ExtensionRegistry::new()), runtime.clone());
        endpoint
            .install_component(&ComponentRef {
                id: "org.example.a".to_string(),
                location: "file:/a.jar".to_string(),
            })
            .expect("install");
        assert_eq!(runtime.installed_ids(), vec!["org.example.a"]);
    }
}
