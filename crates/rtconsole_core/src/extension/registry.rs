//! Name-keyed registry of typed extensions.
//!
//! # Responsibility
//! - Bind each extension name to one type-erased handler.
//! - Perform context unmarshal, typed execution and result marshal.
//!
//! # Invariants
//! - Names are unique; a second registration under a bound name is rejected.
//! - The map entry lock is never held while an extension executes.

use crate::extension::error::ExtensionError;
use crate::marshal::{from_properties, to_properties, FieldSpec, PropertyMap, Record};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use log::{debug, info, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

static EXTENSION_NAME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9](?:[A-Za-z0-9._-]*[A-Za-z0-9])?$").expect("valid extension name regex")
});

/// A named operation with a fixed typed context and result.
///
/// `execute` runs synchronously on the invoking thread and may block on
/// runtime operations.
pub trait Extension: Send + Sync + 'static {
    type Context: Record;
    type Result: Record;

    /// Unique registry name.
    fn name(&self) -> &str;

    fn execute(&self, context: Self::Context) -> Self::Result;
}

/// Type identity of a context or result record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordType {
    pub type_name: &'static str,
    pub fields: &'static [FieldSpec],
}

impl RecordType {
    pub fn of<R: Record>() -> Self {
        Self {
            type_name: std::any::type_name::<R>(),
            fields: R::SCHEMA,
        }
    }
}

/// Immutable registration snapshot for one extension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionDescriptor {
    pub name: String,
    pub context_type: RecordType,
    pub result_type: RecordType,
}

/// Type-erased invocation surface stored by the registry.
pub trait ExtensionHandler: Send + Sync {
    fn descriptor(&self) -> &ExtensionDescriptor;

    /// Unmarshals `context`, executes, and marshals the result.
    fn invoke(&self, context: &PropertyMap) -> Result<PropertyMap, ExtensionError>;
}

struct TypedHandler<E: Extension> {
    extension: E,
    descriptor: ExtensionDescriptor,
}

impl<E: Extension> ExtensionHandler for TypedHandler<E> {
    fn descriptor(&self) -> &ExtensionDescriptor {
        &self.descriptor
    }

    fn invoke(&self, context: &PropertyMap) -> Result<PropertyMap, ExtensionError> {
        let name = &self.descriptor.name;
        let typed_context = from_properties::<E::Context>(context).map_err(|cause| {
            ExtensionError::ContextConversion {
                name: name.clone(),
                cause,
            }
        })?;

        let result = self.extension.execute(typed_context);

        to_properties(&result).map_err(|cause| ExtensionError::ResultConversion {
            name: name.clone(),
            cause,
        })
    }
}

/// Startup hook that contributes extensions to a registry.
///
/// Providers are collected by whoever assembles the agent; the registry does
/// not care how they were discovered.
pub trait ExtensionProvider {
    fn register_extensions(&self, registry: &ExtensionRegistry) -> RegistryResult<()>;
}

pub type RegistryResult<T> = Result<T, RegistryError>;

/// Registration errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    InvalidName(String),
    DuplicateName(String),
}

impl Display for RegistryError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidName(value) => write!(f, "extension name is invalid: `{value}`"),
            Self::DuplicateName(value) => {
                write!(f, "extension name already registered: {value}")
            }
        }
    }
}

impl Error for RegistryError {}

/// Concurrent name -> handler registry.
#[derive(Default)]
pub struct ExtensionRegistry {
    entries: DashMap<String, Arc<dyn ExtensionHandler>>,
}

impl ExtensionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a registry populated by every provider in order.
    ///
    /// Stops at the first provider error.
    pub fn from_providers(providers: &[&dyn ExtensionProvider]) -> RegistryResult<Self> {
        let registry = Self::new();
        for provider in providers {
            provider.register_extensions(&registry)?;
        }
        Ok(registry)
    }

    /// Registers `extension` under its own name.
    ///
    /// # Errors
    /// - `InvalidName` for blank names or names with unsupported characters.
    /// - `DuplicateName` when the name is already bound; the existing binding
    ///   is kept.
    pub fn register<E: Extension>(&self, extension: E) -> RegistryResult<ExtensionDescriptor> {
        let name = extension.name().to_string();
        if !EXTENSION_NAME_RE.is_match(&name) {
            warn!("event=extension_register module=extension status=error error_code=invalid_name name={name:?}");
            return Err(RegistryError::InvalidName(name));
        }

        let descriptor = ExtensionDescriptor {
            name: name.clone(),
            context_type: RecordType::of::<E::Context>(),
            result_type: RecordType::of::<E::Result>(),
        };

        match self.entries.entry(name.clone()) {
            Entry::Occupied(_) => {
                warn!("event=extension_register module=extension status=error error_code=duplicate_name name={name}");
                Err(RegistryError::DuplicateName(name))
            }
            Entry::Vacant(vacant) => {
                vacant.insert(Arc::new(TypedHandler {
                    extension,
                    descriptor: descriptor.clone(),
                }));
                info!(
                    "event=extension_register module=extension status=ok name={} context_type={} result_type={}",
                    name, descriptor.context_type.type_name, descriptor.result_type.type_name
                );
                Ok(descriptor)
            }
        }
    }

    /// Removes the binding for `name`, returning its descriptor when present.
    pub fn unregister(&self, name: &str) -> Option<ExtensionDescriptor> {
        let removed = self
            .entries
            .remove(name)
            .map(|(_, handler)| handler.descriptor().clone());
        match &removed {
            Some(_) => info!("event=extension_unregister module=extension status=ok name={name}"),
            None => debug!("event=extension_unregister module=extension status=noop name={name}"),
        }
        removed
    }

    /// Returns the handler bound to `name`.
    ///
    /// The returned handle is detached from the map, so invoking it does not
    /// block concurrent registration.
    pub fn lookup(&self, name: &str) -> Option<Arc<dyn ExtensionHandler>> {
        self.entries.get(name).map(|entry| Arc::clone(entry.value()))
    }

    /// Returns descriptors sorted by name.
    pub fn descriptors(&self) -> Vec<ExtensionDescriptor> {
        let mut descriptors: Vec<ExtensionDescriptor> = self
            .entries
            .iter()
            .map(|entry| entry.value().descriptor().clone())
            .collect();
        descriptors.sort_by(|left, right| left.name.cmp(&right.name));
        descriptors
    }

    /// Returns bound names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.entries.iter().map(|entry| entry.key().clone()).collect();
        names.sort();
        names
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::{Extension, ExtensionProvider, ExtensionRegistry, RegistryError, RegistryResult};
    use crate::extension::error::ExtensionError;
    use crate::marshal::{
        ConversionResult, FieldReader, FieldSpec, FieldWriter, PropertyMap, PropertyValue,
        Record, ScalarKind,
    };

    struct Greeting {
        who: String,
    }

    impl Record for Greeting {
        const SCHEMA: &'static [FieldSpec] = &[FieldSpec::required("who", ScalarKind::Text)];

        fn write_fields(&self, writer: &mut FieldWriter) {
            writer.put("who", self.who.as_str());
        }

        fn read_fields(reader: &FieldReader<'_>) -> ConversionResult<Self> {
            Ok(Self {
                who: reader.get("who")?,
            })
        }
    }

    struct Hello {
        name: &'static str,
    }

    impl Extension for Hello {
        type Context = Greeting;
        type Result = Greeting;

        fn name(&self) -> &str {
            self.name
        }

        fn execute(&self, context: Greeting) -> Greeting {
            Greeting {
                who: format!("hello {}", context.who),
            }
        }
    }

    struct BaselineProvider;

    impl ExtensionProvider for BaselineProvider {
        fn register_extensions(&self, registry: &ExtensionRegistry) -> RegistryResult<()> {
            registry.register(Hello { name: "hello" })?;
            registry.register(Hello { name: "hello.again" })?;
            Ok(())
        }
    }

    fn context(who: &str) -> PropertyMap {
        let mut map = PropertyMap::new();
        map.insert("who".to_string(), PropertyValue::from(who));
        map
    }

    #[test]
    fn registers_and_invokes_by_name() {
        let registry = ExtensionRegistry::new();
        let descriptor = registry
            .register(Hello { name: "hello" })
            .expect("registration");
        assert_eq!(descriptor.name, "hello");
        assert_eq!(descriptor.context_type.fields.len(), 1);

        let handler = registry.lookup("hello").expect("handler");
        let result = handler.invoke(&context("console")).expect("invoke");
        assert_eq!(result["who"], PropertyValue::from("hello console"));
    }

    #[test]
    fn rejects_duplicate_name_and_keeps_first_binding() {
        let registry = ExtensionRegistry::new();
        registry
            .register(Hello { name: "hello" })
            .expect("first registration");
        let err = registry
            .register(Hello { name: "hello" })
            .expect_err("duplicate must fail");
        assert_eq!(err, RegistryError::DuplicateName("hello".to_string()));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn rejects_invalid_names() {
        let registry = ExtensionRegistry::new();
        for name in ["", "  ", " hello", "bad name", "trailing-"] {
            let err = registry
                .register(Hello { name })
                .expect_err("invalid name must fail");
            assert!(matches!(err, RegistryError::InvalidName(_)));
        }
        assert!(registry.is_empty());
    }

    #[test]
    fn unregister_frees_name_for_rebinding() {
        let registry = ExtensionRegistry::new();
        registry.register(Hello { name: "hello" }).expect("register");
        assert!(registry.unregister("hello").is_some());
        assert!(registry.unregister("hello").is_none());
        registry
            .register(Hello { name: "hello" })
            .expect("name is free again");
    }

    #[test]
    fn context_conversion_failure_is_reported_with_name() {
        let registry = ExtensionRegistry::new();
        registry.register(Hello { name: "hello" }).expect("register");
        let mut bad = PropertyMap::new();
        bad.insert("who".to_string(), PropertyValue::Int(1));

        let err = registry
            .lookup("hello")
            .expect("handler")
            .invoke(&bad)
            .expect_err("mismatch must fail");
        assert!(matches!(err, ExtensionError::ContextConversion { ref name, .. } if name == "hello"));
    }

    #[test]
    fn loads_extensions_from_providers() {
        let registry =
            ExtensionRegistry::from_providers(&[&BaselineProvider]).expect("provider loads");
        let names: Vec<String> = registry
            .descriptors()
            .into_iter()
            .map(|descriptor| descriptor.name)
            .collect();
        assert_eq!(names, vec!["hello".to_string(), "hello.again".to_string()]);
    }
}
