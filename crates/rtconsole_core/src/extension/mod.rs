//! Named, strongly-typed extensions invoked through property maps.
//!
//! `registry` binds names to typed handlers on the agent side; `client` is
//! the console-side typed facade over any [`crate::agent::Agent`].

pub mod client;
pub mod error;
pub mod registry;

pub use client::{execute_extension, InvocationError, InvocationFailure};
pub use error::ExtensionError;
pub use registry::{
    Extension, ExtensionDescriptor, ExtensionHandler, ExtensionProvider, ExtensionRegistry,
    RecordType, RegistryError, RegistryResult,
};
