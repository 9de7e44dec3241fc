//! Marshalling between typed records and wire-neutral property maps.
//!
//! # Responsibility
//! - Define the scalar property representation shared by agent and console.
//! - Convert records in both directions using an explicit per-type schema.
//!
//! # Invariants
//! - Conversion is pure; no shared state, callable from any thread.
//! - `from_properties(to_properties(x)) == x` for every declared field.

mod convert;
mod value;

pub use convert::{
    from_properties, to_properties, validate, ConversionError, ConversionResult, FieldReader,
    FieldWriter, FromProperty, Record,
};
pub use value::{FieldSpec, PropertyMap, PropertyValue, ScalarKind};
