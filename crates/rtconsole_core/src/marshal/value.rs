//! Scalar property values and field schema declarations.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

/// Wire-neutral property mapping used for extension contexts and results.
///
/// Key order carries no meaning; `BTreeMap` only keeps iteration stable.
pub type PropertyMap = BTreeMap<String, PropertyValue>;

/// One scalar value inside a [`PropertyMap`].
///
/// Serialized untagged so a property map is a flat JSON object on the wire.
/// Variant order matters for deserialization: integers must be tried before
/// floats.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl PropertyValue {
    /// Returns the scalar kind carried by this value.
    pub fn kind(&self) -> ScalarKind {
        match self {
            Self::Bool(_) => ScalarKind::Bool,
            Self::Int(_) => ScalarKind::Int,
            Self::Float(_) => ScalarKind::Float,
            Self::Text(_) => ScalarKind::Text,
        }
    }
}

impl From<bool> for PropertyValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for PropertyValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for PropertyValue {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<u32> for PropertyValue {
    fn from(value: u32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<f64> for PropertyValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<String> for PropertyValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

/// Scalar kinds a record field may declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalarKind {
    Bool,
    Int,
    Float,
    Text,
}

impl ScalarKind {
    /// Stable lowercase name used in diagnostics and descriptors.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::Int => "int",
            Self::Float => "float",
            Self::Text => "text",
        }
    }

    /// Whether a value of `found` kind is accepted for a field of this kind.
    ///
    /// `int -> float` is the only implicit widening.
    pub fn accepts(self, found: ScalarKind) -> bool {
        self == found || (self == Self::Float && found == Self::Int)
    }
}

impl Display for ScalarKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Declaration of one record field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: ScalarKind,
    /// Required fields must be present in both directions.
    pub required: bool,
}

impl FieldSpec {
    pub const fn required(name: &'static str, kind: ScalarKind) -> Self {
        Self {
            name,
            kind,
            required: true,
        }
    }

    pub const fn optional(name: &'static str, kind: ScalarKind) -> Self {
        Self {
            name,
            kind,
            required: false,
        }
    }
}
