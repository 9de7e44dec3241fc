//! Schema-driven conversion between typed records and property maps.
//!
//! # Invariants
//! - Both directions validate against `Record::SCHEMA`; undeclared keys are
//!   a conversion failure, never silently dropped.
//! - A record is only constructed after the whole map passed validation.

use crate::marshal::value::{FieldSpec, PropertyMap, PropertyValue, ScalarKind};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type ConversionResult<T> = Result<T, ConversionError>;

/// Record-to-map (or map-to-record) conversion failure.
///
/// Serializable so a remote agent can report the exact cause.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversionError {
    /// Key present in the map but not declared by the target schema.
    UnknownField(String),
    /// Required field absent.
    MissingField(String),
    TypeMismatch {
        field: String,
        expected: ScalarKind,
        found: ScalarKind,
    },
    /// Integer does not fit the record's numeric field type.
    OutOfRange { field: String, value: i64 },
    /// NaN or an infinity; JSON has no encoding for either.
    NonFinite { field: String },
}

impl Display for ConversionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownField(name) => write!(f, "field is not declared by record: {name}"),
            Self::MissingField(name) => write!(f, "required field is missing: {name}"),
            Self::TypeMismatch {
                field,
                expected,
                found,
            } => write!(
                f,
                "field `{field}` has kind {found}, expected {expected}"
            ),
            Self::OutOfRange { field, value } => {
                write!(f, "field `{field}` value {value} is out of range")
            }
            Self::NonFinite { field } => write!(f, "field `{field}` is not a finite number"),
        }
    }
}

impl Error for ConversionError {}

/// Typed record with an explicit field schema.
///
/// Implementors declare their fields once in `SCHEMA`; the generic
/// [`to_properties`] / [`from_properties`] routines enforce it.
pub trait Record: Sized {
    const SCHEMA: &'static [FieldSpec];

    /// Writes every field value into `writer`.
    fn write_fields(&self, writer: &mut FieldWriter);

    /// Builds the record from a map that already passed schema validation.
    fn read_fields(reader: &FieldReader<'_>) -> ConversionResult<Self>;
}

/// Collects field values while a record is marshalled.
#[derive(Debug, Default)]
pub struct FieldWriter {
    properties: PropertyMap,
}

impl FieldWriter {
    pub fn put(&mut self, name: &str, value: impl Into<PropertyValue>) {
        self.properties.insert(name.to_string(), value.into());
    }

    /// Writes `value` when present; absent optionals are omitted from the map.
    pub fn put_opt<V: Into<PropertyValue>>(&mut self, name: &str, value: Option<V>) {
        if let Some(value) = value {
            self.put(name, value);
        }
    }
}

/// Read access to a validated property map.
#[derive(Debug)]
pub struct FieldReader<'a> {
    properties: &'a PropertyMap,
}

impl FieldReader<'_> {
    /// Reads a required field.
    pub fn get<T: FromProperty>(&self, name: &str) -> ConversionResult<T> {
        match self.properties.get(name) {
            Some(value) => T::from_property(name, value),
            None => Err(ConversionError::MissingField(name.to_string())),
        }
    }

    /// Reads an optional field; `None` when the key is absent.
    pub fn get_opt<T: FromProperty>(&self, name: &str) -> ConversionResult<Option<T>> {
        self.properties
            .get(name)
            .map(|value| T::from_property(name, value))
            .transpose()
    }

    /// Reads an optional field, falling back to `default` when absent.
    pub fn get_or<T: FromProperty>(&self, name: &str, default: T) -> ConversionResult<T> {
        Ok(self.get_opt(name)?.unwrap_or(default))
    }
}

/// Rust field types that can be read from one [`PropertyValue`].
pub trait FromProperty: Sized {
    fn from_property(field: &str, value: &PropertyValue) -> ConversionResult<Self>;
}

fn mismatch(field: &str, expected: ScalarKind, value: &PropertyValue) -> ConversionError {
    ConversionError::TypeMismatch {
        field: field.to_string(),
        expected,
        found: value.kind(),
    }
}

impl FromProperty for bool {
    fn from_property(field: &str, value: &PropertyValue) -> ConversionResult<Self> {
        match value {
            PropertyValue::Bool(flag) => Ok(*flag),
            other => Err(mismatch(field, ScalarKind::Bool, other)),
        }
    }
}

impl FromProperty for i64 {
    fn from_property(field: &str, value: &PropertyValue) -> ConversionResult<Self> {
        match value {
            PropertyValue::Int(number) => Ok(*number),
            other => Err(mismatch(field, ScalarKind::Int, other)),
        }
    }
}

impl FromProperty for i32 {
    fn from_property(field: &str, value: &PropertyValue) -> ConversionResult<Self> {
        let wide = i64::from_property(field, value)?;
        i32::try_from(wide).map_err(|_| ConversionError::OutOfRange {
            field: field.to_string(),
            value: wide,
        })
    }
}

impl FromProperty for u32 {
    fn from_property(field: &str, value: &PropertyValue) -> ConversionResult<Self> {
        let wide = i64::from_property(field, value)?;
        u32::try_from(wide).map_err(|_| ConversionError::OutOfRange {
            field: field.to_string(),
            value: wide,
        })
    }
}

impl FromProperty for f64 {
    fn from_property(field: &str, value: &PropertyValue) -> ConversionResult<Self> {
        match value {
            PropertyValue::Float(number) => Ok(*number),
            PropertyValue::Int(number) => Ok(*number as f64),
            other => Err(mismatch(field, ScalarKind::Float, other)),
        }
    }
}

impl FromProperty for String {
    fn from_property(field: &str, value: &PropertyValue) -> ConversionResult<Self> {
        match value {
            PropertyValue::Text(text) => Ok(text.clone()),
            other => Err(mismatch(field, ScalarKind::Text, other)),
        }
    }
}

/// Marshals `record` into a property map.
///
/// # Errors
/// - `UnknownField` when the record writes a key its schema does not declare.
/// - `MissingField` when a required field was not written.
/// - `TypeMismatch` when a written value disagrees with the declared kind.
/// - `NonFinite` for a NaN or infinite float.
pub fn to_properties<R: Record>(record: &R) -> ConversionResult<PropertyMap> {
    let mut writer = FieldWriter::default();
    record.write_fields(&mut writer);
    validate(R::SCHEMA, &writer.properties)?;
    Ok(writer.properties)
}

/// Reconstructs a record of type `R` from `properties`.
///
/// # Errors
/// - `UnknownField` for keys not declared by `R::SCHEMA`.
/// - `MissingField` for absent required fields.
/// - `TypeMismatch` / `OutOfRange` for values that cannot populate a field.
pub fn from_properties<R: Record>(properties: &PropertyMap) -> ConversionResult<R> {
    validate(R::SCHEMA, properties)?;
    R::read_fields(&FieldReader { properties })
}

/// Checks `properties` against `schema` without building a record.
pub fn validate(schema: &[FieldSpec], properties: &PropertyMap) -> ConversionResult<()> {
    for key in properties.keys() {
        if !schema.iter().any(|spec| spec.name == key.as_str()) {
            return Err(ConversionError::UnknownField(key.clone()));
        }
    }

    for spec in schema {
        match properties.get(spec.name) {
            Some(value) if !spec.kind.accepts(value.kind()) => {
                return Err(ConversionError::TypeMismatch {
                    field: spec.name.to_string(),
                    expected: spec.kind,
                    found: value.kind(),
                });
            }
            Some(PropertyValue::Float(value)) if !value.is_finite() => {
                return Err(ConversionError::NonFinite {
                    field: spec.name.to_string(),
                });
            }
            Some(_) => {}
            None if spec.required => {
                return Err(ConversionError::MissingField(spec.name.to_string()));
            }
            None => {}
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{
        from_properties, to_properties, ConversionError, ConversionResult, FieldReader,
        FieldWriter, Record,
    };
    use crate::marshal::value::{FieldSpec, PropertyMap, PropertyValue, ScalarKind};

    #[derive(Debug, Clone, PartialEq)]
    struct BundleQuery {
        symbolic_name: String,
        start_level: i32,
        weight: f64,
        active_only: bool,
        limit: Option<u32>,
    }

    impl Record for BundleQuery {
        const SCHEMA: &'static [FieldSpec] = &[
            FieldSpec::required("symbolic_name", ScalarKind::Text),
            FieldSpec::required("start_level", ScalarKind::Int),
            FieldSpec::required("weight", ScalarKind::Float),
            FieldSpec::optional("active_only", ScalarKind::Bool),
            FieldSpec::optional("limit", ScalarKind::Int),
        ];

        fn write_fields(&self, writer: &mut FieldWriter) {
            writer.put("symbolic_name", self.symbolic_name.as_str());
            writer.put("start_level", self.start_level);
            writer.put("weight", self.weight);
            writer.put("active_only", self.active_only);
            writer.put_opt("limit", self.limit);
        }

        fn read_fields(reader: &FieldReader<'_>) -> ConversionResult<Self> {
            Ok(Self {
                symbolic_name: reader.get("symbolic_name")?,
                start_level: reader.get("start_level")?,
                weight: reader.get("weight")?,
                active_only: reader.get_or("active_only", false)?,
                limit: reader.get_opt("limit")?,
            })
        }
    }

    fn sample() -> BundleQuery {
        BundleQuery {
            symbolic_name: "org.example.core".to_string(),
            start_level: 20,
            weight: 0.75,
            active_only: true,
            limit: Some(50),
        }
    }

    #[test]
    fn round_trips_all_declared_fields() {
        let query = sample();
        let map = to_properties(&query).expect("marshal");
        assert_eq!(map.len(), 5);
        let back: BundleQuery = from_properties(&map).expect("unmarshal");
        assert_eq!(back, query);
    }

    #[test]
    fn absent_optionals_round_trip_as_none() {
        let mut query = sample();
        query.limit = None;
        let map = to_properties(&query).expect("marshal");
        assert!(!map.contains_key("limit"));
        let back: BundleQuery = from_properties(&map).expect("unmarshal");
        assert_eq!(back.limit, None);
    }

    #[test]
    fn defaulted_field_uses_default_when_absent() {
        let mut map = to_properties(&sample()).expect("marshal");
        map.remove("active_only");
        let back: BundleQuery = from_properties(&map).expect("unmarshal");
        assert!(!back.active_only);
    }

    #[test]
    fn rejects_missing_required_field() {
        let mut map = to_properties(&sample()).expect("marshal");
        map.remove("start_level");
        let err = from_properties::<BundleQuery>(&map).expect_err("missing field must fail");
        assert_eq!(err, ConversionError::MissingField("start_level".to_string()));
    }

    #[test]
    fn rejects_unknown_field() {
        let mut map = to_properties(&sample()).expect("marshal");
        map.insert("location".to_string(), PropertyValue::from("file:/tmp"));
        let err = from_properties::<BundleQuery>(&map).expect_err("extra key must fail");
        assert_eq!(err, ConversionError::UnknownField("location".to_string()));
    }

    #[test]
    fn rejects_kind_mismatch() {
        let mut map = to_properties(&sample()).expect("marshal");
        map.insert("start_level".to_string(), PropertyValue::from("twenty"));
        let err = from_properties::<BundleQuery>(&map).expect_err("mismatch must fail");
        assert_eq!(
            err,
            ConversionError::TypeMismatch {
                field: "start_level".to_string(),
                expected: ScalarKind::Int,
                found: ScalarKind::Text,
            }
        );
    }

    #[test]
    fn widens_int_into_float_field() {
        let mut map = to_properties(&sample()).expect("marshal");
        map.insert("weight".to_string(), PropertyValue::Int(2));
        let back: BundleQuery = from_properties(&map).expect("int widens to float");
        assert_eq!(back.weight, 2.0);
    }

    #[test]
    fn rejects_integer_out_of_field_range() {
        let mut map = to_properties(&sample()).expect("marshal");
        map.insert("limit".to_string(), PropertyValue::Int(-1));
        let err = from_properties::<BundleQuery>(&map).expect_err("negative u32 must fail");
        assert!(matches!(err, ConversionError::OutOfRange { .. }));
    }

    #[test]
    fn empty_map_fails_on_first_required_field() {
        let err = from_properties::<BundleQuery>(&PropertyMap::new()).expect_err("empty map");
        assert_eq!(err, ConversionError::MissingField("symbolic_name".to_string()));
    }

    #[test]
    fn rejects_non_finite_float_in_both_directions() {
        for weight in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            let mut query = sample();
            query.weight = weight;
            let err = to_properties(&query).expect_err("non-finite weight must fail");
            assert_eq!(
                err,
                ConversionError::NonFinite {
                    field: "weight".to_string()
                }
            );
        }

        let mut map = to_properties(&sample()).expect("marshal");
        map.insert("weight".to_string(), PropertyValue::Float(f64::NAN));
        assert!(matches!(
            from_properties::<BundleQuery>(&map),
            Err(ConversionError::NonFinite { .. })
        ));
    }
}
