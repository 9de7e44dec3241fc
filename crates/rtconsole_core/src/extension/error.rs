//! Extension resolution and conversion errors.

use crate::marshal::ConversionError;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Wire code for an unknown extension name.
pub const CODE_NOT_FOUND: &str = "NOT_FOUND";
/// Wire code for a context map that does not fit the extension's context type.
pub const CODE_CONTEXT_CONVERSION_FAILED: &str = "CONTEXT_CONVERSION_FAILED";
/// Wire code for a result record that could not be marshalled.
pub const CODE_RESULT_CONVERSION_FAILED: &str = "RESULT_CONVERSION_FAILED";

/// Failure of one `execute_extension` call on the agent side.
///
/// All variants are recoverable by the caller: retry with corrected input or
/// pick a different extension.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "code")]
pub enum ExtensionError {
    #[serde(rename = "NOT_FOUND")]
    NotFound { name: String },
    #[serde(rename = "CONTEXT_CONVERSION_FAILED")]
    ContextConversion {
        name: String,
        cause: ConversionError,
    },
    #[serde(rename = "RESULT_CONVERSION_FAILED")]
    ResultConversion {
        name: String,
        cause: ConversionError,
    },
}

impl ExtensionError {
    /// Stable error code used on the wire.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => CODE_NOT_FOUND,
            Self::ContextConversion { .. } => CODE_CONTEXT_CONVERSION_FAILED,
            Self::ResultConversion { .. } => CODE_RESULT_CONVERSION_FAILED,
        }
    }

    /// Name of the extension the failing call addressed.
    pub fn extension_name(&self) -> &str {
        match self {
            Self::NotFound { name }
            | Self::ContextConversion { name, .. }
            | Self::ResultConversion { name, .. } => name,
        }
    }
}

impl Display for ExtensionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound { name } => write!(f, "extension not found: {name}"),
            Self::ContextConversion { name, cause } => {
                write!(f, "context conversion failed for extension `{name}`: {cause}")
            }
            Self::ResultConversion { name, cause } => {
                write!(f, "result conversion failed for extension `{name}`: {cause}")
            }
        }
    }
}

impl Error for ExtensionError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::NotFound { .. } => None,
            Self::ContextConversion { cause, .. } | Self::ResultConversion { cause, .. } => {
                Some(cause)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::ExtensionError;
    use crate::marshal::ConversionError;

    #[test]
    fn serializes_with_wire_code_tag() {
        let err = ExtensionError::ContextConversion {
            name: "echo".to_string(),
            cause: ConversionError::MissingField("count".to_string()),
        };
        let json = serde_json::to_value(&err).expect("error serializes");
        assert_eq!(json["code"], "CONTEXT_CONVERSION_FAILED");
        assert_eq!(json["name"], "echo");

        let back: ExtensionError = serde_json::from_value(json).expect("error deserializes");
        assert_eq!(back, err);
        assert_eq!(back.code(), "CONTEXT_CONVERSION_FAILED");
    }

    #[test]
    fn preserves_conversion_cause_as_source() {
        let err = ExtensionError::ResultConversion {
            name: "double".to_string(),
            cause: ConversionError::UnknownField("extra".to_string()),
        };
        let source = std::error::Error::source(&err).expect("source is kept");
        assert!(source.to_string().contains("extra"));
    }
}
