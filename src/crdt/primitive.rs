//! Immutable scalar values.

use chrono::DateTime;
use chrono::SecondsFormat;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value as JsonValue;

use super::size::string_size;
use crate::Error;
use crate::Result;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum Primitive {
    Null,
    Bool(bool),
    Int(i32),
    Long(i64),
    Double(f64),
    String(String),
    Bytes(Vec<u8>),
    /// Milliseconds since the Unix epoch.
    Date(i64),
}

/// Tag of a `Primitive`, written next to its raw bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PrimitiveKind {
    Null,
    Bool,
    Int,
    Long,
    Double,
    String,
    Bytes,
    Date,
}

impl Primitive {
    pub fn kind(&self) -> PrimitiveKind {
        return match self {
            Primitive::Null => PrimitiveKind::Null,
            Primitive::Bool(_) => PrimitiveKind::Bool,
            Primitive::Int(_) => PrimitiveKind::Int,
            Primitive::Long(_) => PrimitiveKind::Long,
            Primitive::Double(_) => PrimitiveKind::Double,
            Primitive::String(_) => PrimitiveKind::String,
            Primitive::Bytes(_) => PrimitiveKind::Bytes,
            Primitive::Date(_) => PrimitiveKind::Date,
        };
    }

    pub fn type_name(&self) -> &'static str {
        return match self {
            Primitive::Null => "null",
            Primitive::Bool(_) => "bool",
            Primitive::Int(_) => "int",
            Primitive::Long(_) => "long",
            Primitive::Double(_) => "double",
            Primitive::String(_) => "string",
            Primitive::Bytes(_) => "bytes",
            Primitive::Date(_) => "date",
        };
    }

    pub fn is_numeric(&self) -> bool {
        return matches!(self, Primitive::Int(_) | Primitive::Long(_) | Primitive::Double(_));
    }

    /// Bytes this value adds to the document.
    pub fn data_size(&self) -> usize {
        return match self {
            Primitive::Null => 8,
            Primitive::Bool(_) => 4,
            Primitive::Int(_) => 4,
            Primitive::Long(_) => 8,
            Primitive::Double(_) => 8,
            Primitive::String(value) => string_size(value),
            Primitive::Bytes(value) => value.len(),
            Primitive::Date(_) => 8,
        };
    }

    /// Little-endian encoding of the value, without its tag.
    pub fn to_bytes(&self) -> Vec<u8> {
        return match self {
            Primitive::Null => Vec::new(),
            Primitive::Bool(value) => vec![*value as u8],
            Primitive::Int(value) => value.to_le_bytes().to_vec(),
            Primitive::Long(value) => value.to_le_bytes().to_vec(),
            Primitive::Double(value) => value.to_le_bytes().to_vec(),
            Primitive::String(value) => value.as_bytes().to_vec(),
            Primitive::Bytes(value) => value.clone(),
            Primitive::Date(value) => value.to_le_bytes().to_vec(),
        };
    }

    pub fn from_bytes(kind: PrimitiveKind, bytes: &[u8]) -> Result<Primitive> {
        let invalid = || Error::InvalidSnapshot(format!("bad {kind:?} encoding of {} bytes", bytes.len()));
        return Ok(match kind {
            PrimitiveKind::Null => Primitive::Null,
            PrimitiveKind::Bool => match bytes {
                [value] => Primitive::Bool(*value != 0),
                _ => return Err(invalid()),
            },
            PrimitiveKind::Int => Primitive::Int(i32::from_le_bytes(bytes.try_into().map_err(|_| invalid())?)),
            PrimitiveKind::Long => Primitive::Long(i64::from_le_bytes(bytes.try_into().map_err(|_| invalid())?)),
            PrimitiveKind::Double => {
                Primitive::Double(f64::from_le_bytes(bytes.try_into().map_err(|_| invalid())?))
            }
            PrimitiveKind::String => {
                Primitive::String(String::from_utf8(bytes.to_vec()).map_err(|_| invalid())?)
            }
            PrimitiveKind::Bytes => Primitive::Bytes(bytes.to_vec()),
            PrimitiveKind::Date => Primitive::Date(i64::from_le_bytes(bytes.try_into().map_err(|_| invalid())?)),
        });
    }

    /// Dates render as RFC 3339, bytes as hex.
    pub fn to_json_value(&self) -> JsonValue {
        return match self {
            Primitive::Null => JsonValue::Null,
            Primitive::Bool(value) => JsonValue::from(*value),
            Primitive::Int(value) => JsonValue::from(*value),
            Primitive::Long(value) => JsonValue::from(*value),
            Primitive::Double(value) => JsonValue::from(*value),
            Primitive::String(value) => JsonValue::from(value.as_str()),
            Primitive::Bytes(value) => JsonValue::from(hex::encode(value)),
            Primitive::Date(millis) => match DateTime::<Utc>::from_timestamp_millis(*millis) {
                Some(date) => JsonValue::from(date.to_rfc3339_opts(SecondsFormat::Millis, true)),
                None => JsonValue::from(*millis),
            },
        };
    }

    /// Scalar JSON values map onto primitives. Integers pick the narrowest
    /// of `Int` and `Long`.
    pub fn from_json_value(value: &JsonValue) -> Option<Primitive> {
        return match value {
            JsonValue::Null => Some(Primitive::Null),
            JsonValue::Bool(value) => Some(Primitive::Bool(*value)),
            JsonValue::Number(number) => {
                if let Some(int) = number.as_i64() {
                    Some(match i32::try_from(int) {
                        Ok(narrow) => Primitive::Int(narrow),
                        Err(_) => Primitive::Long(int),
                    })
                } else {
                    number.as_f64().map(Primitive::Double)
                }
            }
            JsonValue::String(value) => Some(Primitive::String(value.clone())),
            JsonValue::Array(_) | JsonValue::Object(_) => None,
        };
    }
}

impl From<bool> for Primitive {
    fn from(value: bool) -> Self {
        return Primitive::Bool(value);
    }
}

impl From<i32> for Primitive {
    fn from(value: i32) -> Self {
        return Primitive::Int(value);
    }
}

impl From<i64> for Primitive {
    fn from(value: i64) -> Self {
        return Primitive::Long(value);
    }
}

impl From<f64> for Primitive {
    fn from(value: f64) -> Self {
        return Primitive::Double(value);
    }
}

impl From<&str> for Primitive {
    fn from(value: &str) -> Self {
        return Primitive::String(value.to_string());
    }
}

impl From<String> for Primitive {
    fn from(value: String) -> Self {
        return Primitive::String(value);
    }
}

impl From<Vec<u8>> for Primitive {
    fn from(value: Vec<u8>) -> Self {
        return Primitive::Bytes(value);
    }
}

impl From<DateTime<Utc>> for Primitive {
    fn from(value: DateTime<Utc>) -> Self {
        return Primitive::Date(value.timestamp_millis());
    }
}
