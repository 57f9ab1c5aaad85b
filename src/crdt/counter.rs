//! Numeric counters merged by addition.

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value as JsonValue;

use super::primitive::Primitive;
use crate::Error;
use crate::Result;

/// Integer counters wrap on overflow so that increments stay commutative.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum CounterValue {
    Int(i32),
    Long(i64),
    Double(f64),
}

impl CounterValue {
    /// A counter starting from a numeric primitive.
    pub fn from_primitive(value: &Primitive) -> Result<CounterValue> {
        return match value {
            Primitive::Int(v) => Ok(CounterValue::Int(*v)),
            Primitive::Long(v) => Ok(CounterValue::Long(*v)),
            Primitive::Double(v) => Ok(CounterValue::Double(*v)),
            other => Err(Error::TypeMismatch {
                expected: "number",
                actual: other.type_name(),
            }),
        };
    }

    pub fn increase(&mut self, delta: &Primitive) -> Result<()> {
        let (int, float) = match delta {
            Primitive::Int(v) => (*v as i64, *v as f64),
            Primitive::Long(v) => (*v, *v as f64),
            Primitive::Double(v) => (*v as i64, *v),
            other => {
                return Err(Error::TypeMismatch {
                    expected: "number",
                    actual: other.type_name(),
                });
            }
        };
        match self {
            CounterValue::Int(value) => *value = value.wrapping_add(int as i32),
            CounterValue::Long(value) => *value = value.wrapping_add(int),
            CounterValue::Double(value) => *value += float,
        }
        return Ok(());
    }

    /// The delta that undoes `increase(delta)`.
    pub fn negate(delta: &Primitive) -> Primitive {
        return match delta {
            Primitive::Int(v) => Primitive::Int(v.wrapping_neg()),
            Primitive::Long(v) => Primitive::Long(v.wrapping_neg()),
            Primitive::Double(v) => Primitive::Double(-v),
            other => other.clone(),
        };
    }

    pub fn to_primitive(&self) -> Primitive {
        return match self {
            CounterValue::Int(v) => Primitive::Int(*v),
            CounterValue::Long(v) => Primitive::Long(*v),
            CounterValue::Double(v) => Primitive::Double(*v),
        };
    }

    pub fn data_size(&self) -> usize {
        return match self {
            CounterValue::Int(_) => 4,
            CounterValue::Long(_) | CounterValue::Double(_) => 8,
        };
    }

    pub fn to_json_value(&self) -> JsonValue {
        return self.to_primitive().to_json_value();
    }
}
