//! Aggregates over property values
//!
//! Shared by result sets and to-many lists. Nil values never take part.

use crate::error::Result;
use trove_core::{PropertyDef, PropertyType, RecordType, Value};

fn mismatch(prop: &PropertyDef, expected: &str) -> crate::Error {
    trove_core::Error::TypeMismatch {
        property: prop.name.clone(),
        expected: expected.to_string(),
        got: prop.property_type.to_string(),
    }
    .into()
}

/// Look up a property that `min`/`max` can run over
pub(crate) fn comparable<'a>(record_type: &'a RecordType, property: &str) -> Result<&'a PropertyDef> {
    let prop = record_type.require_property(property)?;
    match prop.property_type {
        PropertyType::Int | PropertyType::Float | PropertyType::Date => Ok(prop),
        _ => Err(mismatch(prop, "int, float or date")),
    }
}

/// Look up a property that `sum`/`average` can run over
pub(crate) fn numeric<'a>(record_type: &'a RecordType, property: &str) -> Result<&'a PropertyDef> {
    let prop = record_type.require_property(property)?;
    match prop.property_type {
        PropertyType::Int | PropertyType::Float => Ok(prop),
        _ => Err(mismatch(prop, "int or float")),
    }
}

/// Smallest non-nil value
pub fn min<'a>(values: impl IntoIterator<Item = &'a Value>) -> Option<Value> {
    values
        .into_iter()
        .filter(|v| !v.is_null())
        .min_by(|a, b| a.total_cmp(b))
        .cloned()
}

/// Largest non-nil value
pub fn max<'a>(values: impl IntoIterator<Item = &'a Value>) -> Option<Value> {
    values
        .into_iter()
        .filter(|v| !v.is_null())
        .max_by(|a, b| a.total_cmp(b))
        .cloned()
}

/// Sum of numeric values
///
/// Ints sum to an int unless a float is present or the int sum would
/// overflow `i64`, in which case the result is a float.
pub fn sum<'a>(values: impl IntoIterator<Item = &'a Value>) -> Value {
    let mut int_sum: i64 = 0;
    let mut float_sum = 0.0;
    let mut as_float = false;
    for value in values {
        match value {
            Value::Int(i) => match int_sum.checked_add(*i) {
                Some(total) => int_sum = total,
                None => {
                    float_sum += int_sum as f64 + *i as f64;
                    int_sum = 0;
                    as_float = true;
                }
            },
            Value::Float(f) => {
                float_sum += f;
                as_float = true;
            }
            _ => {}
        }
    }
    if as_float {
        Value::Float(float_sum + int_sum as f64)
    } else {
        Value::Int(int_sum)
    }
}

/// Mean of numeric values, `None` when there are none
pub fn average<'a>(values: impl IntoIterator<Item = &'a Value>) -> Option<f64> {
    let (total, count) = values
        .into_iter()
        .filter_map(Value::as_float)
        .fold((0.0, 0usize), |(t, n), v| (t + v, n + 1));
    (count > 0).then(|| total / count as f64)
}
