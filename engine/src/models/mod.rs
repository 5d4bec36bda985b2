//! Domain models for the Tabmap engine.
//!
//! - [`Record`] - one row: an insertion-ordered field → value map
//! - [`Collection`] - an ordered list of records (or plain values)
//!
//! Values are `serde_json::Value`s. The `preserve_order` feature keeps field
//! insertion order, which becomes column order when a collection is saved.

use serde_json::{Map, Value};

/// One row of data. Field order is significant.
pub type Record = Map<String, Value>;

/// An ordered sequence of records.
///
/// Side-channel arrays built by `copyToArray` hold plain values instead of
/// records, so elements are kept as generic values.
pub type Collection = Vec<Value>;

// =============================================================================
// Field access
// =============================================================================

/// Read a field from a record-like value. Non-objects have no fields.
pub fn field<'a>(record: &'a Value, name: &str) -> Option<&'a Value> {
    record.as_object().and_then(|obj| obj.get(name))
}

// =============================================================================
// Equality and truthiness
// =============================================================================

/// Strict equality between two values.
///
/// Numbers compare numerically, so an integer read from one sheet equals the
/// same number stored as a float in another.
pub fn strict_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_i64(), y.as_i64()) {
            (Some(i), Some(j)) => i == j,
            _ => x.as_f64() == y.as_f64(),
        },
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(a, b)| strict_eq(a, b))
        }
        _ => a == b,
    }
}

/// Strict equality where either side may be an absent field.
///
/// Two absent fields are equal; an absent field never equals a present one.
pub fn field_eq(a: Option<&Value>, b: Option<&Value>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(x), Some(y)) => strict_eq(x, y),
        _ => false,
    }
}

/// Whether `value` is strictly equal to any element of `list`.
pub fn contains(list: &[Value], value: Option<&Value>) -> bool {
    match value {
        Some(v) => list.iter().any(|item| strict_eq(item, v)),
        None => false,
    }
}

/// Truthiness as config authors expect it: `null`, `false`, `0` and `""` are
/// falsy, everything else (including empty arrays) is truthy.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

// =============================================================================
// Display helpers
// =============================================================================

/// Render a value as cell text: strings unquoted, numbers without a trailing
/// `.0`, null as empty, containers as JSON.
pub fn display_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Array(_) | Value::Object(_) => value.to_string(),
    }
}

/// Build a JSON number from a float, collapsing integral values to integers.
pub fn number_value(f: f64) -> Value {
    if f.fract() == 0.0 && f.is_finite() && f.abs() < 9.007_199_254_740_992e15 {
        Value::from(f as i64)
    } else {
        serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null)
    }
}
