//! Normalization of loosely typed document attributes.
//!
//! Course documents are written by several authoring tools, so flags and
//! counters show up as booleans, numbers or strings. Everything is coerced
//! once here, at the read boundary.

use serde_json::Value;

/// Activation flag: `true`, `"true"`, `1` and `"1"` are truthy, anything else is not.
pub fn to_boolean(raw: Option<&Value>) -> bool {
    match raw {
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64() == Some(1.0),
        Some(Value::String(s)) => s == "true" || s == "1",
        _ => false,
    }
}

/// Integer coercion for counters such as `cupos` and `inscritos`.
///
/// Numbers truncate toward zero, numeric strings are parsed after trimming,
/// booleans count as 1/0. Missing, null, non-finite or non-numeric values
/// yield `default`.
pub fn to_int(raw: Option<&Value>, default: i64) -> i64 {
    match raw {
        Some(Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().and_then(truncate))
            .unwrap_or(default),
        Some(Value::String(s)) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().and_then(truncate))
                .unwrap_or(default)
        }
        Some(Value::Bool(b)) => i64::from(*b),
        _ => default,
    }
}

fn truncate(f: f64) -> Option<i64> {
    if f.is_finite() {
        Some(f.trunc() as i64)
    } else {
        None
    }
}
