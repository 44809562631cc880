// src/pipeline/normalize.rs

//! Raw item to record conversion.

use serde_json::Value;

use crate::models::{FieldSpec, Record};

/// True for values that count as "present": anything but null, `false`,
/// zero, and empty strings, arrays or objects.
pub fn is_truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0),
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(a)) => !a.is_empty(),
        Some(Value::Object(o)) => !o.is_empty(),
    }
}

/// Null, empty string and empty object do not count as a value.
pub fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Object(o) => o.is_empty(),
        _ => false,
    }
}

/// Follow `path` through nested objects.
///
/// Returns `default` when an intermediate value is not an object or the final
/// value is missing or blank.
pub fn extract_path(item: &Value, path: &[String], default: &Value) -> Value {
    let mut current = item;
    for key in path {
        let Value::Object(map) = current else {
            return default.clone();
        };
        match map.get(key) {
            Some(next) => current = next,
            None => return default.clone(),
        }
    }

    if is_blank(current) {
        default.clone()
    } else {
        current.clone()
    }
}

/// Build a record with one value per declared field, in declared order.
pub fn normalize(item: &Value, fields: &[FieldSpec]) -> Record {
    let mut record = Record::new();
    for field in fields {
        record.push(&field.name, extract_path(item, &field.path, &field.default));
    }
    record
}

/// Public, live, validated bug bounty program.
pub fn is_active_bounty(item: &Value) -> bool {
    is_truthy(item.get("public"))
        && !is_truthy(item.get("archived"))
        && !is_truthy(item.get("disabled"))
        && item.get("status").and_then(Value::as_str) == Some("V")
        && is_truthy(item.get("bounty"))
        && !is_truthy(item.get("vdp"))
}
