//! Record flattening and cell rendering
//!
//! Nested objects become dotted column names (`address.city`). Arrays are
//! kept whole and rendered as JSON text.

use serde_json::{Map, Value};

/// Flatten nested objects into dotted keys, preserving key order.
///
/// A later key that flattens to an existing column overwrites the value but
/// keeps the original column position.
pub fn flatten_record(record: &Map<String, Value>) -> Map<String, Value> {
    let mut flat = Map::new();
    for (key, value) in record {
        flatten_into(&mut flat, key.clone(), value);
    }
    flat
}

fn flatten_into(flat: &mut Map<String, Value>, prefix: String, value: &Value) {
    match value {
        Value::Object(inner) if !inner.is_empty() => {
            for (key, nested) in inner {
                flatten_into(flat, format!("{}.{}", prefix, key), nested);
            }
        }
        other => {
            flat.insert(prefix, other.clone());
        }
    }
}

/// Render one value as a CSV cell. Null is the empty cell.
pub fn render_cell(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(true) => "True".to_string(),
        Value::Bool(false) => "False".to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        Value::Array(_) | Value::Object(_) => value.to_string(),
    }
}
