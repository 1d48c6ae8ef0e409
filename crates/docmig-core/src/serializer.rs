//! Conversion between native values and portable JSON values.
//!
//! Timestamps do not survive plain JSON, so they are encoded as a tagged
//! object:
//!
//! ```json
//! { "_type": "timestamp", "_value": "2025-01-15T10:30:00Z" }
//! ```
//!
//! Every other scalar passes through unchanged and lists/objects recurse.
//! `deserialize(&serialize(v)) == v` holds for every value except non-finite
//! floats (`NaN`, `±inf`), which have no JSON form and serialize as `null`.

use std::collections::BTreeMap;

use serde_json::{Map, Number, Value as JsonValue};

use crate::error::SerializeError;
use crate::value::{Fields, Timestamp, Value};

/// Tag key marking an encoded provider type.
pub const TYPE_KEY: &str = "_type";

/// Key holding the encoded payload.
pub const VALUE_KEY: &str = "_value";

/// Tag value for timestamps.
pub const TIMESTAMP_TAG: &str = "timestamp";

/// Serialize a native value to its portable form.
///
/// A non-finite [`Value::Float`] becomes `null` and reads back as
/// [`Value::Null`].
pub fn serialize(value: &Value) -> JsonValue {
    match value {
        Value::Null => JsonValue::Null,
        Value::Bool(b) => JsonValue::Bool(*b),
        Value::Integer(i) => JsonValue::Number((*i).into()),
        // Non-finite floats have no JSON form.
        Value::Float(f) => Number::from_f64(*f)
            .map(JsonValue::Number)
            .unwrap_or(JsonValue::Null),
        Value::String(s) => JsonValue::String(s.clone()),
        Value::Timestamp(ts) => {
            let mut tagged = Map::new();
            tagged.insert(TYPE_KEY.to_string(), JsonValue::from(TIMESTAMP_TAG));
            tagged.insert(VALUE_KEY.to_string(), JsonValue::from(ts.to_iso_string()));
            JsonValue::Object(tagged)
        }
        Value::List(items) => JsonValue::Array(items.iter().map(serialize).collect()),
        Value::Object(fields) => JsonValue::Object(serialize_fields(fields)),
    }
}

/// Serialize a whole document body.
pub fn serialize_fields(fields: &Fields) -> Map<String, JsonValue> {
    fields
        .iter()
        .map(|(k, v)| (k.clone(), serialize(v)))
        .collect()
}

/// Deserialize a portable value back to its native form.
pub fn deserialize(value: &JsonValue) -> Result<Value, SerializeError> {
    match value {
        JsonValue::Null => Ok(Value::Null),
        JsonValue::Bool(b) => Ok(Value::Bool(*b)),
        JsonValue::Number(n) => Ok(match n.as_i64() {
            Some(i) => Value::Integer(i),
            None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
        }),
        JsonValue::String(s) => Ok(Value::String(s.clone())),
        JsonValue::Array(items) => items
            .iter()
            .map(deserialize)
            .collect::<Result<Vec<_>, _>>()
            .map(Value::List),
        JsonValue::Object(map) => {
            if map.get(TYPE_KEY).and_then(JsonValue::as_str) == Some(TIMESTAMP_TAG) {
                return deserialize_timestamp(map).map(Value::Timestamp);
            }
            deserialize_map(map).map(Value::Object)
        }
    }
}

/// Deserialize a whole document body. The input must be a JSON object.
pub fn deserialize_fields(value: &JsonValue) -> Result<Fields, SerializeError> {
    match value {
        JsonValue::Object(map) => deserialize_map(map),
        other => Err(SerializeError::NotAnObject(json_kind(other))),
    }
}

fn deserialize_map(map: &Map<String, JsonValue>) -> Result<Fields, SerializeError> {
    map.iter()
        .map(|(k, v)| Ok((k.clone(), deserialize(v)?)))
        .collect()
}

fn deserialize_timestamp(map: &Map<String, JsonValue>) -> Result<Timestamp, SerializeError> {
    let raw = map
        .get(VALUE_KEY)
        .and_then(JsonValue::as_str)
        .ok_or_else(|| SerializeError::InvalidTimestamp("missing _value".to_string()))?;
    Timestamp::parse(raw).ok_or_else(|| SerializeError::InvalidTimestamp(raw.to_string()))
}

/// Flatten a portable value into a single-level map for tabular output.
///
/// Nested object keys are joined with `.`. Lists are not descended into;
/// they become one JSON-text cell. There is no inverse.
pub fn flatten(value: &JsonValue, prefix: &str) -> BTreeMap<String, JsonValue> {
    let mut out = BTreeMap::new();
    flatten_into(value, prefix, &mut out);
    out
}

fn flatten_into(value: &JsonValue, prefix: &str, out: &mut BTreeMap<String, JsonValue>) {
    match value {
        JsonValue::Object(map) => {
            for (key, child) in map {
                let path = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{}.{}", prefix, key)
                };
                match child {
                    JsonValue::Object(_) => flatten_into(child, &path, out),
                    JsonValue::Array(_) => {
                        out.insert(path, JsonValue::String(child.to_string()));
                    }
                    scalar => {
                        out.insert(path, scalar.clone());
                    }
                }
            }
        }
        JsonValue::Array(_) => {
            out.insert(prefix.to_string(), JsonValue::String(value.to_string()));
        }
        scalar => {
            out.insert(prefix.to_string(), scalar.clone());
        }
    }
}

fn json_kind(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "boolean",
        JsonValue::Number(_) => "number",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "array",
        JsonValue::Object(_) => "object",
    }
}
