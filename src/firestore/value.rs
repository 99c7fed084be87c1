//! Conversion between `serde_json` trees and the Firestore `Value` envelope.
//!
//! The write direction also splits [`FieldValue`](super::field_value::FieldValue)
//! sentinels out of the payload into field transforms.

use serde::de::Error as DeError;
use serde::Serialize;
use serde_json::map::Map;
use serde_json::Value as JsonValue;
use std::collections::HashMap;

use super::field_value::{transform_kind, TRANSFORM_SENTINEL};
use super::models::{ArrayValue, FieldTransform, MapValue, Value, ValueType};
use super::FirestoreError;

pub(crate) fn decode_fields(
    fields: HashMap<String, Value>,
) -> Result<JsonValue, FirestoreError> {
    let mut map = Map::new();
    for (key, value) in fields {
        map.insert(key, decode_value(value)?);
    }
    Ok(JsonValue::Object(map))
}

pub(crate) fn decode_value(value: Value) -> Result<JsonValue, FirestoreError> {
    use serde_json::json;
    Ok(match value.value_type {
        ValueType::StringValue(s) => JsonValue::String(s),
        ValueType::IntegerValue(s) => {
            let i: i64 = s.parse().map_err(|e| {
                <serde_json::Error as DeError>::custom(format!(
                    "failed to parse integer string '{}': {}",
                    s, e
                ))
            })?;
            JsonValue::Number(i.into())
        }
        ValueType::DoubleValue(d) => JsonValue::Number(
            serde_json::Number::from_f64(d).ok_or_else(|| {
                <serde_json::Error as DeError>::custom(format!("invalid f64 value: {}", d))
            })?,
        ),
        ValueType::BooleanValue(b) => JsonValue::Bool(b),
        ValueType::MapValue(map_value) => decode_fields(map_value.fields)?,
        ValueType::ArrayValue(array_value) => {
            let values = array_value
                .values
                .into_iter()
                .map(decode_value)
                .collect::<Result<Vec<_>, _>>()?;
            JsonValue::Array(values)
        }
        ValueType::NullValue(_) => JsonValue::Null,
        ValueType::TimestampValue(s) => JsonValue::String(s),
        ValueType::GeoPointValue(gp) => {
            json!({ "latitude": gp.latitude, "longitude": gp.longitude })
        }
        ValueType::BytesValue(s) => JsonValue::String(s),
        ValueType::ReferenceValue(s) => JsonValue::String(s),
    })
}

pub(crate) fn encode_value(value: JsonValue) -> Result<Value, FirestoreError> {
    let value_type = match value {
        JsonValue::Null => ValueType::NullValue(()),
        JsonValue::Bool(b) => ValueType::BooleanValue(b),
        JsonValue::Number(n) => {
            if let Some(i) = n.as_i64() {
                ValueType::IntegerValue(i.to_string())
            } else if let Some(f) = n.as_f64() {
                ValueType::DoubleValue(f)
            } else {
                return Err(FirestoreError::Validation(format!(
                    "unsupported number value: {}",
                    n
                )));
            }
        }
        JsonValue::String(s) => ValueType::StringValue(s),
        JsonValue::Array(a) => {
            let values = a
                .into_iter()
                .map(encode_value)
                .collect::<Result<Vec<_>, _>>()?;
            ValueType::ArrayValue(ArrayValue { values })
        }
        JsonValue::Object(o) => {
            if o.contains_key(TRANSFORM_SENTINEL) {
                return Err(FirestoreError::Validation(
                    "field transforms are only supported at the top level of a write payload"
                        .to_string(),
                ));
            }
            let mut fields = HashMap::new();
            for (k, v) in o {
                fields.insert(k, encode_value(v)?);
            }
            ValueType::MapValue(MapValue { fields })
        }
    };
    Ok(Value { value_type })
}

/// Serializes a write payload and splits it into stored fields and field
/// transforms. `FieldValue` sentinels are honored at the top level only.
pub(crate) fn encode_write_payload<T: Serialize>(
    value: &T,
) -> Result<(HashMap<String, Value>, Vec<FieldTransform>), FirestoreError> {
    let json = serde_json::to_value(value)?;
    let JsonValue::Object(map) = json else {
        return Err(FirestoreError::Validation(
            "write payloads must serialize to a JSON object".to_string(),
        ));
    };

    let mut fields = HashMap::new();
    let mut transforms = Vec::new();
    for (key, value) in map {
        match transform_kind(&value) {
            Some(kind) => transforms.push(FieldTransform {
                field_path: key,
                kind: kind?,
            }),
            None => {
                fields.insert(key, encode_value(value)?);
            }
        }
    }
    Ok((fields, transforms))
}
