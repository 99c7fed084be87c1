//! Sentinel field values callers embed in write payloads.
//!
//! A [`FieldValue`] serializes into a reserved-key marker object; the write
//! path lifts those markers out of the stored fields and sends them as
//! `updateTransforms` on the same commit, so a payload like
//!
//! ```
//! # use firestore_compat::FieldValue;
//! let payload = serde_json::json!({
//!     "visits": FieldValue::increment(1),
//!     "lastSeen": FieldValue::server_timestamp(),
//! });
//! ```
//!
//! stores nothing for those two keys locally and lets the store compute them.

use serde::ser::{Error as SerError, SerializeMap};
use serde::{Serialize, Serializer};
use serde_json::Value as JsonValue;

use super::models::{ServerValue, TransformKind, Value, ValueType};
use super::FirestoreError;

/// Reserved key marking a transform inside a serialized write payload.
pub(crate) const TRANSFORM_SENTINEL: &str = "$__fieldTransform";

/// A server-computed field value (server-assigned timestamp or numeric
/// increment) usable anywhere a write payload is accepted.
#[derive(Clone, Debug)]
pub struct FieldValue {
    kind: Kind,
}

#[derive(Clone, Debug)]
enum Kind {
    ServerTimestamp,
    IncrementInt(i64),
    IncrementDouble(f64),
}

impl FieldValue {
    /// The time at which the store processes the write.
    pub fn server_timestamp() -> Self {
        FieldValue {
            kind: Kind::ServerTimestamp,
        }
    }

    /// Atomically adds `by` to the current numeric value of the field.
    pub fn increment(by: i64) -> Self {
        FieldValue {
            kind: Kind::IncrementInt(by),
        }
    }

    /// Floating-point variant of [`FieldValue::increment`]. The operand must
    /// be finite; NaN and infinities are rejected at write time.
    pub fn increment_float(by: f64) -> Self {
        FieldValue {
            kind: Kind::IncrementDouble(by),
        }
    }

    fn to_transform(&self) -> Result<TransformKind, FirestoreError> {
        Ok(match self.kind {
            Kind::ServerTimestamp => TransformKind::SetToServerValue(ServerValue::RequestTime),
            Kind::IncrementInt(n) => TransformKind::Increment(Value {
                value_type: ValueType::IntegerValue(n.to_string()),
            }),
            Kind::IncrementDouble(d) => {
                if !d.is_finite() {
                    return Err(FirestoreError::Validation(
                        "increment operand must be a finite number".to_string(),
                    ));
                }
                TransformKind::Increment(Value {
                    value_type: ValueType::DoubleValue(d),
                })
            }
        })
    }
}

impl Serialize for FieldValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let kind = self.to_transform().map_err(S::Error::custom)?;
        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry(TRANSFORM_SENTINEL, &kind)?;
        map.end()
    }
}

/// Recognizes a serialized sentinel. Returns `None` for ordinary values.
pub(crate) fn transform_kind(
    value: &JsonValue,
) -> Option<Result<TransformKind, FirestoreError>> {
    let object = value.as_object()?;
    let inner = object.get(TRANSFORM_SENTINEL)?;
    Some(serde_json::from_value(inner.clone()).map_err(FirestoreError::from))
}
