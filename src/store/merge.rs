use serde_json::{Map, Value};

use crate::{Result, StoreError};

/// How a patch is folded into the current value.
///
/// Implementations return the next value, or `None` when the patch changes
/// nothing, which is what decides whether listeners are notified. Reporting a
/// change that did not happen only costs a spurious notification; missing a
/// real one loses an update.
pub trait Merge<V> {
    /// What callers hand to [`Store::update`](super::Store::update).
    type Patch;

    /// Compute the value that results from applying `patch` to `current`.
    ///
    /// # Errors
    /// Returns `StoreError::InvalidArgument` if the patch has the wrong shape.
    fn merge(&self, current: &V, patch: Self::Patch) -> Result<Option<V>>;
}

/// Replace the whole value when the new one differs.
#[derive(Debug, Default, Clone, Copy)]
pub struct Replace;

impl<V: PartialEq> Merge<V> for Replace {
    type Patch = V;

    fn merge(&self, current: &V, patch: V) -> Result<Option<V>> {
        if *current == patch {
            return Ok(None);
        }
        Ok(Some(patch))
    }
}

/// Shallow field merge for JSON objects.
///
/// Fields named in the patch overwrite the same fields of the current object;
/// other fields are left alone. A `null` patch changes nothing, and anything
/// other than an object or `null` is rejected.
#[derive(Debug, Default, Clone, Copy)]
pub struct FieldMerge;

impl Merge<Map<String, Value>> for FieldMerge {
    type Patch = Value;

    fn merge(
        &self,
        current: &Map<String, Value>,
        patch: Value,
    ) -> Result<Option<Map<String, Value>>> {
        let fields = match patch {
            Value::Null => return Ok(None),
            Value::Object(fields) => fields,
            other => {
                return Err(StoreError::invalid_argument(format!(
                    "expected an object patch, got {}",
                    json_kind(&other)
                )));
            }
        };

        let changes: Vec<(String, Value)> = fields
            .into_iter()
            .filter(|(key, next)| current.get(key) != Some(next))
            .collect();
        if changes.is_empty() {
            return Ok(None);
        }

        let mut next = current.clone();
        next.extend(changes);
        Ok(Some(next))
    }
}

/// Accept a JSON object (or `null`) as the initial value of a field-merged store.
pub(crate) fn object_from_json(value: Value) -> Result<Map<String, Value>> {
    match value {
        Value::Null => Ok(Map::new()),
        Value::Object(fields) => Ok(fields),
        other => Err(StoreError::invalid_argument(format!(
            "expected an object, got {}",
            json_kind(&other)
        ))),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
