//! Untyped rows exchanged between models and the engine.

use crate::error::{StoreError, StoreResult};
use crate::value::{FromValue, Value};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;

/// Labels attached to a row or a transaction, keyed by name.
pub type Labels = BTreeMap<String, String>;

/// Builds a label set from `(name, value)` pairs.
#[must_use]
pub fn labels(pairs: &[(&str, &str)]) -> Labels {
    pairs
        .iter()
        .map(|(name, value)| ((*name).to_string(), (*value).to_string()))
        .collect()
}

/// Ordered field values of one stored row.
///
/// Field names match case-insensitively.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    values: Vec<(String, Value)>,
}

impl Row {
    /// Creates an empty row.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a field value, replacing any previous value.
    pub fn set(&mut self, field: &str, value: impl Into<Value>) -> &mut Self {
        let value = value.into();
        match self.position(field) {
            Some(i) => self.values[i].1 = value,
            None => self.values.push((field.to_string(), value)),
        }
        self
    }

    /// Builder form of [`Row::set`].
    #[must_use]
    pub fn with(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.set(field, value);
        self
    }

    /// Returns the raw value of a field.
    #[must_use]
    pub fn value(&self, field: &str) -> Option<&Value> {
        self.position(field).map(|i| &self.values[i].1)
    }

    /// Reads a field, using the type's default when it is absent or null.
    pub fn get<T: FromValue + Default>(&self, field: &str) -> StoreResult<T> {
        match self.value(field) {
            None | Some(Value::Null) => Ok(T::default()),
            Some(value) => T::from_value(field, value),
        }
    }

    /// Serializes a structured field.
    pub fn set_encoded<T: Serialize>(&mut self, field: &str, value: &T) -> StoreResult<&mut Self> {
        let json = serde_json::to_value(value).map_err(|source| StoreError::Encoding {
            field: field.to_string(),
            source,
        })?;
        Ok(self.set(field, Value::Json(json)))
    }

    /// Deserializes a structured field. Absent or empty fields yield the default.
    pub fn get_encoded<T: DeserializeOwned + Default>(&self, field: &str) -> StoreResult<T> {
        match self.value(field) {
            None | Some(Value::Null) | Some(Value::Json(serde_json::Value::Null)) => {
                Ok(T::default())
            }
            Some(Value::Json(json)) => {
                serde_json::from_value(json.clone()).map_err(|source| StoreError::Encoding {
                    field: field.to_string(),
                    source,
                })
            }
            Some(Value::Text(text)) if text.is_empty() => Ok(T::default()),
            Some(Value::Text(text)) => {
                serde_json::from_str(text).map_err(|source| StoreError::Encoding {
                    field: field.to_string(),
                    source,
                })
            }
            Some(other) => Err(StoreError::field_type(
                field,
                format!("expected encoded value, found {other:?}"),
            )),
        }
    }

    /// Returns true if the row carries the field.
    #[must_use]
    pub fn contains(&self, field: &str) -> bool {
        self.position(field).is_some()
    }

    /// Number of fields carried.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true if the row carries no fields.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Iterates over `(field, value)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(name, value)| (name.as_str(), value))
    }

    fn position(&self, field: &str) -> Option<usize> {
        self.values
            .iter()
            .position(|(name, _)| name.eq_ignore_ascii_case(field))
    }
}
