//! Column values.

use crate::error::{StoreError, StoreResult};
use crate::model::FieldType;
use rusqlite::types::{ToSql, ToSqlOutput, ValueRef};
use std::fmt;

/// A single column value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Absent value.
    Null,
    /// Integer column.
    Integer(i64),
    /// Boolean column, stored as 0/1.
    Bool(bool),
    /// String column.
    Text(String),
    /// Encoded (structured) column, stored as compact JSON text.
    Json(serde_json::Value),
}

impl Value {
    /// Returns the integer value, if this is an integer.
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(n) => Some(*n),
            _ => None,
        }
    }

    /// Returns the boolean value, if this is a boolean.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Returns the string value, if this is a string.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Returns true for `Null`.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Renders the value as it is stored in the label `parent` column.
    #[must_use]
    pub fn key_string(&self) -> String {
        match self {
            Self::Null => String::new(),
            Self::Integer(n) => n.to_string(),
            Self::Bool(b) => i64::from(*b).to_string(),
            Self::Text(s) => s.clone(),
            Self::Json(v) => v.to_string(),
        }
    }

    /// The zero value written for a field the row does not carry.
    pub(crate) fn zero(ty: FieldType) -> Self {
        match ty {
            FieldType::Integer => Self::Integer(0),
            FieldType::Bool => Self::Bool(false),
            FieldType::String => Self::Text(String::new()),
            FieldType::Encoded => Self::Json(serde_json::Value::Null),
        }
    }

    /// Reads a column according to the declared field type.
    pub(crate) fn from_column(field: &str, ty: FieldType, raw: ValueRef<'_>) -> StoreResult<Self> {
        let value = match (ty, raw) {
            (_, ValueRef::Null) => Self::Null,
            (FieldType::Integer, ValueRef::Integer(n)) => Self::Integer(n),
            (FieldType::Bool, ValueRef::Integer(n)) => Self::Bool(n != 0),
            (FieldType::String, ValueRef::Text(t)) => {
                Self::Text(String::from_utf8_lossy(t).into_owned())
            }
            (FieldType::String, ValueRef::Integer(n)) => Self::Text(n.to_string()),
            (FieldType::Encoded, ValueRef::Text(t)) => {
                if t.is_empty() {
                    Self::Json(serde_json::Value::Null)
                } else {
                    let parsed = serde_json::from_slice(t).map_err(|source| {
                        StoreError::Encoding {
                            field: field.to_string(),
                            source,
                        }
                    })?;
                    Self::Json(parsed)
                }
            }
            (ty, other) => {
                return Err(StoreError::field_type(
                    field,
                    format!("stored {:?} does not fit {ty:?}", other.data_type()),
                ))
            }
        };
        Ok(value)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Integer(n) => write!(f, "{n}"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Text(s) => write!(f, "{s}"),
            Self::Json(v) => write!(f, "{v}"),
        }
    }
}

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Self::Null => ToSqlOutput::from(rusqlite::types::Null),
            Self::Integer(n) => ToSqlOutput::from(*n),
            Self::Bool(b) => ToSqlOutput::from(i64::from(*b)),
            Self::Text(s) => ToSqlOutput::from(s.as_str()),
            Self::Json(serde_json::Value::Null) => ToSqlOutput::from(""),
            Self::Json(v) => ToSqlOutput::from(v.to_string()),
        })
    }
}

macro_rules! impl_from_int {
    ($($t:ty),*) => {
        $(
            impl From<$t> for Value {
                fn from(n: $t) -> Self {
                    Self::Integer(i64::from(n))
                }
            }
        )*
    };
}

impl_from_int!(i8, i16, i32, i64, u8, u16, u32);

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<&String> for Value {
    fn from(s: &String) -> Self {
        Self::Text(s.clone())
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        Self::Json(v)
    }
}

/// Conversion from a column value into a Rust field.
pub trait FromValue: Sized {
    /// Converts `value`, read from `field`.
    fn from_value(field: &str, value: &Value) -> StoreResult<Self>;
}

macro_rules! impl_from_value_int {
    ($($t:ty),*) => {
        $(
            impl FromValue for $t {
                fn from_value(field: &str, value: &Value) -> StoreResult<Self> {
                    let n = match value {
                        Value::Integer(n) => *n,
                        Value::Bool(b) => i64::from(*b),
                        other => {
                            return Err(StoreError::field_type(
                                field,
                                format!("expected integer, found {other:?}"),
                            ))
                        }
                    };
                    <$t>::try_from(n).map_err(|_| {
                        StoreError::field_type(field, format!("{n} out of range"))
                    })
                }
            }
        )*
    };
}

impl_from_value_int!(i8, i16, i32, i64, u8, u16, u32, u64, usize);

impl FromValue for bool {
    fn from_value(field: &str, value: &Value) -> StoreResult<Self> {
        match value {
            Value::Bool(b) => Ok(*b),
            Value::Integer(n) => Ok(*n != 0),
            other => Err(StoreError::field_type(
                field,
                format!("expected bool, found {other:?}"),
            )),
        }
    }
}

impl FromValue for String {
    fn from_value(field: &str, value: &Value) -> StoreResult<Self> {
        match value {
            Value::Text(s) => Ok(s.clone()),
            other => Err(StoreError::field_type(
                field,
                format!("expected string, found {other:?}"),
            )),
        }
    }
}

impl FromValue for Value {
    fn from_value(_field: &str, value: &Value) -> StoreResult<Self> {
        Ok(value.clone())
    }
}
