//! Error types for invdb core.

use std::io;
use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur in store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Row not found.
    #[error("{kind} not found: pk={pk}")]
    NotFound {
        /// Kind searched.
        kind: String,
        /// Primary key that was not found.
        pk: String,
    },

    /// Unique constraint violated.
    #[error("duplicate {kind}: {detail}")]
    Duplicate {
        /// Kind of the offending row.
        kind: String,
        /// Engine message naming the constraint.
        detail: String,
    },

    /// Optimistic revision mismatch on update.
    #[error("conflict updating {kind} pk={pk}: row changed since it was read")]
    Conflict {
        /// Kind of the row.
        kind: String,
        /// Primary key of the row.
        pk: String,
    },

    /// A `+must` foreign key references a missing row.
    #[error("{kind}: referenced row is missing ({detail})")]
    FkMissing {
        /// Kind of the referencing row.
        kind: String,
        /// Engine message.
        detail: String,
    },

    /// The engine (or the session in use) has been closed.
    #[error("engine is closed")]
    EngineClosed,

    /// The operation was cancelled by its caller.
    #[error("operation cancelled")]
    Cancelled,

    /// A predicate references an unknown field.
    #[error("predicate references unknown field '{field}' on {kind}")]
    PredicateRef {
        /// Kind the predicate was built against.
        kind: String,
        /// Unknown field name.
        field: String,
    },

    /// The predicate operator does not apply to the field type.
    #[error("predicate operator '{operator}' not supported on field '{field}'")]
    PredicateType {
        /// Field name.
        field: String,
        /// Operator.
        operator: &'static str,
    },

    /// The predicate value cannot be converted to the field type.
    #[error("predicate value for field '{field}' is invalid: {message}")]
    PredicateValue {
        /// Field name.
        field: String,
        /// Description of the problem.
        message: String,
    },

    /// A field value has an unexpected type.
    #[error("field '{field}' has unsupported type: {message}")]
    FieldType {
        /// Field name.
        field: String,
        /// Description of the problem.
        message: String,
    },

    /// A link field cannot point at its target.
    #[error("{kind}.{field}: must be a link of the target primary key type")]
    MustBePointer {
        /// Kind declaring the field.
        kind: String,
        /// Field name.
        field: String,
    },

    /// A schema does not describe a storable object.
    #[error("{kind}: must describe an object with stored fields")]
    MustBeObject {
        /// Kind name as declared.
        kind: String,
    },

    /// A generated primary key references invalid fields.
    #[error("{kind}: generated pk must concatenate existing string fields ({message})")]
    GenPkType {
        /// Kind name.
        kind: String,
        /// Description of the problem.
        message: String,
    },

    /// The primary key field has an unsupported type.
    #[error("{kind}.{field}: primary key must be a string or integer")]
    PkType {
        /// Kind name.
        kind: String,
        /// Field name.
        field: String,
    },

    /// A detail level outside `0..=9`.
    #[error("detail level {detail} out of range (0..=9)")]
    DetailOutOfRange {
        /// The offending level.
        detail: u32,
    },

    /// A definition without a primary key, or a row without its value.
    #[error("{kind}: must have exactly one primary key")]
    MustHavePk {
        /// Kind name.
        kind: String,
    },

    /// A watch queue overflowed and events were dropped.
    #[error("watch {watch} queue full: {dropped} event(s) dropped")]
    QueueFull {
        /// Watch id.
        watch: u64,
        /// Number of events dropped since the last report.
        dropped: u64,
    },

    /// Malformed definition (role tag, reference, cycle).
    #[error("invalid definition: {message}")]
    Definition {
        /// Description of the problem.
        message: String,
    },

    /// Kind is not part of the data model.
    #[error("unknown kind: {kind}")]
    UnknownKind {
        /// Kind name.
        kind: String,
    },

    /// Encoded field (de)serialization failed.
    #[error("encoding field '{field}': {source}")]
    Encoding {
        /// Field name.
        field: String,
        /// Underlying serde error.
        #[source]
        source: serde_json::Error,
    },

    /// Embedded engine error wrapped with caller context.
    #[error("{context}: {source}")]
    Sqlite {
        /// What the caller was doing.
        context: String,
        /// Underlying engine error.
        #[source]
        source: rusqlite::Error,
    },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Operation not permitted in the current state.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Description of why the operation is invalid.
        message: String,
    },
}

impl StoreError {
    /// Creates a not found error.
    pub fn not_found(kind: impl Into<String>, pk: impl Into<String>) -> Self {
        Self::NotFound {
            kind: kind.into(),
            pk: pk.into(),
        }
    }

    /// Creates a conflict error.
    pub fn conflict(kind: impl Into<String>, pk: impl Into<String>) -> Self {
        Self::Conflict {
            kind: kind.into(),
            pk: pk.into(),
        }
    }

    /// Creates a definition error.
    pub fn definition(message: impl Into<String>) -> Self {
        Self::Definition {
            message: message.into(),
        }
    }

    /// Creates an unknown kind error.
    pub fn unknown_kind(kind: impl Into<String>) -> Self {
        Self::UnknownKind { kind: kind.into() }
    }

    /// Creates a field type error.
    pub fn field_type(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::FieldType {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Creates a predicate value error.
    pub fn predicate_value(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::PredicateValue {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }

    /// Wraps an engine error with context.
    pub fn sqlite(context: impl Into<String>, source: rusqlite::Error) -> Self {
        Self::Sqlite {
            context: context.into(),
            source,
        }
    }

    /// Returns true for `NotFound`.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Returns true for `Conflict`.
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }

    /// Classifies a failed write on `kind`.
    ///
    /// Foreign key violations become `FkMissing`, unique and primary key
    /// violations become `Duplicate`. Everything else is wrapped as-is.
    pub(crate) fn from_write(kind: &str, context: &str, source: rusqlite::Error) -> Self {
        use rusqlite::ffi;

        if let rusqlite::Error::SqliteFailure(err, message) = &source {
            let detail = message.clone().unwrap_or_else(|| err.to_string());
            match err.extended_code {
                ffi::SQLITE_CONSTRAINT_FOREIGNKEY => {
                    return Self::FkMissing {
                        kind: kind.to_string(),
                        detail,
                    }
                }
                ffi::SQLITE_CONSTRAINT_UNIQUE | ffi::SQLITE_CONSTRAINT_PRIMARYKEY => {
                    return Self::Duplicate {
                        kind: kind.to_string(),
                        detail,
                    }
                }
                _ => {}
            }
        }
        Self::sqlite(format!("{context} {kind}"), source)
    }
}

/// Adds caller context to engine results.
pub(crate) trait SqlContext<T> {
    /// Wraps an engine error with `context`.
    fn context(self, context: impl FnOnce() -> String) -> StoreResult<T>;
}

impl<T> SqlContext<T> for Result<T, rusqlite::Error> {
    fn context(self, context: impl FnOnce() -> String) -> StoreResult<T> {
        self.map_err(|source| StoreError::sqlite(context(), source))
    }
}
