//! SQL synthesis.
//!
//! [`ddl`] renders schema creation statements from definitions; [`dml`]
//! renders parameterized CRUD statements. Parameters are named after the
//! column they bind (`:name`); predicate parameters use `:_p<n>`.

pub mod ddl;
pub mod dml;

pub use ddl::{create_statements, label_table};
pub use dml::Statement;

use crate::model::Field;

/// Name of the label side table.
pub const LABEL_TABLE: &str = "Label";

/// Quotes an identifier.
#[must_use]
pub fn ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Column expression of a field; virtual fields project the engine's `rowid`.
#[must_use]
pub fn column(field: &Field) -> String {
    if field.is_virtual {
        "rowid".to_string()
    } else {
        ident(&field.name)
    }
}

/// Named parameter bound to a column.
#[must_use]
pub fn param(field: &Field) -> String {
    format!(":{}", field.name)
}
