//! Model definitions.
//!
//! A kind is declared once as a [`Schema`] (field names, types and role
//! tags) and validated into a [`Definition`]. Typed structs move in and out
//! of the engine through the [`Model`] trait.

mod data_model;
mod definition;
mod field;

pub use data_model::{DataModel, DataModelBuilder};
pub use definition::{Definition, Schema};
pub use field::{Field, FieldType, ForeignKey};

pub(crate) use definition::LABEL_KIND;

use crate::error::StoreResult;
use crate::row::{Labels, Row};

/// Highest detail level.
pub const MAX_DETAIL: u8 = 9;

/// A typed row of one kind.
pub trait Model: Sized + Send + 'static {
    /// Kind name; must match the schema.
    const KIND: &'static str;

    /// Declares the kind's fields.
    fn schema() -> Schema;

    /// Writes the struct's fields into `row`.
    fn encode(&self, row: &mut Row) -> StoreResult<()>;

    /// Rebuilds the struct from a (possibly projected) row.
    fn decode(row: &Row) -> StoreResult<Self>;

    /// Labels stored with the row.
    fn labels(&self) -> Labels {
        Labels::new()
    }
}
