//! Lazily decoded query results.

use crate::error::StoreResult;
use crate::model::Model;
use crate::row::Row;
use std::marker::PhantomData;

/// Rows returned by `find`, decoded one at a time.
///
/// The rows are read when the cursor is created; the length is known up front.
pub struct Cursor<M> {
    rows: std::vec::IntoIter<Row>,
    _model: PhantomData<fn() -> M>,
}

impl<M: Model> Cursor<M> {
    pub(crate) fn new(rows: Vec<Row>) -> Self {
        Self {
            rows: rows.into_iter(),
            _model: PhantomData,
        }
    }
}

impl<M: Model> Iterator for Cursor<M> {
    type Item = StoreResult<M>;

    fn next(&mut self) -> Option<Self::Item> {
        self.rows.next().map(|row| M::decode(&row))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.rows.size_hint()
    }
}

impl<M: Model> ExactSizeIterator for Cursor<M> {}

impl<M> std::fmt::Debug for Cursor<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cursor")
            .field("remaining", &self.rows.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FieldType, Schema};

    struct Num(i64);

    impl Model for Num {
        const KIND: &'static str = "Num";

        fn schema() -> Schema {
            Schema::new(Self::KIND).field("n", FieldType::Integer, "pk")
        }

        fn encode(&self, row: &mut Row) -> StoreResult<()> {
            row.set("n", self.0);
            Ok(())
        }

        fn decode(row: &Row) -> StoreResult<Self> {
            Ok(Self(row.get("n")?))
        }
    }

    #[test]
    fn len_then_iterate() {
        let rows = vec![Row::new().with("n", 1), Row::new().with("n", 2)];
        let mut cursor = Cursor::<Num>::new(rows);
        assert_eq!(cursor.len(), 2);
        assert_eq!(cursor.next().unwrap().unwrap().0, 1);
        assert_eq!(cursor.len(), 1);
        assert_eq!(cursor.next().unwrap().unwrap().0, 2);
        assert!(cursor.next().is_none());
    }

    #[test]
    fn decode_errors_surface_per_item() {
        let rows = vec![Row::new().with("n", "x")];
        let mut cursor = Cursor::<Num>::new(rows);
        assert!(cursor.next().unwrap().is_err());
    }
}
