//! Parameterized CRUD statements.

use crate::error::{StoreError, StoreResult};
use crate::model::{Definition, Field, FieldType};
use crate::predicate::{Filter, ListOptions, Predicate};
use crate::row::Row;
use crate::sql::{column, ident, param, LABEL_TABLE};
use crate::value::Value;
use rusqlite::types::ToSql;

/// Parameter holding the expected revision on update.
const EXPECTED: &str = ":_expected";

/// Parameter holding the primary key in WHERE clauses.
const PK: &str = ":_pk";

/// A SQL statement with named parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    /// SQL text.
    pub sql: String,
    /// Named parameters, each name including its `:` prefix.
    pub params: Vec<(String, Value)>,
}

impl Statement {
    fn new(sql: String) -> Self {
        Self {
            sql,
            params: Vec::new(),
        }
    }

    fn bind(mut self, name: impl Into<String>, value: Value) -> Self {
        self.params.push((name.into(), value));
        self
    }

    /// Parameters in the form rusqlite binds by name.
    #[must_use]
    pub fn named(&self) -> Vec<(&str, &dyn ToSql)> {
        self.params
            .iter()
            .map(|(name, value)| (name.as_str(), value as &dyn ToSql))
            .collect()
    }
}

/// INSERT of every stored field. An `incremented` field is written as 1.
pub fn insert(def: &Definition, row: &Row) -> StoreResult<Statement> {
    let mut columns = Vec::new();
    let mut values = Vec::new();
    let mut params = Vec::new();
    for field in def.stored_fields() {
        columns.push(ident(&field.name));
        if field.incremented {
            values.push("1".to_string());
            continue;
        }
        values.push(param(field));
        let value = if field.pk {
            def.pk_value(row)?
        } else {
            field_value(field, row)?
        };
        params.push((param(field), value));
    }
    Ok(Statement {
        sql: format!(
            "INSERT INTO {} ({}) VALUES ({})",
            ident(def.kind()),
            columns.join(", "),
            values.join(", ")
        ),
        params,
    })
}

/// UPDATE of every mutable field.
///
/// The revision counter is bumped in SQL. When `expected` is given, the
/// statement only matches the row at that revision. `filter` narrows the
/// match further.
pub fn update(
    def: &Definition,
    row: &Row,
    expected: Option<i64>,
    filter: Option<&Predicate>,
) -> StoreResult<Statement> {
    let mut sets = Vec::new();
    let mut params = Vec::new();
    for field in def.stored_fields().filter(|f| f.is_mutable()) {
        let col = ident(&field.name);
        if field.incremented {
            sets.push(format!("{col} = {col} + 1"));
        } else {
            sets.push(format!("{col} = {}", param(field)));
            params.push((param(field), field_value(field, row)?));
        }
    }
    let pk = def.pk();
    if sets.is_empty() {
        let col = ident(&pk.name);
        sets.push(format!("{col} = {col}"));
    }

    let mut conditions = vec![format!("{} = {PK}", ident(&pk.name))];
    params.push((PK.to_string(), def.pk_value(row)?));
    if let (Some(rev), Some(expected)) = (def.incremented(), expected) {
        conditions.push(format!("{} = {EXPECTED}", ident(&rev.name)));
        params.push((EXPECTED.to_string(), Value::Integer(expected)));
    }
    if let Some(predicate) = filter {
        let expr = predicate.build(&mut Filter::new(def, &mut params))?;
        conditions.push(format!("({expr})"));
    }

    Ok(Statement {
        sql: format!(
            "UPDATE {} SET {} WHERE {}",
            ident(def.kind()),
            sets.join(", "),
            conditions.join(" AND ")
        ),
        params,
    })
}

/// DELETE by primary key.
#[must_use]
pub fn delete(def: &Definition, pk: Value) -> Statement {
    Statement::new(format!(
        "DELETE FROM {} WHERE {} = {PK}",
        ident(def.kind()),
        ident(&def.pk().name)
    ))
    .bind(PK, pk)
}

/// SELECT of the fields projected at `detail`, by primary key.
#[must_use]
pub fn get(def: &Definition, pk: Value, detail: u8) -> Statement {
    Statement::new(format!(
        "SELECT {} FROM {} WHERE {} = {PK}",
        projection(&def.projection(detail)),
        ident(def.kind()),
        ident(&def.pk().name)
    ))
    .bind(PK, pk)
}

/// Existence check with the current revision (0 without a revision field).
#[must_use]
pub fn revision(def: &Definition, pk: Value) -> Statement {
    let rev = def
        .incremented()
        .map_or_else(|| "0".to_string(), |f| ident(&f.name));
    Statement::new(format!(
        "SELECT {rev} FROM {} WHERE {} = {PK}",
        ident(def.kind()),
        ident(&def.pk().name)
    ))
    .bind(PK, pk)
}

/// SELECT honoring predicate, detail, sort and page.
pub fn list(def: &Definition, options: &ListOptions) -> StoreResult<Statement> {
    let fields = def.projection(options.resolved_detail()?);
    let mut params = Vec::new();
    let mut sql = format!("SELECT {} FROM {}", projection(&fields), ident(def.kind()));
    if let Some(predicate) = &options.predicate {
        let expr = predicate.build(&mut Filter::new(def, &mut params))?;
        sql.push_str(" WHERE ");
        sql.push_str(&expr);
    }
    if !options.sort.is_empty() {
        let mut ordinals = Vec::with_capacity(options.sort.len());
        for &i in &options.sort {
            if i >= fields.len() {
                return Err(StoreError::invalid_operation(format!(
                    "sort index {i} outside a projection of {} columns",
                    fields.len()
                )));
            }
            ordinals.push((i + 1).to_string());
        }
        sql.push_str(" ORDER BY ");
        sql.push_str(&ordinals.join(", "));
    }
    if let Some(page) = options.page {
        let clamp = |n: usize| i64::try_from(n).unwrap_or(i64::MAX);
        sql.push_str(&format!(
            " LIMIT {} OFFSET {}",
            clamp(page.limit),
            clamp(page.offset)
        ));
    }
    Ok(Statement { sql, params })
}

/// COUNT of rows matching the predicate.
pub fn count(def: &Definition, predicate: Option<&Predicate>) -> StoreResult<Statement> {
    let mut params = Vec::new();
    let mut sql = format!("SELECT COUNT(*) FROM {}", ident(def.kind()));
    if let Some(predicate) = predicate {
        let expr = predicate.build(&mut Filter::new(def, &mut params))?;
        sql.push_str(" WHERE ");
        sql.push_str(&expr);
    }
    Ok(Statement { sql, params })
}

/// Full rows of `child` whose `link` column equals `parent_pk`.
#[must_use]
pub fn children(child: &Definition, link: &Field, parent_pk: Value) -> Statement {
    Statement::new(format!(
        "SELECT {} FROM {} WHERE {} = :_parent",
        projection(&child.projection(crate::model::MAX_DETAIL)),
        ident(child.kind()),
        ident(&link.name)
    ))
    .bind(":_parent", parent_pk)
}

/// Removes every label of one row.
#[must_use]
pub fn delete_labels(kind: &str, parent: &str) -> Statement {
    Statement::new(format!(
        "DELETE FROM {} WHERE \"kind\" = :kind AND \"parent\" = :parent",
        ident(LABEL_TABLE)
    ))
    .bind(":kind", Value::from(kind))
    .bind(":parent", Value::from(parent))
}

/// Inserts one label row.
#[must_use]
pub fn insert_label(kind: &str, parent: &str, name: &str, value: &str) -> Statement {
    Statement::new(format!(
        "INSERT INTO {} (\"kind\", \"parent\", \"name\", \"value\") \
         VALUES (:kind, :parent, :name, :value)",
        ident(LABEL_TABLE)
    ))
    .bind(":kind", Value::from(kind))
    .bind(":parent", Value::from(parent))
    .bind(":name", Value::from(name))
    .bind(":value", Value::from(value))
}

/// Selects `(name, value)` labels of one row.
#[must_use]
pub fn select_labels(kind: &str, parent: &str) -> Statement {
    Statement::new(format!(
        "SELECT \"name\", \"value\" FROM {} WHERE \"kind\" = :kind AND \"parent\" = :parent \
         ORDER BY \"name\"",
        ident(LABEL_TABLE)
    ))
    .bind(":kind", Value::from(kind))
    .bind(":parent", Value::from(parent))
}

fn projection(fields: &[&Field]) -> String {
    fields
        .iter()
        .map(|f| column(f))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Value written for `field`, falling back to the type's zero value.
fn field_value(field: &Field, row: &Row) -> StoreResult<Value> {
    let value = match (field.ty, row.value(&field.name)) {
        (ty, None | Some(Value::Null)) => Value::zero(ty),
        (FieldType::Integer, Some(Value::Integer(n))) => Value::Integer(*n),
        (FieldType::Integer, Some(Value::Bool(b))) => Value::Integer(i64::from(*b)),
        (FieldType::Bool, Some(Value::Bool(b))) => Value::Bool(*b),
        (FieldType::Bool, Some(Value::Integer(n))) => Value::Bool(*n != 0),
        (FieldType::String, Some(Value::Text(s))) => Value::Text(s.clone()),
        (FieldType::Encoded, Some(v @ (Value::Json(_) | Value::Text(_)))) => v.clone(),
        (ty, Some(other)) => {
            return Err(StoreError::field_type(
                &field.name,
                format!("{other:?} cannot be stored as {ty:?}"),
            ))
        }
    };
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Schema;
    use crate::predicate::eq;

    fn def() -> Definition {
        let schema = Schema::new("Item")
            .field("id", FieldType::Integer, "pk")
            .field("name", FieldType::String, "")
            .field("owner", FieldType::String, "const")
            .field("rev", FieldType::Integer, "incremented")
            .field("tags", FieldType::Encoded, "d2")
            .field("row", FieldType::Integer, "virtual");
        Definition::new(&schema, 0).unwrap()
    }

    #[test]
    fn insert_statement() {
        let row = Row::new().with("id", 1).with("name", "alpha");
        let st = insert(&def(), &row).unwrap();
        assert_eq!(
            st.sql,
            "INSERT INTO \"Item\" (\"id\", \"name\", \"owner\", \"rev\", \"tags\") \
             VALUES (:id, :name, :owner, 1, :tags)"
        );
        assert_eq!(st.params.len(), 4);
        assert_eq!(st.params[2], (":owner".to_string(), Value::Text(String::new())));
        assert_eq!(
            st.params[3],
            (":tags".to_string(), Value::Json(serde_json::Value::Null))
        );
    }

    #[test]
    fn update_statement() {
        let row = Row::new().with("id", 1).with("name", "beta");
        let st = update(&def(), &row, Some(1), None).unwrap();
        assert_eq!(
            st.sql,
            "UPDATE \"Item\" SET \"name\" = :name, \"rev\" = \"rev\" + 1, \"tags\" = :tags \
             WHERE \"id\" = :_pk AND \"rev\" = :_expected"
        );
        assert!(st
            .params
            .contains(&(":_expected".to_string(), Value::Integer(1))));

        let st = update(&def(), &row, None, Some(&eq("name", "alpha"))).unwrap();
        assert!(st.sql.ends_with("WHERE \"id\" = :_pk AND (\"name\" = :_p3)"));
    }

    #[test]
    fn list_statement() {
        let opts = ListOptions::new()
            .predicate(eq("name", "a"))
            .detail(0)
            .sort([1])
            .page(20, 10);
        let st = list(&def(), &opts).unwrap();
        assert_eq!(
            st.sql,
            "SELECT \"id\", \"name\", \"owner\", \"rev\", rowid FROM \"Item\" \
             WHERE \"name\" = :_p0 ORDER BY 2 LIMIT 10 OFFSET 20"
        );
        assert!(list(&def(), &ListOptions::new().detail(0).sort([9])).is_err());
    }

    #[test]
    fn page_bounds_fit_sqlite_integers() {
        let st = list(&def(), &ListOptions::new().page(usize::MAX, usize::MAX)).unwrap();
        let max = i64::MAX;
        assert!(st.sql.ends_with(&format!("LIMIT {max} OFFSET {max}")));
    }

    #[test]
    fn count_and_get() {
        let st = count(&def(), None).unwrap();
        assert_eq!(st.sql, "SELECT COUNT(*) FROM \"Item\"");

        let st = get(&def(), Value::Integer(3), 9);
        assert!(st.sql.contains("\"tags\""));
        assert_eq!(st.named().len(), 1);
    }

    #[test]
    fn rejects_mistyped_values() {
        let row = Row::new().with("id", 1).with("name", 5);
        assert!(matches!(
            insert(&def(), &row),
            Err(StoreError::FieldType { .. })
        ));
    }
}
