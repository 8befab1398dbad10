//! Row-level statement execution on one connection.

use crate::error::{SqlContext, StoreError, StoreResult};
use crate::model::{Definition, Field, MAX_DETAIL};
use crate::predicate::{ListOptions, Predicate};
use crate::row::{Labels, Row};
use crate::sql::{dml, Statement};
use crate::value::Value;
use rusqlite::Connection;

/// Reads the row with primary key `pk`, projected at `detail`.
pub(crate) fn fetch(
    conn: &Connection,
    def: &Definition,
    pk: &Value,
    detail: u8,
) -> StoreResult<Option<Row>> {
    let st = dml::get(def, pk.clone(), detail);
    let mut rows = select(conn, def, &st, &def.projection(detail))?;
    Ok(rows.pop())
}

/// Current revision of a row, or `None` if it does not exist.
pub(crate) fn revision(conn: &Connection, def: &Definition, pk: &Value) -> StoreResult<Option<i64>> {
    let st = dml::revision(def, pk.clone());
    let mut stmt = conn
        .prepare_cached(&st.sql)
        .context(|| format!("prepare revision {}", def.kind()))?;
    let mut rows = stmt
        .query(st.named().as_slice())
        .context(|| format!("revision {}", def.kind()))?;
    match rows.next().context(|| format!("revision {}", def.kind()))? {
        Some(row) => Ok(Some(
            row.get(0).context(|| format!("revision {}", def.kind()))?,
        )),
        None => Ok(None),
    }
}

/// Runs a SELECT whose columns are `fields`, in order.
pub(crate) fn select(
    conn: &Connection,
    def: &Definition,
    st: &Statement,
    fields: &[&Field],
) -> StoreResult<Vec<Row>> {
    let mut stmt = conn
        .prepare_cached(&st.sql)
        .context(|| format!("prepare select {}", def.kind()))?;
    let mut rows = stmt
        .query(st.named().as_slice())
        .context(|| format!("select {}", def.kind()))?;
    let mut out = Vec::new();
    while let Some(raw) = rows.next().context(|| format!("select {}", def.kind()))? {
        let mut row = Row::new();
        for (i, field) in fields.iter().enumerate() {
            let cell = raw
                .get_ref(i)
                .context(|| format!("read {}.{}", def.kind(), field.name))?;
            row.set(&field.name, Value::from_column(&field.name, field.ty, cell)?);
        }
        out.push(row);
    }
    Ok(out)
}

/// Rows matching `options`.
pub(crate) fn list(
    conn: &Connection,
    def: &Definition,
    options: &ListOptions,
) -> StoreResult<Vec<Row>> {
    let st = dml::list(def, options)?;
    let fields = def.projection(options.resolved_detail()?);
    select(conn, def, &st, &fields)
}

/// Number of rows matching `predicate`.
pub(crate) fn count(
    conn: &Connection,
    def: &Definition,
    predicate: Option<&Predicate>,
) -> StoreResult<usize> {
    let st = dml::count(def, predicate)?;
    let n: i64 = conn
        .query_row(&st.sql, st.named().as_slice(), |r| r.get(0))
        .context(|| format!("count {}", def.kind()))?;
    Ok(usize::try_from(n).unwrap_or(0))
}

/// Full rows of `child` linked to `parent_pk` through `link`.
pub(crate) fn children(
    conn: &Connection,
    child: &Definition,
    link: &Field,
    parent_pk: &Value,
) -> StoreResult<Vec<Row>> {
    let st = dml::children(child, link, parent_pk.clone());
    select(conn, child, &st, &child.projection(MAX_DETAIL))
}

/// Executes a write, classifying constraint failures.
fn write(conn: &Connection, def: &Definition, what: &str, st: &Statement) -> StoreResult<usize> {
    let mut stmt = conn
        .prepare_cached(&st.sql)
        .map_err(|e| StoreError::from_write(def.kind(), what, e))?;
    stmt.execute(st.named().as_slice())
        .map_err(|e| StoreError::from_write(def.kind(), what, e))
}

/// INSERT of `row`.
pub(crate) fn insert(conn: &Connection, def: &Definition, row: &Row) -> StoreResult<()> {
    write(conn, def, "insert", &dml::insert(def, row)?)?;
    Ok(())
}

/// UPDATE of `row`; returns the number of rows affected.
pub(crate) fn update(
    conn: &Connection,
    def: &Definition,
    row: &Row,
    expected: Option<i64>,
    filter: Option<&Predicate>,
) -> StoreResult<usize> {
    write(conn, def, "update", &dml::update(def, row, expected, filter)?)
}

/// DELETE by primary key; returns the number of rows affected.
pub(crate) fn delete(conn: &Connection, def: &Definition, pk: &Value) -> StoreResult<usize> {
    write(conn, def, "delete", &dml::delete(def, pk.clone()))
}

/// Replaces every label of one row.
pub(crate) fn replace_labels(
    conn: &Connection,
    kind: &str,
    parent: &str,
    labels: &Labels,
) -> StoreResult<()> {
    delete_labels(conn, kind, parent)?;
    for (name, value) in labels {
        let st = dml::insert_label(kind, parent, name, value);
        conn.prepare_cached(&st.sql)
            .and_then(|mut stmt| stmt.execute(st.named().as_slice()))
            .context(|| format!("insert label {kind}/{parent}/{name}"))?;
    }
    Ok(())
}

/// Removes every label of one row.
pub(crate) fn delete_labels(conn: &Connection, kind: &str, parent: &str) -> StoreResult<()> {
    let st = dml::delete_labels(kind, parent);
    conn.prepare_cached(&st.sql)
        .and_then(|mut stmt| stmt.execute(st.named().as_slice()))
        .context(|| format!("delete labels {kind}/{parent}"))?;
    Ok(())
}

/// Labels of one row.
pub(crate) fn labels(conn: &Connection, kind: &str, parent: &str) -> StoreResult<Labels> {
    let st = dml::select_labels(kind, parent);
    let mut stmt = conn
        .prepare_cached(&st.sql)
        .context(|| format!("prepare labels {kind}"))?;
    let pairs = stmt
        .query_map(st.named().as_slice(), |r| {
            Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?))
        })
        .context(|| format!("labels {kind}/{parent}"))?;
    let mut out = Labels::new();
    for pair in pairs {
        let (name, value) = pair.context(|| format!("labels {kind}/{parent}"))?;
        out.insert(name, value);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DataModel, FieldType, Schema};
    use crate::predicate::eq;
    use crate::row::labels as label_set;
    use crate::sql::create_statements;

    fn setup() -> (Connection, DataModel) {
        let model = DataModel::builder()
            .with_schema(
                Schema::new("Host")
                    .field("id", FieldType::String, "pk")
                    .field("rev", FieldType::Integer, "incremented"),
            )
            .with_schema(
                Schema::new("VM")
                    .field("id", FieldType::Integer, "pk")
                    .field("host", FieldType::String, "fk(Host +must +cascade)")
                    .field("name", FieldType::String, "key"),
            )
            .build()
            .unwrap();
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("PRAGMA foreign_keys = ON").unwrap();
        for sql in create_statements(&model) {
            conn.execute_batch(&sql).unwrap();
        }
        (conn, model)
    }

    #[test]
    fn insert_fetch_update() {
        let (conn, model) = setup();
        let host = model.definition("Host").unwrap();
        let row = Row::new().with("id", "h1");
        insert(&conn, host, &row).unwrap();

        let pk = Value::from("h1");
        let stored = fetch(&conn, host, &pk, MAX_DETAIL).unwrap().unwrap();
        assert_eq!(stored.get::<i64>("rev").unwrap(), 1);
        assert_eq!(revision(&conn, host, &pk).unwrap(), Some(1));

        assert_eq!(update(&conn, host, &row, Some(1), None).unwrap(), 1);
        assert_eq!(update(&conn, host, &row, Some(1), None).unwrap(), 0);
        assert_eq!(revision(&conn, host, &pk).unwrap(), Some(2));
    }

    #[test]
    fn constraint_errors_are_classified() {
        let (conn, model) = setup();
        let vm = model.definition("VM").unwrap();
        let orphan = Row::new().with("id", 1).with("host", "nope").with("name", "a");
        assert!(matches!(
            insert(&conn, vm, &orphan),
            Err(StoreError::FkMissing { .. })
        ));

        let host = model.definition("Host").unwrap();
        insert(&conn, host, &Row::new().with("id", "h1")).unwrap();
        let a = Row::new().with("id", 1).with("host", "h1").with("name", "a");
        insert(&conn, vm, &a).unwrap();
        let twin = Row::new().with("id", 2).with("host", "h1").with("name", "a");
        assert!(matches!(
            insert(&conn, vm, &twin),
            Err(StoreError::Duplicate { .. })
        ));
    }

    #[test]
    fn labels_and_match() {
        let (conn, model) = setup();
        let host = model.definition("Host").unwrap();
        for (id, role) in [("h1", "web"), ("h2", "db")] {
            insert(&conn, host, &Row::new().with("id", id)).unwrap();
            replace_labels(&conn, "Host", id, &label_set(&[("role", role)])).unwrap();
        }
        let opts = ListOptions::new().predicate(crate::predicate::matches(label_set(&[(
            "role", "web",
        )])));
        let rows = list(&conn, host, &opts).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get::<String>("id").unwrap(), "h1");
        assert_eq!(count(&conn, host, opts.predicate.as_ref()).unwrap(), 1);

        assert_eq!(labels(&conn, "Host", "h2").unwrap(), label_set(&[("role", "db")]));
        delete_labels(&conn, "Host", "h2").unwrap();
        assert!(labels(&conn, "Host", "h2").unwrap().is_empty());
    }

    #[test]
    fn children_by_link() {
        let (conn, model) = setup();
        let host = model.definition("Host").unwrap();
        let vm = model.definition("VM").unwrap();
        insert(&conn, host, &Row::new().with("id", "h1")).unwrap();
        for (id, name) in [(1, "a"), (2, "b")] {
            let row = Row::new().with("id", id).with("host", "h1").with("name", name);
            insert(&conn, vm, &row).unwrap();
        }
        let link = vm.field("host").unwrap();
        let kids = children(&conn, vm, link, &Value::from("h1")).unwrap();
        assert_eq!(kids.len(), 2);

        let named = list(&conn, vm, &ListOptions::new().predicate(eq("name", "b"))).unwrap();
        assert_eq!(named[0].get::<i64>("id").unwrap(), 2);
        assert_eq!(delete(&conn, vm, &Value::Integer(2)).unwrap(), 1);
        assert_eq!(delete(&conn, vm, &Value::Integer(2)).unwrap(), 0);
    }
}
