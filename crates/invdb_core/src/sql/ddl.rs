//! Schema creation statements.

use crate::model::{DataModel, Definition, FieldType};
use crate::sql::{ident, LABEL_TABLE};

/// Statements creating the label table and its lookup index.
#[must_use]
pub fn label_table() -> Vec<String> {
    let table = ident(LABEL_TABLE);
    vec![
        format!(
            "CREATE TABLE IF NOT EXISTS {table} (\n\
             \"kind\" TEXT NOT NULL,\n\
             \"parent\" TEXT NOT NULL,\n\
             \"name\" TEXT NOT NULL,\n\
             \"value\" TEXT NOT NULL,\n\
             PRIMARY KEY (\"kind\", \"parent\", \"name\"))"
        ),
        format!(
            "CREATE INDEX IF NOT EXISTS {} ON {table} (\"kind\", \"name\", \"value\")",
            ident(&format!("{LABEL_TABLE}_match"))
        ),
    ]
}

/// Every statement needed to create the model's schema, in dependency order.
#[must_use]
pub fn create_statements(model: &DataModel) -> Vec<String> {
    let mut statements = label_table();
    for def in model.definitions() {
        statements.extend(definition_statements(def, model));
    }
    statements
}

/// Table and index statements for one definition.
///
/// FK targets are looked up in `model` for their primary key column.
#[must_use]
pub fn definition_statements(def: &Definition, model: &DataModel) -> Vec<String> {
    let table = ident(def.kind());
    let mut lines = Vec::new();

    for field in def.stored_fields() {
        let mut line = format!("{} {}", ident(&field.name), field.ty.sql_type());
        if field.pk {
            line.push_str(" PRIMARY KEY");
            if field.ty != FieldType::Integer {
                line.push_str(" NOT NULL");
            }
        } else {
            line.push_str(" NOT NULL");
        }
        lines.push(line);
    }

    for (_, members) in def.unique_groups() {
        let cols: Vec<String> = members.iter().map(|f| ident(&f.name)).collect();
        lines.push(format!("UNIQUE ({})", cols.join(", ")));
    }

    for (field, fk) in def.foreign_keys() {
        if !fk.must {
            continue;
        }
        let Some(target) = model.definition(&fk.target) else {
            continue;
        };
        let mut line = format!(
            "FOREIGN KEY ({}) REFERENCES {} ({})",
            ident(&field.name),
            ident(target.kind()),
            ident(&target.pk().name)
        );
        if fk.cascade {
            line.push_str(" ON DELETE CASCADE");
        }
        lines.push(line);
    }

    let mut statements = vec![format!(
        "CREATE TABLE IF NOT EXISTS {table} (\n{})",
        lines.join(",\n")
    )];

    let keys: Vec<String> = def.key_fields().map(|f| ident(&f.name)).collect();
    if !keys.is_empty() {
        statements.push(format!(
            "CREATE UNIQUE INDEX IF NOT EXISTS {} ON {table} ({})",
            ident(&format!("{}_key", def.kind())),
            keys.join(", ")
        ));
    }

    for (group, members) in def.index_groups() {
        let cols: Vec<String> = members.iter().map(|f| ident(&f.name)).collect();
        statements.push(format!(
            "CREATE INDEX IF NOT EXISTS {} ON {table} ({})",
            ident(&format!("{}_{group}", def.kind())),
            cols.join(", ")
        ));
    }

    // FK columns are indexed whether or not the constraint is enforced.
    for (field, _) in def.foreign_keys() {
        statements.push(format!(
            "CREATE INDEX IF NOT EXISTS {} ON {table} ({})",
            ident(&format!("{}_fk_{}", def.kind(), field.name)),
            ident(&field.name)
        ));
    }

    statements
}
