//! Labels command implementation.

use super::open_read_only;
use invdb_core::sql::{ident, LABEL_TABLE};
use rusqlite::Connection;
use std::path::Path;

/// One label row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelRow {
    /// Primary key of the labeled row, as text.
    pub parent: String,
    /// Label name.
    pub name: String,
    /// Label value.
    pub value: String,
}

/// Runs the labels command.
pub fn run(path: &Path, kind: &str, parent: Option<&str>) -> Result<(), Box<dyn std::error::Error>> {
    let conn = open_read_only(path)?;
    let rows = labels(&conn, kind, parent)?;
    for row in &rows {
        println!("{}\t{}={}", row.parent, row.name, row.value);
    }
    println!("{} label(s)", rows.len());
    Ok(())
}

/// Label rows of `kind`, optionally of one row, ordered by parent and name.
pub fn labels(
    conn: &Connection,
    kind: &str,
    parent: Option<&str>,
) -> Result<Vec<LabelRow>, Box<dyn std::error::Error>> {
    let sql = format!(
        "SELECT \"parent\", \"name\", \"value\" FROM {} \
         WHERE \"kind\" = ?1 AND (?2 IS NULL OR \"parent\" = ?2) \
         ORDER BY \"parent\", \"name\"",
        ident(LABEL_TABLE)
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(rusqlite::params![kind, parent], |r| {
            Ok(LabelRow {
                parent: r.get(0)?,
                name: r.get(1)?,
                value: r.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}
