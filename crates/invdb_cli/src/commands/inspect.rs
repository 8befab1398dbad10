//! Inspect command implementation.

use super::open_read_only;
use invdb_core::sql::{ident, LABEL_TABLE};
use rusqlite::Connection;
use serde::Serialize;
use std::path::Path;

/// Database inspection result.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// Database path.
    pub path: String,
    /// File size in bytes.
    pub file_size: u64,
    /// Page size in bytes.
    pub page_size: i64,
    /// Journal mode.
    pub journal_mode: String,
    /// Per-kind statistics.
    pub kinds: Vec<KindStats>,
}

/// Statistics for one kind.
#[derive(Debug, Serialize)]
pub struct KindStats {
    /// Table name.
    pub kind: String,
    /// Number of rows.
    pub rows: i64,
    /// Number of label rows.
    pub labels: i64,
}

/// Runs the inspect command.
pub fn run(path: &Path, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let conn = open_read_only(path)?;
    let result = inspect(&conn, path)?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        _ => {
            print_text_output(&result);
        }
    }

    Ok(())
}

/// Collects statistics for every user table.
pub fn inspect(conn: &Connection, path: &Path) -> Result<InspectResult, Box<dyn std::error::Error>> {
    let file_size = std::fs::metadata(path)?.len();
    let page_size: i64 = conn.query_row("PRAGMA page_size", [], |r| r.get(0))?;
    let journal_mode: String = conn.query_row("PRAGMA journal_mode", [], |r| r.get(0))?;

    let mut stmt = conn.prepare(
        "SELECT name FROM sqlite_master WHERE type = 'table' \
         AND name NOT LIKE 'sqlite_%' ORDER BY name",
    )?;
    let tables = stmt
        .query_map([], |r| r.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;

    let mut kinds = Vec::new();
    for table in tables.into_iter().filter(|t| t != LABEL_TABLE) {
        let rows: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM {}", ident(&table)),
            [],
            |r| r.get(0),
        )?;
        let labels: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM {} WHERE \"kind\" = ?1", ident(LABEL_TABLE)),
            [&table],
            |r| r.get(0),
        )?;
        kinds.push(KindStats {
            kind: table,
            rows,
            labels,
        });
    }

    Ok(InspectResult {
        path: path.display().to_string(),
        file_size,
        page_size,
        journal_mode,
        kinds,
    })
}

fn print_text_output(result: &InspectResult) {
    println!("invdb Database Inspection");
    println!("=========================");
    println!();
    println!("Path:         {}", result.path);
    println!("File size:    {} bytes", result.file_size);
    println!("Page size:    {} bytes", result.page_size);
    println!("Journal mode: {}", result.journal_mode);
    println!();
    println!("{:<24} {:>10} {:>10}", "Kind", "Rows", "Labels");
    println!("{:-<24} {:->10} {:->10}", "", "", "");
    for kind in &result.kinds {
        println!("{:<24} {:>10} {:>10}", kind.kind, kind.rows, kind.labels);
    }
}
