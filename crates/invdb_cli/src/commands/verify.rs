//! Verify command implementation.

use super::open_read_only;
use rusqlite::Connection;
use std::path::Path;

/// Verification result.
#[derive(Debug, Default)]
pub struct VerifyResult {
    /// Problems reported by `PRAGMA integrity_check`.
    pub integrity: Vec<String>,
    /// Rows whose enforced links point at missing rows.
    pub foreign_keys: Vec<String>,
}

impl VerifyResult {
    fn is_ok(&self) -> bool {
        self.integrity.is_empty() && self.foreign_keys.is_empty()
    }
}

/// Runs the verify command.
pub fn run(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    println!("Verifying database at {}", path.display());
    println!();

    let conn = open_read_only(path)?;
    let result = verify(&conn)?;

    println!("Integrity:    {} problem(s)", result.integrity.len());
    for problem in &result.integrity {
        println!("  {problem}");
    }
    println!("Foreign keys: {} violation(s)", result.foreign_keys.len());
    for violation in &result.foreign_keys {
        println!("  {violation}");
    }

    println!();
    if result.is_ok() {
        println!("✓ Database verification passed");
        Ok(())
    } else {
        println!("✗ Database verification failed");
        Err("Verification failed".into())
    }
}

/// Runs both checks.
pub fn verify(conn: &Connection) -> Result<VerifyResult, Box<dyn std::error::Error>> {
    let mut result = VerifyResult::default();

    let mut stmt = conn.prepare("PRAGMA integrity_check")?;
    for line in stmt.query_map([], |r| r.get::<_, String>(0))? {
        let line = line?;
        if line != "ok" {
            result.integrity.push(line);
        }
    }

    let mut stmt = conn.prepare("PRAGMA foreign_key_check")?;
    let violations = stmt.query_map([], |r| {
        Ok(format!(
            "{} rowid={} -> {}",
            r.get::<_, String>(0)?,
            r.get::<_, Option<i64>>(1)?.map_or_else(|| "?".to_string(), |id| id.to_string()),
            r.get::<_, String>(2)?,
        ))
    })?;
    for violation in violations {
        result.foreign_keys.push(violation?);
    }

    Ok(result)
}
