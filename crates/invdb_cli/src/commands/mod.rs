//! CLI command implementations.

pub mod inspect;
pub mod labels;
pub mod verify;

use rusqlite::{Connection, OpenFlags};
use std::path::Path;
use tracing::debug;

/// Opens an existing database file without write access.
pub fn open_read_only(path: &Path) -> Result<Connection, Box<dyn std::error::Error>> {
    if !path.exists() {
        return Err(format!("No database found at {}", path.display()).into());
    }
    let conn = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )?;
    debug!(path = %path.display(), "opened read-only");
    Ok(conn)
}
