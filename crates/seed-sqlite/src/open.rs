use anyhow::{Context, Result};
use rusqlite::{Connection, OpenFlags};
use std::path::Path;
use std::time::Duration;

pub struct Db {
    pub conn: Connection,
}

impl Db {
    /// Open an existing database for read/write. Never creates the file: a
    /// missing runtime artifact must not turn into an empty database.
    pub fn open_existing(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_URI
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let conn = Connection::open_with_flags(path, flags)
            .with_context(|| format!("open sqlite database {}", path.display()))?;
        apply_pragmas(&conn)?;
        Ok(Db { conn })
    }
}

// journal_mode is left alone: it persists in the file and belongs to the app.
fn apply_pragmas(conn: &Connection) -> Result<()> {
    conn.busy_timeout(Duration::from_secs(5))?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    Ok(())
}
