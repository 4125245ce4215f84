//! Connection setup.
//!
//! # Invariants
//! - Every returned connection has `foreign_keys=ON` and a fully migrated
//!   schema.
//! - File databases use WAL so the CLI can run against a live server DB.

use super::migrations::apply_migrations;
use super::DbResult;
use rusqlite::Connection;
use std::path::Path;
use std::time::{Duration, Instant};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Opens (creating if needed) the database file at `path` and migrates it.
///
/// Missing parent directories are created.
pub fn open_db(path: impl AsRef<Path>) -> DbResult<Connection> {
    let path = path.as_ref();
    logged("file", || {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let mut conn = Connection::open(path)?;
        conn.query_row("PRAGMA journal_mode = WAL;", [], |_| Ok(()))?;
        prepare(&mut conn)?;
        Ok(conn)
    })
}

/// Fresh migrated in-memory database for tests and `KABUNOTE_ENV=testing`.
pub fn open_db_in_memory() -> DbResult<Connection> {
    logged("memory", || {
        let mut conn = Connection::open_in_memory()?;
        prepare(&mut conn)?;
        Ok(conn)
    })
}

fn prepare(conn: &mut Connection) -> DbResult<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.busy_timeout(BUSY_TIMEOUT)?;
    apply_migrations(conn)?;
    Ok(())
}

fn logged(
    mode: &str,
    open: impl FnOnce() -> DbResult<Connection>,
) -> DbResult<Connection> {
    let started = Instant::now();
    let result = open();
    let elapsed = started.elapsed().as_millis();
    match &result {
        Ok(_) => log::info!("event=db_open module=db status=ok mode={mode} duration_ms={elapsed}"),
        Err(err) => log::error!(
            "event=db_open module=db status=error mode={mode} duration_ms={elapsed} error={err}"
        ),
    }
    result
}
